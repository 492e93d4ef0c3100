use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SharedTypeError {
    #[error("unknown client type: {0}")]
    UnknownClientType(String),
    #[error("unknown network status: {0}")]
    UnknownStatus(String),
}
