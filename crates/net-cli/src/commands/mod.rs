//! CLI commands
//!
//! Commands return their rendered output instead of printing it, so the
//! binary decides what reaches the terminal.

pub mod cluster;
pub mod network;

pub use cluster::ClusterCommand;
pub use network::NetworkCommand;

use anyhow::Result;
use serde::Serialize;

use crate::cli::OutputFormat;

/// Render `value` as pretty JSON, or with `text` otherwise.
pub(crate) fn render<T, F>(format: OutputFormat, value: &T, text: F) -> Result<String>
where
    T: Serialize + ?Sized,
    F: FnOnce(&T) -> String,
{
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(value)?),
        OutputFormat::Text => Ok(text(value)),
    }
}

/// Plain acknowledgement of a completed action.
pub(crate) fn done(format: OutputFormat, message: String) -> Result<String> {
    let value = serde_json::json!({ "result": message });
    render(format, &value, |_| message)
}
