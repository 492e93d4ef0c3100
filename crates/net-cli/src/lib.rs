//! Clusternet CLI
//!
//! Command line front end of the network lifecycle engine: it wires the
//! file-backed cluster store and the `ip` controller of this member into a
//! lifecycle orchestrator and exposes its operations as subcommands.

pub mod cli;
pub mod commands;
pub mod context;

#[cfg(test)]
mod tests;
