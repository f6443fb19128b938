//! Console rendering of agent events

pub mod cli_handler;

pub use cli_handler::{CliOutputConfig, CliOutputHandler};
