//! # eventdesk Core
//!
//! Core library for eventdesk: LLM agents that manage speakers and events
//! in a Dataverse CRM.
//!
//! The CRM is reached through [`dataverse::DataverseTools`], which is
//! exposed three ways: as individual tools for tool-calling agents, as
//! functions inside scripts run by [`script::ScriptRunner`], and (from the
//! `eventdesk-mcp` binary) as MCP tools. Tool failures never escape as
//! errors; they come back as text starting with [`reply::ERROR_MARKER`].

// Core modules
pub mod agent;
pub mod config;
pub mod dataverse;
pub mod error;
pub mod llm;
pub mod output;
pub mod reply;
pub mod script;
pub mod tools;

// Re-export commonly used types
pub use agent::{Agent, AgentBuilder, AgentConfig, AgentProfile};
pub use config::{AppConfig, ConfigLoader, DataverseConfig, ModelParams, Protocol, ResolvedLlmConfig};
pub use dataverse::{DataverseTools, ReplyStyle};
pub use error::{Error, Result};
pub use reply::ERROR_MARKER;
pub use script::ScriptRunner;

/// Current version of the eventdesk-core library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for the library
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}

/// Initialize tracing with a specific debug mode. `RUST_LOG` wins when set.
pub fn init_tracing_with_debug(debug: bool) {
    let filter = if debug { "debug" } else { "info" };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}
