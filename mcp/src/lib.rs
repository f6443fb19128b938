//! # eventdesk MCP
//!
//! Model Context Protocol server that exposes the eventdesk Dataverse
//! tools and the script evaluator to an MCP host over stdio.

pub mod server;

use std::sync::Arc;

use anyhow::Result;
use eventdesk_core::{dataverse, AppConfig, DataverseTools, ReplyStyle};

pub use server::EventDeskServer;

/// Server bound to the configured organization, or to memory when `offline`
pub fn build_server(config: &AppConfig, offline: bool) -> Result<EventDeskServer> {
    let settings = if offline {
        None
    } else {
        Some(config.require_dataverse()?)
    };
    let service = dataverse::connect(settings, offline)?;
    tracing::info!("Organization: {}", service.describe());

    let tools = DataverseTools::new(service).with_reply_style(ReplyStyle::Detailed);
    Ok(EventDeskServer::new(Arc::new(tools), config.script))
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventdesk_core::ConfigLoader;

    #[tokio::test]
    async fn test_offline_server_needs_no_settings() {
        let config = ConfigLoader::new()
            .without_search()
            .with_env(|_| None)
            .load()
            .await
            .unwrap();
        let server = build_server(&config, true).unwrap();
        assert_eq!(server.tool_names().len(), 8);

        let err = build_server(&config, false).err().unwrap();
        assert!(err.to_string().contains("No configuration found"));
    }
}
