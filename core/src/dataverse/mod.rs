//! Dataverse access: record types, the organization service seam, a Web
//! API client, an in-memory stand-in, and [`DataverseTools`].

pub mod auth;
pub mod entity;
pub mod fetch;
pub mod memory;
pub mod schema;
pub mod service;
pub mod tools;
pub mod web_api;

use std::sync::Arc;

pub use entity::{Entity, EntityCollection, EntityReference, WhoAmIResponse};
pub use memory::InMemoryOrganizationService;
pub use service::{DataverseResult, OrganizationService};
pub use tools::{parse_event_date, DataverseTools, ReplyStyle};
pub use web_api::WebApiClient;

use crate::config::DataverseConfig;
use crate::error::{ConfigError, Result};

/// Organization service for the given settings. `offline` wins over any
/// configured environment.
pub fn connect(config: Option<&DataverseConfig>, offline: bool) -> Result<Arc<dyn OrganizationService>> {
    if offline {
        tracing::info!("Using in-memory organization");
        return Ok(Arc::new(InMemoryOrganizationService::new()));
    }

    let config = config.ok_or(ConfigError::MissingField {
        field: "dataverse".to_string(),
    })?;
    let client = WebApiClient::new(config)?;
    tracing::info!(environment = %config.url, "Connected to Dataverse Web API");
    Ok(Arc::new(client))
}
