//! Configuration for eventdesk
//!
//! `types` and `dataverse` hold resolved, validated settings; `loader`
//! discovers files, merges the environment and applies flag overrides.

pub mod dataverse;
pub mod loader;
pub mod types;

pub use dataverse::DataverseConfig;
pub use loader::{AgentSettings, AppConfig, ConfigLoader, RawConfig};
pub use types::{ModelParams, Protocol, ResolvedLlmConfig};
