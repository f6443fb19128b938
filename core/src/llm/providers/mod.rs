//! Provider implementations

pub mod openai;

pub use openai::OpenAiClient;

use crate::config::{Protocol, ResolvedLlmConfig};
use crate::error::Result;

use super::LlmClient;

/// Client for the configured protocol
pub fn create_client(config: &ResolvedLlmConfig) -> Result<Box<dyn LlmClient>> {
    match config.protocol {
        Protocol::OpenAICompat => Ok(Box::new(OpenAiClient::new(config)?)),
    }
}
