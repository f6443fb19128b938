//! Agent profiles and the tool-calling loop

pub mod base;
pub mod config;
pub mod core;
pub mod execution;
pub mod prompt;

pub use base::{Agent, AgentResult};
pub use config::{AgentBuilder, AgentConfig, AgentProfile};
pub use core::AgentCore;
pub use execution::AgentExecution;
pub use prompt::{build_import_task, build_system_prompt, CODEGEN_INSTRUCTIONS, IMPORT_PROMPT};
