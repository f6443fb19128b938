//! Agent configuration structures

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::prompt::{CODEGEN_INSTRUCTIONS, TOOL_CALLING_INSTRUCTIONS};
use super::AgentCore;
use crate::config::ResolvedLlmConfig;
use crate::error::{AgentError, Result};
use crate::llm::{create_client, ChatOptions};
use crate::output::AgentOutput;
use crate::tools::{ToolRegistry, RUN_SCRIPT_NAME};

/// The two ways an agent can drive the CRM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentProfile {
    /// One tool call per record
    ToolCalling,
    /// Writes scripts and runs them with `run_script`
    CodeGen,
}

impl AgentProfile {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ToolCalling => "tool_calling",
            Self::CodeGen => "codegen",
        }
    }

    /// Human-readable label used in console headings
    pub fn label(&self) -> &'static str {
        match self {
            Self::ToolCalling => "Tool Calling Agent",
            Self::CodeGen => "Code Gen Agent",
        }
    }

    pub fn default_tools(&self) -> Vec<String> {
        match self {
            Self::ToolCalling => vec!["create_speaker".to_string(), "create_event".to_string()],
            Self::CodeGen => vec![RUN_SCRIPT_NAME.to_string()],
        }
    }

    pub fn default_instructions(&self) -> &'static str {
        match self {
            Self::ToolCalling => TOOL_CALLING_INSTRUCTIONS,
            Self::CodeGen => CODEGEN_INSTRUCTIONS,
        }
    }
}

impl fmt::Display for AgentProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AgentProfile {
    type Err = AgentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tools" | "tool_calling" | "tool-calling" => Ok(Self::ToolCalling),
            "codegen" | "code_gen" | "code-gen" => Ok(Self::CodeGen),
            other => Err(AgentError::InvalidTask {
                message: format!("unknown agent profile '{}'", other),
            }),
        }
    }
}

/// Configuration for an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub profile: AgentProfile,

    /// Maximum number of model round trips per task
    pub max_steps: usize,

    /// Tools available to this agent
    pub tools: Vec<String>,

    /// Custom system prompt; the profile default is used when unset
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Stream model output when the client supports it
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

impl AgentConfig {
    pub fn for_profile(profile: AgentProfile) -> Self {
        Self {
            profile,
            max_steps: 50,
            tools: profile.default_tools(),
            system_prompt: None,
            stream: true,
        }
    }

    /// Instructions this agent starts every conversation with
    pub fn instructions(&self) -> &str {
        self.system_prompt
            .as_deref()
            .unwrap_or_else(|| self.profile.default_instructions())
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self::for_profile(AgentProfile::ToolCalling)
    }
}

/// Builder for creating agents with resolved LLM configuration
pub struct AgentBuilder {
    llm_config: ResolvedLlmConfig,
    agent_config: AgentConfig,
}

impl AgentBuilder {
    pub fn new(llm_config: ResolvedLlmConfig) -> Self {
        Self {
            llm_config,
            agent_config: AgentConfig::default(),
        }
    }

    /// Switch profile, resetting tools to the profile's defaults
    pub fn with_profile(mut self, profile: AgentProfile) -> Self {
        self.agent_config.profile = profile;
        self.agent_config.tools = profile.default_tools();
        self
    }

    pub fn with_agent_config(mut self, agent_config: AgentConfig) -> Self {
        self.agent_config = agent_config;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.agent_config.max_steps = max_steps;
        self
    }

    pub fn with_tools(mut self, tools: Vec<String>) -> Self {
        self.agent_config.tools = tools;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.agent_config.system_prompt = system_prompt;
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.agent_config.stream = stream;
        self
    }

    /// Build the agent, taking its tools from `registry`
    pub fn build(self, registry: &ToolRegistry, output: Box<dyn AgentOutput>) -> Result<AgentCore> {
        self.llm_config.validate()?;
        let llm_client = Arc::from(create_client(&self.llm_config)?);
        let tool_executor = registry.create_executor(&self.agent_config.tools)?;
        let options = ChatOptions::from(&self.llm_config.params);

        tracing::debug!(
            profile = %self.agent_config.profile,
            model = %self.llm_config.model,
            tools = ?self.agent_config.tools,
            "Building agent"
        );

        Ok(AgentCore::new(self.agent_config, llm_client, tool_executor, output)
            .with_chat_options(options))
    }
}
