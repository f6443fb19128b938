//! Resolved settings shared by every console command

use anyhow::{Context, Result};
use eventdesk_core::agent::{AgentBuilder, AgentConfig, AgentCore, AgentProfile};
use eventdesk_core::dataverse;
use eventdesk_core::output::AgentOutput;
use eventdesk_core::tools::ToolRegistry;
use eventdesk_core::{AppConfig, ConfigLoader, DataverseTools, ReplyStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded configuration plus the global flags that shape agents
pub struct CliContext {
    pub config: AppConfig,
    pub offline: bool,
    instructions: Option<PathBuf>,
    max_steps: Option<usize>,
}

impl CliContext {
    pub async fn load(
        loader: ConfigLoader,
        offline: bool,
        instructions: Option<PathBuf>,
        max_steps: Option<usize>,
    ) -> Result<Self> {
        let config = loader.load().await?;
        match &config.source {
            Some(path) => debug!("Loaded configuration from {}", path.display()),
            None => debug!("No configuration file found, using environment only"),
        }

        Ok(Self {
            config,
            offline,
            instructions,
            max_steps,
        })
    }

    /// Tool object bound to Dataverse, or to memory with `--offline`
    pub fn dataverse_tools(&self, reply_style: ReplyStyle) -> Result<Arc<DataverseTools>> {
        let settings = if self.offline {
            None
        } else {
            Some(self.config.require_dataverse()?)
        };
        let service = dataverse::connect(settings, self.offline)?;
        info!("Organization: {}", service.describe());
        Ok(Arc::new(
            DataverseTools::new(service).with_reply_style(reply_style),
        ))
    }

    pub fn registry(&self, tools: Arc<DataverseTools>) -> ToolRegistry {
        ToolRegistry::for_dataverse(tools, self.config.script)
    }

    /// Agent settings for `profile`; `tools` replaces the profile defaults when non-empty
    pub async fn agent_config(&self, profile: AgentProfile, tools: Vec<String>) -> Result<AgentConfig> {
        let mut agent_config = AgentConfig::for_profile(profile);
        agent_config.max_steps = self.max_steps.unwrap_or(self.config.agent.max_steps);
        if !tools.is_empty() {
            agent_config.tools = tools;
        }

        if profile == AgentProfile::CodeGen {
            let file = self
                .instructions
                .as_ref()
                .or(self.config.agent.instructions_file.as_ref());
            if let Some(path) = file {
                let instructions = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read instructions from {}", path.display()))?;
                agent_config.system_prompt = Some(instructions);
            }
        }

        Ok(agent_config)
    }

    pub async fn build_agent(
        &self,
        profile: AgentProfile,
        tools: Vec<String>,
        registry: &ToolRegistry,
        output: Box<dyn AgentOutput>,
    ) -> Result<AgentCore> {
        let llm_config = self.config.require_llm()?.clone();
        info!("Using model: {}", llm_config.model);

        let agent = AgentBuilder::new(llm_config)
            .with_agent_config(self.agent_config(profile, tools).await?)
            .build(registry, output)?;
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    async fn context(instructions: Option<PathBuf>) -> CliContext {
        let loader = ConfigLoader::new().without_search().with_env(|_| None);
        CliContext::load(loader, true, instructions, Some(7)).await.unwrap()
    }

    #[tokio::test]
    async fn test_codegen_reads_instructions_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "Write Rhai.").unwrap();

        let context = context(Some(file.path().to_path_buf())).await;
        let config = context
            .agent_config(AgentProfile::CodeGen, Vec::new())
            .await
            .unwrap();
        assert_eq!(config.max_steps, 7);
        assert_eq!(config.instructions().trim(), "Write Rhai.");

        // the tool-calling agent keeps its built-in instructions
        let config = context
            .agent_config(AgentProfile::ToolCalling, vec!["who_am_i".to_string()])
            .await
            .unwrap();
        assert!(config.system_prompt.is_none());
        assert_eq!(config.tools, vec!["who_am_i".to_string()]);
    }

    #[tokio::test]
    async fn test_offline_tools_need_no_dataverse_settings() {
        let context = context(None).await;
        let tools = context.dataverse_tools(ReplyStyle::Terse).unwrap();
        assert_eq!(tools.reply_style(), ReplyStyle::Terse);
        assert_eq!(context.registry(tools).list_tools().len(), 7);
    }

    #[tokio::test]
    async fn test_agent_needs_llm_settings() {
        let context = context(None).await;
        let tools = context.dataverse_tools(ReplyStyle::Terse).unwrap();
        let registry = context.registry(tools);
        let err = context
            .build_agent(
                AgentProfile::ToolCalling,
                Vec::new(),
                &registry,
                Box::new(eventdesk_core::output::NullOutput),
            )
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("No configuration found"));
    }
}
