//! CLI output handler implementation

use async_trait::async_trait;
use colored::Colorize;
use eventdesk_core::llm::Usage;
use eventdesk_core::output::{
    AgentEvent, AgentOutput, OutputError, ToolExecutionInfo, ToolExecutionStatus,
};
use serde_json::Value;
use std::io::Write;
use tracing::debug;

/// CLI output configuration
#[derive(Debug, Clone)]
pub struct CliOutputConfig {
    /// Print the text each tool hands back to the model
    pub show_tool_results: bool,
    /// Print token usage when a run finishes
    pub show_usage: bool,
}

impl Default for CliOutputConfig {
    fn default() -> Self {
        Self {
            show_tool_results: false,
            show_usage: true,
        }
    }
}

/// Streams agent text to stdout and prints one line per tool call
pub struct CliOutputHandler {
    config: CliOutputConfig,
}

impl CliOutputHandler {
    pub fn new(config: CliOutputConfig) -> Self {
        Self { config }
    }
}

impl Default for CliOutputHandler {
    fn default() -> Self {
        Self::new(CliOutputConfig::default())
    }
}

/// `- Tool Call: 'name' (Args: [k = v],[k = v])`
pub fn format_tool_call(tool_info: &ToolExecutionInfo) -> String {
    let mut line = format!("- Tool Call: '{}'", tool_info.tool_name);
    if !tool_info.arguments.is_empty() {
        let args: Vec<String> = tool_info
            .arguments
            .iter()
            .map(|(key, value)| format!("[{} = {}]", key, display_value(value)))
            .collect();
        line.push_str(&format!(" (Args: {})", args.join(",")));
    }
    line
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Usage block printed after each run. Total is input plus output;
/// reasoning tokens are already part of the output count.
pub fn format_usage(usage: &Usage) -> String {
    format!(
        "- Input Tokens: {}\n- Output Tokens: {} ({} was used for reasoning)\n- Total tokens: {}",
        usage.prompt_tokens,
        usage.completion_tokens,
        usage.reasoning_tokens,
        usage.prompt_tokens + usage.completion_tokens
    )
}

fn flush_stdout() -> Result<(), OutputError> {
    std::io::stdout().flush()?;
    Ok(())
}

#[async_trait]
impl AgentOutput for CliOutputHandler {
    async fn emit_event(&self, event: AgentEvent) -> Result<(), OutputError> {
        match event {
            AgentEvent::ExecutionStarted { context } => {
                debug!(agent = %context.agent_id, max_steps = context.max_steps, "Execution started");
            }
            AgentEvent::StepStarted { step_number } => {
                debug!("Step {}", step_number);
            }
            AgentEvent::TextDelta { text } => {
                print!("{}", text);
                flush_stdout()?;
            }
            AgentEvent::ToolExecutionStarted { tool_info } => {
                println!();
                println!("{}", format_tool_call(&tool_info).cyan());
            }
            AgentEvent::ToolExecutionCompleted { tool_info } => {
                let Some(result) = &tool_info.result else {
                    return Ok(());
                };
                match tool_info.status {
                    ToolExecutionStatus::Error => println!("  {}", result.content.red()),
                    _ if self.config.show_tool_results => {
                        println!("  {}", result.content.dimmed())
                    }
                    _ => debug!(tool = %tool_info.tool_name, "{}", result.content),
                }
            }
            AgentEvent::TokenUsageUpdated { token_usage } => {
                debug!(
                    input = token_usage.prompt_tokens,
                    output = token_usage.completion_tokens,
                    "Token usage"
                );
            }
            AgentEvent::ExecutionCompleted {
                context,
                success,
                summary,
            } => {
                if !success {
                    println!();
                    println!("{}", summary.red());
                }
                if self.config.show_usage {
                    println!("\n\n{}", format_usage(&context.token_usage));
                }
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<(), OutputError> {
        flush_stdout()
    }
}
