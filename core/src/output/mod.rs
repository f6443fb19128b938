//! Output abstraction for agent runs
//!
//! The agent reports progress as [`AgentEvent`]s; front ends decide how
//! to render them (console, logs, nothing at all).

use crate::llm::Usage;
use crate::tools::{ToolCall, ToolResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Error type returned by output sinks
pub type OutputError = Box<dyn std::error::Error + Send + Sync>;

/// Null output handler that discards all events
pub struct NullOutput;

#[async_trait]
impl AgentOutput for NullOutput {
    async fn emit_event(&self, _event: AgentEvent) -> Result<(), OutputError> {
        Ok(())
    }
}

/// Status of tool execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ToolExecutionStatus {
    Executing,
    Success,
    Error,
}

/// Tool execution snapshot handed to output sinks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionInfo {
    pub call_id: String,
    pub tool_name: String,
    /// Arguments as name/value pairs
    pub arguments: Vec<(String, serde_json::Value)>,
    pub status: ToolExecutionStatus,
    pub result: Option<ToolResult>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ToolExecutionInfo {
    pub fn started(call: &ToolCall) -> Self {
        Self {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: arguments_of(call),
            status: ToolExecutionStatus::Executing,
            result: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn completed(call: &ToolCall, result: &ToolResult) -> Self {
        Self {
            status: if result.success {
                ToolExecutionStatus::Success
            } else {
                ToolExecutionStatus::Error
            },
            result: Some(result.clone()),
            ..Self::started(call)
        }
    }
}

fn arguments_of(call: &ToolCall) -> Vec<(String, serde_json::Value)> {
    match &call.parameters {
        serde_json::Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        serde_json::Value::Null => Vec::new(),
        other => vec![("input".to_string(), other.clone())],
    }
}

/// Context describing one agent run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecutionContext {
    /// Profile or agent name
    pub agent_id: String,
    pub task: String,
    pub max_steps: usize,
    pub current_step: usize,
    pub execution_time: std::time::Duration,
    pub token_usage: Usage,
}

/// Events emitted during agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AgentEvent {
    ExecutionStarted {
        context: AgentExecutionContext,
    },
    ExecutionCompleted {
        context: AgentExecutionContext,
        success: bool,
        summary: String,
    },
    /// A step (one model round trip) started
    StepStarted {
        step_number: usize,
    },
    /// Streamed model text
    TextDelta {
        text: String,
    },
    ToolExecutionStarted {
        tool_info: ToolExecutionInfo,
    },
    ToolExecutionCompleted {
        tool_info: ToolExecutionInfo,
    },
    /// Cumulative usage, emitted after each model call
    TokenUsageUpdated {
        token_usage: Usage,
    },
}

/// Abstract output interface for agent execution
#[async_trait]
pub trait AgentOutput: Send + Sync {
    /// Emit an agent event
    async fn emit_event(&self, event: AgentEvent) -> Result<(), OutputError>;

    /// Flush any buffered output
    async fn flush(&self) -> Result<(), OutputError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_info_keeps_argument_order() {
        let parameters = crate::llm::parse_tool_arguments(
            r#"{"event_name": "RustConf", "location": "Montreal", "event_date": "2024-09-10"}"#,
        );
        let info = ToolExecutionInfo::started(&ToolCall::new("create_event", parameters));
        assert_eq!(info.status, ToolExecutionStatus::Executing);
        let names: Vec<&str> = info.arguments.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["event_name", "location", "event_date"]);
    }

    #[test]
    fn test_completed_status_follows_result() {
        let call = ToolCall::new("who_am_i", json!({}));
        let failed = ToolResult::error(call.id.clone(), "boom".to_string());
        let info = ToolExecutionInfo::completed(&call, &failed);
        assert_eq!(info.status, ToolExecutionStatus::Error);
        assert!(info.arguments.is_empty());
    }

    #[tokio::test]
    async fn test_null_output_accepts_events() {
        let output = NullOutput;
        assert!(output
            .emit_event(AgentEvent::TextDelta {
                text: "x".to_string()
            })
            .await
            .is_ok());
    }
}
