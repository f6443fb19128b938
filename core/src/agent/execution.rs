//! Agent execution result structures

use serde::{Deserialize, Serialize};

use crate::llm::Usage;

/// Result of agent execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentExecution {
    /// Whether the execution was successful
    pub success: bool,

    /// Final answer, or the failure description
    pub final_result: String,

    /// Number of model round trips
    pub steps_executed: usize,

    /// Total execution time in milliseconds
    pub duration_ms: u64,

    /// Token usage summed over every step
    pub usage: Usage,
}

impl AgentExecution {
    /// Create a successful execution result
    pub fn success(final_result: String, steps_executed: usize, duration_ms: u64) -> Self {
        Self {
            success: true,
            final_result,
            steps_executed,
            duration_ms,
            usage: Usage::default(),
        }
    }

    /// Create a failed execution result
    pub fn failure(error: String, steps_executed: usize, duration_ms: u64) -> Self {
        Self {
            success: false,
            final_result: format!("Execution failed: {}", error),
            steps_executed,
            duration_ms,
            usage: Usage::default(),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }
}
