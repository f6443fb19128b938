//! Single task execution command

use anyhow::Result;
use eventdesk_core::{Agent, AgentProfile, ReplyStyle};
use tracing::info;

use crate::config::CliContext;
use crate::output::CliOutputHandler;

/// Execute a single task; returns whether the agent finished
pub async fn run_command(
    context: &CliContext,
    task: &str,
    profile: AgentProfile,
    tools: Vec<String>,
) -> Result<bool> {
    info!("Executing task with the {} agent", profile);

    let registry = context.registry(context.dataverse_tools(ReplyStyle::Terse)?);
    let mut agent = context
        .build_agent(profile, tools, &registry, Box::new(CliOutputHandler::default()))
        .await?;

    let execution = agent.execute_task(task).await?;
    info!(
        steps = execution.steps_executed,
        duration_ms = execution.duration_ms,
        "Task finished"
    );

    Ok(execution.success)
}
