//! Bulk import of past events, run once per agent

use anyhow::{Context, Result};
use colored::Colorize;
use eventdesk_core::agent::build_import_task;
use eventdesk_core::{Agent, AgentProfile, ReplyStyle};
use std::path::PathBuf;
use std::time::Instant;

use crate::config::CliContext;
use crate::output::CliOutputHandler;

/// Run each agent over the same past-events listing and time it
pub async fn import_command(
    context: &CliContext,
    events_file: Option<PathBuf>,
    profiles: &[AgentProfile],
) -> Result<bool> {
    let path = events_file.unwrap_or_else(|| context.config.agent.events_file.clone());
    let past_events = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read past events from {}", path.display()))?;
    let task = build_import_task(&past_events);

    // both agents write to the same organization
    let registry = context.registry(context.dataverse_tools(ReplyStyle::Terse)?);
    let mut all_succeeded = true;

    for (i, profile) in profiles.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", format!("Running {}...", profile.label().to_lowercase()).bold());

        let mut agent = context
            .build_agent(
                *profile,
                Vec::new(),
                &registry,
                Box::new(CliOutputHandler::default()),
            )
            .await?;

        let started = Instant::now();
        let execution = agent.execute_task(&task).await?;
        let elapsed = started.elapsed();

        println!(
            "\n{} Elapsed Time: {}ms ({:.2}s)",
            profile.label(),
            elapsed.as_millis(),
            elapsed.as_secs_f64()
        );
        all_succeeded &= execution.success;
    }

    Ok(all_succeeded)
}
