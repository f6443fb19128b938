//! Interactive chat over stdin

use anyhow::Result;
use colored::Colorize;
use eventdesk_core::{AgentProfile, ReplyStyle};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::CliContext;
use crate::output::{CliOutputConfig, CliOutputHandler};

fn is_exit(line: &str) -> bool {
    matches!(line, "exit" | "quit")
}

/// Read messages line by line until `exit`, `quit` or end of input
pub async fn chat_command(
    context: &CliContext,
    profile: AgentProfile,
    tools: Vec<String>,
) -> Result<bool> {
    let registry = context.registry(context.dataverse_tools(ReplyStyle::Terse)?);
    let output = CliOutputHandler::new(CliOutputConfig {
        show_tool_results: true,
        show_usage: true,
    });
    let mut agent = context
        .build_agent(profile, tools, &registry, Box::new(output))
        .await?;

    println!(
        "{}",
        format!("Chatting with the {}. Type 'exit' to leave.", profile.label()).bold()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("{} ", ">".green().bold());
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_exit(line) {
            break;
        }

        let execution = agent.chat(line).await?;
        if !execution.success {
            tracing::warn!("Turn ended without an answer");
        }
        println!();
    }

    Ok(true)
}
