//! # eventdesk CLI
//!
//! Console front end for eventdesk agents.
//!
//! ## Usage
//!
//! - `eventdesk import` - Create the events and speakers listed in `past_events.txt`
//! - `eventdesk run "task"` - Execute a single task
//! - `eventdesk chat` - Talk to an agent interactively
//! - `eventdesk script "who_am_i()"` - Evaluate one script against the CRM
//! - `eventdesk whoami` - Show the identity the CRM sees
//! - `eventdesk tools` - Show available tools

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use eventdesk_core::{AgentProfile, ConfigLoader};
use std::path::PathBuf;
use std::process::ExitCode;

mod commands;
mod config;
mod output;

use commands::{
    chat_command, import_command, run_command, script_command, tools_command, whoami_command,
};
use config::CliContext;

/// eventdesk - LLM agents for Dataverse events and speakers
#[derive(Parser)]
#[command(name = "eventdesk")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "LLM agents that manage events and speakers in Dataverse")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file or directory path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// API key override
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Base URL override
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Model name override
    #[arg(long, global = true)]
    model: Option<String>,

    /// Use an in-memory CRM instead of Dataverse
    #[arg(long, global = true)]
    offline: bool,

    /// Markdown instructions for the code-generation agent
    #[arg(long, global = true)]
    instructions: Option<PathBuf>,

    /// Maximum number of steps per task
    #[arg(long, global = true)]
    max_steps: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Agent used by single-agent commands
#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentArg {
    /// One tool call per record
    Tools,
    /// Generated scripts run through `run_script`
    Codegen,
}

impl From<AgentArg> for AgentProfile {
    fn from(arg: AgentArg) -> Self {
        match arg {
            AgentArg::Tools => AgentProfile::ToolCalling,
            AgentArg::Codegen => AgentProfile::CodeGen,
        }
    }
}

/// Agents used by `import`
#[derive(Debug, Clone, Copy, ValueEnum)]
enum ImportAgents {
    Tools,
    Codegen,
    /// Tool calling first, then code generation
    Both,
}

impl ImportAgents {
    fn profiles(self) -> Vec<AgentProfile> {
        match self {
            Self::Tools => vec![AgentProfile::ToolCalling],
            Self::Codegen => vec![AgentProfile::CodeGen],
            Self::Both => vec![AgentProfile::ToolCalling, AgentProfile::CodeGen],
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a single task
    Run {
        /// The task to execute
        task: String,

        #[arg(long, value_enum, default_value = "tools")]
        agent: AgentArg,

        /// Comma-separated tool names replacing the agent's defaults
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },

    /// Create the events and speakers from a past-events listing
    Import {
        /// Past events file (defaults to the configured events file)
        events_file: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "both")]
        agent: ImportAgents,
    },

    /// Chat with an agent; type `exit` or `quit` to leave
    Chat {
        #[arg(long, value_enum, default_value = "tools")]
        agent: AgentArg,

        /// Comma-separated tool names replacing the agent's defaults
        #[arg(long, value_delimiter = ',')]
        tools: Vec<String>,
    },

    /// Evaluate a script against the CRM tools
    Script {
        /// Script source
        code: String,
    },

    /// Show the identity the CRM sees
    Whoami,

    /// Show available tools
    Tools,
}

/// Build a configuration loader from CLI arguments
fn build_config_loader(cli: &Cli) -> ConfigLoader {
    let mut loader = ConfigLoader::new();

    if let Some(config_path) = &cli.config {
        loader = loader.with_config_override(config_path.clone());
    }

    if let Some(api_key) = &cli.api_key {
        loader = loader.with_api_key_override(api_key.clone());
    }

    if let Some(base_url) = &cli.base_url {
        loader = loader.with_base_url_override(base_url.clone());
    }

    if let Some(model) = &cli.model {
        loader = loader.with_model_override(model.clone());
    }

    loader
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    eventdesk_core::init_tracing_with_debug(cli.verbose);

    // listing tools needs neither configuration nor a connection
    if let Commands::Tools = cli.command {
        tools_command();
        return Ok(ExitCode::SUCCESS);
    }

    let context = CliContext::load(
        build_config_loader(&cli),
        cli.offline,
        cli.instructions.clone(),
        cli.max_steps,
    )
    .await?;

    let success = match cli.command {
        Commands::Run { task, agent, tools } => {
            run_command(&context, &task, agent.into(), tools).await?
        }
        Commands::Import { events_file, agent } => {
            import_command(&context, events_file, &agent.profiles()).await?
        }
        Commands::Chat { agent, tools } => chat_command(&context, agent.into(), tools).await?,
        Commands::Script { code } => script_command(&context, code).await?,
        Commands::Whoami => whoami_command(&context).await?,
        Commands::Tools => true,
    };

    Ok(if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
