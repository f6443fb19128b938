//! Direct script evaluation

use anyhow::Result;
use eventdesk_core::reply::is_error_text;
use eventdesk_core::{ReplyStyle, ScriptRunner};

use crate::config::CliContext;

/// Evaluate `code` against the CRM tools and print the reply
pub async fn script_command(context: &CliContext, code: String) -> Result<bool> {
    let tools = context.dataverse_tools(ReplyStyle::Detailed)?;
    let runner = ScriptRunner::new(tools).with_limits(context.config.script);

    let reply = runner.run_script_async(code).await;
    println!("{}", reply);

    Ok(!is_error_text(&reply))
}
