//! WhoAmI command

use anyhow::Result;
use eventdesk_core::reply::is_error_text;
use eventdesk_core::ReplyStyle;

use crate::config::CliContext;

pub async fn whoami_command(context: &CliContext) -> Result<bool> {
    let tools = context.dataverse_tools(ReplyStyle::Detailed)?;
    let reply = tools.who_am_i().await;
    println!("{}", reply);
    Ok(!is_error_text(&reply))
}
