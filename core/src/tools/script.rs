//! `run_script`: model-written Rhai code against the Dataverse tools

use async_trait::async_trait;
use serde_json::json;

use super::{Tool, ToolCall, ToolExample, ToolFactory, ToolResult};
use crate::dataverse::DataverseTools;
use crate::error::Result;
use crate::script::ScriptRunner;

pub const RUN_SCRIPT_NAME: &str = "run_script";
pub const RUN_SCRIPT_DESCRIPTION: &str =
    "Call this tool to execute Rhai code. The Dataverse tools are available as functions \
     (who_am_i, execute_fetch, create_speaker, create_event, add_speaker_to_event, \
     update_speaker_biography) and the value of the last expression is returned as text. \
     Failures start with [ERROR].";

pub struct RunScriptTool {
    runner: ScriptRunner<DataverseTools>,
}

impl RunScriptTool {
    pub fn new(runner: ScriptRunner<DataverseTools>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Tool for RunScriptTool {
    fn name(&self) -> &str {
        RUN_SCRIPT_NAME
    }

    fn description(&self) -> &str {
        RUN_SCRIPT_DESCRIPTION
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "Rhai source. Leave the final expression without a trailing semicolon to return its value."
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolResult> {
        let code: String = call.get_parameter("code")?;
        let reply = self.runner.run_script_async(code).await;
        Ok(ToolResult::from_reply(call.id, reply))
    }

    fn examples(&self) -> Vec<ToolExample> {
        vec![ToolExample {
            description: "Create a speaker and an event in one call".to_string(),
            parameters: json!({
                "code": "let s = create_speaker(\"Ada\", \"Lovelace\");\nlet e = create_event(\"RustConf\", \"Montreal\", \"2024-09-10\");\ns + \" \" + e"
            }),
            expected_result: "OK OK".to_string(),
        }]
    }
}

pub struct RunScriptToolFactory {
    runner: ScriptRunner<DataverseTools>,
}

impl RunScriptToolFactory {
    pub fn new(runner: ScriptRunner<DataverseTools>) -> Self {
        Self { runner }
    }
}

impl ToolFactory for RunScriptToolFactory {
    fn create(&self) -> Box<dyn Tool> {
        Box::new(RunScriptTool::new(self.runner.clone()))
    }

    fn tool_name(&self) -> &str {
        RUN_SCRIPT_NAME
    }

    fn tool_description(&self) -> &str {
        RUN_SCRIPT_DESCRIPTION
    }
}
