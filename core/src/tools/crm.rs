//! Dataverse operations exposed as agent tools

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use super::{Tool, ToolCall, ToolExample, ToolFactory, ToolResult};
use crate::dataverse::DataverseTools;
use crate::error::Result;

/// The CRM operations a model can call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrmOperation {
    WhoAmI,
    ExecuteFetch,
    CreateSpeaker,
    CreateEvent,
    AddSpeakerToEvent,
    UpdateSpeakerBiography,
}

impl CrmOperation {
    pub const ALL: [CrmOperation; 6] = [
        CrmOperation::WhoAmI,
        CrmOperation::ExecuteFetch,
        CrmOperation::CreateSpeaker,
        CrmOperation::CreateEvent,
        CrmOperation::AddSpeakerToEvent,
        CrmOperation::UpdateSpeakerBiography,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CrmOperation::WhoAmI => "who_am_i",
            CrmOperation::ExecuteFetch => "execute_fetch",
            CrmOperation::CreateSpeaker => "create_speaker",
            CrmOperation::CreateEvent => "create_event",
            CrmOperation::AddSpeakerToEvent => "add_speaker_to_event",
            CrmOperation::UpdateSpeakerBiography => "update_speaker_biography",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            CrmOperation::WhoAmI => {
                "Executes a WhoAmI request against Dataverse and returns the result as a JSON string."
            }
            CrmOperation::ExecuteFetch => {
                "Executes a FetchXML request using the supplied expression, which needs to be a valid \
                 FetchXML expression. Returns the result as a JSON string. If the request fails, the \
                 response starts with [ERROR] and the error should be presented to the user."
            }
            CrmOperation::CreateSpeaker => "Creates a Speaker.",
            CrmOperation::CreateEvent => "Creates an Event.",
            CrmOperation::AddSpeakerToEvent => "Adds a speaker to an event.",
            CrmOperation::UpdateSpeakerBiography => "Updates the biography of a speaker.",
        }
    }

    pub fn parameters_schema(&self) -> serde_json::Value {
        match self {
            CrmOperation::WhoAmI => json!({ "type": "object", "properties": {} }),
            CrmOperation::ExecuteFetch => json!({
                "type": "object",
                "properties": {
                    "fetch_xml": {
                        "type": "string",
                        "description": "FetchXML query, e.g. <fetch top=\"5\"><entity name=\"contact\"><attribute name=\"fullname\"/></entity></fetch>"
                    }
                },
                "required": ["fetch_xml"]
            }),
            CrmOperation::CreateSpeaker => json!({
                "type": "object",
                "properties": {
                    "first_name": { "type": "string", "description": "The first name of the speaker" },
                    "last_name": { "type": "string", "description": "The last name of the speaker" }
                },
                "required": ["first_name", "last_name"]
            }),
            CrmOperation::CreateEvent => json!({
                "type": "object",
                "properties": {
                    "event_name": { "type": "string", "description": "The name of the event" },
                    "location": { "type": "string", "description": "Where the event takes place" },
                    "event_date": { "type": "string", "description": "The date of the event, YYYY-MM-DD or RFC 3339" }
                },
                "required": ["event_name", "location", "event_date"]
            }),
            CrmOperation::AddSpeakerToEvent => json!({
                "type": "object",
                "properties": {
                    "event_id": { "type": "string", "description": "GUID of the event" },
                    "speaker_id": { "type": "string", "description": "GUID of the speaker" }
                },
                "required": ["event_id", "speaker_id"]
            }),
            CrmOperation::UpdateSpeakerBiography => json!({
                "type": "object",
                "properties": {
                    "speaker_id": { "type": "string", "description": "GUID of the speaker" },
                    "biography": { "type": "string", "description": "The new biography text" }
                },
                "required": ["speaker_id", "biography"]
            }),
        }
    }

    /// Run the operation against `tools` and return its reply text
    pub async fn invoke(&self, tools: &DataverseTools, call: &ToolCall) -> Result<String> {
        let reply = match self {
            CrmOperation::WhoAmI => tools.who_am_i().await,
            CrmOperation::ExecuteFetch => {
                let fetch_xml: String = call.get_parameter("fetch_xml")?;
                tools.execute_fetch(&fetch_xml).await
            }
            CrmOperation::CreateSpeaker => {
                let first_name: String = call.get_parameter_or("first_name", String::new());
                let last_name: String = call.get_parameter("last_name")?;
                tools.create_speaker(&first_name, &last_name).await
            }
            CrmOperation::CreateEvent => {
                let event_name: String = call.get_parameter("event_name")?;
                let location: String = call.get_parameter_or("location", String::new());
                let event_date: String = call.get_parameter("event_date")?;
                tools.create_event(&event_name, &location, &event_date).await
            }
            CrmOperation::AddSpeakerToEvent => {
                let event_id: String = call.get_parameter("event_id")?;
                let speaker_id: String = call.get_parameter("speaker_id")?;
                tools.add_speaker_to_event(&event_id, &speaker_id).await
            }
            CrmOperation::UpdateSpeakerBiography => {
                let speaker_id: String = call.get_parameter("speaker_id")?;
                let biography: String = call.get_parameter("biography")?;
                tools.update_speaker_biography(&speaker_id, &biography).await
            }
        };
        Ok(reply)
    }
}

/// One CRM operation bound to a tool object
pub struct CrmTool {
    operation: CrmOperation,
    tools: Arc<DataverseTools>,
}

impl CrmTool {
    pub fn new(operation: CrmOperation, tools: Arc<DataverseTools>) -> Self {
        Self { operation, tools }
    }
}

#[async_trait]
impl Tool for CrmTool {
    fn name(&self) -> &str {
        self.operation.name()
    }

    fn description(&self) -> &str {
        self.operation.description()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.operation.parameters_schema()
    }

    async fn execute(&self, call: ToolCall) -> Result<ToolResult> {
        let reply = self.operation.invoke(&self.tools, &call).await?;
        Ok(ToolResult::from_reply(call.id, reply))
    }

    fn examples(&self) -> Vec<ToolExample> {
        match self.operation {
            CrmOperation::CreateSpeaker => vec![ToolExample {
                description: "Create a speaker".to_string(),
                parameters: json!({ "first_name": "Ada", "last_name": "Lovelace" }),
                expected_result: "OK".to_string(),
            }],
            CrmOperation::CreateEvent => vec![ToolExample {
                description: "Create an event".to_string(),
                parameters: json!({
                    "event_name": "Power Platform Community Sweden",
                    "location": "Stockholm",
                    "event_date": "2024-03-14"
                }),
                expected_result: "OK".to_string(),
            }],
            _ => Vec::new(),
        }
    }
}

/// Builds [`CrmTool`]s sharing one tool object
pub struct CrmToolFactory {
    operation: CrmOperation,
    tools: Arc<DataverseTools>,
}

impl CrmToolFactory {
    pub fn new(operation: CrmOperation, tools: Arc<DataverseTools>) -> Self {
        Self { operation, tools }
    }
}

impl ToolFactory for CrmToolFactory {
    fn create(&self) -> Box<dyn Tool> {
        Box::new(CrmTool::new(self.operation, Arc::clone(&self.tools)))
    }

    fn tool_name(&self) -> &str {
        self.operation.name()
    }

    fn tool_description(&self) -> &str {
        self.operation.description()
    }
}
