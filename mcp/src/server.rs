//! MCP server exposing the Dataverse tools
//!
//! Every tool answers with one text block. Replies carrying the error
//! marker are sent as tool errors so the host can tell them apart.

use std::sync::Arc;

use eventdesk_core::reply::is_error_text;
use eventdesk_core::script::{ScriptLimits, ScriptRunner};
use eventdesk_core::DataverseTools;
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunScriptRequest {
    #[schemars(description = "Rhai source; the value of the last expression is returned")]
    pub code: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecuteFetchRequest {
    #[schemars(description = "A valid FetchXML query")]
    pub fetch_xml: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateSpeakerRequest {
    #[schemars(description = "The first name of the speaker")]
    pub first_name: String,
    #[schemars(description = "The last name of the speaker")]
    pub last_name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateEventRequest {
    #[schemars(description = "The name of the event")]
    pub event_name: String,
    #[schemars(description = "Where the event takes place")]
    pub location: String,
    #[schemars(description = "The date of the event, YYYY-MM-DD or RFC 3339")]
    pub event_date: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddSpeakerToEventRequest {
    #[schemars(description = "GUID of the event")]
    pub event_id: String,
    #[schemars(description = "GUID of the speaker")]
    pub speaker_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateSpeakerBiographyRequest {
    #[schemars(description = "GUID of the speaker")]
    pub speaker_id: String,
    #[schemars(description = "The new biography text")]
    pub biography: String,
}

/// Reply text as a tool result
fn text_result(reply: String) -> CallToolResult {
    if is_error_text(&reply) {
        CallToolResult::error(vec![Content::text(reply)])
    } else {
        CallToolResult::success(vec![Content::text(reply)])
    }
}

#[derive(Clone)]
pub struct EventDeskServer {
    tools: Arc<DataverseTools>,
    runner: ScriptRunner<DataverseTools>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl EventDeskServer {
    pub fn new(tools: Arc<DataverseTools>, limits: ScriptLimits) -> Self {
        Self {
            runner: ScriptRunner::new(Arc::clone(&tools)).with_limits(limits),
            tools,
            tool_router: Self::tool_router(),
        }
    }

    /// Names of the tools this server answers to
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        names.sort_unstable();
        names
    }

    #[tool(
        description = "Call this tool to execute Rhai code against the Dataverse tools. who_am_i, execute_fetch, create_speaker, create_event, add_speaker_to_event and update_speaker_biography are available as functions; the value of the last expression is returned as text."
    )]
    async fn run_script(
        &self,
        Parameters(RunScriptRequest { code }): Parameters<RunScriptRequest>,
    ) -> Result<CallToolResult, McpError> {
        debug!(bytes = code.len(), "run_script called");
        Ok(text_result(self.runner.run_script_async(code).await))
    }

    #[tool(description = "Compile Rhai code without running it. Returns OK or the compilation error.")]
    async fn check_script(
        &self,
        Parameters(RunScriptRequest { code }): Parameters<RunScriptRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(text_result(self.runner.check_script_async(code).await))
    }

    #[tool(description = "Executes a WhoAmI request against Dataverse and returns the result as a JSON string.")]
    async fn who_am_i(&self) -> Result<CallToolResult, McpError> {
        Ok(text_result(self.tools.who_am_i().await))
    }

    #[tool(
        description = "Executes a FetchXML request using the supplied expression, which needs to be a valid FetchXML expression. Returns the result as a JSON string. If the request fails, the response starts with [ERROR] and the error should be presented to the user."
    )]
    async fn execute_fetch(
        &self,
        Parameters(ExecuteFetchRequest { fetch_xml }): Parameters<ExecuteFetchRequest>,
    ) -> Result<CallToolResult, McpError> {
        Ok(text_result(self.tools.execute_fetch(&fetch_xml).await))
    }

    #[tool(description = "Creates a Speaker.")]
    async fn create_speaker(
        &self,
        Parameters(request): Parameters<CreateSpeakerRequest>,
    ) -> Result<CallToolResult, McpError> {
        let reply = self
            .tools
            .create_speaker(&request.first_name, &request.last_name)
            .await;
        Ok(text_result(reply))
    }

    #[tool(description = "Creates an Event.")]
    async fn create_event(
        &self,
        Parameters(request): Parameters<CreateEventRequest>,
    ) -> Result<CallToolResult, McpError> {
        let reply = self
            .tools
            .create_event(&request.event_name, &request.location, &request.event_date)
            .await;
        Ok(text_result(reply))
    }

    #[tool(description = "Adds a speaker to an event.")]
    async fn add_speaker_to_event(
        &self,
        Parameters(request): Parameters<AddSpeakerToEventRequest>,
    ) -> Result<CallToolResult, McpError> {
        let reply = self
            .tools
            .add_speaker_to_event(&request.event_id, &request.speaker_id)
            .await;
        Ok(text_result(reply))
    }

    #[tool(description = "Updates the biography of a speaker.")]
    async fn update_speaker_biography(
        &self,
        Parameters(request): Parameters<UpdateSpeakerBiographyRequest>,
    ) -> Result<CallToolResult, McpError> {
        let reply = self
            .tools
            .update_speaker_biography(&request.speaker_id, &request.biography)
            .await;
        Ok(text_result(reply))
    }
}

#[tool_handler]
impl ServerHandler for EventDeskServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "eventdesk-mcp".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(
                "Dataverse tools for events and speakers. Use the individual tools for single \
                 records or run_script to batch several calls in one Rhai script. Replies \
                 starting with [ERROR] are failures."
                    .to_string(),
            ),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventdesk_core::dataverse::{EntityReference, InMemoryOrganizationService};
    use eventdesk_core::ReplyStyle;

    /// Id at the end of a "... with ID: {id}" reply
    fn parse_id(reply: &str) -> String {
        reply.rsplit(' ').next().unwrap_or_default().to_string()
    }

    fn server() -> (EventDeskServer, Arc<InMemoryOrganizationService>) {
        let service = Arc::new(InMemoryOrganizationService::new());
        let tools = DataverseTools::new(service.clone()).with_reply_style(ReplyStyle::Detailed);
        (
            EventDeskServer::new(Arc::new(tools), ScriptLimits::default()),
            service,
        )
    }

    fn text(result: &CallToolResult) -> String {
        result
            .content
            .first()
            .and_then(|content| content.as_text())
            .map(|content| content.text.clone())
            .unwrap_or_default()
    }

    #[test]
    fn test_lists_every_tool() {
        let (server, _) = server();
        assert_eq!(
            server.tool_names(),
            vec![
                "add_speaker_to_event",
                "check_script",
                "create_event",
                "create_speaker",
                "execute_fetch",
                "run_script",
                "update_speaker_biography",
                "who_am_i",
            ]
        );
    }

    #[test]
    fn test_server_info() {
        let (server, _) = server();
        let info = server.get_info();
        assert_eq!(info.server_info.name, "eventdesk-mcp");
        assert!(info.capabilities.tools.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_script() {
        let (server, _) = server();
        let result = server
            .run_script(Parameters(RunScriptRequest {
                code: "1+1".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(text(&result), "2");

        let result = server
            .run_script(Parameters(RunScriptRequest {
                code: "Undefined()".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).starts_with("[ERROR]"));
        assert!(text(&result).contains("Undefined"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_check_script() {
        let (server, service) = server();
        let ok = server
            .check_script(Parameters(RunScriptRequest {
                code: r#"create_speaker("Ada", "Lovelace")"#.to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(text(&ok), "OK");
        // compiling does not run anything
        assert_eq!(service.count("contact").await, 0);

        let bad = server
            .check_script(Parameters(RunScriptRequest {
                code: "let = ;".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(bad.is_error, Some(true));
    }

    #[tokio::test]
    async fn test_speaker_and_event_flow() {
        let (server, service) = server();

        let speaker = server
            .create_speaker(Parameters(CreateSpeakerRequest {
                first_name: "Grace".to_string(),
                last_name: "Hopper".to_string(),
            }))
            .await
            .unwrap();
        assert!(text(&speaker).starts_with("Contact created successfully with ID: "));
        let speaker_id = parse_id(&text(&speaker));

        let event = server
            .create_event(Parameters(CreateEventRequest {
                event_name: "Nordic Summit".to_string(),
                location: "Oslo".to_string(),
                event_date: "2024-05-02".to_string(),
            }))
            .await
            .unwrap();
        assert!(text(&event).starts_with("Event created successfully with ID: "));
        let event_id = parse_id(&text(&event));

        let linked = server
            .add_speaker_to_event(Parameters(AddSpeakerToEventRequest {
                event_id: event_id.clone(),
                speaker_id: speaker_id.clone(),
            }))
            .await
            .unwrap();
        assert_eq!(
            text(&linked),
            format!("Speaker {} successfully added to event {}", speaker_id, event_id)
        );

        let updated = server
            .update_speaker_biography(Parameters(UpdateSpeakerBiographyRequest {
                speaker_id: speaker_id.clone(),
                biography: "Rear admiral".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(updated.is_error, Some(false));

        let event_ref = EntityReference::new("new_event", event_id.parse().unwrap());
        assert_eq!(
            service.related(&event_ref, "cr5ec_new_EventSpeakers").await.len(),
            1
        );
    }

    #[tokio::test]
    async fn test_bad_input_is_tool_error() {
        let (server, _) = server();
        let result = server
            .add_speaker_to_event(Parameters(AddSpeakerToEventRequest {
                event_id: "not-a-guid".to_string(),
                speaker_id: "also-not".to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).starts_with("[ERROR]"));
    }

    #[tokio::test]
    async fn test_who_am_i_and_fetch() {
        let (server, _) = server();
        let me = server.who_am_i().await.unwrap();
        assert!(text(&me).contains("UserId"));

        let rows = server
            .execute_fetch(Parameters(ExecuteFetchRequest {
                fetch_xml: r#"<fetch><entity name="contact"/></fetch>"#.to_string(),
            }))
            .await
            .unwrap();
        assert_eq!(rows.is_error, Some(false));
    }
}
