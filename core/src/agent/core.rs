//! AgentCore implementation

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::StreamExt;

use super::config::AgentConfig;
use super::prompt::build_system_prompt;
use crate::agent::{Agent, AgentExecution, AgentResult};
use crate::error::{AgentError, Result};
use crate::llm::{
    parse_tool_arguments, ChatOptions, ContentBlock, FinishReason, LlmClient, LlmMessage,
    LlmResponse, LlmStreamChunk, ToolCallDelta, ToolDefinition, Usage,
};
use crate::output::{AgentEvent, AgentExecutionContext, AgentOutput, ToolExecutionInfo};
use crate::tools::{ToolCall, ToolExecutor};

/// Tool-calling agent loop over one LLM client and one tool set
pub struct AgentCore {
    config: AgentConfig,
    llm_client: Arc<dyn LlmClient>,
    chat_options: ChatOptions,
    tool_executor: ToolExecutor,
    conversation_history: Vec<LlmMessage>,
    output: Box<dyn AgentOutput>,
}

impl AgentCore {
    pub fn new(
        config: AgentConfig,
        llm_client: Arc<dyn LlmClient>,
        tool_executor: ToolExecutor,
        output: Box<dyn AgentOutput>,
    ) -> Self {
        Self {
            config,
            llm_client,
            chat_options: ChatOptions::default(),
            tool_executor,
            conversation_history: Vec::new(),
            output,
        }
    }

    pub fn with_chat_options(mut self, chat_options: ChatOptions) -> Self {
        self.chat_options = chat_options;
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Conversation so far, system prompt first
    pub fn history(&self) -> &[LlmMessage] {
        &self.conversation_history
    }

    pub fn clear_history(&mut self) {
        self.conversation_history.clear();
    }

    /// Send one user message, keeping earlier turns in context
    pub async fn chat(&mut self, message: &str) -> AgentResult<AgentExecution> {
        self.run(message).await
    }

    fn system_prompt(&self) -> String {
        build_system_prompt(self.config.instructions(), &self.tool_executor.list_tools())
    }

    async fn emit(&self, event: AgentEvent) {
        if let Err(e) = self.output.emit_event(event).await {
            tracing::debug!("Failed to emit agent event: {}", e);
        }
    }

    async fn run(&mut self, task: &str) -> AgentResult<AgentExecution> {
        if task.trim().is_empty() {
            return Err(AgentError::InvalidTask {
                message: "task is empty".to_string(),
            }
            .into());
        }

        let start_time = Instant::now();
        let mut usage = Usage::default();
        let mut context = AgentExecutionContext {
            agent_id: self.config.profile.name().to_string(),
            task: task.to_string(),
            max_steps: self.config.max_steps,
            current_step: 0,
            execution_time: std::time::Duration::ZERO,
            token_usage: usage,
        };
        self.emit(AgentEvent::ExecutionStarted {
            context: context.clone(),
        })
        .await;

        if self.conversation_history.is_empty() {
            self.conversation_history
                .push(LlmMessage::system(self.system_prompt()));
        }
        self.conversation_history.push(LlmMessage::user(task));

        let tool_definitions = self.tool_executor.get_tool_definitions();
        let mut step = 0;

        let outcome: std::result::Result<String, String> = loop {
            if step >= self.config.max_steps {
                let err = AgentError::MaxStepsExceeded {
                    max_steps: self.config.max_steps,
                };
                tracing::warn!("{}", err);
                break Err(err.to_string());
            }
            step += 1;
            self.emit(AgentEvent::StepStarted { step_number: step }).await;

            let response = match self.request(&tool_definitions).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("LLM request failed for step {}: {}", step, e);
                    break Err(e.to_string());
                }
            };

            if let Some(step_usage) = &response.usage {
                usage.add(step_usage);
                self.emit(AgentEvent::TokenUsageUpdated { token_usage: usage })
                    .await;
            }

            let message = response.message;
            self.conversation_history.push(message.clone());

            if !message.has_tool_use() {
                break Ok(message.get_text().unwrap_or_default());
            }
            self.execute_tool_calls(&message).await;
        };

        let duration = start_time.elapsed();
        context.current_step = step;
        context.execution_time = duration;
        context.token_usage = usage;

        let duration_ms = duration.as_millis() as u64;
        let execution = match outcome {
            Ok(answer) => AgentExecution::success(answer, step, duration_ms),
            Err(error) => AgentExecution::failure(error, step, duration_ms),
        }
        .with_usage(usage);

        self.emit(AgentEvent::ExecutionCompleted {
            context,
            success: execution.success,
            summary: execution.final_result.clone(),
        })
        .await;
        if let Err(e) = self.output.flush().await {
            tracing::debug!("Failed to flush output: {}", e);
        }

        Ok(execution)
    }

    /// One model round trip, streamed when both sides allow it
    async fn request(&self, tool_definitions: &[ToolDefinition]) -> Result<LlmResponse> {
        let messages = self.conversation_history.clone();
        let tools = (!tool_definitions.is_empty()).then(|| tool_definitions.to_vec());
        let options = Some(self.chat_options.clone());

        if self.config.stream && self.llm_client.supports_streaming() {
            let mut stream = self
                .llm_client
                .chat_completion_stream(messages, tools, options)
                .await?;

            let mut accumulator = StreamAccumulator::default();
            while let Some(chunk) = stream.next().await {
                if let Some(text) = accumulator.push(chunk?) {
                    self.emit(AgentEvent::TextDelta { text }).await;
                }
            }
            return Ok(accumulator.finish(self.llm_client.model_name()));
        }

        let response = self
            .llm_client
            .chat_completion(messages, tools, options)
            .await?;
        if let Some(text) = response.message.get_text().filter(|t| !t.is_empty()) {
            self.emit(AgentEvent::TextDelta { text }).await;
        }
        Ok(response)
    }

    /// Run every tool call of `message` in order and record the results
    async fn execute_tool_calls(&mut self, message: &LlmMessage) {
        let calls: Vec<ToolCall> = message
            .get_tool_uses()
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => {
                    Some(ToolCall::new(name.clone(), input.clone()).with_id(id.clone()))
                }
                _ => None,
            })
            .collect();

        for call in calls {
            self.emit(AgentEvent::ToolExecutionStarted {
                tool_info: ToolExecutionInfo::started(&call),
            })
            .await;

            let result = self.tool_executor.execute(call.clone()).await;

            self.emit(AgentEvent::ToolExecutionCompleted {
                tool_info: ToolExecutionInfo::completed(&call, &result),
            })
            .await;

            self.conversation_history.push(LlmMessage::tool_result(
                result.tool_call_id,
                result.content,
                !result.success,
            ));
        }
    }
}

#[async_trait]
impl Agent for AgentCore {
    async fn execute_task(&mut self, task: &str) -> AgentResult<AgentExecution> {
        self.clear_history();
        self.run(task).await
    }

    fn config(&self) -> &AgentConfig {
        &self.config
    }

    fn agent_type(&self) -> &str {
        self.config.profile.name()
    }
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Folds streamed chunks back into one response. Tool-call fragments
/// are grouped by their `index`.
#[derive(Debug, Default)]
pub(crate) struct StreamAccumulator {
    text: String,
    tool_calls: BTreeMap<u32, PendingToolCall>,
    usage: Option<Usage>,
    finish_reason: Option<FinishReason>,
}

impl StreamAccumulator {
    /// Absorb a chunk, returning any new text
    pub(crate) fn push(&mut self, chunk: LlmStreamChunk) -> Option<String> {
        for delta in chunk.tool_calls.into_iter().flatten() {
            self.push_tool_call(delta);
        }
        if chunk.usage.is_some() {
            self.usage = chunk.usage;
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }

        let delta = chunk.delta.filter(|d| !d.is_empty())?;
        self.text.push_str(&delta);
        Some(delta)
    }

    fn push_tool_call(&mut self, delta: ToolCallDelta) {
        let pending = self.tool_calls.entry(delta.index).or_default();
        if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
            pending.id = Some(id);
        }
        if let Some(name) = delta.name.filter(|name| !name.is_empty()) {
            pending.name = name;
        }
        if let Some(arguments) = delta.arguments {
            pending.arguments.push_str(&arguments);
        }
    }

    pub(crate) fn finish(self, model: &str) -> LlmResponse {
        let mut tool_uses = Vec::new();
        for (index, pending) in self.tool_calls {
            if pending.name.is_empty() {
                tracing::warn!(index, "Dropping streamed tool call without a name");
                continue;
            }
            tool_uses.push(ContentBlock::ToolUse {
                id: pending.id.unwrap_or_else(|| format!("call_{}", index)),
                input: parse_tool_arguments(&pending.arguments),
                name: pending.name,
            });
        }

        let message = if tool_uses.is_empty() {
            LlmMessage::assistant(self.text)
        } else {
            let text = (!self.text.is_empty()).then_some(self.text);
            LlmMessage::assistant_with_tools(text, tool_uses)
        };

        LlmResponse {
            message,
            usage: self.usage,
            model: model.to_string(),
            finish_reason: self.finish_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentProfile;
    use crate::dataverse::{DataverseTools, InMemoryOrganizationService};
    use crate::error::LlmError;
    use crate::llm::{LlmStream, MessageContent, MessageRole};
    use crate::output::NullOutput;
    use crate::script::ScriptLimits;
    use crate::tools::ToolRegistry;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records what it was sent
    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<VecDeque<LlmResponse>>,
        streams: Mutex<VecDeque<Vec<LlmStreamChunk>>>,
        requests: Mutex<Vec<Vec<LlmMessage>>>,
    }

    impl ScriptedClient {
        fn with_responses(responses: Vec<LlmResponse>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                ..Self::default()
            }
        }

        fn with_streams(streams: Vec<Vec<LlmStreamChunk>>) -> Self {
            Self {
                streams: Mutex::new(streams.into()),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedClient {
        async fn chat_completion(
            &self,
            messages: Vec<LlmMessage>,
            _tools: Option<Vec<ToolDefinition>>,
            _options: Option<ChatOptions>,
        ) -> Result<LlmResponse> {
            self.requests.lock().unwrap().push(messages);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Network {
                    message: "no more responses".to_string(),
                }
                .into())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }

        fn provider_name(&self) -> &str {
            "test"
        }

        fn supports_streaming(&self) -> bool {
            !self.streams.lock().unwrap().is_empty()
        }

        async fn chat_completion_stream(
            &self,
            messages: Vec<LlmMessage>,
            _tools: Option<Vec<ToolDefinition>>,
            _options: Option<ChatOptions>,
        ) -> Result<LlmStream<'_>> {
            self.requests.lock().unwrap().push(messages);
            let chunks = self.streams.lock().unwrap().pop_front().unwrap_or_default();
            Ok(Box::new(futures::stream::iter(chunks.into_iter().map(Ok))))
        }
    }

    fn tool_call_response(id: &str, name: &str, input: serde_json::Value) -> LlmResponse {
        LlmResponse {
            message: LlmMessage::assistant_with_tools(
                None,
                vec![ContentBlock::ToolUse {
                    id: id.to_string(),
                    name: name.to_string(),
                    input,
                }],
            ),
            usage: Some(Usage {
                prompt_tokens: 100,
                completion_tokens: 20,
                total_tokens: 120,
                reasoning_tokens: 8,
            }),
            model: "scripted".to_string(),
            finish_reason: Some(FinishReason::ToolCalls),
        }
    }

    fn text_response(text: &str) -> LlmResponse {
        LlmResponse {
            message: LlmMessage::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 150,
                completion_tokens: 5,
                total_tokens: 155,
                reasoning_tokens: 0,
            }),
            model: "scripted".to_string(),
            finish_reason: Some(FinishReason::Stop),
        }
    }

    fn agent(
        client: Arc<ScriptedClient>,
        service: Arc<InMemoryOrganizationService>,
        max_steps: usize,
    ) -> AgentCore {
        let registry = ToolRegistry::for_dataverse(
            Arc::new(DataverseTools::new(service)),
            ScriptLimits::default(),
        );
        let mut config = AgentConfig::for_profile(AgentProfile::ToolCalling);
        config.max_steps = max_steps;
        let executor = registry.create_executor(&config.tools).unwrap();
        AgentCore::new(config, client, executor, Box::new(NullOutput))
    }

    #[tokio::test]
    async fn test_tool_call_then_answer() {
        let client = Arc::new(ScriptedClient::with_responses(vec![
            tool_call_response(
                "call_1",
                "create_speaker",
                json!({"first_name": "Ada", "last_name": "Lovelace"}),
            ),
            text_response("Done!"),
        ]));
        let service = Arc::new(InMemoryOrganizationService::new());
        let mut agent = agent(client.clone(), service.clone(), 10);

        let execution = agent.execute_task("Create Ada Lovelace").await.unwrap();
        assert!(execution.success);
        assert_eq!(execution.final_result, "Done!");
        assert_eq!(execution.steps_executed, 2);
        assert_eq!(execution.usage.prompt_tokens, 250);
        assert_eq!(execution.usage.reasoning_tokens, 8);
        assert_eq!(service.count("contact").await, 1);

        // second request carries the tool result
        let requests = client.requests.lock().unwrap();
        let last = requests[1].last().unwrap();
        assert_eq!(last.role, MessageRole::Tool);
        match &last.content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                } => {
                    assert_eq!(tool_use_id, "call_1");
                    assert_eq!(content, "OK");
                    assert!(!is_error);
                }
                other => panic!("unexpected block: {:?}", other),
            },
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_tool_is_reported_to_model() {
        let client = Arc::new(ScriptedClient::with_responses(vec![
            tool_call_response(
                "call_1",
                "create_event",
                json!({"event_name": "Summit", "location": "Oslo", "event_date": "someday"}),
            ),
            text_response("The date was invalid."),
        ]));
        let service = Arc::new(InMemoryOrganizationService::new());
        let mut agent = agent(client.clone(), service.clone(), 10);

        let execution = agent.execute_task("Create the summit").await.unwrap();
        assert!(execution.success);
        assert_eq!(service.count("new_event").await, 0);

        let history = agent.history();
        let tool_message = &history[history.len() - 2];
        assert!(tool_message.get_text().is_none());
        match &tool_message.content {
            MessageContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolResult { content, is_error, .. } => {
                    assert!(content.starts_with("[ERROR]"));
                    assert!(is_error);
                }
                other => panic!("unexpected block: {:?}", other),
            },
            other => panic!("unexpected content: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_max_steps() {
        let responses = (0..3)
            .map(|i| {
                tool_call_response(
                    &format!("call_{}", i),
                    "create_speaker",
                    json!({"first_name": "A", "last_name": "B"}),
                )
            })
            .collect();
        let client = Arc::new(ScriptedClient::with_responses(responses));
        let service = Arc::new(InMemoryOrganizationService::new());
        let mut agent = agent(client, service.clone(), 2);

        let execution = agent.execute_task("loop forever").await.unwrap();
        assert!(!execution.success);
        assert_eq!(execution.steps_executed, 2);
        assert!(execution.final_result.contains("Maximum steps exceeded: 2"));
        assert_eq!(service.count("contact").await, 2);
    }

    #[tokio::test]
    async fn test_llm_failure_ends_run() {
        let client = Arc::new(ScriptedClient::default());
        let service = Arc::new(InMemoryOrganizationService::new());
        let mut agent = agent(client, service, 5);

        let execution = agent.execute_task("anything").await.unwrap();
        assert!(!execution.success);
        assert!(execution.final_result.starts_with("Execution failed:"));
    }

    #[tokio::test]
    async fn test_empty_task_is_rejected() {
        let client = Arc::new(ScriptedClient::default());
        let service = Arc::new(InMemoryOrganizationService::new());
        let mut agent = agent(client, service, 5);
        assert!(agent.execute_task("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_chat_keeps_history() {
        let client = Arc::new(ScriptedClient::with_responses(vec![
            text_response("Hello"),
            text_response("Still here"),
            text_response("Fresh"),
        ]));
        let service = Arc::new(InMemoryOrganizationService::new());
        let mut agent = agent(client.clone(), service, 5);

        agent.chat("hi").await.unwrap();
        agent.chat("again").await.unwrap();
        agent.execute_task("new task").await.unwrap();

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[1].len(), 4);
        assert_eq!(requests[2].len(), 2);
        assert_eq!(requests[0][0].role, MessageRole::System);
    }

    #[tokio::test]
    async fn test_streamed_tool_call() {
        let first = vec![
            LlmStreamChunk {
                delta: Some("Creating".to_string()),
                ..Default::default()
            },
            LlmStreamChunk {
                tool_calls: Some(vec![ToolCallDelta {
                    index: 0,
                    id: Some("call_9".to_string()),
                    name: Some("create_speaker".to_string()),
                    arguments: Some(r#"{"first_name":"Grace","#.to_string()),
                }]),
                ..Default::default()
            },
            LlmStreamChunk {
                tool_calls: Some(vec![ToolCallDelta {
                    index: 0,
                    arguments: Some(r#""last_name":"Hopper"}"#.to_string()),
                    ..Default::default()
                }]),
                finish_reason: Some(FinishReason::ToolCalls),
                ..Default::default()
            },
            LlmStreamChunk {
                usage: Some(Usage {
                    prompt_tokens: 10,
                    completion_tokens: 4,
                    total_tokens: 14,
                    reasoning_tokens: 0,
                }),
                ..Default::default()
            },
        ];
        let second = vec![LlmStreamChunk {
            delta: Some("Done!".to_string()),
            finish_reason: Some(FinishReason::Stop),
            ..Default::default()
        }];

        let client = Arc::new(ScriptedClient::with_streams(vec![first, second]));
        let service = Arc::new(InMemoryOrganizationService::new());
        let mut agent = agent(client, service.clone(), 5);

        let execution = agent.execute_task("Create Grace Hopper").await.unwrap();
        assert!(execution.success);
        assert_eq!(execution.final_result, "Done!");
        assert_eq!(execution.usage.total_tokens, 14);
        assert_eq!(service.count("contact").await, 1);
    }

    #[test]
    fn test_accumulator_groups_by_index() {
        let mut accumulator = StreamAccumulator::default();
        let deltas = [
            (0, Some("a"), Some("create_event"), "{\"event_name\":"),
            (1, Some("b"), Some("create_speaker"), "{}"),
            (0, None, None, "\"Summit\"}"),
        ];
        for (index, id, name, arguments) in deltas {
            accumulator.push(LlmStreamChunk {
                tool_calls: Some(vec![ToolCallDelta {
                    index,
                    id: id.map(str::to_string),
                    name: name.map(str::to_string),
                    arguments: Some(arguments.to_string()),
                }]),
                ..Default::default()
            });
        }

        let response = accumulator.finish("m");
        let uses = response.message.get_tool_uses();
        assert_eq!(uses.len(), 2);
        match uses[0] {
            ContentBlock::ToolUse { id, name, input } => {
                assert_eq!(id, "a");
                assert_eq!(name, "create_event");
                assert_eq!(input, &json!({"event_name": "Summit"}));
            }
            other => panic!("unexpected block: {:?}", other),
        }
    }

    #[test]
    fn test_accumulator_text_only() {
        let mut accumulator = StreamAccumulator::default();
        assert_eq!(
            accumulator.push(LlmStreamChunk {
                delta: Some("Hi".to_string()),
                ..Default::default()
            }),
            Some("Hi".to_string())
        );
        assert_eq!(accumulator.push(LlmStreamChunk::default()), None);
        let response = accumulator.finish("m");
        assert!(!response.message.has_tool_use());
        assert_eq!(response.message.get_text().as_deref(), Some("Hi"));
    }
}
