//! OpenAI client implementation using async-openai library

use crate::config::ResolvedLlmConfig;
use crate::error::{LlmError, Result};
use crate::llm::message::parse_tool_arguments;
use crate::llm::{
    ChatOptions, ContentBlock, FinishReason, LlmClient, LlmMessage, LlmResponse, LlmStream,
    LlmStreamChunk, MessageContent, MessageRole, ToolCallDelta, ToolDefinition, Usage,
};
use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessage,
        ChatCompletionRequestAssistantMessageContent, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessage, ChatCompletionRequestToolMessage,
        ChatCompletionRequestToolMessageContent, ChatCompletionRequestUserMessage,
        ChatCompletionStreamOptions, ChatCompletionTool, ChatCompletionToolType,
        CompletionUsage, CreateChatCompletionRequest, CreateChatCompletionRequestArgs,
        CreateChatCompletionResponse, CreateChatCompletionStreamResponse, FunctionCall,
        FunctionObject, Stop,
    },
    Client,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// OpenAI client using async-openai library
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiClient {
    /// Create a new OpenAI client from resolved LLM config
    pub fn new(config: &ResolvedLlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(LlmError::Authentication {
                message: "No API key found for OpenAI".to_string(),
            }
            .into());
        }

        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(config.base_url.trim_end_matches('/'));

        let mut client = Client::with_config(openai_config);
        if !config.headers.is_empty() {
            let mut headers = HeaderMap::new();
            for (name, value) in &config.headers {
                let name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                    LlmError::InvalidRequest {
                        message: format!("Invalid header name '{}': {}", name, e),
                    }
                })?;
                let value = HeaderValue::from_str(value).map_err(|e| LlmError::InvalidRequest {
                    message: format!("Invalid header value for '{}': {}", name, e),
                })?;
                headers.insert(name, value);
            }
            let http = reqwest::Client::builder()
                .default_headers(headers)
                .build()?;
            client = client.with_http_client(http);
        }

        Ok(Self {
            client,
            model: config.model.clone(),
        })
    }

    fn build_request(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<ToolDefinition>>,
        options: Option<ChatOptions>,
        stream: bool,
    ) -> Result<CreateChatCompletionRequest> {
        let mut request_builder = CreateChatCompletionRequestArgs::default();
        request_builder.model(&self.model);
        request_builder.messages(convert_messages(messages)?);

        if let Some(tools) = tools.filter(|t| !t.is_empty()) {
            tracing::debug!("OpenAI request with {} tools enabled", tools.len());
            request_builder.tools(convert_tools(tools));
        }

        if stream {
            request_builder.stream(true);
            request_builder.stream_options(ChatCompletionStreamOptions {
                include_usage: true,
            });
        }

        if let Some(opts) = options {
            if let Some(max_tokens) = opts.max_tokens {
                request_builder.max_completion_tokens(max_tokens);
            }
            if let Some(temperature) = opts.temperature {
                request_builder.temperature(temperature);
            }
            if let Some(top_p) = opts.top_p {
                request_builder.top_p(top_p);
            }
            if let Some(stop) = opts.stop {
                request_builder.stop(Stop::StringArray(stop));
            }
        }

        request_builder.build().map_err(|e| {
            tracing::error!("Failed to build OpenAI request: {}", e);
            LlmError::InvalidRequest {
                message: format!("Failed to build request: {}", e),
            }
            .into()
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn chat_completion(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<ToolDefinition>>,
        options: Option<ChatOptions>,
    ) -> Result<LlmResponse> {
        let request = self.build_request(messages, tools, options, false)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            tracing::error!("OpenAI API call failed: {}", e);
            convert_error(e)
        })?;

        let response = convert_response(response)?;
        for block in response.message.get_tool_uses() {
            if let ContentBlock::ToolUse { id, name, .. } = block {
                tracing::debug!("Tool call: {} (id: {})", name, id);
            }
        }
        Ok(response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider_name(&self) -> &str {
        "openai"
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    async fn chat_completion_stream(
        &self,
        messages: Vec<LlmMessage>,
        tools: Option<Vec<ToolDefinition>>,
        options: Option<ChatOptions>,
    ) -> Result<LlmStream<'_>> {
        let request = self.build_request(messages, tools, options, true)?;

        let stream = self
            .client
            .chat()
            .create_stream(request)
            .await
            .map_err(convert_error)?;

        let converted_stream = stream.map(|result| match result {
            Ok(chunk) => Ok(convert_stream_chunk(chunk)),
            Err(e) => Err(convert_error(e)),
        });

        Ok(Box::new(Box::pin(converted_stream)))
    }
}

/// Convert our internal message format to async-openai format
fn convert_messages(messages: Vec<LlmMessage>) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut converted = Vec::new();

    for message in messages {
        match message.role {
            MessageRole::System => {
                converted.push(ChatCompletionRequestMessage::System(
                    ChatCompletionRequestSystemMessage {
                        content: message.get_text().unwrap_or_default().into(),
                        name: None,
                    },
                ));
            }
            MessageRole::User => {
                converted.push(ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessage {
                        content: message.get_text().unwrap_or_default().into(),
                        name: None,
                    },
                ));
            }
            MessageRole::Assistant => {
                let tool_calls: Vec<ChatCompletionMessageToolCall> = message
                    .get_tool_uses()
                    .into_iter()
                    .filter_map(|block| match block {
                        ContentBlock::ToolUse { id, name, input } => {
                            Some(ChatCompletionMessageToolCall {
                                id: id.clone(),
                                r#type: ChatCompletionToolType::Function,
                                function: FunctionCall {
                                    name: name.clone(),
                                    arguments: input.to_string(),
                                },
                            })
                        }
                        _ => None,
                    })
                    .collect();
                let content = message
                    .get_text()
                    .filter(|text| !text.is_empty() || tool_calls.is_empty())
                    .map(ChatCompletionRequestAssistantMessageContent::Text);

                converted.push(ChatCompletionRequestMessage::Assistant(
                    ChatCompletionRequestAssistantMessage {
                        content,
                        tool_calls: if tool_calls.is_empty() {
                            None
                        } else {
                            Some(tool_calls)
                        },
                        ..Default::default()
                    },
                ));
            }
            MessageRole::Tool => {
                let MessageContent::Blocks(blocks) = &message.content else {
                    return Err(LlmError::InvalidRequest {
                        message: "Tool message must contain ToolResult".to_string(),
                    }
                    .into());
                };
                for block in blocks {
                    if let ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        ..
                    } = block
                    {
                        converted.push(ChatCompletionRequestMessage::Tool(
                            ChatCompletionRequestToolMessage {
                                content: ChatCompletionRequestToolMessageContent::Text(
                                    content.clone(),
                                ),
                                tool_call_id: tool_use_id.clone(),
                            },
                        ));
                    }
                }
            }
        }
    }

    Ok(converted)
}

/// Convert our tool definitions to async-openai format
fn convert_tools(tools: Vec<ToolDefinition>) -> Vec<ChatCompletionTool> {
    tools
        .into_iter()
        .map(|tool| ChatCompletionTool {
            r#type: ChatCompletionToolType::Function,
            function: FunctionObject {
                name: tool.function.name,
                description: Some(tool.function.description),
                parameters: Some(tool.function.parameters),
                strict: None,
            },
        })
        .collect()
}

/// Convert async-openai response to our internal format
fn convert_response(response: CreateChatCompletionResponse) -> Result<LlmResponse> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::InvalidRequest {
            message: "No choices in response".to_string(),
        })?;

    let tool_uses: Vec<ContentBlock> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tool_call| ContentBlock::ToolUse {
            input: parse_tool_arguments(&tool_call.function.arguments),
            id: tool_call.id,
            name: tool_call.function.name,
        })
        .collect();

    Ok(LlmResponse {
        message: LlmMessage::assistant_with_tools(choice.message.content, tool_uses),
        usage: response.usage.map(convert_usage),
        model: response.model,
        finish_reason: choice.finish_reason.map(convert_finish_reason),
    })
}

/// Convert async-openai stream chunk to our internal format
fn convert_stream_chunk(chunk: CreateChatCompletionStreamResponse) -> LlmStreamChunk {
    let usage = chunk.usage.map(convert_usage);
    let Some(choice) = chunk.choices.into_iter().next() else {
        // the usage-only chunk at the end of the stream has no choices
        return LlmStreamChunk {
            usage,
            ..LlmStreamChunk::default()
        };
    };

    let tool_calls = choice
        .delta
        .tool_calls
        .map(|calls| {
            calls
                .into_iter()
                .map(|call| {
                    let (name, arguments) = match call.function {
                        Some(function) => (function.name, function.arguments),
                        None => (None, None),
                    };
                    ToolCallDelta {
                        index: call.index,
                        id: call.id,
                        name,
                        arguments,
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|calls| !calls.is_empty());

    LlmStreamChunk {
        delta: choice.delta.content,
        tool_calls,
        finish_reason: choice.finish_reason.map(convert_finish_reason),
        usage,
    }
}

fn convert_usage(usage: CompletionUsage) -> Usage {
    Usage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
        reasoning_tokens: usage
            .completion_tokens_details
            .and_then(|details| details.reasoning_tokens)
            .unwrap_or(0),
    }
}

fn convert_finish_reason(reason: async_openai::types::FinishReason) -> FinishReason {
    match reason {
        async_openai::types::FinishReason::Stop => FinishReason::Stop,
        async_openai::types::FinishReason::Length => FinishReason::Length,
        async_openai::types::FinishReason::ToolCalls => FinishReason::ToolCalls,
        async_openai::types::FinishReason::ContentFilter => FinishReason::ContentFilter,
        async_openai::types::FinishReason::FunctionCall => FinishReason::ToolCalls,
    }
}

fn convert_error(error: OpenAIError) -> crate::error::Error {
    match error {
        OpenAIError::ApiError(api) => match api.code.as_deref() {
            Some("invalid_api_key") => LlmError::Authentication {
                message: api.message,
            },
            Some("rate_limit_exceeded") => LlmError::RateLimit,
            _ => LlmError::ApiError {
                status: 400,
                message: api.message,
            },
        },
        OpenAIError::Reqwest(e) => LlmError::Network {
            message: e.to_string(),
        },
        other => LlmError::ApiError {
            status: 500,
            message: other.to_string(),
        },
    }
    .into()
}
