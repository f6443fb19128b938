//! LLM client abstractions and implementations

pub mod client;
pub mod message;
pub mod providers;

pub use client::{
    ChatOptions, FinishReason, FunctionDefinition, LlmClient, LlmResponse, LlmStream,
    LlmStreamChunk, ToolCallDelta, ToolDefinition, Usage,
};
pub use message::{parse_tool_arguments, ContentBlock, LlmMessage, MessageContent, MessageRole};
pub use providers::{create_client, OpenAiClient};
