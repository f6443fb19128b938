//! LLM message structures

use serde::{Deserialize, Serialize};

/// Represents a message in an LLM conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmMessage {
    /// Role of the message sender
    pub role: MessageRole,

    /// Content of the message
    pub content: MessageContent,
}

/// Role of the message sender
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    /// Tool execution result
    Tool,
}

/// Content of a message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Simple text content
    Text(String),

    /// Text interleaved with tool calls or results
    Blocks(Vec<ContentBlock>),
}

/// A block of content within a message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },

    /// Tool use request
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },

    /// Tool result
    ToolResult {
        tool_use_id: String,
        is_error: bool,
        content: String,
    },
}

impl LlmMessage {
    pub fn system<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn user<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant<S: Into<String>>(content: S) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Assistant turn with optional text followed by tool calls
    pub fn assistant_with_tools(text: Option<String>, tool_uses: Vec<ContentBlock>) -> Self {
        if tool_uses.is_empty() {
            return Self::assistant(text.unwrap_or_default());
        }
        let mut blocks = Vec::with_capacity(tool_uses.len() + 1);
        if let Some(text) = text.filter(|t| !t.is_empty()) {
            blocks.push(ContentBlock::Text { text });
        }
        blocks.extend(tool_uses);
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Blocks(blocks),
        }
    }

    /// Result of one tool call
    pub fn tool_result<S: Into<String>>(tool_use_id: S, content: S, is_error: bool) -> Self {
        Self {
            role: MessageRole::Tool,
            content: MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                is_error,
                content: content.into(),
            }]),
        }
    }

    /// Get the text content of the message
    pub fn get_text(&self) -> Option<String> {
        match &self.content {
            MessageContent::Text(text) => Some(text.clone()),
            MessageContent::Blocks(blocks) => {
                let text_parts: Vec<&str> = blocks
                    .iter()
                    .filter_map(|block| match block {
                        ContentBlock::Text { text } => Some(text.as_str()),
                        _ => None,
                    })
                    .collect();
                if text_parts.is_empty() {
                    None
                } else {
                    Some(text_parts.join("\n"))
                }
            }
        }
    }

    /// Check if the message contains tool use
    pub fn has_tool_use(&self) -> bool {
        !self.get_tool_uses().is_empty()
    }

    /// Extract tool use blocks from the message
    pub fn get_tool_uses(&self) -> Vec<&ContentBlock> {
        match &self.content {
            MessageContent::Text(_) => Vec::new(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter(|block| matches!(block, ContentBlock::ToolUse { .. }))
                .collect(),
        }
    }
}

/// Parse tool-call arguments as JSON. Empty input is an empty object;
/// anything unparseable is kept as a JSON string.
pub fn parse_tool_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::Value::Object(Default::default());
    }
    serde_json::from_str(arguments)
        .unwrap_or_else(|_| serde_json::Value::String(arguments.to_string()))
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_arguments() {
        assert_eq!(parse_tool_arguments(r#"{"a":1}"#), serde_json::json!({"a": 1}));
        assert_eq!(parse_tool_arguments("  "), serde_json::json!({}));
        assert_eq!(parse_tool_arguments("{broken"), serde_json::json!("{broken"));
    }
    use serde_json::json;

    #[test]
    fn test_assistant_with_tools() {
        let message = LlmMessage::assistant_with_tools(
            Some("Creating it".to_string()),
            vec![ContentBlock::ToolUse {
                id: "call_1".to_string(),
                name: "create_speaker".to_string(),
                input: json!({"last_name": "Lovelace"}),
            }],
        );
        assert!(message.has_tool_use());
        assert_eq!(message.get_text().as_deref(), Some("Creating it"));
        assert_eq!(message.get_tool_uses().len(), 1);
    }

    #[test]
    fn test_assistant_without_tools_is_plain_text() {
        let message = LlmMessage::assistant_with_tools(Some("Done!".to_string()), Vec::new());
        assert!(matches!(message.content, MessageContent::Text(ref t) if t == "Done!"));
        assert!(!message.has_tool_use());
    }

    #[test]
    fn test_tool_result_has_no_text() {
        let message = LlmMessage::tool_result("call_1", "OK", false);
        assert_eq!(message.role, MessageRole::Tool);
        assert!(message.get_text().is_none());
    }
}
