//! Conversion between crate types and the Messages API shape.
//!
//! System messages are hoisted into the `system` field; tool results become
//! `tool_result` blocks inside user messages, with consecutive results
//! merged into one message as the API expects.

use crate::types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDef};

use super::types::{AnthropicContentBlock, AnthropicMessage, AnthropicResponse, AnthropicTool};

/// Split a conversation into the system prompt and API messages.
pub fn messages_to_wire(messages: &[ChatMessage]) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system_parts: Vec<&str> = Vec::new();
    let mut wire: Vec<AnthropicMessage> = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system_parts.push(&message.content),
            Role::User => wire.push(AnthropicMessage {
                role: "user".to_string(),
                content: vec![AnthropicContentBlock::Text {
                    text: message.content.clone(),
                }],
            }),
            Role::Assistant => {
                let mut blocks = Vec::new();
                if !message.content.is_empty() {
                    blocks.push(AnthropicContentBlock::Text {
                        text: message.content.clone(),
                    });
                }
                for call in message.tool_calls.iter().flatten() {
                    blocks.push(AnthropicContentBlock::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| serde_json::json!({})),
                    });
                }
                if blocks.is_empty() {
                    blocks.push(AnthropicContentBlock::Text {
                        text: String::new(),
                    });
                }
                wire.push(AnthropicMessage {
                    role: "assistant".to_string(),
                    content: blocks,
                });
            }
            Role::Tool => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: message.content.clone(),
                    is_error: false,
                };
                // Consecutive tool results share one user message.
                match wire.last_mut() {
                    Some(last)
                        if last.role == "user"
                            && last
                                .content
                                .iter()
                                .all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. })) =>
                    {
                        last.content.push(block);
                    }
                    _ => wire.push(AnthropicMessage {
                        role: "user".to_string(),
                        content: vec![block],
                    }),
                }
            }
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (system, wire)
}

pub fn tool_to_wire(tool: &ToolDef) -> AnthropicTool {
    AnthropicTool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: tool.parameters.clone(),
    }
}

pub fn response_from_wire(response: AnthropicResponse) -> ChatResponse {
    let mut content = String::new();
    let mut reasoning = String::new();
    let mut tool_calls = Vec::new();

    for block in response.content {
        match block {
            AnthropicContentBlock::Text { text } => {
                if !content.is_empty() {
                    content.push('\n');
                }
                content.push_str(&text);
            }
            AnthropicContentBlock::Thinking { thinking } => {
                if !reasoning.is_empty() {
                    reasoning.push('\n');
                }
                reasoning.push_str(&thinking);
            }
            AnthropicContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall::new(id, name, input.to_string()));
            }
            AnthropicContentBlock::ToolResult { .. } => {}
        }
    }

    ChatResponse {
        content,
        reasoning,
        tool_calls,
    }
}
