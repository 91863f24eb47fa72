//! Conversion between crate types and the Chat Completions wire format.

use crate::types::{ChatMessage, ChatResponse, Role, ToolCall, ToolDef};

use super::types::{
    WireFunctionCall, WireFunctionDef, WireMessage, WireResponseMessage, WireTool, WireToolCall,
};

pub fn role_to_wire(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

pub fn message_to_wire(message: &ChatMessage) -> WireMessage {
    WireMessage {
        role: role_to_wire(message.role).to_string(),
        content: message.content.clone(),
        tool_call_id: message.tool_call_id.clone(),
        tool_calls: message.tool_calls.as_ref().map(|calls| {
            calls
                .iter()
                .map(|c| WireToolCall {
                    id: c.id.clone(),
                    call_type: "function".to_string(),
                    function: WireFunctionCall {
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    },
                })
                .collect()
        }),
    }
}

pub fn tool_to_wire(tool: &ToolDef) -> WireTool {
    WireTool {
        tool_type: "function".to_string(),
        function: WireFunctionDef {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
        },
    }
}

pub fn response_from_wire(message: WireResponseMessage) -> ChatResponse {
    ChatResponse {
        content: message.content.unwrap_or_default(),
        reasoning: message.reasoning_content.unwrap_or_default(),
        tool_calls: message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.function.name, c.function.arguments))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_message_conversion() {
        let wire = message_to_wire(&ChatMessage::tool("call_7", "32 units"));
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_7"));
        assert!(wire.tool_calls.is_none());
    }

    #[test]
    fn test_assistant_tool_calls_conversion() {
        let msg = ChatMessage::assistant_tool_calls(
            "",
            vec![ToolCall::new("c1", "scan", r#"{"deep":true}"#)],
        );
        let wire = message_to_wire(&msg);
        let calls = wire.tool_calls.unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"deep":true}"#);
        assert_eq!(calls[0].call_type, "function");
    }

    #[test]
    fn test_response_conversion_defaults() {
        let response = response_from_wire(WireResponseMessage {
            content: None,
            reasoning_content: None,
            tool_calls: None,
        });
        assert!(response.content.is_empty());
        assert!(response.reasoning.is_empty());
        assert!(!response.has_tool_calls());
    }

    #[test]
    fn test_roles() {
        assert_eq!(role_to_wire(Role::System), "system");
        assert_eq!(role_to_wire(Role::Tool), "tool");
    }
}
