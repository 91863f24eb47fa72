//! Storage encoding for tool calls and tool results inside memory content.
//!
//! An assistant memory that carries tool calls stores them as
//! `PREFIX id US name US arguments RS id US name US arguments ...` where RS
//! and US are the ASCII record/unit separators. A tool-result memory stores
//! `call_id US result_text`. Arguments are kept as the raw JSON text the
//! provider returned, so formatting a parsed encoding reproduces it exactly.

use serde::{Deserialize, Serialize};

/// Marks an assistant memory's content as an encoded tool-call batch.
pub const TOOL_CALL_STORAGE_PREFIX: &str = "\u{2}zoea:tool_calls\u{2}";

/// Separates tool-call records within one assistant memory.
pub const RECORD_DELIMITER: char = '\u{1e}';

/// Separates the id, name and arguments fields within one record, and the
/// call id from the result text in a tool-result memory.
pub const FIELD_DELIMITER: char = '\u{1f}';

/// A tool invocation requested by the model. `arguments` is raw JSON text,
/// threaded through unchanged; only the activity tracker ever inspects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// True when a memory's content is an encoded tool-call batch.
pub fn is_tool_call_content(content: &str) -> bool {
    content.starts_with(TOOL_CALL_STORAGE_PREFIX)
}

/// Encode one or more tool calls into a single assistant memory content.
pub fn format_tool_calls(calls: &[ToolCall]) -> String {
    let records: Vec<String> = calls
        .iter()
        .map(|c| format!("{}{FIELD_DELIMITER}{}{FIELD_DELIMITER}{}", c.id, c.name, c.arguments))
        .collect();
    format!(
        "{TOOL_CALL_STORAGE_PREFIX}{}",
        records.join(&RECORD_DELIMITER.to_string())
    )
}

/// Decode an assistant memory content back into tool calls. Returns `None`
/// when the content is not a tool-call encoding or a record is malformed.
pub fn parse_tool_calls(content: &str) -> Option<Vec<ToolCall>> {
    let body = content.strip_prefix(TOOL_CALL_STORAGE_PREFIX)?;
    let mut calls = Vec::new();
    for record in body.split(RECORD_DELIMITER) {
        let mut fields = record.splitn(3, FIELD_DELIMITER);
        let id = fields.next()?;
        let name = fields.next()?;
        let arguments = fields.next()?;
        if id.is_empty() || name.is_empty() {
            return None;
        }
        calls.push(ToolCall::new(id, name, arguments));
    }
    if calls.is_empty() {
        return None;
    }
    Some(calls)
}

/// Encode a tool result as `call_id US text`.
pub fn format_tool_result(call_id: &str, text: &str) -> String {
    format!("{call_id}{FIELD_DELIMITER}{text}")
}

/// Decode a tool-result memory content into `(call_id, text)`.
pub fn parse_tool_result(content: &str) -> Option<(&str, &str)> {
    let (id, text) = content.split_once(FIELD_DELIMITER)?;
    if id.is_empty() {
        return None;
    }
    Some((id, text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_single_call() {
        let calls = vec![ToolCall::new("c1", "move_ship", r#"{"x":1}"#)];
        let encoded = format_tool_calls(&calls);
        assert!(encoded.starts_with(TOOL_CALL_STORAGE_PREFIX));
        assert!(is_tool_call_content(&encoded));
        assert_eq!(parse_tool_calls(&encoded), Some(calls));
    }

    #[test]
    fn test_format_multiple_calls() {
        let calls = vec![
            ToolCall::new("c1", "get_status", "{}"),
            ToolCall::new("c2", "move_ship", r#"{"x":4,"y":9}"#),
            ToolCall::new("c3", "mine", r#"{"resource":"iron"}"#),
        ];
        let encoded = format_tool_calls(&calls);
        let decoded = parse_tool_calls(&encoded).unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded, calls);
    }

    #[test]
    fn test_roundtrip_is_exact() {
        // format(parse(x)) == x for well-formed encodings.
        let calls = vec![
            ToolCall::new("id-1", "scan", r#"{"deep": true, "range": 3}"#),
            ToolCall::new("id-2", "dock", r#"{"station":"alpha"}"#),
        ];
        let encoded = format_tool_calls(&calls);
        let reencoded = format_tool_calls(&parse_tool_calls(&encoded).unwrap());
        assert_eq!(reencoded, encoded);
    }

    #[test]
    fn test_arguments_preserved_verbatim() {
        // Whitespace and key order in raw arguments must survive.
        let raw = r#"{ "b": 2,   "a": 1 }"#;
        let calls = vec![ToolCall::new("c1", "noop", raw)];
        let decoded = parse_tool_calls(&format_tool_calls(&calls)).unwrap();
        assert_eq!(decoded[0].arguments, raw);
    }

    #[test]
    fn test_parse_rejects_plain_text() {
        assert_eq!(parse_tool_calls("just a normal response"), None);
        assert!(!is_tool_call_content("just a normal response"));
    }

    #[test]
    fn test_parse_rejects_malformed_record() {
        let content = format!("{TOOL_CALL_STORAGE_PREFIX}only-an-id");
        assert_eq!(parse_tool_calls(&content), None);

        let content = format!("{TOOL_CALL_STORAGE_PREFIX}{FIELD_DELIMITER}name{FIELD_DELIMITER}{{}}");
        assert_eq!(parse_tool_calls(&content), None);
    }

    #[test]
    fn test_tool_result_roundtrip() {
        let content = format_tool_result("c7", "42 units of iron mined");
        assert_eq!(parse_tool_result(&content), Some(("c7", "42 units of iron mined")));
    }

    #[test]
    fn test_tool_result_text_may_contain_delimiter() {
        // Only the first separator splits; the rest belongs to the text.
        let text = format!("left{FIELD_DELIMITER}right");
        let content = format_tool_result("c1", &text);
        let (id, parsed) = parse_tool_result(&content).unwrap();
        assert_eq!(id, "c1");
        assert_eq!(parsed, text);
    }

    #[test]
    fn test_tool_result_rejects_plain_text() {
        assert_eq!(parse_tool_result("no separator here"), None);
    }
}
