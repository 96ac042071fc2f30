//! Tool-call parsing
//!
//! Two paths into [`ToolCall`]s: assembling structured streaming chunks,
//! and extracting call-shaped JSON embedded in free text. The text path
//! whitelist-validates extracted names - a function-call-shaped string
//! literal in prose must never become an executable call.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::error::LlmError;
use super::types::{ChatResponse, StopReason, StreamChunk, TokenUsage, ToolCall};

/// Extract whitelist-validated tool calls from free text
///
/// Scans for JSON objects of the shape `{"name": ..., "arguments": {...}}`
/// anywhere in the text (inline or inside code fences). Objects whose name
/// is not in the whitelist are ignored.
pub fn extract_tool_calls(text: &str, whitelist: &HashSet<String>) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let bytes = text.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'{' {
            i += 1;
            continue;
        }

        match balanced_object_end(text, i) {
            Some(end) => {
                let candidate = &text[i..=end];
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(candidate)
                    && let Some(name) = value.get("name").and_then(|n| n.as_str())
                    && let Some(arguments) = value.get("arguments")
                    && arguments.is_object()
                {
                    if whitelist.contains(name) {
                        calls.push(ToolCall::new(name, arguments.clone()));
                    } else {
                        debug!(name, "Ignoring extracted call with non-whitelisted name");
                    }
                    i = end + 1;
                    continue;
                }
                i += 1;
            }
            None => break,
        }
    }

    calls
}

/// Find the index of the `}` closing the object that opens at `start`,
/// respecting string literals and escapes.
fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Assembles streaming chunks into a complete response
///
/// Supports both delivery modes real transports exhibit: incremental tool
/// call assembly (start/delta chunks) and text-only streams whose calls
/// are extracted at stream end.
#[derive(Default)]
pub struct StreamAssembler {
    content: String,
    call_order: Vec<String>,
    partial_calls: HashMap<String, (String, String)>,
    stop_reason: Option<StopReason>,
    usage: TokenUsage,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: StreamChunk) {
        match chunk {
            StreamChunk::TextDelta(delta) => self.content.push_str(&delta),
            StreamChunk::ToolUseStart { id, name } => {
                self.call_order.push(id.clone());
                self.partial_calls.insert(id, (name, String::new()));
            }
            StreamChunk::ToolUseDelta { id, json_delta } => {
                if let Some((_, buffer)) = self.partial_calls.get_mut(&id) {
                    buffer.push_str(&json_delta);
                }
            }
            StreamChunk::Done { stop_reason, usage } => {
                self.stop_reason = Some(stop_reason);
                self.usage = usage;
            }
        }
    }

    /// Finish the stream and produce the response
    ///
    /// A tool call whose accumulated arguments fail to parse aborts the
    /// whole response - a half-parsed call must not execute.
    pub fn finish(self) -> Result<ChatResponse, LlmError> {
        let mut tool_calls = Vec::new();
        for id in &self.call_order {
            let (name, buffer) = &self.partial_calls[id];
            let arguments: serde_json::Value = if buffer.trim().is_empty() {
                serde_json::json!({})
            } else {
                serde_json::from_str(buffer)
                    .map_err(|e| LlmError::InvalidResponse(format!("tool call {} arguments: {}", name, e)))?
            };
            tool_calls.push(ToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments,
            });
        }

        let stop_reason = self.stop_reason.unwrap_or(StopReason::EndTurn);
        Ok(ChatResponse {
            content: if self.content.is_empty() { None } else { Some(self.content) },
            tool_calls,
            stop_reason,
            usage: self.usage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whitelist(names: &[&str]) -> HashSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_extract_simple_call() {
        let text = r#"I'll read the file first: {"name": "read_file", "arguments": {"path": "a.rs"}}"#;
        let calls = extract_tool_calls(text, &whitelist(&["read_file"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].name, "read_file");
        assert_eq!(calls[0].arguments["path"], "a.rs");
    }

    #[test]
    fn test_extract_rejects_non_whitelisted() {
        let text = r#"{"name": "open", "arguments": {"path": "/etc/passwd"}}"#;
        let calls = extract_tool_calls(text, &whitelist(&["read_file"]));
        assert!(calls.is_empty());
    }

    #[test]
    fn test_extract_ignores_call_shaped_string_literal() {
        // The call shape appears inside a string value, not as an object
        let text = r#"The docs say to use "{\"name\": \"read_file\"}" as an example."#;
        let calls = extract_tool_calls(text, &whitelist(&["read_file"]));
        assert!(calls.is_empty());
    }

    #[test]
    fn test_extract_requires_arguments_object() {
        let text = r#"{"name": "read_file", "arguments": "a.rs"}"#;
        let calls = extract_tool_calls(text, &whitelist(&["read_file"]));
        assert!(calls.is_empty());
    }

    #[test]
    fn test_extract_multiple_calls_in_fence() {
        let text = "```json\n{\"name\": \"read_file\", \"arguments\": {\"path\": \"a.rs\"}}\n{\"name\": \"write_file\", \"arguments\": {\"path\": \"b.rs\", \"content\": \"x\"}}\n```";
        let calls = extract_tool_calls(text, &whitelist(&["read_file", "write_file"]));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].name, "write_file");
    }

    #[test]
    fn test_extract_nested_braces_in_arguments() {
        let text = r#"{"name": "write_file", "arguments": {"path": "a.rs", "content": "fn main() { }"}}"#;
        let calls = extract_tool_calls(text, &whitelist(&["write_file"]));
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments["content"], "fn main() { }");
    }

    #[test]
    fn test_assembler_incremental_tool_call() {
        let mut assembler = StreamAssembler::new();
        assembler.feed(StreamChunk::TextDelta("Reading now.".to_string()));
        assembler.feed(StreamChunk::ToolUseStart {
            id: "t1".to_string(),
            name: "read_file".to_string(),
        });
        assembler.feed(StreamChunk::ToolUseDelta {
            id: "t1".to_string(),
            json_delta: "{\"path\":".to_string(),
        });
        assembler.feed(StreamChunk::ToolUseDelta {
            id: "t1".to_string(),
            json_delta: " \"a.rs\"}".to_string(),
        });
        assembler.feed(StreamChunk::Done {
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage::default(),
        });

        let response = assembler.finish().unwrap();
        assert_eq!(response.content.as_deref(), Some("Reading now."));
        assert_eq!(response.tool_calls.len(), 1);
        assert_eq!(response.tool_calls[0].arguments["path"], "a.rs");
        assert_eq!(response.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn test_assembler_rejects_half_parsed_call() {
        let mut assembler = StreamAssembler::new();
        assembler.feed(StreamChunk::ToolUseStart {
            id: "t1".to_string(),
            name: "read_file".to_string(),
        });
        assembler.feed(StreamChunk::ToolUseDelta {
            id: "t1".to_string(),
            json_delta: "{\"path\": \"trunc".to_string(),
        });

        assert!(assembler.finish().is_err());
    }

    #[test]
    fn test_assembler_empty_arguments_default() {
        let mut assembler = StreamAssembler::new();
        assembler.feed(StreamChunk::ToolUseStart {
            id: "t1".to_string(),
            name: "list_directory".to_string(),
        });

        let response = assembler.finish().unwrap();
        assert_eq!(response.tool_calls[0].arguments, serde_json::json!({}));
    }
}
