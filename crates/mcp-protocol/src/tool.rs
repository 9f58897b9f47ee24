//! Tool definitions and call results.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool advertised by a server's `tools/list` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the tool's input, left opaque.
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// The envelope of a `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsListResult {
    /// The tools this server advertises.
    pub tools: Vec<Tool>,
    /// Opaque pagination cursor, if the result was truncated.
    #[serde(rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// One entry of a tool call's content list, held as opaque JSON.
///
/// MCP's content catalog (text, image, audio, resource, ...) evolves; rather
/// than normalize it into a closed sum type that breaks on the next content
/// kind, a block round-trips exactly as the server sent it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ContentBlock(pub Value);

impl ContentBlock {
    /// The block's `type` discriminant (`"text"`, `"image"`, ...), if present.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    /// The block's `text` field, for the common `{"type": "text", ...}` case.
    pub fn as_text(&self) -> Option<&str> {
        self.0.get("text").and_then(Value::as_str)
    }
}

/// The envelope of a `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsCallResult {
    /// The content blocks produced by the call, each preserved as raw JSON.
    pub content: Vec<ContentBlock>,
    /// Set by the server when the tool itself reported failure, as distinct
    /// from a JSON-RPC-level error.
    #[serde(rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_text_content() {
        let raw = json!({"content": [{"type": "text", "text": "hi"}]});
        let result: ToolsCallResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.content.len(), 1);
        assert_eq!(result.content[0].kind(), Some("text"));
        assert_eq!(result.content[0].as_text(), Some("hi"));
    }

    #[test]
    fn non_text_content_round_trips_unchanged() {
        let raw = json!({
            "content": [{"type": "image", "data": "base64blob", "mimeType": "image/png"}]
        });
        let result: ToolsCallResult = serde_json::from_value(raw.clone()).unwrap();
        let back = serde_json::to_value(&result).unwrap();
        assert_eq!(back["content"][0], raw["content"][0]);
    }

    #[test]
    fn is_error_defaults_to_absent() {
        let raw = json!({"content": []});
        let result: ToolsCallResult = serde_json::from_value(raw).unwrap();
        assert_eq!(result.is_error, None);
    }
}
