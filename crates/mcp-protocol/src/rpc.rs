//! JSON-RPC 2.0 envelope types used on every transport.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::JsonRpcError;
use crate::request_id::RequestId;

/// The only JSON-RPC version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Zero-sized marker that serializes to/deserializes from the literal `"2.0"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "invalid jsonrpc version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// A JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Method name, e.g. `"tools/call"`.
    pub method: String,
    /// Method parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    /// Correlation identifier, echoed back on the matching response.
    pub id: RequestId,
}

impl JsonRpcRequest {
    /// Build a request with the given id.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC notification: a request with no `id` that expects no response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Method name, e.g. `"notifications/initialized"`.
    pub method: String,
    /// Method parameters, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Build a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// The result/error payload of a response, mutually exclusive by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcResponsePayload {
    /// A successful call, carrying the raw `result` value.
    Success {
        /// Raw JSON result, left opaque so callers can decode it into their
        /// own typed shape (e.g. `ToolsListResult`).
        result: Value,
    },
    /// A failed call.
    Error {
        /// The JSON-RPC error object.
        error: JsonRpcError,
    },
}

/// Response id: `null` only appears when the server couldn't even parse the
/// request enough to learn its id (e.g. a parse error).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// Wrap a known request id.
    pub fn from_request(id: RequestId) -> Self {
        Self(Some(id))
    }

    /// The `null` id used for requests the server could not correlate.
    pub fn null() -> Self {
        Self(None)
    }

    /// Borrow the underlying id, if any.
    pub fn as_request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }
}

/// A JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Either `result` or `error`, never both.
    #[serde(flatten)]
    pub payload: JsonRpcResponsePayload,
    /// The id of the request this responds to, or null on a parse error.
    pub id: ResponseId,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_omits_absent_params() {
        let req = JsonRpcRequest::new(RequestId::Number(1), "ping", None);
        let v = serde_json::to_value(&req).unwrap();
        assert!(!v.as_object().unwrap().contains_key("params"));
    }

    #[test]
    fn response_payload_is_untagged() {
        let raw = json!({"jsonrpc": "2.0", "id": 1, "result": {"ok": true}});
        let resp: JsonRpcResponse = serde_json::from_value(raw).unwrap();
        match resp.payload {
            JsonRpcResponsePayload::Success { result } => {
                assert_eq!(result, json!({"ok": true}));
            }
            JsonRpcResponsePayload::Error { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn null_id_round_trips() {
        let id = ResponseId::null();
        let v = serde_json::to_value(&id).unwrap();
        assert!(v.is_null());
    }
}
