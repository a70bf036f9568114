//! JSON-RPC 2.0 wire types shared between the HTTP gateway and the stdio
//! transport. Framing is one JSON object per line (`\n`-terminated); these
//! types model the object, not the framing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes, plus the proxy layer's own
/// `PROXY_ERROR` code for upstream/transport failures.
pub mod error_code {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    pub const PROXY_ERROR: i64 = -32000;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// Shape of a raw line on the child-process transport, classified the way
/// the reader task does it: presence of `id` vs `method` decides request,
/// response, or notification. Unlike a derive(Deserialize) tagged enum this
/// is decided by inspecting the parsed `Value`'s keys, which is what lets
/// the reader preserve unknown fields byte-for-byte when it only needs to
/// rewrite `id`.
#[derive(Debug, Clone)]
pub enum JsonRpcMessage {
    Request(Value),
    Response(Value),
    Notification(Value),
}

/// Classify a parsed JSON object per spec §3/§4.1: no `id` key present means
/// notification; `method` present (with an `id`) means request; otherwise
/// response.
pub fn classify(value: Value) -> JsonRpcMessage {
    let has_id = value.get("id").is_some();
    let has_method = value.get("method").is_some();
    if !has_id {
        JsonRpcMessage::Notification(value)
    } else if has_method {
        JsonRpcMessage::Request(value)
    } else {
        JsonRpcMessage::Response(value)
    }
}

/// Returns `true` if the parsed object declares `jsonrpc: "2.0"`.
pub fn is_jsonrpc_2(value: &Value) -> bool {
    value.get("jsonrpc").and_then(Value::as_str) == Some(JSONRPC_VERSION)
}

/// Read the `id` field of a parsed object, if present.
pub fn take_id(value: &Value) -> Option<Value> {
    value.get("id").cloned()
}

/// Replace the `id` field of a parsed object in place, preserving every
/// other field and the original key order (requires `serde_json`'s
/// `preserve_order` feature on the whole workspace, which this crate's
/// consumers enable). This is the Rust equivalent of the original's
/// in-place `sjson.Set` text patch.
pub fn set_id(value: &mut Value, id: Value) {
    if let Value::Object(map) = value {
        map.insert("id".to_string(), id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serialization() {
        let req = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(json!(7)),
            method: "ping".to_string(),
            params: None,
        };
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["id"], json!(7));
        assert!(v.get("params").is_none());
    }

    #[test]
    fn response_success_roundtrip() {
        let resp = JsonRpcResponse::success(json!(7), json!({"ok": true}));
        let text = serde_json::to_string(&resp).unwrap();
        let back: JsonRpcResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back.id, json!(7));
        assert_eq!(back.result.unwrap()["ok"], json!(true));
        assert!(back.error.is_none());
    }

    #[test]
    fn classify_notification_has_no_id() {
        let v = json!({"jsonrpc": "2.0", "method": "log", "params": {"msg": "hi"}});
        match classify(v) {
            JsonRpcMessage::Notification(_) => {}
            other => panic!("expected notification, got {other:?}"),
        }
    }

    #[test]
    fn classify_request_has_id_and_method() {
        let v = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"});
        match classify(v) {
            JsonRpcMessage::Request(_) => {}
            other => panic!("expected request, got {other:?}"),
        }
    }

    #[test]
    fn classify_response_has_id_no_method() {
        let v = json!({"jsonrpc": "2.0", "id": 1, "result": {}});
        match classify(v) {
            JsonRpcMessage::Response(_) => {}
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn set_id_preserves_other_fields() {
        let mut v = json!({"jsonrpc": "2.0", "id": "old", "result": {"a": 1}});
        set_id(&mut v, json!("new"));
        assert_eq!(v["id"], json!("new"));
        assert_eq!(v["result"]["a"], json!(1));
    }

    #[test]
    fn is_jsonrpc_2_rejects_other_versions() {
        assert!(is_jsonrpc_2(&json!({"jsonrpc": "2.0"})));
        assert!(!is_jsonrpc_2(&json!({"jsonrpc": "1.0"})));
        assert!(!is_jsonrpc_2(&json!({})));
    }
}
