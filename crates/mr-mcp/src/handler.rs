//! Per-request entry point (spec §4.4): resolves the SSE session, acquires
//! a pooled [`StdioClient`], forwards the request, and fans the response out
//! to both the direct HTTP reply and the session's SSE queue.
//!
//! Transport concerns (HTTP routing, query-string parsing) live in the
//! `mr-server` crate; this module only needs the session id and the raw
//! request body, so it carries no axum dependency.

use std::sync::Arc;

use mr_protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
use mr_types::RouterError;
use serde_json::Value;

use crate::registry::ClientRegistry;
use crate::session_registry::SessionRegistry;

/// Outcome of handling one inbound JSON-RPC message.
pub enum HandlerOutcome {
    /// A JSON-RPC response (success or error) to send back over HTTP.
    Response(JsonRpcResponse),
    /// The inbound message was a notification; no direct HTTP body.
    Empty,
}

pub struct MessageHandler {
    registry: Arc<ClientRegistry>,
    pub(crate) sessions: Arc<SessionRegistry>,
}

impl MessageHandler {
    pub fn new(registry: Arc<ClientRegistry>, sessions: Arc<SessionRegistry>) -> Self {
        Self { registry, sessions }
    }

    /// Implements spec §4.4 steps 2–8. Step 1 (resolving the SSE-handler
    /// context from the HTTP framework) is the caller's job; by the time
    /// this is called the caller has only a session id and a request body.
    pub async fn handle(&self, session_id: &str, raw_body: &[u8]) -> HandlerOutcome {
        // Step 2: session lookup.
        if session_id.is_empty() {
            tracing::warn!(error = %RouterError::UnknownSession, "request carried no session id");
            return HandlerOutcome::Response(invalid_params(Value::Null));
        }
        let Some(session) = self.sessions.get_session(session_id) else {
            tracing::warn!(session_id, error = %RouterError::UnknownSession, "no session registered for id");
            return HandlerOutcome::Response(invalid_params(Value::Null));
        };

        // Step 3: parse body.
        let request: JsonRpcRequest = match serde_json::from_slice(raw_body) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "malformed json-rpc request body");
                return HandlerOutcome::Response(parse_error(Value::Null));
            }
        };
        let request_id = request.id.clone().unwrap_or(Value::Null);

        // Step 4: acquire client.
        let client = match self.registry.get_stdio_client(session.config().clone()).await {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "failed to acquire mcp server client");
                return HandlerOutcome::Response(proxy_error(request_id));
            }
        };
        if let Some(latched) = client.error() {
            tracing::warn!(session_id, error = %latched, "mcp server client has a latched fatal error");
            return HandlerOutcome::Response(proxy_error(request_id));
        }
        session.set_client(client.clone());

        // Step 5: re-store session (liveness heartbeat; spec.md §9 open
        // question — preserved as a no-op-shaped re-insert).
        self.sessions
            .store_session(session_id.to_string(), session.clone());

        // Step 6: install the notification -> SSE-queue bridge, at most
        // once per (client, session) pair.
        if session.claim_notification_slot(&client) {
            let sink = session.clone();
            client.on_notification(Arc::new(move |message: Value| {
                if let Ok(text) = serde_json::to_string(&message) {
                    sink.send_message(text);
                }
            }));
        }

        // Step 7: forward.
        let response = match client.forward_message(&request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(session_id, error = %e, "forwarding message to mcp server failed");
                return HandlerOutcome::Response(proxy_error(request_id));
            }
        };

        // Step 8: echo onto the SSE queue as well as the direct response.
        match response {
            Some(response) => {
                if let Ok(text) = serde_json::to_string(&response) {
                    session.send_message(text);
                }
                HandlerOutcome::Response(response)
            }
            None => HandlerOutcome::Empty,
        }
    }
}

fn parse_error(id: Value) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        id,
        JsonRpcError::new(mr_protocol::error_code::PARSE_ERROR, "parse error"),
    )
}

fn invalid_params(id: Value) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        id,
        JsonRpcError::new(mr_protocol::error_code::INVALID_PARAMS, "invalid params"),
    )
}

fn proxy_error(id: Value) -> JsonRpcResponse {
    JsonRpcResponse::failure(
        id,
        JsonRpcError::new(mr_protocol::error_code::PROXY_ERROR, "proxy error"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SseSession;
    use mr_config::Config;
    use serde_json::json;

    fn echo_config() -> Config {
        Config {
            cmd: r#"while read -r line; do echo "$line" | sed -E 's/"id":"[^"]*"/"id":"echoed"/'; done"#.to_string(),
            share_process: false,
            key: "echo".to_string(),
        }
    }

    fn handler() -> MessageHandler {
        MessageHandler::new(ClientRegistry::new(), SessionRegistry::new())
    }

    #[tokio::test]
    async fn unknown_session_is_invalid_params() {
        let handler = handler();
        let outcome = handler.handle("missing", b"{}").await;
        match outcome {
            HandlerOutcome::Response(resp) => {
                assert_eq!(
                    resp.error.unwrap().code,
                    mr_protocol::error_code::INVALID_PARAMS
                );
            }
            HandlerOutcome::Empty => panic!("expected an error response"),
        }
    }

    #[tokio::test]
    async fn malformed_body_is_parse_error() {
        let handler = handler();
        handler
            .sessions
            .store_session(
                "s1".to_string(),
                Arc::new(SseSession::new("s1".to_string(), echo_config())),
            );
        let outcome = handler.handle("s1", b"not json").await;
        match outcome {
            HandlerOutcome::Response(resp) => {
                assert_eq!(
                    resp.error.unwrap().code,
                    mr_protocol::error_code::PARSE_ERROR
                );
            }
            HandlerOutcome::Empty => panic!("expected an error response"),
        }
    }

    #[tokio::test]
    async fn simple_call_restores_original_id_and_echoes_to_sse_queue() {
        let handler = handler();
        let session = Arc::new(SseSession::new("s1".to_string(), echo_config()));
        handler
            .sessions
            .store_session("s1".to_string(), session.clone());

        let body = serde_json::to_vec(&json!({"jsonrpc": "2.0", "id": 7, "method": "ping"})).unwrap();
        let outcome = handler.handle("s1", &body).await;
        match outcome {
            HandlerOutcome::Response(resp) => assert_eq!(resp.id, json!(7)),
            HandlerOutcome::Empty => panic!("expected a response"),
        }

        let mut receiver = session.take_receiver().await.unwrap();
        let echoed = receiver.recv().await.unwrap();
        assert!(echoed.contains("\"id\":7"));

        session.client().unwrap().close().await;
    }
}
