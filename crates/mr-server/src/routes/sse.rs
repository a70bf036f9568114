//! `GET /sse?key=<server key>` — the SSE half of the MCP HTTP+SSE transport
//! handshake (SPEC_FULL.md §6). Mints a session id, resolves the server
//! [`Config`](mr_config::Config) for `key` via the Config Provider, stores
//! an [`SseSession`] under the new id, and streams its queue as `event:
//! message` frames — plus an initial `event: endpoint` frame carrying the
//! `/messages?sessionid=<id>` URL the client should POST requests to.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::Stream;
use serde::Deserialize;
use uuid::Uuid;

use mr_mcp::SseSession;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SseQuery {
    pub key: String,
}

/// `GET /sse?key=<server key>`.
pub async fn get_sse(State(state): State<AppState>, Query(query): Query<SseQuery>) -> Response {
    let config = match state.config_provider.get_config(&query.key).await {
        Ok(Some(config)) => config,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                format!("unknown mcp server key: {}", query.key),
            )
                .into_response();
        }
        Err(e) => {
            tracing::warn!(key = %query.key, error = %e, "config provider lookup failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    let session_id = Uuid::new_v4().to_string();
    let session = Arc::new(SseSession::new(session_id.clone(), config));
    state
        .session_registry
        .store_session(session_id.clone(), session.clone());

    let endpoint = format!("/messages?sessionid={session_id}");
    let stream = sse_stream(session, endpoint);
    Sse::new(stream).keep_alive(KeepAlive::default()).into_response()
}

fn sse_stream(
    session: Arc<SseSession>,
    endpoint: String,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        yield Ok(Event::default().event("endpoint").data(endpoint));

        let Some(mut receiver) = session.take_receiver().await else {
            return;
        };
        while let Some(message) = receiver.recv().await {
            yield Ok(Event::default().event("message").data(message));
        }
        session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_config::Config;

    struct FixedProvider(Option<Config>);

    #[async_trait::async_trait]
    impl mr_config::ConfigProvider for FixedProvider {
        async fn get_config(&self, _key: &str) -> mr_types::RouterResult<Option<Config>> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn stores_session_under_fresh_id_before_streaming() {
        let config = Config {
            cmd: "cat".to_string(),
            share_process: false,
            key: "fs".to_string(),
        };
        let state = AppState::new(Arc::new(FixedProvider(Some(config))));
        assert!(state.session_registry.is_empty());

        let response = get_sse(
            State(state.clone()),
            Query(SseQuery {
                key: "fs".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.session_registry.len(), 1);
    }

    #[tokio::test]
    async fn unknown_key_is_not_found() {
        let state = AppState::new(Arc::new(FixedProvider(None)));
        let response = get_sse(
            State(state),
            Query(SseQuery {
                key: "missing".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
