//! `POST /messages?sessionid=<id>` — spec §6's one in-scope HTTP endpoint.
//!
//! Thin glue: pulls the session id out of the query string and the body
//! bytes out of the request, then hands both to [`MessageHandler::handle`],
//! which does everything spec §4.4 describes. This handler's only job is
//! translating axum's extractors into that call and the outcome back into
//! an HTTP response.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;

use mr_mcp::handler::HandlerOutcome;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MessagesQuery {
    #[serde(default)]
    pub sessionid: String,
}

/// `POST /messages?sessionid=<id>`.
pub async fn post_messages(
    State(state): State<AppState>,
    Query(query): Query<MessagesQuery>,
    body: axum::body::Bytes,
) -> Response {
    match state.handler.handle(&query.sessionid, &body).await {
        HandlerOutcome::Response(response) => (StatusCode::OK, Json(response)).into_response(),
        HandlerOutcome::Empty => (StatusCode::OK, "").into_response(),
    }
}
