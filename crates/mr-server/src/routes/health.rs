//! `GET /healthz` — liveness probe. Ambient; not named in spec.md, added
//! because every service in the corpus that binds a port exposes one.

use axum::http::StatusCode;

pub async fn get_healthz() -> StatusCode {
    StatusCode::OK
}
