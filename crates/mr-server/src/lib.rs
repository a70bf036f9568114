//! Axum HTTP glue around the `mr-mcp` subprocess proxy core: routes, app
//! state, and the TCP listener loop.

pub mod routes;
pub mod state;

use std::net::SocketAddr;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Builds the axum [`Router`]: the proxy endpoint plus the SSE and health
/// routes.
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/messages", post(routes::post_messages))
        .route("/sse", get(routes::get_sse))
        .route("/healthz", get(routes::get_healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Binds `addr` and serves `app` until the process is killed. Single fixed
/// bind per process, no port-retry loop.
pub async fn serve(addr: SocketAddr, app: Router) -> anyhow::Result<()> {
    tracing::info!(%addr, "mcprouter-rs listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_config::Config;
    use std::sync::Arc;

    struct NoopProvider;

    #[async_trait::async_trait]
    impl mr_config::ConfigProvider for NoopProvider {
        async fn get_config(&self, _key: &str) -> mr_types::RouterResult<Option<Config>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn builds_router_without_panicking() {
        let state = AppState::new(Arc::new(NoopProvider));
        let _app = build_app(state);
    }
}
