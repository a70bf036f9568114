//! Shared application state threaded through every axum handler.
//!
//! Owns the process-wide [`ClientRegistry`] and [`SessionRegistry`] plus the
//! [`ConfigProvider`] — the three collaborators spec §2 names as the
//! core's external contracts, gathered into one value per SPEC_FULL.md's
//! REDESIGN FLAGS note ("global mutable state ... should be owned by a
//! single Router value parameterizing the HTTP handlers").

use std::sync::Arc;

use mr_config::ConfigProvider;
use mr_mcp::handler::MessageHandler;
use mr_mcp::{ClientRegistry, SessionRegistry};

#[derive(Clone)]
pub struct AppState {
    pub config_provider: Arc<dyn ConfigProvider>,
    pub client_registry: Arc<ClientRegistry>,
    pub session_registry: Arc<SessionRegistry>,
    pub handler: Arc<MessageHandler>,
}

impl AppState {
    pub fn new(config_provider: Arc<dyn ConfigProvider>) -> Self {
        let client_registry = ClientRegistry::new();
        let session_registry = SessionRegistry::new();
        let handler = Arc::new(MessageHandler::new(
            client_registry.clone(),
            session_registry.clone(),
        ));
        Self {
            config_provider,
            client_registry,
            session_registry,
            handler,
        }
    }
}
