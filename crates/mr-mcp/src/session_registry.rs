//! In-memory, concurrent implementation of the Session Registry contract
//! (spec §2/§6: `GetSession(id) -> SSESession | nil`, `StoreSession(id,
//! session)`). Durability and expiry are this registry's concern, not the
//! core's (spec §1 Non-goals exclude durable storage).

use std::sync::Arc;

use dashmap::DashMap;

use crate::session::SseSession;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<String, Arc<SseSession>>,
}

impl SessionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `GetSession(id) -> SSESession | nil`.
    pub fn get_session(&self, id: &str) -> Option<Arc<SseSession>> {
        self.sessions.get(id).map(|entry| entry.clone())
    }

    /// `StoreSession(id, session)`. Called on every inbound message as a
    /// liveness heartbeat per spec.md §9's open question — this registry
    /// preserves that behavior without attaching TTL semantics of its own.
    pub fn store_session(&self, id: String, session: Arc<SseSession>) {
        self.sessions.insert(id, session);
    }

    pub async fn remove_session(&self, id: &str) {
        if let Some((_, session)) = self.sessions.remove(id) {
            session.close().await;
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mr_config::Config;

    fn session(key: &str) -> Arc<SseSession> {
        Arc::new(SseSession::new(
            key.to_string(),
            Config {
                cmd: "cat".to_string(),
                share_process: false,
                key: key.to_string(),
            },
        ))
    }

    #[test]
    fn store_then_get_round_trips() {
        let registry = SessionRegistry::new();
        registry.store_session("abc".to_string(), session("abc"));
        assert!(registry.get_session("abc").is_some());
        assert!(registry.get_session("missing").is_none());
    }

    #[tokio::test]
    async fn remove_closes_session() {
        let registry = SessionRegistry::new();
        let s = session("abc");
        registry.store_session("abc".to_string(), s.clone());
        registry.remove_session("abc").await;
        assert!(registry.get_session("abc").is_none());
        assert!(s.is_closed());
    }
}
