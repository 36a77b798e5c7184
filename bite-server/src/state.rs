//! Application state shared across all request handlers.

use crate::config::runtime::AuthConfig;
use bite_core::events::EngineEventSender;
use bite_core::matching::MatchingApi;
use std::sync::Arc;
use tokio::sync::{RwLock, watch};

/// Cheap to clone; everything is behind `Arc` or is a channel handle.
#[derive(Clone)]
pub struct AppState {
    pub api: Arc<MatchingApi>,
    /// Engine event bus, relayed to admins over WebSocket.
    pub events: EngineEventSender,
    /// Gateway secret, swapped on SIGHUP.
    pub auth: Arc<RwLock<AuthConfig>>,
    /// Flips to `true` when the server starts shutting down.
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        api: Arc<MatchingApi>,
        events: EngineEventSender,
        auth: AuthConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            api,
            events,
            auth: Arc::new(RwLock::new(auth)),
            shutdown,
        }
    }
}
