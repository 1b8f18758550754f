//! Shared application state handed to every axum handler.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use oauth::ClientConfig;
use pool::{Refresher, Selector, Store};
use tokio::sync::Mutex;

use crate::dispatch::DispatchState;

/// A PKCE flow that has been started but not yet completed at
/// `/auth/callback` (spec.md §4.7 boundary stubs).
pub struct PendingAuth {
    pub verifier: String,
    pub created_at: u64,
}

/// TTL for an unfinished PKCE flow before its state value is discarded.
pub const PENDING_AUTH_TTL_SECS: u64 = 10 * 60;

#[derive(Clone)]
pub struct AppState {
    pub dispatch: Arc<DispatchState>,
    pub store: Arc<Store>,
    pub selector: Arc<Selector>,
    pub refresher: Arc<Refresher>,
    pub oauth_config: ClientConfig,
    pub http: reqwest::Client,
    pub pending_auth: Arc<Mutex<HashMap<String, PendingAuth>>>,
    pub started_at: Instant,
}

impl AppState {
    /// Drop PKCE flows older than [`PENDING_AUTH_TTL_SECS`]; called opportunistically
    /// from `/oauth/start` and `/auth/callback` rather than on a timer.
    pub async fn sweep_expired_pending_auth(&self) {
        let now = pool::now_millis() / 1000;
        let mut guard = self.pending_auth.lock().await;
        guard.retain(|_, pending| now.saturating_sub(pending.created_at) < PENDING_AUTH_TTL_SECS);
    }
}
