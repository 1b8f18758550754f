//! OAuth boundary endpoints (spec.md §4.7): the two HTTP endpoints that let
//! an operator's browser complete a PKCE flow against the configured
//! identity provider and land a freshly-issued account in the STORE.
//!
//! The `oauth` crate does the PKCE math and token exchange; this module
//! owns only the short-lived `state -> verifier` map a multi-request HTTP
//! flow needs (grounded on the teacher's admin API, which kept the same
//! kind of in-memory map with expiry for its own PKCE flow).

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::Router;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect};
use axum::routing::get;
use pool::{Account, CommonFields};
use serde::Deserialize;
use tracing::{info, warn};

use crate::app_state::{AppState, PendingAuth};
use crate::error::{Error, Result};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/oauth/start", get(start))
        .route("/auth/callback", get(callback))
}

fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// `GET /oauth/start`: generate a PKCE verifier/challenge pair, stash the
/// verifier under a fresh opaque state value, and redirect the caller's
/// browser to the identity provider's authorization page.
async fn start(State(state): State<AppState>) -> impl IntoResponse {
    state.sweep_expired_pending_auth().await;

    let verifier = oauth::generate_verifier();
    let challenge = oauth::compute_challenge(&verifier);
    let csrf_state = pool::new_id();

    state.pending_auth.lock().await.insert(
        csrf_state.clone(),
        PendingAuth {
            verifier,
            created_at: unix_now(),
        },
    );

    let url = oauth::build_authorization_url(&state.oauth_config, &csrf_state, &challenge);
    info!("oauth flow started");
    Redirect::temporary(&url)
}

#[derive(Debug, Deserialize)]
struct CallbackQuery {
    code: String,
    state: String,
}

/// `GET /auth/callback`: exchange the authorization code for tokens using
/// the verifier stashed at `/oauth/start`, decode the id_token claims, and
/// persist the result as a new OAuth account.
async fn callback(
    State(state): State<AppState>,
    Query(query): Query<CallbackQuery>,
) -> Result<impl IntoResponse> {
    state.sweep_expired_pending_auth().await;

    let pending = {
        let mut guard = state.pending_auth.lock().await;
        guard.remove(&query.state)
    };
    let Some(pending) = pending else {
        return Err(Error::InvalidRequest("unknown or expired oauth state".into()));
    };

    let token = oauth::exchange_code(&state.http, &state.oauth_config, &query.code, &pending.verifier)
        .await
        .map_err(|e| {
            warn!(error = %e, "oauth code exchange failed");
            Error::UpstreamFatal(e.to_string())
        })?;

    let claims = token
        .id_token
        .as_deref()
        .map(oauth::decode_claims)
        .transpose()
        .map_err(|e| Error::UpstreamFatal(e.to_string()))?
        .unwrap_or_default();

    let now = pool::now_millis();
    let id = pool::new_id();
    let account = Account::Oauth {
        common: CommonFields::new(id.clone(), now),
        access_token: token.access_token,
        refresh_token: token.refresh_token,
        id_token: token.id_token,
        account_id: claims.account_id,
        email: claims.email.clone(),
        expire: Some(now + token.expires_in * 1000),
        last_refresh: Some(now),
    };
    state.store.add(account).await?;

    info!(account_id = id, email = ?claims.email, "oauth flow completed, account stored");
    Ok(axum::Json(serde_json::json!({
        "account_id": id,
        "email": claims.email,
    })))
}
