//! Account management endpoints (spec.md §4.7, SPEC_FULL.md §3.1): list,
//! remove, force-refresh, enable/disable, activate, and the two ways to add
//! a credential outside the browser PKCE flow (direct import, static relay).
//!
//! Grounded on the router-construction/`State` extraction/JSON-response
//! idiom the teacher used in its admin API (axum `Router` + `State<T>` +
//! `oneshot`-tested handlers), rewired onto `pool::Store`/`Selector`/
//! `Refresher` instead of the teacher's Anthropic-specific pool.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::Router;
use pool::{Account, CommonFields};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::error::{Error, Result};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/accounts", get(list_accounts))
        .route("/accounts/import", post(import_account))
        .route("/accounts/relay", post(add_relay_account))
        .route("/accounts/{id}", delete(remove_account))
        .route("/accounts/{id}/refresh", post(force_refresh))
        .route("/accounts/{id}/disable", post(disable_account))
        .route("/accounts/{id}/enable", post(enable_account))
        .route("/accounts/{id}/activate", post(activate_account))
}

/// What `GET /accounts` exposes: everything spec.md §3's common fields
/// carry except the bearer credential itself.
#[derive(Debug, Serialize)]
struct AccountSummary {
    id: String,
    kind: &'static str,
    label: Option<String>,
    disabled: bool,
    fail_count: u32,
    last_error_code: Option<u16>,
    cooldown_until: Option<u64>,
    last_used: Option<u64>,
    created_at: u64,
    notes: Option<String>,
    total_requests: u64,
    total_failures: u64,
    /// Human status: active | expiring-soon | expired | cooldown |
    /// disabled | unknown (spec.md §4.6, §6).
    status: &'static str,
    /// Collapsed three-way UI enum: active | waiting | frozen (spec.md §6).
    ui_state: &'static str,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        let common = account.common();
        let label = match account {
            Account::Oauth { email, .. } => email.clone(),
            Account::Relay { name, .. } => Some(name.clone()),
        };
        let status = pool::status_label(account, pool::now_millis());
        Self {
            id: common.id.clone(),
            kind: account.kind(),
            label,
            disabled: common.disabled,
            fail_count: common.fail_count,
            last_error_code: common.last_error_code,
            cooldown_until: common.cooldown_until,
            last_used: common.last_used,
            created_at: common.created_at,
            notes: common.notes.clone(),
            total_requests: common.total_requests,
            total_failures: common.total_failures,
            status,
            ui_state: pool::ui_state(status),
        }
    }
}

async fn list_accounts(State(state): State<AppState>) -> Json<Vec<AccountSummary>> {
    let accounts = state.store.read_accounts().await;
    Json(accounts.iter().map(AccountSummary::from).collect())
}

async fn remove_account(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    if state.store.get(&id).await.is_none() {
        return Err(Error::NotFound(id));
    }
    state.store.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn force_refresh(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<AccountSummary>> {
    let Some(account) = state.store.get(&id).await else {
        return Err(Error::NotFound(id));
    };
    if !account.refreshable() {
        return Err(Error::InvalidRequest(format!("account {id} has no refresh_token")));
    }
    match state.refresher.refresh(&id).await {
        Some(refreshed) => Ok(Json(AccountSummary::from(&refreshed))),
        None => Err(Error::RefreshFailed { account_id: id }),
    }
}

async fn disable_account(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    set_disabled(&state, &id, true).await
}

async fn enable_account(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    set_disabled(&state, &id, false).await
}

async fn set_disabled(state: &AppState, id: &str, disabled: bool) -> Result<StatusCode> {
    if state.store.get(id).await.is_none() {
        return Err(Error::NotFound(id.to_string()));
    }
    state
        .store
        .update(id, move |account| {
            let common = account.common_mut();
            common.disabled = disabled;
            if !disabled {
                common.cooldown_until = None;
                common.fail_count = 0;
            }
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Point the sticky cursor at `id` directly (spec.md §4.4's "Activate"
/// management operation).
async fn activate_account(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    let accounts = state.store.read_accounts().await;
    let Some(index) = accounts.iter().position(|a| a.id() == id) else {
        return Err(Error::NotFound(id));
    };
    state.selector.set(index).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ImportAccountRequest {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    expire: Option<u64>,
}

/// `POST /accounts/import`: register an already-issued OAuth credential
/// directly, bypassing the browser PKCE flow (spec.md §6; SPEC_FULL.md §3.1
/// — lets operators migrate a `auth.json` from elsewhere).
async fn import_account(
    State(state): State<AppState>,
    Json(body): Json<ImportAccountRequest>,
) -> Result<(StatusCode, Json<AccountSummary>)> {
    let id = pool::new_id();
    let account = Account::Oauth {
        common: CommonFields::new(id.clone(), pool::now_millis()),
        access_token: body.access_token,
        refresh_token: body.refresh_token,
        id_token: body.id_token,
        account_id: body.account_id,
        email: body.email,
        expire: body.expire,
        last_refresh: None,
    };
    state.store.add(account).await?;
    let stored = state.store.get(&id).await.expect("just inserted");
    Ok((StatusCode::CREATED, Json(AccountSummary::from(&stored))))
}

#[derive(Debug, Deserialize)]
struct RelayAccountRequest {
    name: String,
    base_url: String,
    api_key: String,
}

/// `POST /accounts/relay`: register a statically-configured relay account
/// (spec.md §3 — an account kind with no refresh token, never touched by
/// the refresher).
async fn add_relay_account(
    State(state): State<AppState>,
    Json(body): Json<RelayAccountRequest>,
) -> Result<(StatusCode, Json<AccountSummary>)> {
    let id = pool::new_id();
    let account = Account::Relay {
        common: CommonFields::new(id.clone(), pool::now_millis()),
        name: body.name,
        base_url: body.base_url,
        api_key: common::Secret::new(body.api_key),
    };
    state.store.add(account).await?;
    let stored = state.store.get(&id).await.expect("just inserted");
    Ok((StatusCode::CREATED, Json(AccountSummary::from(&stored))))
}
