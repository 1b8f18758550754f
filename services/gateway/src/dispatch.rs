//! DISPATCHER (spec.md §4.6): the retry/switch state machine shared by
//! every route family, parameterized over retry policy rather than
//! duplicated per family (spec.md §9 "duplicate dispatch paths").

use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderMap, HeaderValue, Method};
use bytes::Bytes;
use pool::{Refresher, Selector, Store, lifecycle};
use tracing::{info, warn};

use crate::error::{Error, Result};

const OPENAI_BETA: &str = "responses=experimental";
const CLIENT_VERSION: &str = "0.21.0";
const ORIGINATOR: &str = "codex_cli_rs";

/// Which cooldown policy applies when this dispatch family marks a
/// failure (spec.md §4.2, dual-policy note in §9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CooldownPolicy {
    RequestTime,
    RefreshTime,
}

/// Per-family retry knobs (SPEC_FULL.md §4.6 decision on same-account
/// retry scope).
#[derive(Debug, Clone, Copy)]
pub struct DispatchPolicy {
    pub retry_same_account: bool,
    pub max_attempts: usize,
    pub cooldown_policy: CooldownPolicy,
}

impl DispatchPolicy {
    /// `/v1/responses` native passthrough and the generic `/v1/*`
    /// fall-through: both forward the unmodified upstream body either way,
    /// so the same-account retry step costs nothing extra.
    pub fn passthrough() -> Self {
        Self {
            retry_same_account: true,
            max_attempts: usize::MAX,
            cooldown_policy: CooldownPolicy::RequestTime,
        }
    }

    /// Chat/Completions streaming: simplified variant (spec.md §4.6) —
    /// skips the same-account retry, caps attempts at `min(total, 3)`, uses
    /// the refresh-time cooldown policy when marking failures.
    pub fn chat_stream() -> Self {
        Self {
            retry_same_account: false,
            max_attempts: 3,
            cooldown_policy: CooldownPolicy::RefreshTime,
        }
    }
}

pub struct DispatchState {
    pub store: Arc<Store>,
    pub selector: Arc<Selector>,
    pub refresher: Arc<Refresher>,
    pub http: reqwest::Client,
    pub upstream_base_url: String,
}

/// One upstream request as the dispatcher sees it: already translated
/// (when applicable), destined for a fixed upstream path.
pub struct UpstreamRequest {
    pub method: Method,
    pub upstream_path: String,
    pub body: Bytes,
    pub stream: bool,
}

/// A fully-buffered upstream response (non-streaming routes, and the
/// establishment phase of streaming routes that get a non-2xx).
pub struct UpstreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Result of the dispatcher's retry/switch loop.
pub enum DispatchOutcome {
    /// A final response to hand back to the caller as-is.
    Final(UpstreamResponse),
    /// A 2xx establishment for a streaming route: caller owns teeing the
    /// live body from here on (spec.md §4.6 "once the first byte has left
    /// the proxy... mid-stream failures are not retried").
    Streaming {
        response: reqwest::Response,
        account_id: String,
    },
}

/// Run the retry/switch state machine for one request (spec.md §4.6).
pub async fn dispatch(
    state: &DispatchState,
    req: &UpstreamRequest,
    inbound_headers: &HeaderMap,
    policy: DispatchPolicy,
) -> Result<DispatchOutcome> {
    let Some(mut account) = state.selector.select().await else {
        return Err(Error::NoUsableAccount);
    };

    let mut accounts_tried = 0usize;
    let max_attempts = policy.max_attempts.max(1);
    let mut last_response: Option<UpstreamResponse> = None;

    while accounts_tried < max_attempts {
        let mut outcome = send_once(state, &account, req, inbound_headers).await?;

        if (200..300).contains(&outcome.0) {
            if req.stream {
                return Ok(DispatchOutcome::Streaming {
                    response: outcome.1,
                    account_id: account.id().to_string(),
                });
            }
            let body = buffer_body(outcome.1).await?;
            return Ok(DispatchOutcome::Final(UpstreamResponse {
                status: outcome.0,
                headers: HeaderMap::new(),
                body,
            }));
        }

        if !lifecycle::is_retriable_status(outcome.0) {
            let body = buffer_body(outcome.1).await?;
            return Ok(DispatchOutcome::Final(UpstreamResponse {
                status: outcome.0,
                headers: HeaderMap::new(),
                body,
            }));
        }

        if policy.retry_same_account && matches!(outcome.0, 408 | 500 | 502 | 503 | 504) {
            outcome = send_once(state, &account, req, inbound_headers).await?;
        }

        if !(200..300).contains(&outcome.0) {
            if matches!(outcome.0, 401 | 403 | 429 | 408 | 500 | 502 | 503 | 504) {
                if let Some(renewed) = state.refresher.refresh(account.id()).await {
                    account = renewed;
                    outcome = send_once(state, &account, req, inbound_headers).await?;
                }
            }
        }

        if (200..300).contains(&outcome.0) {
            if req.stream {
                return Ok(DispatchOutcome::Streaming {
                    response: outcome.1,
                    account_id: account.id().to_string(),
                });
            }
            let body = buffer_body(outcome.1).await?;
            return Ok(DispatchOutcome::Final(UpstreamResponse {
                status: outcome.0,
                headers: HeaderMap::new(),
                body,
            }));
        }

        mark_failure(state, account.id(), outcome.0, policy.cooldown_policy).await;
        let body = buffer_body(outcome.1).await?;
        last_response = Some(UpstreamResponse {
            status: outcome.0,
            headers: HeaderMap::new(),
            body,
        });

        accounts_tried += 1;
        match state.selector.advance().await {
            Some(next) => account = next,
            None => break,
        }
    }

    match last_response {
        Some(response) => Ok(DispatchOutcome::Final(response)),
        None => Err(Error::NoUsableAccount),
    }
}

async fn mark_failure(state: &DispatchState, account_id: &str, status: u16, policy: CooldownPolicy) {
    let now = pool::now_millis();
    let cooldown = match policy {
        CooldownPolicy::RequestTime => lifecycle::request_time_cooldown(status),
        CooldownPolicy::RefreshTime => {
            let fail_count = state
                .store
                .get(account_id)
                .await
                .map(|a| a.common().fail_count + 1)
                .unwrap_or(1);
            lifecycle::refresh_time_cooldown(status, fail_count)
        }
    };
    let cooldown_until = cooldown.map(|d| now + d.as_millis() as u64);

    let res = state
        .store
        .update(account_id, move |account| {
            let common = account.common_mut();
            common.fail_count += 1;
            common.last_error_code = Some(status);
            common.total_failures += 1;
            if let Some(until) = cooldown_until {
                common.cooldown_until = Some(until);
            }
        })
        .await;
    if let Err(e) = res {
        warn!(account_id, error = %e, "failed to persist request-time failure");
    } else {
        info!(account_id, status, ?cooldown, "marked request-time failure");
    }
}

/// Issue one upstream attempt, returning (status, live response) so the
/// caller decides whether to stream or buffer.
async fn send_once(
    state: &DispatchState,
    account: &pool::Account,
    req: &UpstreamRequest,
    inbound_headers: &HeaderMap,
) -> Result<(u16, reqwest::Response)> {
    let url = format!("{}{}", state.upstream_base_url, req.upstream_path);
    let session_id = pool::new_id();

    let mut builder = state
        .http
        .request(req.method.clone(), &url)
        .body(req.body.clone())
        .header("Authorization", format!("Bearer {}", account.bearer_token()))
        .header("Openai-Beta", OPENAI_BETA)
        .header("Content-Type", "application/json")
        .header("Version", CLIENT_VERSION)
        .header("Session_id", session_id)
        .header("Originator", ORIGINATOR)
        .header(
            "Accept",
            if req.stream { "text/event-stream" } else { "application/json" },
        );

    if let Some(account_id) = account.upstream_account_id() {
        builder = builder.header("Chatgpt-Account-Id", account_id);
    }

    for (name, value) in inbound_headers.iter() {
        if is_hop_by_hop(name.as_str()) || is_reserved(name.as_str()) {
            continue;
        }
        builder = builder.header(name, value);
    }

    let response = builder.send().await.map_err(|e| {
        let error_type = if e.is_timeout() { "timeout" } else { "connection" };
        crate::metrics::record_upstream_error(error_type);
        Error::UpstreamFatal(e.to_string())
    })?;
    let status = response.status().as_u16();
    Ok((status, response))
}

async fn buffer_body(response: reqwest::Response) -> Result<Bytes> {
    response
        .bytes()
        .await
        .map_err(|e| Error::UpstreamFatal(e.to_string()))
}

const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
];

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Headers the dispatcher sets itself and must not let the inbound
/// request override (spec.md §4.6 request envelope).
const RESERVED_HEADERS: &[&str] = &[
    "authorization",
    "openai-beta",
    "content-type",
    "version",
    "session_id",
    "chatgpt-account-id",
    "originator",
    "accept",
    "content-length",
];

fn is_reserved(name: &str) -> bool {
    RESERVED_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

/// Scan a JSON request body for a top-level `"stream":true`, used by the
/// generic `/v1/*` fall-through to decide streaming vs buffered forwarding
/// (spec.md §6).
pub fn body_requests_stream(body: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("stream").and_then(serde_json::Value::as_bool))
        .unwrap_or(false)
}

pub fn normalize_streaming_headers(headers: &mut HeaderMap) {
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));
    headers.insert("Content-Type", HeaderValue::from_static("text/event-stream"));
}

pub const fn request_timeout(secs: u64) -> Duration {
    Duration::from_secs(secs)
}
