//! HTTP route handlers for the three OpenAI-shaped dialects plus the
//! generic `/v1/*` fall-through (spec.md §4.5, §6).
//!
//! Each handler's job is narrow: parse just enough of the body to build the
//! translated upstream request, hand the rest to [`dispatch::dispatch`], and
//! either forward or re-translate whatever comes back. All translation
//! itself lives in the `translate` crate; nothing here inspects dialect
//! internals beyond what picking a path and a tool map requires.

use std::time::Instant;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{HeaderMap, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use futures_util::{Stream, StreamExt};
use serde_json::Value;
use tracing::warn;
use translate::{ToolNameMap, chat_chunk_to_completions_chunk, chat_to_completions, chat_to_responses, completions_to_chat, responses_to_chat};

use crate::app_state::AppState;
use crate::dispatch::{DispatchOutcome, DispatchPolicy, UpstreamRequest, body_requests_stream, dispatch};
use crate::error::{Error, Result};
use crate::metrics;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/models", get(list_models))
        .route("/v1/responses", post(responses_passthrough))
        .route("/v1/chat/completions", post(chat_completions))
        .route("/v1/completions", post(completions))
        .route("/health", get(health))
        .route("/metrics", get(metrics_endpoint))
        .fallback(generic_passthrough)
}

const MODELS: &[&str] = &["gpt-5", "gpt-5-minimal", "gpt-5-low", "gpt-5-medium", "gpt-5-high"];

async fn list_models() -> impl IntoResponse {
    let data: Vec<Value> = MODELS
        .iter()
        .map(|id| serde_json::json!({ "id": id, "object": "model", "owned_by": "openai" }))
        .collect();
    axum::Json(serde_json::json!({ "object": "list", "data": data }))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let accounts = state.store.read_accounts().await;
    let usable = accounts.iter().filter(|a| pool::usable(a, pool::now_millis())).count();
    axum::Json(serde_json::json!({
        "status": "healthy",
        "uptime_seconds": uptime,
        "accounts_total": accounts.len(),
        "accounts_usable": usable,
    }))
}

async fn metrics_endpoint(State(state): State<AppState>) -> impl IntoResponse {
    let _ = &state;
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics::render(),
    )
}

/// `POST /v1/responses`: native dialect, no translation — forwarded exactly
/// as received (spec.md §6).
async fn responses_passthrough(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let stream = body_requests_stream(&body);
    run_passthrough(&state, Method::POST, "/responses".to_string(), body, &headers, stream, "responses").await
}

/// `POST /v1/chat/completions`: translate to Responses, dispatch, translate
/// the result back (spec.md §4.5.2-4.5.4).
async fn chat_completions(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    run_translated(&state, &headers, &body, false, "chat").await
}

/// `POST /v1/completions`: wrap into a Chat request, run the same
/// translated path, then rewrap the result back into Completions shape
/// (spec.md §4.5.5).
async fn completions(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Ok(parsed) = serde_json::from_slice::<Value>(&body) else {
        return Error::InvalidRequest("malformed JSON body".into()).into_response();
    };
    let chat_body = completions_to_chat(&parsed);
    let Ok(chat_bytes) = serde_json::to_vec(&chat_body) else {
        return Error::InvalidRequest("failed to encode wrapped request".into()).into_response();
    };
    run_translated(&state, &headers, &chat_bytes, true, "completions").await
}

/// Shared Chat/Completions path: both dialects reshape into a Responses
/// request, dispatch it, and reshape the result back.
async fn run_translated(state: &AppState, headers: &HeaderMap, body: &[u8], as_completions: bool, dialect: &str) -> Response {
    let Ok(chat) = serde_json::from_slice::<Value>(body) else {
        return Error::InvalidRequest("malformed JSON body".into()).into_response();
    };

    let tool_names: Vec<&str> = chat
        .get("tools")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|t| t.get("function")?.get("name")?.as_str())
        .collect();
    let tool_map = ToolNameMap::build(tool_names);

    let responses_body = chat_to_responses(&chat, &tool_map);
    let stream = responses_body.get("stream").and_then(Value::as_bool).unwrap_or(false);

    let Ok(upstream_body) = serde_json::to_vec(&responses_body) else {
        return Error::InvalidRequest("failed to encode translated request".into()).into_response();
    };

    let policy = if stream { DispatchPolicy::chat_stream() } else { DispatchPolicy::passthrough() };
    let req = UpstreamRequest {
        method: Method::POST,
        upstream_path: "/responses".to_string(),
        body: Bytes::from(upstream_body),
        stream,
    };

    let started = Instant::now();
    let outcome = dispatch(&state.dispatch, &req, headers, policy).await;
    let status = record_outcome_status(&outcome);
    metrics::record_request(status, dialect, started.elapsed().as_secs_f64());

    match outcome {
        Err(e) => e.into_response(),
        Ok(DispatchOutcome::Final(resp)) => {
            if !(200..300).contains(&resp.status) {
                return (StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY), resp.body).into_response();
            }
            let text = String::from_utf8_lossy(&resp.body).into_owned();
            match responses_to_chat(&text, &tool_map) {
                Ok(chat_response) => {
                    let out = if as_completions { chat_to_completions(&chat_response) } else { chat_response };
                    axum::Json(out).into_response()
                }
                Err(e) => {
                    warn!(error = %e, "failed to translate upstream response");
                    Error::MalformedTranslation.into_response()
                }
            }
        }
        Ok(DispatchOutcome::Streaming { response, .. }) => {
            let body = stream_responses_as_chat(response, tool_map, as_completions);
            sse_response(body)
        }
    }
}

/// Shared passthrough path for native `/v1/responses` and the generic
/// `/v1/*` fall-through: same bytes in, same bytes out.
async fn run_passthrough(
    state: &AppState,
    method: Method,
    upstream_path: String,
    body: Bytes,
    headers: &HeaderMap,
    stream: bool,
    dialect: &str,
) -> Response {
    let req = UpstreamRequest { method, upstream_path, body, stream };
    let started = Instant::now();
    let outcome = dispatch(&state.dispatch, &req, headers, DispatchPolicy::passthrough()).await;
    let status = record_outcome_status(&outcome);
    metrics::record_request(status, dialect, started.elapsed().as_secs_f64());

    match outcome {
        Err(e) => e.into_response(),
        Ok(DispatchOutcome::Final(resp)) => {
            let status = StatusCode::from_u16(resp.status).unwrap_or(StatusCode::BAD_GATEWAY);
            (status, [(header::CONTENT_TYPE, "application/json")], resp.body).into_response()
        }
        Ok(DispatchOutcome::Streaming { response, .. }) => {
            let stream = response.bytes_stream().map(|r| r.map_err(std::io::Error::other));
            sse_response(Body::from_stream(stream))
        }
    }
}

fn record_outcome_status(outcome: &Result<DispatchOutcome>) -> u16 {
    match outcome {
        Err(Error::NoUsableAccount) => 503,
        Err(_) => 502,
        Ok(DispatchOutcome::Final(resp)) => resp.status,
        Ok(DispatchOutcome::Streaming { .. }) => 200,
    }
}

fn sse_response(body: Body) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(body)
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

/// The `/v1/*` fall-through: anything not handled by a dedicated route
/// above is forwarded verbatim to the same path upstream (spec.md §6).
async fn generic_passthrough(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    if !parts.uri.path().starts_with("/v1/") {
        return StatusCode::NOT_FOUND.into_response();
    }
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(b) => b,
        Err(_) => return Error::InvalidRequest("failed to read request body".into()).into_response(),
    };
    let stream = body_requests_stream(&body);
    run_passthrough(&state, parts.method, parts.uri.path().to_string(), body, &parts.headers, stream, "generic").await
}

/// Translate a live Responses SSE stream into a Chat (or, if
/// `as_completions`, Completions) SSE stream on the fly, one upstream
/// event at a time (spec.md §4.5.4, §9 — per-stream state only, no
/// buffering of the whole body).
fn stream_responses_as_chat(upstream: reqwest::Response, tool_map: ToolNameMap, as_completions: bool) -> Body {
    let raw = upstream.bytes_stream();
    let state = TranslateState {
        raw: Box::pin(raw),
        buf: translate::LineBuffer::default(),
        stream_state: translate::StreamState::new(),
        tool_map,
        as_completions,
        done: false,
    };

    let stream = futures_util::stream::unfold(state, translate_next);
    Body::from_stream(stream)
}

struct TranslateState {
    raw: std::pin::Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buf: translate::LineBuffer,
    stream_state: translate::StreamState,
    tool_map: ToolNameMap,
    as_completions: bool,
    done: bool,
}

async fn translate_next(mut state: TranslateState) -> Option<(std::io::Result<Bytes>, TranslateState)> {
    if state.done {
        return None;
    }
    loop {
        let events = match state.buf.drain_events() {
            Ok(events) => events,
            Err(e) => {
                warn!(error = %e, "malformed upstream SSE payload mid-translation");
                return None;
            }
        };
        if !events.is_empty() {
            let (out, saw_completed) = render_chat_events(&events, &mut state.stream_state, &state.tool_map, state.as_completions);
            if saw_completed {
                state.done = true;
            }
            if !out.is_empty() {
                return Some((Ok(Bytes::from(out)), state));
            }
            if state.done {
                return None;
            }
            continue;
        }

        match state.raw.next().await {
            Some(Ok(chunk)) => state.buf.push_bytes(&chunk),
            Some(Err(e)) => {
                warn!(error = %e, "upstream stream error mid-translation");
                return None;
            }
            None => {
                let events = match state.buf.finish() {
                    Ok(events) => events,
                    Err(e) => {
                        warn!(error = %e, "malformed upstream SSE payload at stream end");
                        return None;
                    }
                };
                state.done = true;
                if events.is_empty() {
                    return None;
                }
                let (out, _) = render_chat_events(&events, &mut state.stream_state, &state.tool_map, state.as_completions);
                if out.is_empty() {
                    return None;
                }
                return Some((Ok(Bytes::from(out)), state));
            }
        }
    }
}

fn render_chat_events(events: &[Value], stream_state: &mut translate::StreamState, tool_map: &ToolNameMap, as_completions: bool) -> (String, bool) {
    let mut out = String::new();
    let mut saw_completed = false;
    for event in events {
        if event.get("type").and_then(Value::as_str) == Some("response.completed") {
            saw_completed = true;
        }
        if let Some(chunk) = stream_state.translate_event(event, tool_map) {
            let chunk = if as_completions { chat_chunk_to_completions_chunk(&chunk) } else { chunk };
            out.push_str("data: ");
            out.push_str(&chunk.to_string());
            out.push_str("\n\n");
        }
    }
    if saw_completed {
        out.push_str("data: [DONE]\n\n");
    }
    (out, saw_completed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_chat_events_appends_done_sentinel_on_completion() {
        let mut state = translate::StreamState::new();
        let map = ToolNameMap::default();
        let events = vec![serde_json::json!({ "type": "response.completed", "response": { "id": "r1" } })];
        let (out, saw_completed) = render_chat_events(&events, &mut state, &map, false);
        assert!(saw_completed);
        assert!(out.ends_with("data: [DONE]\n\n"));
    }

    #[test]
    fn render_chat_events_rewraps_for_completions() {
        let mut state = translate::StreamState::new();
        let map = ToolNameMap::default();
        let events = vec![serde_json::json!({ "type": "response.output_text.delta", "delta": "hi" })];
        let (out, saw_completed) = render_chat_events(&events, &mut state, &map, true);
        assert!(!saw_completed);
        assert!(out.contains("\"text\":\"hi\""));
        assert!(out.contains("text_completion"));
    }
}
