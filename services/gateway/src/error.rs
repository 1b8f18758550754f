//! Gateway error kinds (spec.md §7, all seven kinds).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("No usable accounts (all disabled, cooling down or expired)")]
    NoUsableAccount,

    /// Surfaced only after the retry/switch loop exhausts itself (spec.md
    /// §7); the dispatcher forwards the last observed upstream response
    /// body/status directly rather than constructing this variant in that
    /// path. Reserved for call sites with no forwardable response in hand.
    #[error("upstream transient error: {status}")]
    UpstreamTransient { status: u16 },

    #[error("upstream error: {0}")]
    UpstreamFatal(String),

    #[error("refresh failed for account {account_id}")]
    RefreshFailed { account_id: String },

    #[error("invalid upstream response")]
    MalformedTranslation,

    #[error("store I/O error: {0}")]
    StoreIoError(#[from] pool::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error: {0}")]
    Config(#[from] common::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::NoUsableAccount => (
                StatusCode::SERVICE_UNAVAILABLE,
                serde_json::json!({ "error": self.to_string() }),
            ),
            Error::UpstreamTransient { status } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                serde_json::json!({ "error": self.to_string() }),
            ),
            Error::UpstreamFatal(_) => (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({ "error": self.to_string() }),
            ),
            Error::RefreshFailed { .. } => (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({ "error": self.to_string() }),
            ),
            Error::MalformedTranslation => (
                StatusCode::BAD_GATEWAY,
                serde_json::json!({ "error": "invalid_upstream_response" }),
            ),
            Error::StoreIoError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": self.to_string() }),
            ),
            Error::NotFound(_) => (
                StatusCode::NOT_FOUND,
                serde_json::json!({ "error": "not found" }),
            ),
            Error::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": self.to_string() }),
            ),
            Error::Config(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": self.to_string() }),
            ),
        };
        (status, axum::Json(body)).into_response()
    }
}
