//! Error types for OAuth authentication operations

/// Errors from OAuth authentication operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Token endpoint returned a non-success status that isn't a credential
    /// rejection (e.g. a transient 5xx, or an exchange-time 400).
    #[error("token exchange failed ({status}): {message}")]
    TokenExchange { status: u16, message: String },

    /// Token endpoint rejected the refresh token itself (401/403): the
    /// account's stored refresh_token is no longer valid.
    #[error("invalid credentials ({status}): {message}")]
    InvalidCredentials { status: u16, message: String },

    #[error("malformed id_token: {0}")]
    IdToken(String),
}

impl Error {
    /// Upstream HTTP status, when this error originated from a token-endpoint
    /// response. `None` for transport-level failures (no response at all).
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::TokenExchange { status, .. } => Some(*status),
            Error::InvalidCredentials { status, .. } => Some(*status),
            Error::Http(_) | Error::IdToken(_) => None,
        }
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
