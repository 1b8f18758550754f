//! OAuth authorization-code + PKCE client library.
//!
//! Provides PKCE generation, authorization-URL construction, and token
//! exchange/refresh against a configured identity provider. This crate owns
//! none of the account bookkeeping (that belongs to `pool`) — it is a thin,
//! independently testable wrapper around the two token-endpoint calls and
//! the id_token claims the refresher needs.
//!
//! Flow:
//! 1. `pkce::generate_verifier()` + `pkce::compute_challenge()`
//! 2. `pkce::build_authorization_url()` to send the caller's browser to the provider
//! 3. `token::exchange_code()` with the authorization code returned at the callback
//! 4. `token::refresh_token()` proactively (sweep) or reactively (401/403)
//! 5. `id_token::decode_claims()` to recover `email`/`account_id` after either step

pub mod client;
pub mod error;
pub mod id_token;
pub mod pkce;
pub mod token;

pub use client::ClientConfig;
pub use error::{Error, Result};
pub use id_token::{IdTokenClaims, decode_claims};
pub use pkce::{build_authorization_url, compute_challenge, generate_verifier};
pub use token::{TokenResponse, exchange_code, refresh_token};
