//! Unverified decoding of the `id_token` claims the refresher needs.
//!
//! The upstream identity provider has already verified signing when it
//! issued the token over TLS; the proxy only needs to read two claims out
//! of the payload segment, not validate the signature itself.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct Claims {
    #[serde(default)]
    email: Option<String>,
    #[serde(default, alias = "https://api.openai.com/auth")]
    account_id: Option<String>,
}

/// Decoded subset of an id_token's claims relevant to account bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdTokenClaims {
    pub email: Option<String>,
    pub account_id: Option<String>,
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_claims(id_token: &str) -> Result<IdTokenClaims> {
    let mut segments = id_token.split('.');
    let _header = segments.next();
    let payload = segments
        .next()
        .ok_or_else(|| Error::IdToken("missing payload segment".into()))?;

    let decoded = URL_SAFE_NO_PAD
        .decode(payload.as_bytes())
        .map_err(|e| Error::IdToken(format!("invalid base64 payload: {e}")))?;

    let claims: Claims = serde_json::from_slice(&decoded)
        .map_err(|e| Error::IdToken(format!("invalid claims JSON: {e}")))?;

    Ok(IdTokenClaims {
        email: claims.email,
        account_id: claims.account_id,
    })
}
