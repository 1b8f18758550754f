//! Identity-provider endpoints and scopes the authorization-code + PKCE flow
//! talks to. These are not secrets — they identify the public client and the
//! provider it authenticates against — but they are also not baked in: the
//! gateway binary supplies them from configuration, since the provider
//! itself is an external collaborator (see the OAuth boundary note in the
//! top-level docs).

use serde::Deserialize;

/// Fixed vendor scope string required by the upstream provider.
pub const SCOPES: &str = "openid email profile offline_access";

/// Vendor-specific extra authorize-request parameters, sent verbatim.
pub const VENDOR_EXTRAS: &[(&str, &str)] = &[
    ("id_token_add_organizations", "true"),
    ("codex_cli_simplified_flow", "true"),
];

/// Client identity and endpoints for one OAuth provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub authorize_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
}
