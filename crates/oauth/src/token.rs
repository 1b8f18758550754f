//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (initial OAuth flow completion).
//! 2. Token refresh (proactive sweep and request-time refresh).
//!
//! Both POST `application/x-www-form-urlencoded` to the provider's token
//! endpoint with different grant types.

use serde::{Deserialize, Serialize};

use crate::client::ClientConfig;
use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time; the caller
/// converts this to an absolute timestamp when storing the credential.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    pub expires_in: u64,
}

/// Exchange an authorization code for tokens (initial OAuth flow).
///
/// Second step of the PKCE flow: the user authorized in their browser and
/// we received the authorization code. The verifier proves this process
/// initiated the flow that produced `code`.
pub async fn exchange_code(
    client: &reqwest::Client,
    cfg: &ClientConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&cfg.token_endpoint)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("code_verifier", verifier),
            ("client_id", cfg.client_id.as_str()),
            ("redirect_uri", cfg.redirect_uri.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::TokenExchange {
            status: status.as_u16(),
            message: body,
        });
    }

    response.json::<TokenResponse>().await.map_err(|e| Error::TokenExchange {
        status: status.as_u16(),
        message: format!("invalid token response: {e}"),
    })
}

/// Refresh an access token using a refresh token.
///
/// Called proactively by the sweep (before expiration) and reactively at
/// request time (on a 401/403 from the upstream API).
pub async fn refresh_token(
    client: &reqwest::Client,
    cfg: &ClientConfig,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(&cfg.token_endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", cfg.client_id.as_str()),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials {
                status: status.as_u16(),
                message: body,
            });
        }

        return Err(Error::TokenExchange {
            status: status.as_u16(),
            message: body,
        });
    }

    response.json::<TokenResponse>().await.map_err(|e| Error::TokenExchange {
        status: status.as_u16(),
        message: format!("invalid refresh response: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_response_deserializes_minimal() {
        let json = r#"{"access_token":"at_abc","expires_in":3600}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "at_abc");
        assert_eq!(token.refresh_token, None);
        assert_eq!(token.id_token, None);
        assert_eq!(token.expires_in, 3600);
    }

    #[test]
    fn token_response_deserializes_full() {
        let json = r#"{"access_token":"at_abc","refresh_token":"rt_def","id_token":"eyJ","expires_in":3600}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("rt_def"));
        assert_eq!(token.id_token.as_deref(), Some("eyJ"));
    }

    #[test]
    fn token_response_serializes() {
        let token = TokenResponse {
            access_token: "at_test".into(),
            refresh_token: Some("rt_test".into()),
            id_token: None,
            expires_in: 3600,
        };
        let json = serde_json::to_string(&token).unwrap();
        assert!(json.contains("\"access_token\":\"at_test\""));
        assert!(json.contains("\"refresh_token\":\"rt_test\""));
        assert!(json.contains("\"expires_in\":3600"));
    }

    #[tokio::test]
    async fn exchange_code_rejects_invalid_code() {
        let client = reqwest::Client::new();
        let cfg = ClientConfig {
            client_id: "client".into(),
            authorize_endpoint: "https://idp.invalid/authorize".into(),
            token_endpoint: "https://idp.invalid/token".into(),
            redirect_uri: "https://idp.invalid/callback".into(),
        };
        let result = exchange_code(&client, &cfg, "invalid-code", "invalid-verifier").await;
        assert!(result.is_err(), "unreachable token endpoint must error");
    }
}
