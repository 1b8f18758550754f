//! Account records (spec.md §3): the unit the store persists, the selector
//! picks among, and the refresher renews.
//!
//! Encoded as a JSON object with a `kind` discriminant and the rest of the
//! fields flattened alongside it, so the on-disk shape is exactly the flat
//! object spec.md §3 describes rather than a nested `{"oauth": {...}}` tag.

use common::Secret;
use serde::{Deserialize, Serialize};

/// Unix milliseconds. Kept as a plain alias (not a newtype) because the
/// store round-trips it opaquely and every consumer compares it against
/// `now_millis()` from [`crate::clock`].
pub type Timestamp = u64;

/// Fields common to both account kinds (spec.md §3 "Common fields").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommonFields {
    pub id: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub last_used: Option<Timestamp>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub fail_count: u32,
    #[serde(default)]
    pub last_error_code: Option<u16>,
    #[serde(default)]
    pub cooldown_until: Option<Timestamp>,
    /// Operator-set annotation surfaced only in `GET /accounts` listings
    /// (SPEC_FULL.md §3.1). Never sent upstream.
    #[serde(default)]
    pub notes: Option<String>,
    /// Lifetime counters distinct from `fail_count` (SPEC_FULL.md §3.1):
    /// these never reset and exist purely for status listings.
    #[serde(default)]
    pub total_requests: u64,
    #[serde(default)]
    pub total_failures: u64,
}

impl CommonFields {
    pub fn new(id: String, created_at: Timestamp) -> Self {
        Self {
            id,
            created_at,
            last_used: None,
            disabled: false,
            fail_count: 0,
            last_error_code: None,
            cooldown_until: None,
            notes: None,
            total_requests: 0,
            total_failures: 0,
        }
    }
}

/// A stored credential record: either an OAuth-issued account or a
/// statically-configured relay (spec.md §3).
///
/// `Debug` is implemented by hand below rather than derived: the bearer
/// credential fields must never appear in a `{:?}`-formatted log line. The
/// OAuth token fields stay plain `String` with redaction only in this impl
/// (they also pass through the translator untouched); the relay's static
/// `api_key` is the one field actually wrapped in [`common::Secret`], since
/// it is a long-lived credential handed to every `.expose()` call site
/// deliberately, not incidentally read through `Debug`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Account {
    Oauth {
        #[serde(flatten)]
        common: CommonFields,
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
        expire: Option<Timestamp>,
        #[serde(default)]
        last_refresh: Option<Timestamp>,
    },
    Relay {
        #[serde(flatten)]
        common: CommonFields,
        name: String,
        base_url: String,
        api_key: Secret<String>,
    },
}

const REDACTED: &str = "[REDACTED]";

impl std::fmt::Debug for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Account::Oauth { common, refresh_token, id_token, account_id, email, expire, last_refresh, .. } => f
                .debug_struct("Oauth")
                .field("common", common)
                .field("access_token", &REDACTED)
                .field("refresh_token", &refresh_token.as_ref().map(|_| REDACTED))
                .field("id_token", &id_token.as_ref().map(|_| REDACTED))
                .field("account_id", account_id)
                .field("email", email)
                .field("expire", expire)
                .field("last_refresh", last_refresh)
                .finish(),
            Account::Relay { common, name, base_url, api_key } => f
                .debug_struct("Relay")
                .field("common", common)
                .field("name", name)
                .field("base_url", base_url)
                .field("api_key", api_key)
                .finish(),
        }
    }
}

impl Account {
    pub fn id(&self) -> &str {
        &self.common().id
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Account::Oauth { .. } => "oauth",
            Account::Relay { .. } => "relay",
        }
    }

    pub fn common(&self) -> &CommonFields {
        match self {
            Account::Oauth { common, .. } => common,
            Account::Relay { common, .. } => common,
        }
    }

    pub fn common_mut(&mut self) -> &mut CommonFields {
        match self {
            Account::Oauth { common, .. } => common,
            Account::Relay { common, .. } => common,
        }
    }

    /// The bearer credential the dispatcher sends upstream: the OAuth
    /// access token, or the relay's static API key.
    pub fn bearer_token(&self) -> &str {
        match self {
            Account::Oauth { access_token, .. } => access_token,
            Account::Relay { api_key, .. } => api_key.expose(),
        }
    }

    /// `Some(account_id)` when the upstream identity provider attached one
    /// to the id_token (sent as `Chatgpt-Account-Id`, spec.md §4.6).
    pub fn upstream_account_id(&self) -> Option<&str> {
        match self {
            Account::Oauth { account_id, .. } => account_id.as_deref(),
            Account::Relay { .. } => None,
        }
    }

    pub fn expire(&self) -> Option<Timestamp> {
        match self {
            Account::Oauth { expire, .. } => *expire,
            Account::Relay { .. } => None,
        }
    }

    /// A relay account never holds a refresh_token (spec.md §3 invariant):
    /// it can never participate in refresh.
    pub fn refreshable(&self) -> bool {
        matches!(self, Account::Oauth { refresh_token: Some(_), .. })
    }

    pub fn refresh_token(&self) -> Option<&str> {
        match self {
            Account::Oauth { refresh_token, .. } => refresh_token.as_deref(),
            Account::Relay { .. } => None,
        }
    }
}
