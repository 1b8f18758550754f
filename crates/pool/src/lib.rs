//! Credential pool: the on-disk account store, the lifecycle/cooldown
//! classifiers, sticky-cursor selection, and OAuth token refresh
//! (spec.md §3, §4.1–§4.3).
//!
//! Account lifecycle:
//! 1. Admin adds an account (oauth or relay) via the gateway's management
//!    API → persisted by [`store::Store`], usable immediately.
//! 2. The dispatcher asks [`selector::Selector`] for an account to use;
//!    selection is sticky and only moves off a healthy account on failure.
//! 3. A request-path failure in the retriable status set applies the
//!    uniform request-time cooldown ([`lifecycle::request_time_cooldown`]).
//! 4. [`refresh::Refresher`] renews OAuth credentials proactively (the
//!    periodic sweep) or reactively, applying the smaller, code-specific
//!    refresh-time cooldown ([`lifecycle::refresh_time_cooldown`]) on
//!    failure.

pub mod account;
pub mod clock;
pub mod error;
pub mod lifecycle;
pub mod refresh;
pub mod selector;
pub mod store;

pub use account::{Account, CommonFields, Timestamp};
pub use clock::{new_id, now_millis};
pub use error::{Error, Result};
pub use lifecycle::{
    DEFAULT_NEAR_EXPIRY, REQUEST_TIME_COOLDOWN, RETRIABLE_STATUSES, is_cooling_down, is_expired,
    is_near_expiry, is_retriable_status, refresh_time_cooldown, request_time_cooldown, status_label,
    ui_state, usable,
};
pub use refresh::{Refresher, spawn_sweep};
pub use selector::Selector;
pub use store::Store;
