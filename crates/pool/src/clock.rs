//! CLOCK & IDS (spec.md §2): monotonic-wall time and unique id generation,
//! consumed by the store, lifecycle, selector and refresher.

use crate::account::Timestamp;
use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as unix milliseconds. All stored timestamps
/// (`created_at`, `cooldown_until`, `expire`, ...) are compared against this.
pub fn now_millis() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as Timestamp
}

/// A fresh opaque unique id, used both for newly created accounts and for
/// the per-attempt `Session_id` header the dispatcher sends upstream.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
