//! LIFECYCLE (spec.md §4.2): pure classifiers over `(Account, now)`, plus
//! the two distinct cooldown policies. No I/O — directly unit-testable.

use std::time::Duration;

use crate::account::{Account, CommonFields, Timestamp};

/// Default `is_near_expiry` threshold (spec.md §4.2).
pub const DEFAULT_NEAR_EXPIRY: Duration = Duration::from_secs(10 * 60);

/// Request-time blanket cooldown (spec.md §4.2, §4.6): applied whenever a
/// request-path failure matches the retriable status set.
pub const REQUEST_TIME_COOLDOWN: Duration = Duration::from_secs(3 * 60 * 60);

pub fn is_cooling_down(common: &CommonFields, now: Timestamp) -> bool {
    common.cooldown_until.is_some_and(|until| until > now)
}

pub fn is_expired(expire: Option<Timestamp>, now: Timestamp) -> bool {
    expire.is_some_and(|e| e <= now)
}

/// Absent expiry counts as near-expiry (spec.md §4.2): an account whose
/// upstream-declared expiry isn't known yet is treated conservatively.
pub fn is_near_expiry(expire: Option<Timestamp>, now: Timestamp, delta: Duration) -> bool {
    match expire {
        None => true,
        Some(e) => e.saturating_sub(now) <= delta.as_millis() as u64,
    }
}

pub fn usable(account: &Account, now: Timestamp) -> bool {
    let common = account.common();
    !common.disabled && !is_cooling_down(common, now) && !is_expired(account.expire(), now)
}

/// The retriable set shared by the dispatcher's retry/switch driver and the
/// request-time cooldown policy (spec.md §4.2, §4.6).
pub const RETRIABLE_STATUSES: &[u16] = &[401, 403, 408, 429, 500, 502, 503, 504];

pub fn is_retriable_status(status: u16) -> bool {
    RETRIABLE_STATUSES.contains(&status)
}

/// Request-path cooldown policy: a uniform 3-hour cooldown for any failure
/// in the retriable set, no change otherwise (spec.md §4.2).
pub fn request_time_cooldown(status: u16) -> Option<Duration> {
    is_retriable_status(status).then_some(REQUEST_TIME_COOLDOWN)
}

/// Refresh-path cooldown policy: smaller, code-specific cooldowns, used
/// only when the failure happened inside the refresher itself (spec.md
/// §4.2). Distinct from, and not to be confused with, the request-time
/// policy above.
pub fn refresh_time_cooldown(status: u16, fail_count: u32) -> Option<Duration> {
    match status {
        429 => Some(Duration::from_secs(30 * 60)),
        401 | 403 => Some(Duration::from_secs(10 * 60)),
        408 | 500 | 502 | 503 | 504 => {
            let exp = 2u64.saturating_pow(fail_count.min(5));
            let secs = (exp * 60).min(30 * 60);
            Some(Duration::from_secs(secs))
        }
        _ => None,
    }
}

/// Human status label for the `GET /accounts` listing (spec.md §4.6, §6):
/// one of `active | expiring-soon | expired | cooldown | disabled |
/// unknown`. Disabled and cooldown take priority over the OAuth-specific
/// expiry checks since they apply to both account kinds.
pub fn status_label(account: &Account, now: Timestamp) -> &'static str {
    let common = account.common();
    if common.disabled {
        return "disabled";
    }
    if is_cooling_down(common, now) {
        return "cooldown";
    }
    match account {
        Account::Oauth { .. } => {
            if is_expired(account.expire(), now) {
                "expired"
            } else if is_near_expiry(account.expire(), now, DEFAULT_NEAR_EXPIRY) {
                "expiring-soon"
            } else {
                "active"
            }
        }
        Account::Relay { .. } => "active",
    }
}

/// Collapse the six-way human status into the three-way UI enum (spec.md
/// §6): `active | waiting | frozen`.
pub fn ui_state(status: &str) -> &'static str {
    match status {
        "active" => "active",
        "expiring-soon" => "waiting",
        "disabled" | "cooldown" | "expired" => "frozen",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::CommonFields;

    fn common() -> CommonFields {
        CommonFields::new("a".into(), 0)
    }

    #[test]
    fn not_cooling_down_without_cooldown_until() {
        assert!(!is_cooling_down(&common(), 1000));
    }

    #[test]
    fn cooling_down_while_cooldown_until_in_future() {
        let mut c = common();
        c.cooldown_until = Some(2000);
        assert!(is_cooling_down(&c, 1000));
    }

    #[test]
    fn cooldown_expires_once_now_reaches_it() {
        let mut c = common();
        c.cooldown_until = Some(1000);
        assert!(!is_cooling_down(&c, 1000));
        assert!(!is_cooling_down(&c, 1001));
    }

    #[test]
    fn expired_when_expire_in_past_or_now() {
        assert!(is_expired(Some(1000), 1000));
        assert!(is_expired(Some(1000), 1001));
        assert!(!is_expired(Some(1000), 999));
    }

    #[test]
    fn absent_expire_is_not_expired() {
        assert!(!is_expired(None, 1000));
    }

    #[test]
    fn absent_expire_counts_as_near_expiry() {
        assert!(is_near_expiry(None, 1000, DEFAULT_NEAR_EXPIRY));
    }

    #[test]
    fn within_delta_is_near_expiry() {
        let now = 1_000_000;
        let expire = now + Duration::from_secs(5 * 60).as_millis() as u64;
        assert!(is_near_expiry(Some(expire), now, DEFAULT_NEAR_EXPIRY));
    }

    #[test]
    fn beyond_delta_is_not_near_expiry() {
        let now = 1_000_000;
        let expire = now + Duration::from_secs(20 * 60).as_millis() as u64;
        assert!(!is_near_expiry(Some(expire), now, DEFAULT_NEAR_EXPIRY));
    }

    fn oauth_with(common: CommonFields, expire: Option<Timestamp>) -> Account {
        Account::Oauth {
            common,
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            id_token: None,
            account_id: None,
            email: None,
            expire,
            last_refresh: None,
        }
    }

    #[test]
    fn usable_requires_enabled_not_cooling_not_expired() {
        let account = oauth_with(common(), None);
        assert!(usable(&account, 1000));

        let mut disabled_common = common();
        disabled_common.disabled = true;
        let disabled = oauth_with(disabled_common, None);
        assert!(!usable(&disabled, 1000));

        let mut cooling_common = common();
        cooling_common.cooldown_until = Some(5000);
        let cooling = oauth_with(cooling_common, None);
        assert!(!usable(&cooling, 1000));

        let expired = oauth_with(common(), Some(500));
        assert!(!usable(&expired, 1000));
    }

    #[test]
    fn request_time_cooldown_covers_retriable_set() {
        for &status in RETRIABLE_STATUSES {
            assert_eq!(request_time_cooldown(status), Some(REQUEST_TIME_COOLDOWN));
        }
        assert_eq!(request_time_cooldown(400), None);
        assert_eq!(request_time_cooldown(200), None);
    }

    #[test]
    fn refresh_time_cooldown_429_is_30_min() {
        assert_eq!(refresh_time_cooldown(429, 0), Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn refresh_time_cooldown_401_403_is_10_min() {
        assert_eq!(refresh_time_cooldown(401, 0), Some(Duration::from_secs(10 * 60)));
        assert_eq!(refresh_time_cooldown(403, 9), Some(Duration::from_secs(10 * 60)));
    }

    #[test]
    fn refresh_time_cooldown_5xx_is_exponential_capped_at_30_min() {
        assert_eq!(refresh_time_cooldown(500, 0), Some(Duration::from_secs(60)));
        assert_eq!(refresh_time_cooldown(500, 1), Some(Duration::from_secs(120)));
        assert_eq!(refresh_time_cooldown(500, 2), Some(Duration::from_secs(240)));
        // capped: 2^5 * 60 = 1920s > 1800s cap
        assert_eq!(refresh_time_cooldown(503, 5), Some(Duration::from_secs(30 * 60)));
        assert_eq!(refresh_time_cooldown(408, 10), Some(Duration::from_secs(30 * 60)));
    }

    #[test]
    fn refresh_time_cooldown_other_status_is_none() {
        assert_eq!(refresh_time_cooldown(400, 0), None);
        assert_eq!(refresh_time_cooldown(200, 0), None);
    }

    #[test]
    fn status_label_disabled_takes_priority() {
        let mut c = common();
        c.disabled = true;
        c.cooldown_until = Some(5000);
        let account = oauth_with(c, Some(500));
        assert_eq!(status_label(&account, 1000), "disabled");
    }

    #[test]
    fn status_label_cooldown_before_expiry_checks() {
        let mut c = common();
        c.cooldown_until = Some(5000);
        let account = oauth_with(c, Some(100));
        assert_eq!(status_label(&account, 1000), "cooldown");
    }

    #[test]
    fn status_label_oauth_expired_vs_expiring_soon_vs_active() {
        let now = 1_000_000;
        let expired = oauth_with(common(), Some(now - 1));
        assert_eq!(status_label(&expired, now), "expired");

        let soon = oauth_with(common(), Some(now + Duration::from_secs(5 * 60).as_millis() as u64));
        assert_eq!(status_label(&soon, now), "expiring-soon");

        let healthy = oauth_with(common(), Some(now + Duration::from_secs(60 * 60).as_millis() as u64));
        assert_eq!(status_label(&healthy, now), "active");
    }

    #[test]
    fn status_label_relay_is_active_unless_disabled_or_cooling() {
        let relay = Account::Relay {
            common: common(),
            name: "r".into(),
            base_url: "https://relay.test".into(),
            api_key: common::Secret::new("key".into()),
        };
        assert_eq!(status_label(&relay, 1000), "active");
    }

    #[test]
    fn ui_state_collapses_six_way_status() {
        assert_eq!(ui_state("active"), "active");
        assert_eq!(ui_state("expiring-soon"), "waiting");
        assert_eq!(ui_state("disabled"), "frozen");
        assert_eq!(ui_state("cooldown"), "frozen");
        assert_eq!(ui_state("expired"), "frozen");
        assert_eq!(ui_state("anything-else"), "unknown");
    }
}
