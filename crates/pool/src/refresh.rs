//! REFRESHER (spec.md §4.3): single-flight-per-account token refresh, plus
//! the periodic near-expiry sweep.
//!
//! Grounded on the teacher's proactive-refresh task (`refresh.rs`
//! `spawn_refresh_task`/`refresh_cycle`) generalized from a fixed interval
//! to jittered timing and from account-disabling-on-failure to the
//! refresh-time cooldown policy (spec.md §4.2).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use oauth::ClientConfig;
use rand::Rng;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::clock::now_millis;
use crate::lifecycle::{DEFAULT_NEAR_EXPIRY, is_near_expiry, refresh_time_cooldown};
use crate::store::Store;

const SWEEP_BASE_INTERVAL: Duration = Duration::from_secs(15 * 60);
const SWEEP_JITTER: Duration = Duration::from_secs(3 * 60);
const SWEEP_MIN_INTERVAL: Duration = Duration::from_secs(60);

/// One internal refresh attempt is retried with a small bounded backoff
/// before the whole `refresh()` call is classified as failed (SPEC_FULL.md
/// §4.3 decision; grounded on the corpus's bounded-retry pattern around
/// token-endpoint calls).
const REFRESH_ATTEMPTS: u32 = 3;

pub struct Refresher {
    store: Arc<Store>,
    client_config: ClientConfig,
    http: reqwest::Client,
    in_flight: Mutex<HashSet<String>>,
}

impl Refresher {
    pub fn new(store: Arc<Store>, client_config: ClientConfig, http: reqwest::Client) -> Self {
        Self {
            store,
            client_config,
            http,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Refresh one account's credentials. Single-flight per id: a
    /// concurrent call for an id already being refreshed returns `None`
    /// immediately without performing any network I/O (spec.md §4.3, #6).
    pub async fn refresh(&self, account_id: &str) -> Option<Account> {
        {
            let mut inflight = self.in_flight.lock().await;
            if !inflight.insert(account_id.to_string()) {
                debug!(account_id, "refresh already in flight, skipping");
                return None;
            }
        }

        let result = self.do_refresh(account_id).await;

        self.in_flight.lock().await.remove(account_id);
        result
    }

    async fn do_refresh(&self, account_id: &str) -> Option<Account> {
        let Some(account) = self.store.get(account_id).await else {
            warn!(account_id, "refresh requested for unknown account");
            return None;
        };
        let Some(refresh_token) = account.refresh_token().map(str::to_string) else {
            debug!(account_id, "account has no refresh_token, cannot refresh");
            return None;
        };

        match self.call_token_endpoint_with_retry(&refresh_token).await {
            Ok(token_response) => {
                let now = now_millis();
                let claims = token_response
                    .id_token
                    .as_deref()
                    .and_then(|t| oauth::decode_claims(t).ok());

                let access_token = token_response.access_token;
                let new_refresh_token = token_response.refresh_token;
                let id_token = token_response.id_token;
                let expire = now + token_response.expires_in * 1000;

                let update_result = self
                    .store
                    .update(account_id, move |acct| {
                        if let Account::Oauth {
                            access_token: at,
                            refresh_token: rt,
                            id_token: it,
                            account_id: aid,
                            email,
                            expire: exp,
                            last_refresh,
                            common,
                        } = acct
                        {
                            *at = access_token;
                            if let Some(new_rt) = new_refresh_token {
                                *rt = Some(new_rt);
                            }
                            *it = id_token;
                            if let Some(claims) = &claims {
                                if claims.account_id.is_some() {
                                    *aid = claims.account_id.clone();
                                }
                                if claims.email.is_some() {
                                    *email = claims.email.clone();
                                }
                            }
                            *exp = Some(expire);
                            *last_refresh = Some(now);
                            common.fail_count = 0;
                            common.last_error_code = None;
                            common.cooldown_until = None;
                        }
                    })
                    .await;

                if let Err(e) = update_result {
                    warn!(account_id, error = %e, "failed to persist refreshed account");
                    return None;
                }

                info!(account_id, expire, "refresh succeeded");
                metrics::counter!("gateway_refresh_total", "outcome" => "success").increment(1);
                self.store.get(account_id).await
            }
            Err(e) => {
                let status = e.status().unwrap_or(0);
                warn!(account_id, status, error = %e, "refresh failed");
                metrics::counter!("gateway_refresh_total", "outcome" => "failure").increment(1);

                let fail_count = account.common().fail_count + 1;
                let cooldown = refresh_time_cooldown(status, fail_count);
                let now = now_millis();
                let cooldown_until = cooldown.map(|d| now + d.as_millis() as u64);

                let _ = self
                    .store
                    .update(account_id, move |acct| {
                        let common = acct.common_mut();
                        common.fail_count = fail_count;
                        common.last_error_code = Some(status);
                        if let Some(until) = cooldown_until {
                            common.cooldown_until = Some(until);
                        }
                    })
                    .await;

                None
            }
        }
    }

    async fn call_token_endpoint_with_retry(
        &self,
        refresh_token: &str,
    ) -> oauth::Result<oauth::TokenResponse> {
        let mut last_err = None;
        for attempt in 0..REFRESH_ATTEMPTS {
            match oauth::refresh_token(&self.http, &self.client_config, refresh_token).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    // A credential rejection (401/403) is never transient:
                    // retrying the same refresh_token will not help.
                    if matches!(e, oauth::Error::InvalidCredentials { .. }) {
                        return Err(e);
                    }
                    let backoff = Duration::from_secs(1 << attempt);
                    let jitter_ms = rand::rng().random_range(0..250u64);
                    last_err = Some(e);
                    if attempt + 1 < REFRESH_ATTEMPTS {
                        tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
                    }
                }
            }
        }
        Err(last_err.expect("loop runs at least once"))
    }
}

/// Spawn the periodic sweep (spec.md §4.3): every 15 minutes, jittered by
/// up to 3 minutes (never under 1 minute), refresh every non-disabled
/// near-expiry account. Cancellable via `shutdown`.
pub fn spawn_sweep(
    refresher: Arc<Refresher>,
    store: Arc<Store>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let jitter_ms = rand::rng().random_range(0..SWEEP_JITTER.as_millis() as u64);
            let interval =
                (SWEEP_BASE_INTERVAL + Duration::from_millis(jitter_ms)).max(SWEEP_MIN_INTERVAL);

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.cancelled() => {
                    info!("sweep shutting down");
                    return;
                }
            }

            sweep_once(&refresher, &store).await;
        }
    })
}

async fn sweep_once(refresher: &Refresher, store: &Store) {
    let accounts = store.read_accounts().await;
    let now = now_millis();
    let mut swept = 0usize;

    for account in accounts {
        if account.common().disabled || !account.refreshable() {
            continue;
        }
        if !is_near_expiry(account.expire(), now, DEFAULT_NEAR_EXPIRY) {
            continue;
        }
        swept += 1;
        // Sweep failures are absorbed (spec.md §4.3): do_refresh already
        // persists fail_count/cooldown on failure, nothing further to do.
        refresher.refresh(account.id()).await;
    }

    debug!(swept, "sweep cycle complete");
}
