//! SELECTOR (spec.md §4.4): sticky-cursor account selection.
//!
//! `select()` never rotates away from a healthy active account; the
//! dispatcher calls `advance()` once it has marked a failure on the
//! current one.

use std::sync::Arc;

use tracing::{debug, info};

use crate::account::Account;
use crate::clock::now_millis;
use crate::lifecycle::usable;
use crate::store::Store;

pub struct Selector {
    store: Arc<Store>,
}

impl Selector {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Sticky pick: if the account at the cursor is usable, keep the
    /// cursor where it is. Otherwise scan forward from cursor+1 and land
    /// on the first usable account found.
    pub async fn select(&self) -> Option<Account> {
        let accounts = self.store.read_accounts().await;
        let n = accounts.len();
        if n == 0 {
            return None;
        }
        let cursor = self.store.read_cursor().await % n;
        let now = now_millis();

        if usable(&accounts[cursor], now) {
            let id = accounts[cursor].id().to_string();
            self.mark_selected(&id).await;
            return self.store.get(&id).await;
        }

        for offset in 1..=n {
            let idx = (cursor + offset) % n;
            if usable(&accounts[idx], now) {
                let id = accounts[idx].id().to_string();
                if let Err(e) = self.store.write_cursor(idx).await {
                    tracing::warn!(error = %e, "failed to persist cursor on select");
                }
                self.mark_selected(&id).await;
                info!(account_id = id, cursor = idx, "selector moved cursor (sticky account unusable)");
                return self.store.get(&id).await;
            }
        }
        debug!("selector: no usable account");
        None
    }

    /// Move past the current cursor unconditionally; used by the dispatcher
    /// after marking a failure on the account currently at the cursor.
    pub async fn advance(&self) -> Option<Account> {
        let accounts = self.store.read_accounts().await;
        let n = accounts.len();
        if n == 0 {
            return None;
        }
        let cursor = self.store.read_cursor().await % n;
        let now = now_millis();

        for offset in 1..=n {
            let idx = (cursor + offset) % n;
            if usable(&accounts[idx], now) {
                if let Err(e) = self.store.write_cursor(idx).await {
                    tracing::warn!(error = %e, "failed to persist cursor on advance");
                }
                info!(account_id = accounts[idx].id(), cursor = idx, "selector advanced");
                return self.store.get(accounts[idx].id()).await;
            }
        }
        debug!("selector: advance found no usable account");
        None
    }

    /// Directly set the cursor (the "Activate" management operation).
    pub async fn set(&self, index: usize) -> crate::error::Result<()> {
        let n = self.store.read_accounts().await.len();
        let normalized = if n == 0 { 0 } else { index % n };
        self.store.write_cursor(normalized).await
    }

    async fn mark_selected(&self, id: &str) {
        let now = now_millis();
        if let Err(e) = self
            .store
            .update(id, |acct| {
                let common = acct.common_mut();
                common.last_used = Some(now);
                common.total_requests += 1;
            })
            .await
        {
            tracing::warn!(account_id = id, error = %e, "failed to persist last_used");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::CommonFields;

    fn oauth(id: &str) -> Account {
        Account::Oauth {
            common: CommonFields::new(id.into(), 0),
            access_token: format!("at_{id}"),
            refresh_token: Some(format!("rt_{id}")),
            id_token: None,
            account_id: None,
            email: None,
            expire: None,
            last_refresh: None,
        }
    }

    async fn seeded(ids: &[&str]) -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).await.unwrap());
        for id in ids {
            store.add(oauth(id)).await.unwrap();
        }
        (dir, store)
    }

    #[tokio::test]
    async fn select_empty_pool_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).await.unwrap());
        let selector = Selector::new(store);
        assert!(selector.select().await.is_none());
    }

    #[tokio::test]
    async fn select_is_sticky_on_healthy_cursor() {
        let (_dir, store) = seeded(&["a", "b", "c"]).await;
        store.write_cursor(1).await.unwrap();
        let selector = Selector::new(store.clone());

        let picked = selector.select().await.unwrap();
        assert_eq!(picked.id(), "b");
        assert_eq!(store.read_cursor().await, 1, "select must not move cursor when sticky account is usable");
    }

    #[tokio::test]
    async fn select_marks_last_used() {
        let (_dir, store) = seeded(&["a"]).await;
        let selector = Selector::new(store.clone());
        selector.select().await.unwrap();
        let acct = store.get("a").await.unwrap();
        assert!(acct.common().last_used.is_some());
    }

    #[tokio::test]
    async fn select_scans_forward_when_cursor_account_unusable() {
        let (_dir, store) = seeded(&["a", "b", "c"]).await;
        store.update("a", |acct| acct.common_mut().disabled = true).await.unwrap();
        let selector = Selector::new(store.clone());

        let picked = selector.select().await.unwrap();
        assert_eq!(picked.id(), "b");
        assert_eq!(store.read_cursor().await, 1);
    }

    #[tokio::test]
    async fn select_none_usable_returns_none() {
        let (_dir, store) = seeded(&["a", "b"]).await;
        store.update("a", |acct| acct.common_mut().disabled = true).await.unwrap();
        store.update("b", |acct| acct.common_mut().disabled = true).await.unwrap();
        let selector = Selector::new(store);
        assert!(selector.select().await.is_none());
    }

    #[tokio::test]
    async fn advance_moves_to_next_usable() {
        let (_dir, store) = seeded(&["a", "b", "c"]).await;
        let selector = Selector::new(store.clone());

        let next = selector.advance().await.unwrap();
        assert_eq!(next.id(), "b");
        assert_eq!(store.read_cursor().await, 1);
    }

    #[tokio::test]
    async fn advance_skips_unusable_accounts() {
        let (_dir, store) = seeded(&["a", "b", "c"]).await;
        store.update("b", |acct| acct.common_mut().disabled = true).await.unwrap();
        let selector = Selector::new(store.clone());

        let next = selector.advance().await.unwrap();
        assert_eq!(next.id(), "c");
    }

    #[tokio::test]
    async fn advance_wraps_around() {
        let (_dir, store) = seeded(&["a", "b"]).await;
        store.write_cursor(1).await.unwrap();
        let selector = Selector::new(store.clone());

        let next = selector.advance().await.unwrap();
        assert_eq!(next.id(), "a");
        assert_eq!(store.read_cursor().await, 0);
    }

    #[tokio::test]
    async fn advance_none_usable_returns_none() {
        let (_dir, store) = seeded(&["a"]).await;
        store.update("a", |acct| acct.common_mut().disabled = true).await.unwrap();
        let selector = Selector::new(store);
        assert!(selector.advance().await.is_none());
    }

    #[tokio::test]
    async fn set_sets_cursor_directly() {
        let (_dir, store) = seeded(&["a", "b", "c"]).await;
        let selector = Selector::new(store.clone());
        selector.set(2).await.unwrap();
        assert_eq!(store.read_cursor().await, 2);
    }

    #[tokio::test]
    async fn set_normalizes_out_of_range_index() {
        let (_dir, store) = seeded(&["a", "b"]).await;
        let selector = Selector::new(store.clone());
        selector.set(5).await.unwrap();
        assert_eq!(store.read_cursor().await, 1);
    }
}
