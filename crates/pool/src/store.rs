//! STORE (spec.md §4.1): durable, atomic, serialized persistence of the
//! Account sequence and the cursor.
//!
//! Two independent serializing locks guard the two on-disk files, mirroring
//! the teacher's `CredentialStore` (a `Mutex<HashMap<...>>` wrapping one
//! file) duplicated across the accounts file and the cursor file. Every
//! write goes through temp-file-then-rename so a crash mid-write can never
//! leave a partially-written file observable. Operations that touch both
//! files lock the accounts mutex before the cursor mutex (fixed order,
//! spec.md §5) to rule out deadlock.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::Account;
use crate::error::{Error, Result};

const ACCOUNTS_FILE: &str = "accounts.json";
const CURSOR_FILE: &str = "cursor";

/// Durable journal of the Account sequence plus the cursor.
pub struct Store {
    accounts_path: PathBuf,
    cursor_path: PathBuf,
    accounts: Mutex<Vec<Account>>,
    cursor: Mutex<usize>,
}

impl Store {
    /// Open (or cold-start) a store rooted at `dir`. The directory is
    /// created if missing. I/O errors on read degrade to empty/zero per
    /// spec.md §4.1 failure semantics; only write errors propagate.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::StoreIo {
                operation: "create_dir_all",
                path: dir.display().to_string(),
                source: e,
            })?;

        let accounts_path = dir.join(ACCOUNTS_FILE);
        let cursor_path = dir.join(CURSOR_FILE);

        let accounts = load_accounts(&accounts_path).await;
        let cursor = load_cursor(&cursor_path).await;

        info!(
            path = %accounts_path.display(),
            accounts = accounts.len(),
            cursor,
            "store opened"
        );

        Ok(Self {
            accounts_path,
            cursor_path,
            accounts: Mutex::new(accounts),
            cursor: Mutex::new(cursor),
        })
    }

    /// A full snapshot of the Account sequence, in insertion order.
    pub async fn read_accounts(&self) -> Vec<Account> {
        self.accounts.lock().await.clone()
    }

    /// Replace the entire Account sequence and persist atomically.
    pub async fn write_accounts(&self, accounts: Vec<Account>) -> Result<()> {
        let mut guard = self.accounts.lock().await;
        write_atomic_json(&self.accounts_path, &accounts).await?;
        *guard = accounts;
        Ok(())
    }

    /// The cursor, always a valid index modulo the current sequence length
    /// (or 0 when the sequence is empty) is enforced by callers; the store
    /// itself just persists whatever non-negative integer it is given.
    pub async fn read_cursor(&self) -> usize {
        *self.cursor.lock().await
    }

    pub async fn write_cursor(&self, index: usize) -> Result<()> {
        let mut guard = self.cursor.lock().await;
        write_atomic_text(&self.cursor_path, &index.to_string()).await?;
        *guard = index;
        Ok(())
    }

    /// Append a new account. Errors if `account.id()` already exists
    /// (set-semantics on id, spec.md §3).
    pub async fn add(&self, account: Account) -> Result<()> {
        let mut guard = self.accounts.lock().await;
        if guard.iter().any(|a| a.id() == account.id()) {
            return Err(Error::DuplicateId(account.id().to_string()));
        }
        let mut next = guard.clone();
        next.push(account);
        write_atomic_json(&self.accounts_path, &next).await?;
        *guard = next;
        Ok(())
    }

    /// Read-modify-write a single Account by id. A no-op (not an error) if
    /// `id` is absent, per spec.md §4.1.
    pub async fn update<F>(&self, id: &str, mutator: F) -> Result<()>
    where
        F: FnOnce(&mut Account),
    {
        let mut guard = self.accounts.lock().await;
        let Some(pos) = guard.iter().position(|a| a.id() == id) else {
            debug!(account_id = id, "update: account not found, no-op");
            return Ok(());
        };
        let mut next = guard.clone();
        mutator(&mut next[pos]);
        write_atomic_json(&self.accounts_path, &next).await?;
        *guard = next;
        Ok(())
    }

    /// Remove an account by id. A no-op if absent.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let mut guard = self.accounts.lock().await;
        if !guard.iter().any(|a| a.id() == id) {
            return Ok(());
        }
        let next: Vec<Account> = guard.iter().filter(|a| a.id() != id).cloned().collect();
        write_atomic_json(&self.accounts_path, &next).await?;
        *guard = next;
        Ok(())
    }

    /// Look up a single account by id without mutating anything.
    pub async fn get(&self, id: &str) -> Option<Account> {
        self.accounts.lock().await.iter().find(|a| a.id() == id).cloned()
    }
}

async fn load_accounts(path: &Path) -> Vec<Account> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "accounts file unreadable, starting empty");
                Vec::new()
            }
        },
        Err(_) => Vec::new(),
    }
}

async fn load_cursor(path: &Path) -> usize {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents.trim().parse().unwrap_or(0),
        Err(_) => 0,
    }
}

/// Write-temp-then-rename, the shared atomicity primitive for both files.
async fn write_atomic_json(path: &Path, accounts: &[Account]) -> Result<()> {
    let json = serde_json::to_string_pretty(accounts).map_err(|e| Error::StoreParse {
        path: path.display().to_string(),
        source: e,
    })?;
    write_atomic_bytes(path, json.as_bytes()).await
}

async fn write_atomic_text(path: &Path, contents: &str) -> Result<()> {
    write_atomic_bytes(path, contents.as_bytes()).await
}

async fn write_atomic_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp_path = dir.join(format!(
        ".{}.tmp.{}",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("store"),
        std::process::id()
    ));

    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| Error::StoreIo {
            operation: "write_temp",
            path: tmp_path.display().to_string(),
            source: e,
        })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        if let Err(e) = tokio::fs::set_permissions(&tmp_path, perms).await {
            warn!(path = %tmp_path.display(), error = %e, "failed to restrict store file permissions");
        }
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::StoreIo {
            operation: "rename",
            path: path.display().to_string(),
            source: e,
        })?;

    debug!(path = %path.display(), "store write persisted");
    Ok(())
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

    #[tokio::test]
    async fn cold_start_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        assert!(store.read_accounts().await.is_empty());
        assert_eq!(store.read_cursor().await, 0);
    }

    #[tokio::test]
    async fn add_and_reload_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).await.unwrap();
            store.add(oauth("a")).await.unwrap();
            store.add(oauth("b")).await.unwrap();
        }
        let store2 = Store::open(dir.path()).await.unwrap();
        let accounts = store2.read_accounts().await;
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].id(), "a");
        assert_eq!(accounts[1].id(), "b");
    }

    #[tokio::test]
    async fn add_duplicate_id_errors() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        store.add(oauth("a")).await.unwrap();
        let err = store.add(oauth("a")).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateId(_)));
    }

    #[tokio::test]
    async fn update_mutates_matching_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        store.add(oauth("a")).await.unwrap();

        store
            .update("a", |acct| acct.common_mut().fail_count = 3)
            .await
            .unwrap();

        let acct = store.get("a").await.unwrap();
        assert_eq!(acct.common().fail_count, 3);
    }

    #[tokio::test]
    async fn update_missing_id_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        store.update("ghost", |acct| acct.common_mut().fail_count = 1).await.unwrap();
        assert!(store.read_accounts().await.is_empty());
    }

    #[tokio::test]
    async fn remove_deletes_account() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        store.add(oauth("a")).await.unwrap();
        store.add(oauth("b")).await.unwrap();
        store.remove("a").await.unwrap();
        let accounts = store.read_accounts().await;
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id(), "b");
    }

    #[tokio::test]
    async fn cursor_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        store.write_cursor(2).await.unwrap();
        let store2 = Store::open(dir.path()).await.unwrap();
        assert_eq!(store2.read_cursor().await, 2);
    }

    #[tokio::test]
    async fn garbled_cursor_file_defaults_to_zero() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(CURSOR_FILE), b"not-a-number")
            .await
            .unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        assert_eq!(store.read_cursor().await, 0);
    }

    #[tokio::test]
    async fn garbled_accounts_file_defaults_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join(ACCOUNTS_FILE), b"{not json")
            .await
            .unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        assert!(store.read_accounts().await.is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn accounts_file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).await.unwrap();
        store.add(oauth("a")).await.unwrap();
        let meta = tokio::fs::metadata(dir.path().join(ACCOUNTS_FILE)).await.unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o600);
    }

    #[tokio::test]
    async fn concurrent_adds_dont_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let store = std::sync::Arc::new(Store::open(dir.path()).await.unwrap());
        let mut handles = Vec::new();
        for i in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add(oauth(&format!("acct-{i}"))).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.read_accounts().await.len(), 10);
        let contents = tokio::fs::read_to_string(dir.path().join(ACCOUNTS_FILE)).await.unwrap();
        let parsed: Vec<Account> = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed.len(), 10);
    }
}
