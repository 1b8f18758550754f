//! Error types for pool operations (STORE / LIFECYCLE / SELECTOR / REFRESHER).

/// Errors surfaced by the pool crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// STORE write failed: on-disk state is untouched (temp-then-rename
    /// never reached the final path), per spec.md §4.1 failure semantics.
    #[error("store I/O error ({operation} on {path}): {source}")]
    StoreIo {
        operation: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("store parse error ({path}): {source}")]
    StoreParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("account not found: {0}")]
    NotFound(String),

    #[error("account id already exists: {0}")]
    DuplicateId(String),
}

/// Result alias for pool operations.
pub type Result<T> = std::result::Result<T, Error>;
