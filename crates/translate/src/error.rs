//! Error type for TRANSLATOR operations (spec.md §4.5, §7 MalformedTranslation).

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
