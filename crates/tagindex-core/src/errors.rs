//! Error types for the tag-scoped snippet index.

use crate::models::PathAndFingerprint;

/// Failure to turn one file into snippet descriptors.
///
/// Always scoped to a single path. The reconciliation engine logs it,
/// leaves that entry unacknowledged and moves on with the batch.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("Unsupported language: {0}")]
    Unsupported(String),

    #[error("Malformed snippet descriptor: {0}")]
    Malformed(String),

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("File too large: {path} ({size} bytes, limit {limit})")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Top-level error enum for the index.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// AddTag or Delete referenced an artifact that does not exist.
    #[error("Integrity error for {entry}: {reason}")]
    Integrity {
        entry: PathAndFingerprint,
        reason: String,
    },

    /// Transaction or commit failure; the enclosing batch was rolled back.
    #[error("Persistence error: {0}")]
    Persistence(#[from] rusqlite::Error),

    #[error("Extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IndexError {
    pub fn integrity(entry: &PathAndFingerprint, reason: impl Into<String>) -> Self {
        IndexError::Integrity {
            entry: entry.clone(),
            reason: reason.into(),
        }
    }

    /// Whether a later reconciliation run can be expected to succeed
    /// with the same entries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IndexError::Persistence(_) | IndexError::Io(_))
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
pub type ExtractionResult<T> = Result<T, ExtractionError>;
