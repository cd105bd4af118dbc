use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failures reported by the navigation layer. Every variant is recoverable:
/// callers retry, skip the row, or fall back to the listing.
#[derive(Debug, Error)]
pub enum NavError {
    #[error("timed out waiting for {what}")]
    Timeout { what: String },
    #[error("element not found: {what}")]
    NotFound { what: String },
    #[error("element went stale before it could be used")]
    Stale,
    #[error("webdriver error '{error}': {message}")]
    WebDriver { error: String, message: String },
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("unexpected webdriver response: {0}")]
    Protocol(String),
}

impl NavError {
    pub fn timeout(what: impl Into<String>) -> Self {
        NavError::Timeout { what: what.into() }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        NavError::NotFound { what: what.into() }
    }
}

/// Errors surfaced by a harvest run.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Nav(#[from] NavError),
    #[error("storage failure on {}: {source}", path.display())]
    Storage {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("record encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl HarvestError {
    pub fn storage(path: impl Into<PathBuf>, source: io::Error) -> Self {
        HarvestError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Storage-integrity failures halt the run and are never retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, HarvestError::Storage { .. } | HarvestError::Encode(_))
    }
}

/// Snapshot compaction failures. These never escape the store; they are
/// logged as warnings because the record log stays authoritative.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
}
