use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

use crate::model::Target;

/// Error from a single fetch attempt. Every variant is retryable.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid response: {0}")]
    InvalidPayload(String),
}

/// Terminal outcome for a target whose retry budget ran out.
#[derive(Debug, Error)]
#[error("giving up on {target} after {attempts} attempts: {last_error}")]
pub struct FetchFailure {
    pub target: Target,
    pub attempts: u32,
    #[source]
    pub last_error: FetchError,
}

/// Error reading or rewriting the history store. Fatal to the scheduler.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error on {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("unexpected header in {path}: {found}")]
    Schema { path: PathBuf, found: String },

    #[error("none of the {rows} rows in {path} could be read; refusing to rewrite")]
    Unreadable { path: PathBuf, rows: usize },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io { path: path.into(), source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        StoreError::Csv { path: path.into(), source }
    }
}
