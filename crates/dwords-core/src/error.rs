//! Error types for dwords-core

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the record store and its collaborators.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Operation referenced a plan, word, or dictionary that does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Add or rename collided with a live record
    #[error("Duplicate word in plan {plan_id}: {word}")]
    DuplicateWord { plan_id: String, word: String },

    /// Import source type not recognized
    #[error("Unsupported import format: {0}")]
    UnsupportedFormat(String),

    /// Import source could not be read or parsed
    #[error("Import error: {0}")]
    Import(String),

    /// Underlying persistence failure
    #[error("Store I/O error: {0}")]
    StoreIo(String),

    /// Equal version and origin with differing content during sync
    #[error("Reconcile conflict on {identity} at version {version}")]
    ReconcileConflict { identity: String, version: i64 },

    /// Remote record stamped past the highest version a clock can step beyond
    #[error("Version {version} of {identity} is out of range")]
    VersionOutOfRange { identity: String, version: i64 },

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StoreError {
    pub(crate) fn duplicate(plan_id: impl ToString, word: &str) -> Self {
        StoreError::DuplicateWord {
            plan_id: plan_id.to_string(),
            word: word.to_string(),
        }
    }

    /// True for errors that describe caller input rather than a failed store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound(_)
                | StoreError::DuplicateWord { .. }
                | StoreError::UnsupportedFormat(_)
                | StoreError::VersionOutOfRange { .. }
        )
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::StoreIo(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::StoreIo(format!("serialization: {}", err))
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Import(err.to_string())
    }
}

impl From<csv::Error> for StoreError {
    fn from(err: csv::Error) -> Self {
        StoreError::Import(format!("csv: {}", err))
    }
}
