//! Repository and queue traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::jobs::ConversionJob;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Keyed store of conversion jobs.
///
/// Records expire `expires_in` seconds after their `created_at`; once expired a
/// record is invisible to lookups and updates even before it is physically purged.
#[async_trait]
pub trait ConversionJobsRepo: Send + Sync {
    /// Persist a new job. Its expiry clock starts at the job's `created_at`.
    async fn create_job(&self, job: &ConversionJob) -> Result<(), RepoError>;

    /// Look a job up by its textual identifier.
    ///
    /// Returns `Ok(None)` for unknown or expired identifiers and
    /// [`RepoError::InvalidInput`] when the identifier is not a UUID.
    async fn find_job(&self, identifier: &str) -> Result<Option<ConversionJob>, RepoError>;

    /// Overwrite the mutable fields of an existing, unexpired job.
    async fn update_job(&self, job: &ConversionJob) -> Result<(), RepoError>;

    /// Physically delete expired records, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64, RepoError>;

    async fn health_check(&self) -> Result<(), RepoError>;
}

/// Durable work queue feeding the conversion workers.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push a JSON payload onto the queue, returning the queue's job id.
    async fn push(&self, payload: serde_json::Value) -> Result<String, RepoError>;
}
