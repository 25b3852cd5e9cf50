use thiserror::Error;
use uuid::Uuid;

use crate::domain::types::JobStatus;

/// Rejections raised by the job lifecycle.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("job {uuid} cannot move from `{from}` to `{to}`")]
    InvalidTransition {
        uuid: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
    #[error("render request could not be serialized: {0}")]
    Encoding(#[source] serde_json::Error),
}

impl DomainError {
    /// True when a delivery hit a job that already reached `succeeded` or `failed`.
    pub fn is_terminal_rejection(&self) -> bool {
        matches!(self, Self::InvalidTransition { from, .. } if from.is_terminal())
    }
}
