//! Client-facing snapshot of a conversion job.

use std::{sync::Arc, time::Duration};

use pressroom_api_types::RenderResponse;
use thiserror::Error;

use crate::{
    application::storage::{BlobStorage, BlobStorageError},
    domain::{jobs::ConversionJob, types::JobStatus},
};

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("succeeded job {0} has no stored artifact")]
    MissingArtifact(String),
    #[error(transparent)]
    Storage(#[from] BlobStorageError),
}

#[derive(Clone)]
pub struct StatusComposer {
    storage: Arc<dyn BlobStorage>,
    download_ttl: Duration,
}

impl StatusComposer {
    pub fn new(storage: Arc<dyn BlobStorage>, download_ttl: Duration) -> Self {
        Self {
            storage,
            download_ttl,
        }
    }

    /// Build the response for a job, presigning a download URL once it has succeeded.
    pub async fn compose(&self, job: &ConversionJob) -> Result<RenderResponse, ComposeError> {
        let file_url = if job.status() == JobStatus::Succeeded {
            let location = job
                .storage()
                .ok_or_else(|| ComposeError::MissingArtifact(job.identifier().to_string()))?;
            let url = self
                .storage
                .presign_get(location, self.download_ttl)
                .await?;
            Some(url)
        } else {
            None
        };

        Ok(RenderResponse {
            uuid: job.identifier().to_string(),
            created_at: job.created_at(),
            started_at: job.started_at(),
            ended_at: job.ended_at(),
            expires_in: job.expires_in(),
            file_url,
            status: job.status(),
            logs: log_lines(job.logs()),
        })
    }
}

/// Split a converter transcript into display lines. `\r` counts as a break
/// since progress bars redraw in place.
fn log_lines(logs: &str) -> Vec<String> {
    logs.split(['\r', '\n'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
