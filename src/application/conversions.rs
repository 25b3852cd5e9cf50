//! API-facing conversion operations: submit a request, report a job's status.

use std::sync::Arc;

use pressroom_api_types::RenderResponse;
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    application::{
        jobs::enqueue_convert_job,
        repos::{ConversionJobsRepo, JobQueue, RepoError},
        status::{ComposeError, StatusComposer},
    },
    domain::{
        error::DomainError,
        jobs::{ConversionJob, now_utc},
        render::RenderRequest,
    },
};

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("failed to save conversion job: {0}")]
    Create(#[source] RepoError),
    #[error("failed to enqueue conversion job: {0}")]
    Enqueue(#[source] RepoError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("`{0}` is not a valid job identifier")]
    InvalidIdentifier(String),
    #[error("conversion job not found")]
    NotFound,
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error(transparent)]
    Compose(#[from] ComposeError),
}

#[derive(Clone)]
pub struct ConversionService {
    jobs: Arc<dyn ConversionJobsRepo>,
    queue: Arc<dyn JobQueue>,
    composer: StatusComposer,
    request_ttl: u32,
}

impl ConversionService {
    pub fn new(
        jobs: Arc<dyn ConversionJobsRepo>,
        queue: Arc<dyn JobQueue>,
        composer: StatusComposer,
        request_ttl: u32,
    ) -> Self {
        Self {
            jobs,
            queue,
            composer,
            request_ttl,
        }
    }

    /// Persist a pending job for `request` and hand it to the workers.
    ///
    /// The record is durable before the queue message exists, so a worker never
    /// receives an identifier it cannot load.
    pub async fn submit(
        &self,
        identifier: Uuid,
        request: &RenderRequest,
    ) -> Result<RenderResponse, SubmitError> {
        let job = ConversionJob::create(identifier, request, self.request_ttl, now_utc())?;

        self.jobs.create_job(&job).await.map_err(|err| {
            error!(
                target = "application::conversions::submit",
                uuid = %identifier,
                error = %err,
                "Unable to save conversion job"
            );
            SubmitError::Create(err)
        })?;

        let queue_id = enqueue_convert_job(self.queue.as_ref(), identifier)
            .await
            .map_err(|err| {
                error!(
                    target = "application::conversions::submit",
                    uuid = %identifier,
                    error = %err,
                    "Unable to enqueue conversion job"
                );
                SubmitError::Enqueue(err)
            })?;

        metrics::counter!("pressroom_jobs_submitted_total", "target" => request.target().as_str())
            .increment(1);
        info!(
            target = "application::conversions::submit",
            uuid = %identifier,
            queue_id = queue_id.as_str(),
            request_type = job.request_type(),
            "Enqueued conversion job"
        );

        Ok(self.composer.compose(&job).await?)
    }

    pub async fn status(&self, identifier: &str) -> Result<RenderResponse, StatusError> {
        if Uuid::parse_str(identifier).is_err() {
            return Err(StatusError::InvalidIdentifier(identifier.to_string()));
        }

        let job = self
            .jobs
            .find_job(identifier)
            .await?
            .ok_or(StatusError::NotFound)?;

        Ok(self.composer.compose(&job).await?)
    }

    pub async fn health_check(&self) -> Result<(), RepoError> {
        self.jobs.health_check().await
    }
}
