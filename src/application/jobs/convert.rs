//! Worker-side fulfillment of a queued conversion job.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};

use apalis::prelude::{Data, Error as ApalisError};
use bytes::Bytes;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    application::{
        converter::Converter,
        repos::{ConversionJobsRepo, RepoError},
        storage::{BlobStorage, BlobStorageError},
    },
    domain::{
        error::DomainError,
        jobs::{ConversionJob, StorageLocation, now_utc},
        render::RenderRequest,
    },
};

use super::{
    context::{JobWorkerContext, job_aborted, job_failed},
    queue::ConvertJobPayload,
};

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub region: String,
    pub bucket: String,
    pub upload_timeout: Duration,
    pub scratch_root: PathBuf,
}

/// How a single delivery ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded,
    Failed,
    /// The job cannot be processed and must not be retried.
    Abandoned,
}

/// Delivery failures that leave the job eligible for redelivery.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("conversion job `{0}` not found")]
    NotFound(String),
    #[error("store error on conversion job `{identifier}`: {source}")]
    Store {
        identifier: String,
        #[source]
        source: RepoError,
    },
    #[error("failed to prepare working directory for `{identifier}`: {source}")]
    Workspace {
        identifier: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Lifecycle(#[from] DomainError),
}

#[derive(Debug, Error)]
#[error("conversion job `{uuid}` abandoned")]
pub struct AbandonedJob {
    pub uuid: String,
}

pub struct FulfillmentPipeline {
    jobs: Arc<dyn ConversionJobsRepo>,
    converter: Arc<dyn Converter>,
    storage: Arc<dyn BlobStorage>,
    settings: PipelineSettings,
}

impl FulfillmentPipeline {
    pub fn new(
        jobs: Arc<dyn ConversionJobsRepo>,
        converter: Arc<dyn Converter>,
        storage: Arc<dyn BlobStorage>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            jobs,
            converter,
            storage,
            settings,
        }
    }

    /// Process one delivery of a queue message naming `identifier`.
    ///
    /// Conversion and upload failures finish the job as `failed` and return
    /// `Ok`. Only store and workspace errors surface as `Err`.
    pub async fn run(&self, identifier: &str) -> Result<PipelineOutcome, PipelineError> {
        info!(
            target = "application::jobs::convert",
            uuid = identifier,
            "Picked up conversion job from queue"
        );

        let mut job = match self.jobs.find_job(identifier).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                error!(
                    target = "application::jobs::convert",
                    uuid = identifier,
                    "Conversion job not found in store"
                );
                return Err(PipelineError::NotFound(identifier.to_string()));
            }
            Err(source) => {
                error!(
                    target = "application::jobs::convert",
                    uuid = identifier,
                    error = %source,
                    "Unable to fetch conversion job"
                );
                return Err(PipelineError::Store {
                    identifier: identifier.to_string(),
                    source,
                });
            }
        };

        let request = match RenderRequest::decode(job.request_type(), job.request_data()) {
            Ok(request) => request,
            Err(err) => {
                error!(
                    target = "application::jobs::convert",
                    uuid = identifier,
                    request_type = job.request_type(),
                    error = %err,
                    "Invalid render request on conversion job, won't proceed"
                );
                return Ok(PipelineOutcome::Abandoned);
            }
        };

        if let Err(err) = job.mark_processing(now_utc()) {
            if !err.is_terminal_rejection() {
                return Err(err.into());
            }
            warn!(
                target = "application::jobs::convert",
                uuid = identifier,
                status = job.status().as_str(),
                error = %err,
                "Conversion job already finished, dropping delivery"
            );
            return Ok(PipelineOutcome::Abandoned);
        }
        self.persist(&job).await?;

        let workspace = tempfile::Builder::new()
            .prefix(&format!("{identifier}-"))
            .tempdir_in(&self.settings.scratch_root)
            .map_err(|source| PipelineError::Workspace {
                identifier: identifier.to_string(),
                source,
            })?;

        let started = Instant::now();
        let fulfillment = request
            .fulfill(self.converter.as_ref(), workspace.path())
            .await;
        metrics::histogram!("pressroom_conversion_ms").record(elapsed_ms(started));

        job.record_logs(&fulfillment.logs);
        if let Err(err) = self.jobs.update_job(&job).await {
            warn!(
                target = "application::jobs::convert",
                uuid = identifier,
                error = %err,
                "Unable to save conversion logs"
            );
        }

        let output = match fulfillment.output {
            Ok(path) => path,
            Err(err) => {
                warn!(
                    target = "application::jobs::convert",
                    uuid = identifier,
                    error = %err,
                    "Conversion failed"
                );
                return self.finish_failed(job).await;
            }
        };

        let key = storage_key(&job, &output);
        if let Err(err) = self.upload(&output, &key).await {
            error!(
                target = "application::jobs::convert",
                uuid = identifier,
                bucket = self.settings.bucket.as_str(),
                key = key.as_str(),
                error = %err,
                "Unable to upload artifact"
            );
            return self.finish_failed(job).await;
        }

        job.mark_succeeded(now_utc())?;
        job.record_storage(StorageLocation {
            region: self.settings.region.clone(),
            bucket: self.settings.bucket.clone(),
            key,
        });
        self.persist(&job).await?;
        metrics::counter!("pressroom_jobs_completed_total", "status" => "succeeded").increment(1);

        info!(
            target = "application::jobs::convert",
            uuid = identifier,
            "Conversion job succeeded"
        );
        Ok(PipelineOutcome::Succeeded)
    }

    async fn finish_failed(
        &self,
        mut job: ConversionJob,
    ) -> Result<PipelineOutcome, PipelineError> {
        job.mark_failed(now_utc())?;
        self.persist(&job).await?;
        metrics::counter!("pressroom_jobs_completed_total", "status" => "failed").increment(1);
        Ok(PipelineOutcome::Failed)
    }

    async fn persist(&self, job: &ConversionJob) -> Result<(), PipelineError> {
        self.jobs.update_job(job).await.map_err(|source| {
            error!(
                target = "application::jobs::convert",
                uuid = %job.identifier(),
                status = job.status().as_str(),
                error = %source,
                "Unable to persist conversion job"
            );
            PipelineError::Store {
                identifier: job.identifier().to_string(),
                source,
            }
        })
    }

    async fn upload(&self, path: &Path, key: &str) -> Result<(), BlobStorageError> {
        let body = Bytes::from(tokio::fs::read(path).await?);
        let limit = self.settings.upload_timeout;
        let started = Instant::now();

        let outcome = tokio::time::timeout(
            limit,
            self.storage.put_object(&self.settings.bucket, key, body),
        )
        .await;
        metrics::histogram!("pressroom_upload_ms").record(elapsed_ms(started));

        outcome.map_err(|_| BlobStorageError::TimedOut {
            key: key.to_string(),
            timeout: limit,
        })?
    }
}

/// Objects are stored as `<identifier>/<file name>`.
fn storage_key(job: &ConversionJob, output: &Path) -> String {
    let file_name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{}/{file_name}", job.identifier())
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}

pub async fn process_convert_job(
    payload: ConvertJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    match context.pipeline.run(&payload.uuid).await {
        Ok(PipelineOutcome::Abandoned) => Err(job_aborted(AbandonedJob { uuid: payload.uuid })),
        Ok(_) => Ok(()),
        Err(err) => Err(job_failed(err)),
    }
}
