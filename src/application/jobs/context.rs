use std::sync::Arc;

use apalis::prelude::Error as ApalisError;

use crate::application::{jobs::convert::FulfillmentPipeline, repos::ConversionJobsRepo};

/// Shared context passed to conversion workers.
#[derive(Clone)]
pub struct JobWorkerContext {
    pub pipeline: Arc<FulfillmentPipeline>,
}

/// Context for the expired-record purge worker.
#[derive(Clone)]
pub struct PurgeContext {
    pub jobs: Arc<dyn ConversionJobsRepo>,
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Convert any error into an [`ApalisError::Failed`], leaving the job eligible for retry.
pub fn job_failed<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Failed(Arc::new(boxed))
}

/// Convert any error into an [`ApalisError::Abort`] so the queue never retries it.
pub fn job_aborted<E>(err: E) -> ApalisError
where
    E: std::error::Error + Send + Sync + 'static,
{
    let boxed: BoxError = Box::new(err);
    ApalisError::Abort(Arc::new(boxed))
}
