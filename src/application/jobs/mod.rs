mod context;
mod convert;
mod monitor;
mod purge;
mod queue;

pub use context::{JobWorkerContext, PurgeContext, job_aborted, job_failed};
pub use convert::{
    AbandonedJob, FulfillmentPipeline, PipelineError, PipelineOutcome, PipelineSettings,
    process_convert_job,
};
pub use monitor::worker_monitor;
pub use purge::{PurgeExpiredJob, process_purge_expired_job, purge_expired_schedule};
pub use queue::{ConvertJobPayload, convert_queue_name, enqueue_convert_job, enqueue_job};
