mod support;

use std::{sync::Arc, time::Duration};

use apalis::prelude::{Data, Error as ApalisError};
use tempfile::TempDir;
use uuid::Uuid;

use pressroom::application::jobs::{
    ConvertJobPayload, FulfillmentPipeline, JobWorkerContext, PipelineError, PipelineOutcome,
    PipelineSettings, process_convert_job,
};
use pressroom::application::repos::ConversionJobsRepo;
use pressroom::application::status::StatusComposer;
use pressroom::domain::jobs::{ConversionJob, ConversionJobParts, now_utc};
use pressroom::domain::render::RenderRequest;
use pressroom::domain::types::{JobStatus, RenderTarget};

use support::{MemoryBlobStorage, MemoryJobsRepo, ScriptedConverter};

const BUCKET: &str = "pressroom-artifacts";
const REGION: &str = "eu-central-1";

struct Harness {
    repo: Arc<MemoryJobsRepo>,
    storage: Arc<MemoryBlobStorage>,
    converter: Arc<ScriptedConverter>,
    pipeline: Arc<FulfillmentPipeline>,
    scratch: TempDir,
}

impl Harness {
    fn new(converter: Arc<ScriptedConverter>) -> Self {
        Self::with_storage(converter, MemoryBlobStorage::new(), Duration::from_secs(60))
    }

    fn with_storage(
        converter: Arc<ScriptedConverter>,
        storage: Arc<MemoryBlobStorage>,
        upload_timeout: Duration,
    ) -> Self {
        let repo = MemoryJobsRepo::new();
        let scratch = TempDir::new().expect("scratch root");
        let pipeline = FulfillmentPipeline::new(
            repo.clone(),
            converter.clone(),
            storage.clone(),
            PipelineSettings {
                region: REGION.to_string(),
                bucket: BUCKET.to_string(),
                upload_timeout,
                scratch_root: scratch.path().to_path_buf(),
            },
        );

        Self {
            repo,
            storage,
            converter,
            pipeline: Arc::new(pipeline),
            scratch,
        }
    }

    async fn submit(&self, target: RenderTarget, body: &str) -> ConversionJob {
        let request = RenderRequest::parse(target, body.as_bytes()).expect("valid request");
        let job = ConversionJob::create(Uuid::new_v4(), &request, 3600, now_utc()).expect("job");
        self.repo.create_job(&job).await.expect("create");
        job
    }

    async fn reload(&self, job: &ConversionJob) -> ConversionJob {
        self.repo.get(job.identifier()).await.expect("job still stored")
    }

    fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch.path())
            .expect("read scratch root")
            .next()
            .is_none()
    }
}

const PDF_BODY: &str = r#"{"source":{"url":"https://example.com/invoice"},"target":{"page_size":"A4"}}"#;

#[tokio::test]
async fn successful_pdf_conversion_uploads_and_succeeds() {
    let harness = Harness::new(ScriptedConverter::succeeding(
        "Loading pages (1/6)\r\n[======>     ] 50%\r\nDone\r\n",
    ));
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;
    let id = job.identifier().to_string();

    let outcome = harness.pipeline.run(&id).await.expect("pipeline run");
    assert_eq!(outcome, PipelineOutcome::Succeeded);

    let stored = harness.reload(&job).await;
    assert_eq!(stored.status(), JobStatus::Succeeded);
    assert!(stored.started_at().is_some());
    assert!(stored.ended_at().is_some());
    let location = stored.storage().expect("storage recorded");
    assert_eq!(location.region, REGION);
    assert_eq!(location.bucket, BUCKET);
    assert_eq!(location.key, format!("{id}/file.pdf"));
    assert!(harness.storage.object(BUCKET, &location.key).await.is_some());

    assert_eq!(
        harness.repo.persisted_statuses().await,
        vec![
            JobStatus::Processing,
            JobStatus::Processing,
            JobStatus::Succeeded
        ]
    );

    let composer = StatusComposer::new(harness.storage.clone(), Duration::from_secs(300));
    let response = composer.compose(&stored).await.expect("compose");
    assert_eq!(response.status, JobStatus::Succeeded);
    assert!(response.file_url.as_deref().is_some_and(|url| !url.is_empty()));
    assert_eq!(
        response.logs,
        vec!["Loading pages (1/6)", "[======>     ] 50%", "Done"]
    );

    let invocations = harness.converter.invocations().await;
    assert_eq!(invocations.len(), 1);
    assert!(invocations[0].args.contains(&"--page-size".to_string()));
    assert_eq!(invocations[0].source_url, "https://example.com/invoice");
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn image_conversion_uses_format_extension() {
    let harness = Harness::new(ScriptedConverter::succeeding("Done\n"));
    let job = harness
        .submit(
            RenderTarget::Image,
            r#"{"source":{"url":"https://example.com"},"target":{"format":"png","width":1024}}"#,
        )
        .await;
    let id = job.identifier().to_string();

    harness.pipeline.run(&id).await.expect("pipeline run");

    let stored = harness.reload(&job).await;
    assert_eq!(
        stored.storage().map(|location| location.key.clone()),
        Some(format!("{id}/file.png"))
    );
}

#[tokio::test]
async fn converter_failure_marks_failed_without_upload() {
    let harness = Harness::new(ScriptedConverter::failing(
        "Loading pages (1/6)\nError: Failed loading page https://example.com/invoice\n",
        1,
    ));
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;

    let outcome = harness
        .pipeline
        .run(&job.identifier().to_string())
        .await
        .expect("pipeline run");
    assert_eq!(outcome, PipelineOutcome::Failed);

    let stored = harness.reload(&job).await;
    assert_eq!(stored.status(), JobStatus::Failed);
    assert!(stored.ended_at().is_some());
    assert!(stored.storage().is_none());
    assert!(stored.logs().contains("Failed loading page"));
    assert_eq!(harness.storage.object_count().await, 0);
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn upload_timeout_marks_failed() {
    let harness = Harness::with_storage(
        ScriptedConverter::succeeding("Done\n"),
        MemoryBlobStorage::slow(Duration::from_secs(5)),
        Duration::from_millis(50),
    );
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;

    let outcome = harness
        .pipeline
        .run(&job.identifier().to_string())
        .await
        .expect("pipeline run");
    assert_eq!(outcome, PipelineOutcome::Failed);

    let stored = harness.reload(&job).await;
    assert_eq!(stored.status(), JobStatus::Failed);
    assert!(stored.storage().is_none());
    assert_eq!(harness.storage.object_count().await, 0);
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn scratch_directory_lives_under_root_and_is_removed() {
    let harness = Harness::new(ScriptedConverter::succeeding("Done\n"));
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;

    harness
        .pipeline
        .run(&job.identifier().to_string())
        .await
        .expect("pipeline run");

    let outputs = harness.converter.output_paths().await;
    let workspace = outputs[0].parent().expect("scratch dir").to_path_buf();
    assert_eq!(workspace.parent(), Some(harness.scratch.path()));
    assert!(
        workspace
            .file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with(&job.identifier().to_string()))
    );
    assert!(!workspace.exists());
}

#[tokio::test]
async fn scratch_directory_is_removed_when_converter_panics() {
    let harness = Harness::new(ScriptedConverter::crashing());
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;
    let id = job.identifier().to_string();

    let pipeline = harness.pipeline.clone();
    let joined = tokio::spawn(async move { pipeline.run(&id).await }).await;
    assert!(joined.is_err_and(|err| err.is_panic()));

    let outputs = harness.converter.output_paths().await;
    assert_eq!(outputs.len(), 1);
    assert!(!outputs[0].exists());
    assert!(harness.scratch_is_empty());

    let stored = harness.reload(&job).await;
    assert_eq!(stored.status(), JobStatus::Processing);
}

#[tokio::test]
async fn failed_log_write_does_not_stop_success() {
    let harness = Harness::new(ScriptedConverter::succeeding("Loading pages (1/6)\nDone\n"));
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;
    harness.repo.fail_update_call(2);

    let outcome = harness
        .pipeline
        .run(&job.identifier().to_string())
        .await
        .expect("pipeline run");
    assert_eq!(outcome, PipelineOutcome::Succeeded);

    let stored = harness.reload(&job).await;
    assert_eq!(stored.status(), JobStatus::Succeeded);
    assert!(stored.logs().contains("Done"));
    assert!(stored.storage().is_some());
    assert_eq!(
        harness.repo.persisted_statuses().await,
        vec![JobStatus::Processing, JobStatus::Succeeded]
    );
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn failed_log_write_does_not_stop_conversion_failure() {
    let harness = Harness::new(ScriptedConverter::failing("Error: page timed out\n", 2));
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;
    harness.repo.fail_update_call(2);

    let outcome = harness
        .pipeline
        .run(&job.identifier().to_string())
        .await
        .expect("pipeline run");
    assert_eq!(outcome, PipelineOutcome::Failed);

    let stored = harness.reload(&job).await;
    assert_eq!(stored.status(), JobStatus::Failed);
    assert!(stored.logs().contains("page timed out"));
    assert_eq!(
        harness.repo.persisted_statuses().await,
        vec![JobStatus::Processing, JobStatus::Failed]
    );
}

#[tokio::test]
async fn failed_final_write_is_a_store_error_and_cleans_scratch() {
    let harness = Harness::new(ScriptedConverter::succeeding("Done\n"));
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;
    harness.repo.fail_update_call(3);

    let err = harness
        .pipeline
        .run(&job.identifier().to_string())
        .await
        .expect_err("final write fails");
    assert!(matches!(err, PipelineError::Store { .. }));

    let stored = harness.reload(&job).await;
    assert_eq!(stored.status(), JobStatus::Processing);
    assert!(harness.scratch_is_empty());
}

#[tokio::test]
async fn unknown_request_type_is_abandoned_and_stays_pending() {
    let harness = Harness::new(ScriptedConverter::succeeding("Done\n"));
    let identifier = Uuid::new_v4();
    harness
        .repo
        .insert(ConversionJob::from_parts(ConversionJobParts {
            identifier,
            created_at: now_utc(),
            started_at: None,
            ended_at: None,
            expires_in: 3600,
            status: JobStatus::Pending,
            logs: String::new(),
            storage: None,
            request_type: "video".to_string(),
            request_data: br#"{"source":{"url":"https://example.com"}}"#.to_vec(),
        }))
        .await;

    let outcome = harness
        .pipeline
        .run(&identifier.to_string())
        .await
        .expect("pipeline run");
    assert_eq!(outcome, PipelineOutcome::Abandoned);

    let stored = harness.repo.get(identifier).await.expect("stored");
    assert_eq!(stored.status(), JobStatus::Pending);
    assert!(harness.converter.invocations().await.is_empty());
}

#[tokio::test]
async fn corrupt_payload_is_abandoned() {
    let harness = Harness::new(ScriptedConverter::succeeding("Done\n"));
    let identifier = Uuid::new_v4();
    harness
        .repo
        .insert(ConversionJob::from_parts(ConversionJobParts {
            identifier,
            created_at: now_utc(),
            started_at: None,
            ended_at: None,
            expires_in: 3600,
            status: JobStatus::Pending,
            logs: String::new(),
            storage: None,
            request_type: "pdf".to_string(),
            request_data: b"{not json".to_vec(),
        }))
        .await;

    let outcome = harness
        .pipeline
        .run(&identifier.to_string())
        .await
        .expect("pipeline run");
    assert_eq!(outcome, PipelineOutcome::Abandoned);
    assert!(harness.repo.persisted_statuses().await.is_empty());
}

#[tokio::test]
async fn missing_job_is_returned_to_the_queue() {
    let harness = Harness::new(ScriptedConverter::succeeding("Done\n"));

    let err = harness
        .pipeline
        .run("00000000-0000-0000-0000-000000000000")
        .await
        .expect_err("missing job");
    assert!(matches!(err, PipelineError::NotFound(_)));
}

#[tokio::test]
async fn redelivered_terminal_job_is_dropped() {
    let harness = Harness::new(ScriptedConverter::succeeding("Done\n"));
    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;
    let id = job.identifier().to_string();

    harness.pipeline.run(&id).await.expect("first delivery");
    let outcome = harness.pipeline.run(&id).await.expect("second delivery");

    assert_eq!(outcome, PipelineOutcome::Abandoned);
    assert_eq!(harness.converter.invocations().await.len(), 1);
    assert_eq!(
        harness.reload(&job).await.status(),
        JobStatus::Succeeded
    );
}

#[tokio::test]
async fn redelivered_processing_job_is_rerun() {
    let harness = Harness::new(ScriptedConverter::succeeding("Done\n"));
    let mut job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;
    job.mark_processing(now_utc()).expect("processing");
    harness.repo.update_job(&job).await.expect("persist");

    let outcome = harness
        .pipeline
        .run(&job.identifier().to_string())
        .await
        .expect("pipeline run");

    assert_eq!(outcome, PipelineOutcome::Succeeded);
    assert_eq!(
        harness.reload(&job).await.status(),
        JobStatus::Succeeded
    );
}

#[tokio::test]
async fn worker_function_maps_outcomes_to_queue_errors() {
    let harness = Harness::new(ScriptedConverter::failing("boom\n", 2));
    let context = JobWorkerContext {
        pipeline: harness.pipeline.clone(),
    };

    let job = harness.submit(RenderTarget::Pdf, PDF_BODY).await;
    let failed = process_convert_job(
        ConvertJobPayload {
            uuid: job.identifier().to_string(),
        },
        Data::new(context.clone()),
    )
    .await;
    assert!(failed.is_ok(), "conversion failures are not retried");

    let missing = process_convert_job(
        ConvertJobPayload {
            uuid: Uuid::new_v4().to_string(),
        },
        Data::new(context.clone()),
    )
    .await;
    assert!(matches!(missing, Err(ApalisError::Failed(_))));

    let repeat = process_convert_job(
        ConvertJobPayload {
            uuid: job.identifier().to_string(),
        },
        Data::new(context),
    )
    .await;
    assert!(matches!(repeat, Err(ApalisError::Abort(_))));
}
