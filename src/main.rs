use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use apalis_sql::{Config as ApalisSqlConfig, postgres::PostgresStorage};
use pressroom::{
    application::{
        conversions::ConversionService,
        error::AppError,
        jobs::{
            FulfillmentPipeline, JobWorkerContext, PipelineSettings, PurgeContext,
            convert_queue_name, process_convert_job, process_purge_expired_job,
            purge_expired_schedule, worker_monitor,
        },
        repos::ConversionJobsRepo,
        status::StatusComposer,
        storage::BlobStorage,
    },
    config,
    infra::{
        converter::WkhtmltoxConverter,
        db::{PostgresJobQueue, PostgresRepositories},
        error::InfraError,
        http::{self, ApiState},
        storage::S3BlobStorage,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging, command.role()).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Worker(_) => run_worker(settings).await,
    }
}

async fn init_repositories(
    settings: &config::Settings,
    max_connections: u32,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or(InfraError::missing("database.url"))?;

    let pool = PostgresRepositories::connect(database_url, max_connections)
        .await
        .map_err(InfraError::from)?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;

    Ok(Arc::new(PostgresRepositories::new(
        pool,
        settings.database.namespace.clone(),
    )))
}

fn required_storage_setting<'a>(
    value: Option<&'a String>,
    key: &'static str,
) -> Result<&'a str, AppError> {
    value
        .map(String::as_str)
        .ok_or_else(|| AppError::from(InfraError::missing(key)))
}

async fn init_blob_storage(settings: &config::Settings) -> Result<Arc<dyn BlobStorage>, AppError> {
    let region = required_storage_setting(settings.storage.region.as_ref(), "storage.region")?;
    let storage = S3BlobStorage::connect(region, settings.storage.endpoint.as_deref()).await;
    Ok(Arc::new(storage))
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories =
        init_repositories(&settings, settings.database.http_max_connections.get()).await?;
    let storage = init_blob_storage(&settings).await?;

    let max_attempts = i32::try_from(settings.worker.max_attempts.get())
        .map_err(|_| AppError::validation("worker.max_attempts exceeds supported range"))?;
    let queue = PostgresJobQueue::new(
        repositories.pool().clone(),
        convert_queue_name(&settings.database.namespace),
        max_attempts,
    );

    let composer = StatusComposer::new(storage, settings.storage.download_url_ttl);
    let conversions = ConversionService::new(
        repositories.clone(),
        Arc::new(queue),
        composer,
        settings.server.request_ttl_seconds,
    );
    let router = http::build_router(ApiState {
        conversions: Arc::new(conversions),
    });

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "pressroom::serve",
        addr = %settings.server.addr,
        namespace = settings.database.namespace.as_str(),
        "HTTP API listening"
    );

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => return flatten_server_result(result),
        _ = shutdown_signal() => {}
    }

    let _ = stop_tx.send(());
    match tokio::time::timeout(settings.server.graceful_shutdown, &mut server).await {
        Ok(result) => flatten_server_result(result),
        Err(_) => {
            warn!(
                target = "pressroom::serve",
                timeout_secs = settings.server.graceful_shutdown.as_secs(),
                "In-flight requests did not drain before the shutdown deadline"
            );
            server.abort();
            Ok(())
        }
    }
}

fn flatten_server_result(
    result: Result<std::io::Result<()>, tokio::task::JoinError>,
) -> Result<(), AppError> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(AppError::unexpected(format!("server error: {err}"))),
        Err(err) => Err(AppError::unexpected(format!("server task failed: {err}"))),
    }
}

async fn run_worker(settings: config::Settings) -> Result<(), AppError> {
    let repositories =
        init_repositories(&settings, settings.database.jobs_max_connections.get()).await?;
    let storage = init_blob_storage(&settings).await?;
    let region = required_storage_setting(settings.storage.region.as_ref(), "storage.region")?;
    let bucket = required_storage_setting(settings.storage.bucket.as_ref(), "storage.bucket")?;

    let converter = WkhtmltoxConverter::from_settings(&settings.worker);
    if converter.probe().await.is_empty() {
        return Err(AppError::from(InfraError::NoConverter {
            tried: format!(
                "{}, {}",
                settings.worker.wkhtmltopdf_path.display(),
                settings.worker.wkhtmltoimage_path.display()
            ),
        }));
    }

    tokio::fs::create_dir_all(&settings.worker.scratch_dir)
        .await
        .map_err(InfraError::from)?;

    let jobs: Arc<dyn ConversionJobsRepo> = repositories.clone();
    let pipeline = FulfillmentPipeline::new(
        jobs.clone(),
        Arc::new(converter),
        storage,
        PipelineSettings {
            region: region.to_string(),
            bucket: bucket.to_string(),
            upload_timeout: settings.storage.upload_timeout,
            scratch_root: settings.worker.scratch_dir.clone(),
        },
    );

    let queue_name = convert_queue_name(&settings.database.namespace);
    let convert_storage = PostgresStorage::new_with_config(
        repositories.pool().clone(),
        ApalisSqlConfig::new(&queue_name),
    );
    let schedule = purge_expired_schedule()
        .map_err(|err| AppError::unexpected(format!("invalid purge schedule: {err}")))?;

    let convert_worker = WorkerBuilder::new("convert-worker")
        .concurrency(settings.worker.concurrency.get() as usize)
        .data(JobWorkerContext {
            pipeline: Arc::new(pipeline),
        })
        .backend(convert_storage)
        .build_fn(process_convert_job);
    let purge_worker = WorkerBuilder::new("purge-expired-worker")
        .data(PurgeContext { jobs })
        .backend(CronStream::new(schedule))
        .build_fn(process_purge_expired_job);

    info!(
        target = "pressroom::worker",
        queue = queue_name.as_str(),
        concurrency = settings.worker.concurrency.get(),
        scratch_dir = %settings.worker.scratch_dir.display(),
        shutdown_timeout_secs = settings.worker.shutdown_timeout.map(|limit| limit.as_secs()),
        "Conversion workers starting"
    );

    worker_monitor(settings.worker.shutdown_timeout)
        .register(convert_worker)
        .register(purge_worker)
        .run_with_signal(async {
            shutdown_signal().await;
            Ok(())
        })
        .await
        .map_err(InfraError::Monitor)?;

    info!(target = "pressroom::worker", "Conversion workers stopped");
    Ok(())
}

/// Resolve on SIGINT or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!(target = "pressroom::shutdown", "Shutdown signal received");
}
