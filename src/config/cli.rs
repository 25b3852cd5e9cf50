use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};

/// Command-line arguments for the pressroom binary.
#[derive(Debug, Parser)]
#[command(
    name = "pressroom",
    version,
    about = "Asynchronous web page to PDF/image conversion service"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "PRESSROOM_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP API accepting render requests.
    Serve(Box<ServeArgs>),
    /// Run the conversion workers.
    Worker(Box<WorkerArgs>),
}

impl Command {
    pub fn role(&self) -> &'static str {
        match self {
            Command::Serve(_) => "serve",
            Command::Worker(_) => "worker",
        }
    }
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerArgs {
    #[command(flatten)]
    pub overrides: WorkerOverrides,
}

/// Overrides accepted by every subcommand.
#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the namespace that prefixes records and queue names.
    #[arg(long = "database-namespace", value_name = "NAME")]
    pub database_namespace: Option<String>,

    /// Override the blob storage region.
    #[arg(long = "storage-region", value_name = "REGION")]
    pub storage_region: Option<String>,

    /// Override the blob storage bucket.
    #[arg(long = "storage-bucket", value_name = "BUCKET")]
    pub storage_bucket: Option<String>,

    /// Override the blob storage endpoint (S3-compatible services).
    #[arg(long = "storage-endpoint", value_name = "URL", value_hint = ValueHint::Url)]
    pub storage_endpoint: Option<String>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override how long job records are retained, in seconds.
    #[arg(long = "server-request-ttl-seconds", value_name = "SECONDS")]
    pub request_ttl_seconds: Option<u64>,

    /// Override the HTTP database pool size.
    #[arg(long = "database-http-max-connections", value_name = "COUNT")]
    pub database_http_max_connections: Option<u32>,

    /// Override the lifetime of presigned download URLs.
    #[arg(long = "storage-download-url-ttl-seconds", value_name = "SECONDS")]
    pub download_url_ttl_seconds: Option<u64>,

    /// Override the attempt budget given to newly enqueued jobs.
    #[arg(long = "worker-max-attempts", value_name = "COUNT")]
    pub worker_max_attempts: Option<u32>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct WorkerOverrides {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the number of jobs processed in parallel (1-10).
    #[arg(long = "worker-concurrency", value_name = "COUNT")]
    pub worker_concurrency: Option<u32>,

    /// Override the jobs database pool size.
    #[arg(long = "database-jobs-max-connections", value_name = "COUNT")]
    pub database_jobs_max_connections: Option<u32>,

    /// Override the wkhtmltopdf executable path.
    #[arg(long = "worker-wkhtmltopdf-path", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub wkhtmltopdf_path: Option<PathBuf>,

    /// Override the wkhtmltoimage executable path.
    #[arg(long = "worker-wkhtmltoimage-path", value_name = "PATH", value_hint = ValueHint::ExecutablePath)]
    pub wkhtmltoimage_path: Option<PathBuf>,

    /// Override the directory under which per-job scratch directories are created.
    #[arg(long = "worker-scratch-dir", value_name = "PATH", value_hint = ValueHint::DirPath)]
    pub scratch_dir: Option<PathBuf>,

    /// Kill converters that run longer than this many seconds.
    #[arg(long = "worker-converter-timeout-seconds", value_name = "SECONDS")]
    pub converter_timeout_seconds: Option<u64>,

    /// Abandon in-flight jobs this many seconds after a shutdown signal.
    #[arg(long = "worker-shutdown-timeout-seconds", value_name = "SECONDS")]
    pub shutdown_timeout_seconds: Option<u64>,

    /// Override the upload deadline.
    #[arg(long = "storage-upload-timeout-seconds", value_name = "SECONDS")]
    pub upload_timeout_seconds: Option<u64>,
}
