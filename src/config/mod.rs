//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

pub use cli::{
    CliArgs, Command, CommonOverrides, ServeArgs, ServeOverrides, WorkerArgs, WorkerOverrides,
};

use std::{net::SocketAddr, num::NonZeroU32, path::PathBuf, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "pressroom";
const ENV_PREFIX: &str = "PRESSROOM";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_GRACEFUL_SHUTDOWN_SECS: u64 = 30;
const DEFAULT_REQUEST_TTL_SECS: u64 = 86_400;
pub const MIN_REQUEST_TTL_SECS: u64 = 300;
const DEFAULT_NAMESPACE: &str = "pressroom";
const DEFAULT_DB_HTTP_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_DB_JOBS_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_WORKER_CONCURRENCY: u32 = 2;
pub const MAX_WORKER_CONCURRENCY: u32 = 10;
const DEFAULT_WORKER_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_WKHTMLTOPDF_PATH: &str = "wkhtmltopdf";
const DEFAULT_WKHTMLTOIMAGE_PATH: &str = "wkhtmltoimage";
const DEFAULT_UPLOAD_TIMEOUT_SECS: u64 = 60;
const DEFAULT_DOWNLOAD_URL_TTL_SECS: u64 = 300;
/// Upper bound S3 accepts for presigned URLs.
const MAX_DOWNLOAD_URL_TTL_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub database: DatabaseSettings,
    pub worker: WorkerSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
    /// Retention window, in seconds, applied to newly created job records.
    pub request_ttl_seconds: u32,
    pub graceful_shutdown: Duration,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct DatabaseSettings {
    pub url: Option<String>,
    pub namespace: String,
    pub http_max_connections: NonZeroU32,
    pub jobs_max_connections: NonZeroU32,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub concurrency: NonZeroU32,
    pub max_attempts: NonZeroU32,
    pub wkhtmltopdf_path: PathBuf,
    pub wkhtmltoimage_path: PathBuf,
    pub scratch_dir: PathBuf,
    pub converter_timeout: Option<Duration>,
    /// Cuts in-flight jobs this long after a shutdown signal. Unset waits for them.
    pub shutdown_timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct StorageSettings {
    pub region: Option<String>,
    pub bucket: Option<String>,
    pub endpoint: Option<String>,
    pub upload_timeout: Duration,
    pub download_url_ttl: Duration,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Worker(args)) => raw.apply_worker_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    database: RawDatabaseSettings,
    worker: RawWorkerSettings,
    storage: RawStorageSettings,
}

impl RawSettings {
    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.database_url.as_ref() {
            self.database.url = Some(url.clone());
        }
        if let Some(namespace) = overrides.database_namespace.as_ref() {
            self.database.namespace = Some(namespace.clone());
        }
        if let Some(region) = overrides.storage_region.as_ref() {
            self.storage.region = Some(region.clone());
        }
        if let Some(bucket) = overrides.storage_bucket.as_ref() {
            self.storage.bucket = Some(bucket.clone());
        }
        if let Some(endpoint) = overrides.storage_endpoint.as_ref() {
            self.storage.endpoint = Some(endpoint.clone());
        }
        if let Some(seconds) = overrides.graceful_shutdown_seconds {
            self.server.graceful_shutdown_seconds = Some(seconds);
        }
    }

    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        self.apply_common_overrides(&overrides.common);

        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(ttl) = overrides.request_ttl_seconds {
            self.server.request_ttl_seconds = Some(ttl);
        }
        if let Some(max) = overrides.database_http_max_connections {
            self.database.http_max_connections = Some(max);
        }
        if let Some(ttl) = overrides.download_url_ttl_seconds {
            self.storage.download_url_ttl_seconds = Some(ttl);
        }
        if let Some(attempts) = overrides.worker_max_attempts {
            self.worker.max_attempts = Some(attempts);
        }
    }

    fn apply_worker_overrides(&mut self, overrides: &WorkerOverrides) {
        self.apply_common_overrides(&overrides.common);

        if let Some(value) = overrides.worker_concurrency {
            self.worker.concurrency = Some(value);
        }
        if let Some(max) = overrides.database_jobs_max_connections {
            self.database.jobs_max_connections = Some(max);
        }
        if let Some(path) = overrides.wkhtmltopdf_path.as_ref() {
            self.worker.wkhtmltopdf_path = Some(path.clone());
        }
        if let Some(path) = overrides.wkhtmltoimage_path.as_ref() {
            self.worker.wkhtmltoimage_path = Some(path.clone());
        }
        if let Some(dir) = overrides.scratch_dir.as_ref() {
            self.worker.scratch_dir = Some(dir.clone());
        }
        if let Some(seconds) = overrides.converter_timeout_seconds {
            self.worker.converter_timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.shutdown_timeout_seconds {
            self.worker.shutdown_timeout_seconds = Some(seconds);
        }
        if let Some(seconds) = overrides.upload_timeout_seconds {
            self.storage.upload_timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            database,
            worker,
            storage,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            database: build_database_settings(database)?,
            worker: build_worker_settings(worker)?,
            storage: build_storage_settings(storage)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());

    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    let ttl = server
        .request_ttl_seconds
        .unwrap_or(DEFAULT_REQUEST_TTL_SECS);
    if ttl < MIN_REQUEST_TTL_SECS {
        return Err(LoadError::invalid(
            "server.request_ttl_seconds",
            format!("must be at least {MIN_REQUEST_TTL_SECS} seconds"),
        ));
    }
    let request_ttl_seconds = u32::try_from(ttl).map_err(|_| {
        LoadError::invalid(
            "server.request_ttl_seconds",
            "value exceeds supported range for u32",
        )
    })?;

    let graceful_secs = server
        .graceful_shutdown_seconds
        .unwrap_or(DEFAULT_GRACEFUL_SHUTDOWN_SECS);
    if graceful_secs == 0 {
        return Err(LoadError::invalid(
            "server.graceful_shutdown_seconds",
            "must be greater than zero",
        ));
    }

    Ok(ServerSettings {
        addr,
        request_ttl_seconds,
        graceful_shutdown: Duration::from_secs(graceful_secs),
    })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_database_settings(database: RawDatabaseSettings) -> Result<DatabaseSettings, LoadError> {
    let url = non_blank(database.url);

    let namespace = match database.namespace {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid(
                    "database.namespace",
                    "must not be empty",
                ));
            }
            trimmed.to_string()
        }
        None => DEFAULT_NAMESPACE.to_string(),
    };

    let http_value = database
        .http_max_connections
        .unwrap_or(DEFAULT_DB_HTTP_MAX_CONNECTIONS);
    let jobs_value = database
        .jobs_max_connections
        .unwrap_or(DEFAULT_DB_JOBS_MAX_CONNECTIONS);

    Ok(DatabaseSettings {
        url,
        namespace,
        http_max_connections: non_zero_u32(http_value.into(), "database.http_max_connections")?,
        jobs_max_connections: non_zero_u32(jobs_value.into(), "database.jobs_max_connections")?,
    })
}

fn build_worker_settings(worker: RawWorkerSettings) -> Result<WorkerSettings, LoadError> {
    let concurrency_value = worker.concurrency.unwrap_or(DEFAULT_WORKER_CONCURRENCY);
    if !(1..=MAX_WORKER_CONCURRENCY).contains(&concurrency_value) {
        return Err(LoadError::invalid(
            "worker.concurrency",
            format!("must be between 1 and {MAX_WORKER_CONCURRENCY}"),
        ));
    }
    let concurrency = non_zero_u32(concurrency_value.into(), "worker.concurrency")?;

    let max_attempts_value = worker.max_attempts.unwrap_or(DEFAULT_WORKER_MAX_ATTEMPTS);
    let max_attempts = non_zero_u32(max_attempts_value.into(), "worker.max_attempts")?;
    i32::try_from(max_attempts.get()).map_err(|_| {
        LoadError::invalid(
            "worker.max_attempts",
            "value exceeds supported range for i32",
        )
    })?;

    let wkhtmltopdf_path = executable_path(
        worker.wkhtmltopdf_path,
        DEFAULT_WKHTMLTOPDF_PATH,
        "worker.wkhtmltopdf_path",
    )?;
    let wkhtmltoimage_path = executable_path(
        worker.wkhtmltoimage_path,
        DEFAULT_WKHTMLTOIMAGE_PATH,
        "worker.wkhtmltoimage_path",
    )?;

    let scratch_dir = worker.scratch_dir.unwrap_or_else(std::env::temp_dir);
    if scratch_dir.as_os_str().is_empty() {
        return Err(LoadError::invalid(
            "worker.scratch_dir",
            "path must not be empty",
        ));
    }

    let converter_timeout = match worker.converter_timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "worker.converter_timeout_seconds",
                "must be greater than zero when set",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    let shutdown_timeout = match worker.shutdown_timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "worker.shutdown_timeout_seconds",
                "must be greater than zero when set",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(WorkerSettings {
        concurrency,
        max_attempts,
        wkhtmltopdf_path,
        wkhtmltoimage_path,
        scratch_dir,
        converter_timeout,
        shutdown_timeout,
    })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let upload_secs = storage
        .upload_timeout_seconds
        .unwrap_or(DEFAULT_UPLOAD_TIMEOUT_SECS);
    if upload_secs == 0 {
        return Err(LoadError::invalid(
            "storage.upload_timeout_seconds",
            "must be greater than zero",
        ));
    }

    let download_secs = storage
        .download_url_ttl_seconds
        .unwrap_or(DEFAULT_DOWNLOAD_URL_TTL_SECS);
    if download_secs == 0 || download_secs > MAX_DOWNLOAD_URL_TTL_SECS {
        return Err(LoadError::invalid(
            "storage.download_url_ttl_seconds",
            format!("must be between 1 and {MAX_DOWNLOAD_URL_TTL_SECS}"),
        ));
    }

    Ok(StorageSettings {
        region: non_blank(storage.region),
        bucket: non_blank(storage.bucket),
        endpoint: non_blank(storage.endpoint),
        upload_timeout: Duration::from_secs(upload_secs),
        download_url_ttl: Duration::from_secs(download_secs),
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
    request_ttl_seconds: Option<u64>,
    graceful_shutdown_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDatabaseSettings {
    url: Option<String>,
    namespace: Option<String>,
    http_max_connections: Option<u32>,
    jobs_max_connections: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawWorkerSettings {
    concurrency: Option<u32>,
    max_attempts: Option<u32>,
    wkhtmltopdf_path: Option<PathBuf>,
    wkhtmltoimage_path: Option<PathBuf>,
    scratch_dir: Option<PathBuf>,
    converter_timeout_seconds: Option<u64>,
    shutdown_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    region: Option<String>,
    bucket: Option<String>,
    endpoint: Option<String>,
    upload_timeout_seconds: Option<u64>,
    download_url_ttl_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}

fn non_zero_u32(value: u64, key: &'static str) -> Result<NonZeroU32, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    let value_u32: u32 = value
        .try_into()
        .map_err(|_| LoadError::invalid(key, "value exceeds supported range for u32"))?;
    NonZeroU32::new(value_u32).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

fn executable_path(
    value: Option<PathBuf>,
    default: &str,
    key: &'static str,
) -> Result<PathBuf, LoadError> {
    let path = value.unwrap_or_else(|| PathBuf::from(default));
    if path.as_os_str().is_empty() {
        return Err(LoadError::invalid(key, "path must not be empty"));
    }
    Ok(path)
}
