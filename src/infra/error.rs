use thiserror::Error;

/// Failures while bootstrapping or running the service processes.
#[derive(Debug, Error)]
pub enum InfraError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("`{key}` is not configured")]
    MissingSetting { key: &'static str },
    #[error("no converter answered `--version` (tried {tried})")]
    NoConverter { tried: String },
    #[error("worker monitor stopped with an error: {0}")]
    Monitor(#[source] std::io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn missing(key: &'static str) -> Self {
        Self::MissingSetting { key }
    }

    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
