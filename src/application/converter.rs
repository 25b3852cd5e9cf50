//! Converter port and request fulfillment.

use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::domain::render::{ConverterInvocation, RenderRequest};

#[derive(Debug, Error)]
pub enum ConverterError {
    #[error("`{program}` binary not found: {source}")]
    NotFound {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("`{program}` exited with status {exit_code:?}")]
    Exit {
        program: String,
        exit_code: Option<i32>,
    },
    #[error("`{program}` did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
    #[error("`{program}` reported success but produced no file at {}", path.display())]
    MissingOutput { program: String, path: PathBuf },
}

/// Outcome of one external converter run. The transcript is kept even on failure.
#[derive(Debug)]
pub struct ConverterOutput {
    pub transcript: String,
    pub result: Result<(), ConverterError>,
}

#[async_trait]
pub trait Converter: Send + Sync {
    async fn run(&self, invocation: &ConverterInvocation) -> ConverterOutput;
}

/// Result of fulfilling a render request: the converter transcript plus the output file.
#[derive(Debug)]
pub struct Fulfillment {
    pub logs: String,
    pub output: Result<PathBuf, ConverterError>,
}

impl RenderRequest {
    /// Run the matching converter and write the artifact into `output_dir`.
    pub async fn fulfill(&self, converter: &dyn Converter, output_dir: &Path) -> Fulfillment {
        let invocation = self.invocation(output_dir);
        debug!(
            target = "application::converter",
            program = invocation.program.as_str(),
            args = ?invocation.args,
            "Invoking converter"
        );

        let ConverterOutput { transcript, result } = converter.run(&invocation).await;
        let output = match result {
            Ok(()) => match tokio::fs::metadata(&invocation.output_path).await {
                Ok(meta) if meta.is_file() => Ok(invocation.output_path),
                _ => Err(ConverterError::MissingOutput {
                    program: invocation.program.as_str().to_string(),
                    path: invocation.output_path,
                }),
            },
            Err(err) => Err(err),
        };

        Fulfillment {
            logs: transcript,
            output,
        }
    }
}
