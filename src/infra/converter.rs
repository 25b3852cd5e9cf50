//! `wkhtmltopdf` / `wkhtmltoimage` subprocess adapter.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    process::{Output, Stdio},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{info, warn};

use crate::{
    application::converter::{Converter, ConverterError, ConverterOutput},
    config::WorkerSettings,
    domain::render::{ConverterInvocation, ConverterProgram},
};

#[derive(Debug, Clone)]
pub struct WkhtmltoxConverter {
    wkhtmltopdf_path: PathBuf,
    wkhtmltoimage_path: PathBuf,
    timeout: Option<Duration>,
}

impl WkhtmltoxConverter {
    pub fn new(
        wkhtmltopdf_path: PathBuf,
        wkhtmltoimage_path: PathBuf,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            wkhtmltopdf_path,
            wkhtmltoimage_path,
            timeout,
        }
    }

    pub fn from_settings(settings: &WorkerSettings) -> Self {
        Self::new(
            settings.wkhtmltopdf_path.clone(),
            settings.wkhtmltoimage_path.clone(),
            settings.converter_timeout,
        )
    }

    fn binary(&self, program: ConverterProgram) -> &Path {
        match program {
            ConverterProgram::Wkhtmltopdf => &self.wkhtmltopdf_path,
            ConverterProgram::Wkhtmltoimage => &self.wkhtmltoimage_path,
        }
    }

    /// Ask each binary for its version, returning the programs that answered.
    pub async fn probe(&self) -> Vec<ConverterProgram> {
        let mut available = Vec::new();
        for program in [ConverterProgram::Wkhtmltopdf, ConverterProgram::Wkhtmltoimage] {
            let binary = self.binary(program);
            let result = Command::new(binary)
                .arg("--version")
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .output()
                .await;

            match result {
                Ok(output) if output.status.success() => {
                    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
                    info!(
                        target = "infra::converter",
                        program = program.as_str(),
                        path = %binary.display(),
                        version = version.as_str(),
                        "Converter available"
                    );
                    available.push(program);
                }
                Ok(output) => {
                    warn!(
                        target = "infra::converter",
                        program = program.as_str(),
                        path = %binary.display(),
                        exit_code = output.status.code().map(i64::from).unwrap_or(-1),
                        "Converter version probe failed"
                    );
                }
                Err(err) => {
                    warn!(
                        target = "infra::converter",
                        program = program.as_str(),
                        path = %binary.display(),
                        error = %err,
                        "Converter not available"
                    );
                }
            }
        }
        available
    }
}

#[async_trait]
impl Converter for WkhtmltoxConverter {
    async fn run(&self, invocation: &ConverterInvocation) -> ConverterOutput {
        let program = invocation.program.as_str();
        let started_at = Instant::now();

        let mut command = Command::new(self.binary(invocation.program));
        command
            .args(&invocation.args)
            .arg(&invocation.source_url)
            .arg(&invocation.output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, command.output()).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(
                        target = "infra::converter",
                        program,
                        elapsed_ms = started_at.elapsed().as_millis() as u64,
                        "Converter exceeded its deadline and was killed"
                    );
                    return ConverterOutput {
                        transcript: String::new(),
                        result: Err(ConverterError::TimedOut {
                            program: program.to_string(),
                            timeout: limit,
                        }),
                    };
                }
            },
            None => command.output().await,
        };

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                warn!(
                    target = "infra::converter",
                    program,
                    error = %err,
                    "Failed to spawn converter"
                );
                let error = if err.kind() == ErrorKind::NotFound {
                    ConverterError::NotFound {
                        program: program.to_string(),
                        source: err,
                    }
                } else {
                    ConverterError::Spawn {
                        program: program.to_string(),
                        source: err,
                    }
                };
                return ConverterOutput {
                    transcript: String::new(),
                    result: Err(error),
                };
            }
        };

        let transcript = transcript(&output);
        let result = if output.status.success() {
            info!(
                target = "infra::converter",
                program,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                "Converter finished"
            );
            Ok(())
        } else {
            let exit_code = output.status.code();
            warn!(
                target = "infra::converter",
                program,
                elapsed_ms = started_at.elapsed().as_millis() as u64,
                exit_code = exit_code.map(i64::from).unwrap_or(-1),
                "Converter exited with failure"
            );
            Err(ConverterError::Exit {
                program: program.to_string(),
                exit_code,
            })
        };

        ConverterOutput { transcript, result }
    }
}

/// stdout followed by stderr; wkhtmltox reports progress on stderr.
fn transcript(output: &Output) -> String {
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    combined
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::{fs, os::unix::fs::PermissionsExt};
    use tempfile::TempDir;

    fn make_executable(path: &Path) {
        let mut perms = fs::metadata(path).expect("metadata").permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms).expect("set perms");
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).expect("write script");
        make_executable(&path);
        path
    }

    fn invocation(program: ConverterProgram, dir: &Path, args: &[&str]) -> ConverterInvocation {
        ConverterInvocation {
            program,
            args: args.iter().map(|arg| arg.to_string()).collect(),
            source_url: "https://example.com/".to_string(),
            output_path: dir.join("file.pdf"),
        }
    }

    #[tokio::test]
    async fn passes_flags_source_and_output_in_order() {
        let dir = TempDir::new().expect("temp dir");
        let args_path = dir.path().join("args.log");
        let script = write_script(
            dir.path(),
            "fake-wkhtmltopdf",
            &format!(
                r#"#!/bin/sh
echo "$@" > "{args_file}"
for last; do :; done
echo "%PDF-1.4" > "$last"
echo "Loading pages (1/6)" >&2
echo "Done" >&2
"#,
                args_file = args_path.display()
            ),
        );
        let converter = WkhtmltoxConverter::new(script, PathBuf::from("/nonexistent"), None);

        let output = converter
            .run(&invocation(
                ConverterProgram::Wkhtmltopdf,
                dir.path(),
                &["--orientation", "Landscape"],
            ))
            .await;

        output.result.expect("conversion succeeded");
        assert!(output.transcript.contains("Loading pages (1/6)"));
        assert!(output.transcript.contains("Done"));

        let args = fs::read_to_string(&args_path).expect("read args");
        assert_eq!(
            args.trim(),
            format!(
                "--orientation Landscape https://example.com/ {}",
                dir.path().join("file.pdf").display()
            )
        );
        assert!(dir.path().join("file.pdf").exists());
    }

    #[tokio::test]
    async fn non_zero_exit_keeps_transcript() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            dir.path(),
            "fake-wkhtmltoimage",
            r#"#!/bin/sh
echo "Error: Failed loading page https://example.com/" >&2
exit 1
"#,
        );
        let converter = WkhtmltoxConverter::new(PathBuf::from("/nonexistent"), script, None);

        let output = converter
            .run(&invocation(ConverterProgram::Wkhtmltoimage, dir.path(), &[]))
            .await;

        match output.result {
            Err(ConverterError::Exit { program, exit_code }) => {
                assert_eq!(program, "wkhtmltoimage");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(output.transcript.contains("Failed loading page"));
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let dir = TempDir::new().expect("temp dir");
        let converter = WkhtmltoxConverter::new(
            dir.path().join("missing-wkhtmltopdf"),
            dir.path().join("missing-wkhtmltoimage"),
            None,
        );

        let output = converter
            .run(&invocation(ConverterProgram::Wkhtmltopdf, dir.path(), &[]))
            .await;
        assert!(matches!(
            output.result,
            Err(ConverterError::NotFound { .. })
        ));
        assert!(converter.probe().await.is_empty());
    }

    #[tokio::test]
    async fn deadline_kills_slow_converter() {
        let dir = TempDir::new().expect("temp dir");
        let script = write_script(
            dir.path(),
            "slow-wkhtmltopdf",
            "#!/bin/sh\nsleep 30\n",
        );
        let converter = WkhtmltoxConverter::new(
            script,
            PathBuf::from("/nonexistent"),
            Some(Duration::from_millis(200)),
        );

        let started = Instant::now();
        let output = converter
            .run(&invocation(ConverterProgram::Wkhtmltopdf, dir.path(), &[]))
            .await;

        assert!(matches!(
            output.result,
            Err(ConverterError::TimedOut { .. })
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
