//! External converter adapter.
//!
//! Text extraction is delegated to an external program (calibre's `ebook-convert` by default),
//! invoked as `<command> [args...] <input> <output>`. The program decides the output format from
//! the output file extension, so the handler always asks for a `.txt` path.
//!
//! The child runs with `kill_on_drop`: if the request future is dropped (client went away,
//! server shutting down) the process is killed instead of being left to finish on its own.

use async_trait::async_trait;
use std::ffi::OsString;
use std::io::Read;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

use crate::config::ConverterConfig;

#[derive(Error, Debug)]
pub enum ConversionError {
    /// The program could not be started at all (not on PATH, not executable)
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Started, but waiting for it or collecting its output failed
    #[error("failed waiting for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}, output: {output}")]
    Failed { program: String, status: ExitStatus, output: String },

    #[error("'{program}' did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },
}

/// Converts the file at `input` and writes the result to `output`
#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, input: &Path, output: &Path) -> Result<(), ConversionError>;
}

/// Runs the configured e-book conversion command as a child process
#[derive(Debug, Clone)]
pub struct EbookConverter {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl EbookConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    /// Full argument vector for one conversion, program first
    pub fn command_line(&self, input: &Path, output: &Path) -> Vec<OsString> {
        let mut cmd = Vec::with_capacity(self.args.len() + 3);
        cmd.push(OsString::from(&self.program));
        cmd.extend(self.args.iter().map(OsString::from));
        cmd.push(input.as_os_str().to_owned());
        cmd.push(output.as_os_str().to_owned());
        cmd
    }
}

impl From<&ConverterConfig> for EbookConverter {
    fn from(config: &ConverterConfig) -> Self {
        Self::new(config.command.clone(), config.args.clone(), config.timeout)
    }
}

#[async_trait]
impl Extractor for EbookConverter {
    #[tracing::instrument(skip(self), fields(program = %self.program))]
    async fn extract(&self, input: &Path, output: &Path) -> Result<(), ConversionError> {
        let cmd = self.command_line(input, output);
        tracing::debug!(command = ?cmd, "Starting conversion");

        let spawn_err = |source| ConversionError::Spawn {
            program: self.program.clone(),
            source,
        };

        // stdout and stderr share one pipe so the captured output keeps the converter's ordering
        let (mut reader, writer) = std::io::pipe().map_err(spawn_err)?;
        let stderr_writer = writer.try_clone().map_err(spawn_err)?;

        // The Command owns the parent's copies of the write end; it must be gone before reading
        // can see EOF, so it only lives for this statement
        let mut child = Command::new(&cmd[0])
            .args(&cmd[1..])
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr_writer)
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        let captured = tokio::task::spawn_blocking(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer).map(|_| buffer)
        });

        let run = async {
            let status = child.wait().await?;
            let output = captured.await.map_err(std::io::Error::other)??;
            Ok::<_, std::io::Error>((status, output))
        };

        // On timeout `child` is dropped at the end of this function, which kills it
        let (status, output) = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result.map_err(|source| ConversionError::Wait {
                program: self.program.clone(),
                source,
            })?,
            Err(_) => {
                return Err(ConversionError::TimedOut {
                    program: self.program.clone(),
                    timeout: self.timeout,
                });
            }
        };

        if status.success() {
            tracing::debug!(%status, "Conversion finished");
            return Ok(());
        }

        Err(ConversionError::Failed {
            program: self.program.clone(),
            status,
            output: String::from_utf8_lossy(&output).into_owned(),
        })
    }
}
