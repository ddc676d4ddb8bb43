//! Typed runner for external tool invocations.
//!
//! Every ffmpeg/ffprobe call in the pipeline goes through [`ToolCommand`]
//! so all call sites share one timeout policy and one stderr truncation
//! policy. Tools run as separate OS processes; a wall-clock timeout kills
//! the child instead of blocking the caller.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use clipflow_core::{truncate_diagnostic, MAX_DIAGNOSTIC_LEN};

/// How an external tool invocation went wrong. Call sites map these onto
/// the pipeline taxonomy (probe vs transcode vs thumbnail).
#[derive(Debug, thiserror::Error)]
pub enum ToolFailure {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("{program} exited with {status:?}: {stderr}")]
    NonZero {
        program: String,
        status: Option<i32>,
        /// Truncated to [`MAX_DIAGNOSTIC_LEN`].
        stderr: String,
    },
}

pub struct ToolOutput {
    pub stdout: Vec<u8>,
    /// Truncated to [`MAX_DIAGNOSTIC_LEN`].
    pub stderr: String,
}

/// Builder for one external tool invocation.
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn arg_path(mut self, path: &Path) -> Self {
        self.args.push(path.to_string_lossy().into_owned());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run the tool to completion, capturing stdout and (truncated) stderr.
    /// The child is killed if the timeout elapses or the future is dropped.
    #[tracing::instrument(skip(self), fields(program = %self.program))]
    pub async fn run(self) -> Result<ToolOutput, ToolFailure> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(args = ?self.args, timeout = ?self.timeout, "Running external tool");

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ToolFailure::Spawn {
                    program: self.program,
                    source,
                })
            }
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "External tool timed out, child killed");
                return Err(ToolFailure::TimedOut {
                    program: self.program,
                    timeout: self.timeout,
                });
            }
        };

        let stderr = truncate_diagnostic(
            String::from_utf8_lossy(&output.stderr).trim(),
            MAX_DIAGNOSTIC_LEN,
        );

        if !output.status.success() {
            return Err(ToolFailure::NonZero {
                program: self.program,
                status: output.status.code(),
                stderr,
            });
        }

        Ok(ToolOutput {
            stdout: output.stdout,
            stderr,
        })
    }
}
