//! Step Executor: runs one external operation and captures its outcome.
//!
//! Every call into an external tool goes through a [`StepExecutor`], which
//! logs the exact command line before running it. In [`ExecMode::Checked`]
//! a non-zero exit becomes an [`ExecutionError`]; in [`ExecMode::Unchecked`]
//! the caller always receives a [`StepResult`] and interprets the exit code
//! itself (used for "does X exist" probes).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::ExecutionError;

/// Exit code reported by unchecked runs when the program could not be started.
pub const SPAWN_FAILURE_EXIT_CODE: i32 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Non-zero exit aborts with [`ExecutionError`].
    Checked,
    /// Never fails; the caller inspects [`StepResult::exit_code`].
    Unchecked,
}

/// A single external command: program, arguments and optional stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<String>,
}

impl Operation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
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

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    /// Shell-like rendering used in logs and error messages.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.command_line())
    }
}

fn quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

/// Immutable record of one executed operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl StepResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined output, for matching tool messages that may land on either stream.
    pub fn output(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }

    fn from_spawn_error(command: String, error: &std::io::Error) -> Self {
        Self {
            command,
            exit_code: SPAWN_FAILURE_EXIT_CODE,
            stdout: String::new(),
            stderr: error.to_string(),
        }
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    /// Run `operation` in `working_dir`.
    ///
    /// In unchecked mode this never returns `Err`.
    async fn execute(
        &self,
        operation: &Operation,
        working_dir: &Path,
        mode: ExecMode,
    ) -> Result<StepResult, ExecutionError>;

    /// Checked run: non-zero exit is an error.
    async fn run(&self, operation: &Operation, working_dir: &Path) -> Result<StepResult, ExecutionError> {
        self.execute(operation, working_dir, ExecMode::Checked).await
    }

    /// Unchecked run: the caller interprets the exit code.
    async fn probe(&self, operation: &Operation, working_dir: &Path) -> StepResult {
        match self.execute(operation, working_dir, ExecMode::Unchecked).await {
            Ok(result) => result,
            Err(e) => StepResult {
                command: operation.command_line(),
                exit_code: match &e {
                    ExecutionError::Failed { exit_code, .. } => *exit_code,
                    ExecutionError::Spawn { .. } => SPAWN_FAILURE_EXIT_CODE,
                },
                stdout: String::new(),
                stderr: e.stderr(),
            },
        }
    }
}

/// Runs operations as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StepExecutor for ProcessExecutor {
    async fn execute(
        &self,
        operation: &Operation,
        working_dir: &Path,
        mode: ExecMode,
    ) -> Result<StepResult, ExecutionError> {
        let command = operation.command_line();
        info!(cwd = %working_dir.display(), "Running: {}", command);

        let mut cmd = Command::new(&operation.program);
        cmd.args(&operation.args)
            .current_dir(working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(if operation.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            });

        let output = match spawn_and_wait(&mut cmd, operation.stdin.as_deref()).await {
            Ok(output) => output,
            Err(e) => {
                return match mode {
                    ExecMode::Checked => Err(ExecutionError::Spawn {
                        operation: command,
                        source: e,
                    }),
                    ExecMode::Unchecked => {
                        debug!("Command could not start (ignoring): {}", e);
                        Ok(StepResult::from_spawn_error(command, &e))
                    }
                };
            }
        };

        let result = StepResult {
            command,
            // Signal-terminated processes have no code.
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.success() {
            match mode {
                ExecMode::Checked => {
                    debug!(exit_code = result.exit_code, "Command failed: {}", result.stderr.trim());
                    return Err(ExecutionError::Failed {
                        operation: result.command,
                        exit_code: result.exit_code,
                        stderr: result.stderr,
                    });
                }
                ExecMode::Unchecked => {
                    debug!(
                        exit_code = result.exit_code,
                        "Command failed (ignoring): {}",
                        result.stderr.trim()
                    );
                }
            }
        }

        Ok(result)
    }
}

async fn spawn_and_wait(
    cmd: &mut Command,
    stdin: Option<&str>,
) -> std::io::Result<std::process::Output> {
    let mut child = cmd.spawn()?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input.as_bytes()).await?;
            // Dropping the pipe closes it so the child sees EOF.
        }
    }

    child.wait_with_output().await
}
