//! Engine invocations inside a running sandbox instance.
//!
//! Commands run through the runtime's exec API with stdout and stderr
//! attached. The combined output is captured in full: the document engine
//! does not report failures through its exit status, so callers inspect the
//! text instead.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, CreateExecResults, StartExecOptions, StartExecResults};
use bollard::{Docker, errors::Error as BollardError};
use futures_util::StreamExt;
use tokio::time::sleep;

use super::sandbox::SandboxInstance;
use crate::error::{ContainerError, TangleboxError};

const EXEC_INSPECT_POLL_INTERVAL_MS: u64 = 100;

const ATTACHED_START: StartExecOptions = StartExecOptions {
    detach: false,
    tty: false,
    output_capacity: None,
};

/// Boxed future type returned by [`ContainerExecClient::create_exec`].
pub type CreateExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<CreateExecResults, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`ContainerExecClient::start_exec`].
pub type StartExecFuture<'a> =
    Pin<Box<dyn Future<Output = Result<StartExecResults, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`ContainerExecClient::inspect_exec`].
pub type InspectExecFuture<'a> = Pin<
    Box<
        dyn Future<Output = Result<bollard::models::ExecInspectResponse, BollardError>> + Send + 'a,
    >,
>;

/// Behaviour required to run and inspect exec sessions.
pub trait ContainerExecClient {
    /// Create an exec session in a running container.
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_>;

    /// Start a previously created exec session.
    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_>;

    /// Inspect an exec session for running status and exit code.
    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_>;
}

impl ContainerExecClient for Docker {
    fn create_exec(
        &self,
        container_id: &str,
        options: CreateExecOptions<String>,
    ) -> CreateExecFuture<'_> {
        let container_id_owned = String::from(container_id);
        Box::pin(async move { Self::create_exec(self, &container_id_owned, options).await })
    }

    fn start_exec(&self, exec_id: &str, options: Option<StartExecOptions>) -> StartExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::start_exec(self, &exec_id_owned, options).await })
    }

    fn inspect_exec(&self, exec_id: &str) -> InspectExecFuture<'_> {
        let exec_id_owned = String::from(exec_id);
        Box::pin(async move { Self::inspect_exec(self, &exec_id_owned).await })
    }
}

/// Captured result of one engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutput {
    /// Interleaved stdout and stderr bytes, in arrival order.
    pub output: Vec<u8>,
    /// Exit code reported by the runtime, when it reported one.
    pub exit_code: Option<i64>,
}

impl EngineOutput {
    /// Return the output decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Runs commands inside sandbox instances through an explicit client.
#[derive(Debug)]
pub struct CommandExecutor<'c, C> {
    client: &'c C,
}

impl<'c, C: ContainerExecClient> CommandExecutor<'c, C> {
    /// Create an executor backed by `client`.
    #[must_use]
    pub const fn new(client: &'c C) -> Self {
        Self { client }
    }

    /// Run `command` in `instance` and capture its output.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ExecFailed` when the command could not be run
    /// at all, for example because the instance is gone or the runtime is
    /// unreachable. A command that runs and prints an error is not an error
    /// here.
    pub async fn run(
        &self,
        instance: &SandboxInstance,
        command: &[String],
    ) -> Result<EngineOutput, TangleboxError> {
        if command.first().is_none_or(|program| program.trim().is_empty()) {
            return Err(exec_failed(instance.name(), "command executable must not be empty"));
        }

        let created = self
            .client
            .create_exec(instance.id(), build_create_exec_options(command))
            .await
            .map_err(|error| exec_failed(instance.name(), format!("create exec failed: {error}")))?;

        let started = self
            .client
            .start_exec(&created.id, Some(ATTACHED_START))
            .await
            .map_err(|error| exec_failed(instance.name(), format!("start exec failed: {error}")))?;

        let StartExecResults::Attached { mut output, .. } = started else {
            return Err(exec_failed(
                instance.name(),
                "daemon returned detached start result for an attached session",
            ));
        };

        let mut captured = Vec::new();
        while let Some(chunk) = output.next().await {
            match chunk {
                Ok(LogOutput::StdOut { message } | LogOutput::StdErr { message }) => {
                    captured.extend_from_slice(&message);
                }
                Ok(LogOutput::Console { message }) => captured.extend_from_slice(&message),
                Ok(LogOutput::StdIn { .. }) => {}
                Err(error) => {
                    return Err(exec_failed(
                        instance.name(),
                        format!("exec stream failed: {error}"),
                    ));
                }
            }
        }

        let exit_code = self.wait_for_exit_code(instance, &created.id).await?;
        Ok(EngineOutput {
            output: captured,
            exit_code,
        })
    }

    async fn wait_for_exit_code(
        &self,
        instance: &SandboxInstance,
        exec_id: &str,
    ) -> Result<Option<i64>, TangleboxError> {
        loop {
            let inspect = self.client.inspect_exec(exec_id).await.map_err(|error| {
                exec_failed(instance.name(), format!("inspect exec failed: {error}"))
            })?;

            if inspect.running.unwrap_or(false) {
                sleep(Duration::from_millis(EXEC_INSPECT_POLL_INTERVAL_MS)).await;
                continue;
            }
            return Ok(inspect.exit_code);
        }
    }
}

fn build_create_exec_options(command: &[String]) -> CreateExecOptions<String> {
    CreateExecOptions::<String> {
        attach_stdin: Some(false),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        tty: Some(false),
        cmd: Some(command.to_vec()),
        ..CreateExecOptions::default()
    }
}

fn exec_failed(instance: &str, message: impl Into<String>) -> TangleboxError {
    TangleboxError::from(ContainerError::ExecFailed {
        name: String::from(instance),
        message: message.into(),
    })
}
