//! Orchestration API for tanglebox commands.
//!
//! Each command has one entry point here: [`run_batch`] for the one-shot
//! tangle, detangle and evaluate commands, [`run_monitor`] for the
//! long-running watcher, and [`sandbox_status`] for the status query. They
//! take library types rather than clap types, receive the runtime client
//! explicitly, and never print or exit; the binary maps their outcome to a
//! process exit code.

use std::future::Future;

use camino::{Utf8Path, Utf8PathBuf};

use crate::batch::{BatchOrchestrator, BatchReport, BatchRequest, BatchSettings, TeardownStatus};
use crate::config::AppConfig;
use crate::engine::{
    ContainerExecClient, ImageClient, ImageProvider, InstanceStatus, SandboxClient,
    SandboxManager,
};
use crate::error::{FilesystemError, Result as TangleboxResult};
use crate::monitor::{ChangeMonitor, DebounceWindow, ProjectWatcher};

/// Outcome of a tanglebox command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Every file was processed and the sandbox was removed.
    Success,
    /// Some files failed; the rest were processed.
    FilesFailed {
        /// Number of failed files.
        count: usize,
    },
    /// The sandbox instance could not be removed.
    TeardownFailed {
        /// Name of the leaked instance.
        instance: String,
    },
}

impl CommandOutcome {
    /// Summarise a batch report. A leaked instance outranks file failures.
    #[must_use]
    pub fn from_report(report: &BatchReport) -> Self {
        if let TeardownStatus::Leaked { instance, .. } = &report.teardown {
            return Self::TeardownFailed {
                instance: instance.clone(),
            };
        }
        match report.failures.len() {
            0 => Self::Success,
            count => Self::FilesFailed { count },
        }
    }

    /// Return the process exit code for this outcome.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Success => 0,
            Self::FilesFailed { .. } => 1,
            Self::TeardownFailed { .. } => 2,
        }
    }
}

/// Image and instance state reported by the `status` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxStatus {
    /// Configured image tag.
    pub image: String,
    /// Whether the runtime has the image.
    pub image_present: bool,
    /// Configured instance name.
    pub instance: String,
    /// State of the instance.
    pub instance_status: InstanceStatus,
}

/// Run one batch against `client`.
///
/// The project folder is canonicalised so the runtime receives an absolute
/// bind path.
///
/// # Errors
///
/// Returns the setup errors of [`BatchOrchestrator::run`] and a
/// `FilesystemError` when the project folder cannot be resolved.
pub async fn run_batch<C>(
    client: &C,
    config: &AppConfig,
    request: BatchRequest,
) -> TangleboxResult<CommandOutcome>
where
    C: ImageClient + SandboxClient + ContainerExecClient,
{
    let resolved = BatchRequest {
        project: canonical_folder(&request.project)?,
        ..request
    };
    let orchestrator = BatchOrchestrator::new(client, BatchSettings::from_config(config));
    let report = orchestrator.run(&resolved).await?;
    report.log_summary();
    Ok(CommandOutcome::from_report(&report))
}

/// Watch `root` and dispatch single-file batches until `shutdown` resolves.
///
/// # Errors
///
/// Returns a `WatchError` when the watcher cannot be started and a
/// `FilesystemError` when `root` cannot be resolved. Failures of individual
/// batches are logged and do not end the monitor.
pub async fn run_monitor<C, S>(
    client: &C,
    config: &AppConfig,
    root: &Utf8Path,
    shutdown: S,
) -> TangleboxResult<CommandOutcome>
where
    C: ImageClient + SandboxClient + ContainerExecClient,
    S: Future<Output = ()>,
{
    let canonical_root = canonical_folder(root)?;
    let (watcher, mut events) = ProjectWatcher::start(&canonical_root)?;
    let orchestrator = BatchOrchestrator::new(client, BatchSettings::from_config(config));
    let mut monitor = ChangeMonitor::new(
        watcher.root(),
        config.document.extension.clone(),
        DebounceWindow::new(config.monitor.debounce_interval()),
        orchestrator,
    );

    let dispatched = monitor.run(&mut events, shutdown).await;
    drop(watcher);
    tracing::info!(dispatched, "change monitor stopped");
    Ok(CommandOutcome::Success)
}

/// Query the runtime for the configured image and instance.
///
/// # Errors
///
/// Returns `ContainerError::ImageInspectFailed` or
/// `ContainerError::InspectFailed` when a query fails for a reason other than
/// absence.
pub async fn sandbox_status<C>(client: &C, config: &AppConfig) -> TangleboxResult<SandboxStatus>
where
    C: ImageClient + SandboxClient,
{
    let image = config.image_tag().to_owned();
    let instance = config.sandbox.instance_name.clone();
    let image_present = ImageProvider::new(client).exists(&image).await?;
    let instance_status = SandboxManager::new(client).status(&instance).await?;
    Ok(SandboxStatus {
        image,
        image_present,
        instance,
        instance_status,
    })
}

fn canonical_folder(path: &Utf8Path) -> TangleboxResult<Utf8PathBuf> {
    let canonical = path.canonicalize_utf8().map_err(|error| {
        let std_path = path.as_std_path().to_path_buf();
        match error.kind() {
            std::io::ErrorKind::NotFound => FilesystemError::NotFound { path: std_path },
            std::io::ErrorKind::PermissionDenied => {
                FilesystemError::PermissionDenied { path: std_path }
            }
            _ => FilesystemError::IoError {
                path: std_path,
                message: error.to_string(),
            },
        }
    })?;
    if !canonical.is_dir() {
        return Err(FilesystemError::IoError {
            path: canonical.into_std_path_buf(),
            message: String::from("not a directory"),
        }
        .into());
    }
    Ok(canonical)
}
