//! Batch orchestration of engine actions over a target folder.
//!
//! A batch walks one fixed sequence: select the files, make sure the sandbox
//! image exists, optionally clear a stale instance, then run one engine
//! command per file inside a scoped sandbox instance. Setup failures abort the
//! batch before any file is touched. Per-file failures are collected in the
//! [`BatchReport`] and never stop the remaining files.

mod command;
mod listing;
mod origin;

use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;

use self::command::{EngineCommand, detect_failure};
use self::origin::OriginScanner;
use crate::config::{AppConfig, EngineConfig};
use crate::engine::{
    CommandExecutor, ContainerExecClient, DestroyOutcome, ImageClient, ImageProvider, ImageSpec,
    SandboxClient, SandboxInstance, SandboxManager, SandboxSpec, VolumeBinding,
};
use crate::error::{FileError, FilesystemError, TangleboxError};

pub(crate) use self::listing::{is_document, normalize_relative};

/// The engine action a batch performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Tangle documents into generated sources.
    Extract,
    /// Detangle generated sources back into their documents.
    SyncBack,
    /// Execute every code block of each document.
    Evaluate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Extract => "tangle",
            Self::SyncBack => "detangle",
            Self::Evaluate => "evaluate",
        };
        f.write_str(label)
    }
}

/// One batch invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    /// The action to perform.
    pub operation: Operation,
    /// Host folder bound into the sandbox.
    pub project: Utf8PathBuf,
    /// Folder to scan, relative to `project`.
    pub target: Utf8PathBuf,
    /// When non-empty, only these file names are processed.
    pub allow_list: Vec<String>,
}

impl BatchRequest {
    /// Build a request over the whole target folder.
    #[must_use]
    pub fn new(
        operation: Operation,
        project: impl Into<Utf8PathBuf>,
        target: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            operation,
            project: project.into(),
            target: target.into(),
            allow_list: vec![],
        }
    }

    /// Restrict the request to the named files.
    #[must_use]
    pub fn with_allow_list(mut self, allow_list: Vec<String>) -> Self {
        self.allow_list = allow_list;
        self
    }
}

/// What happened to the sandbox instance at the end of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownStatus {
    /// No instance was needed because no file qualified.
    NotCreated,
    /// The instance was removed.
    Removed,
    /// The instance had already disappeared when teardown ran.
    AlreadyGone,
    /// Removal failed and the instance is still present.
    Leaked {
        /// Name of the leaked instance.
        instance: String,
        /// Why removal failed.
        message: String,
    },
}

/// Outcome of a batch that got past setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// The action performed.
    pub operation: Operation,
    /// Whether the sandbox image had to be built first.
    pub image_built: bool,
    /// Files for which the engine ran without a reported failure.
    pub processed: Vec<String>,
    /// Per-file failures, in processing order.
    pub failures: Vec<FileError>,
    /// Fate of the sandbox instance.
    pub teardown: TeardownStatus,
}

impl BatchReport {
    /// Return whether every file succeeded and nothing leaked.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && !self.leaked()
    }

    /// Return whether the sandbox instance outlived the batch.
    #[must_use]
    pub const fn leaked(&self) -> bool {
        matches!(self.teardown, TeardownStatus::Leaked { .. })
    }

    /// Log the outcome of the batch.
    pub fn log_summary(&self) {
        if let TeardownStatus::Leaked { instance, message } = &self.teardown {
            tracing::error!(instance = %instance, "sandbox instance was not removed: {message}");
        }
        if self.failures.is_empty() {
            tracing::info!(
                operation = %self.operation,
                processed = self.processed.len(),
                image_built = self.image_built,
                "batch finished"
            );
        } else {
            let failed: Vec<&str> = self.failures.iter().map(FileError::file).collect();
            tracing::warn!(
                operation = %self.operation,
                processed = self.processed.len(),
                failed = ?failed,
                "batch finished with failures"
            );
        }
    }
}

/// Settings a batch needs, extracted from the application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchSettings {
    /// Sandbox image and its build context.
    pub image: ImageSpec,
    /// Name of the sandbox instance.
    pub instance_name: String,
    /// Mount point of the project inside the sandbox.
    pub mount_path: Utf8PathBuf,
    /// Whether to force-remove a leftover instance before creating one.
    pub remove_stale: bool,
    /// Literate document extension.
    pub extension: String,
    /// Engine invocation settings.
    pub engine: EngineConfig,
}

impl BatchSettings {
    /// Collect batch settings from a validated configuration.
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            image: ImageSpec {
                tag: config.image_tag().to_owned(),
                build_context: config.sandbox.build_context.clone(),
            },
            instance_name: config.sandbox.instance_name.clone(),
            mount_path: config.sandbox.mount_path.clone(),
            remove_stale: config.sandbox.remove_stale,
            extension: config.document.extension.clone(),
            engine: config.engine.clone(),
        }
    }
}

/// A file selected for processing and, for SyncBack, its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
struct WorkItem {
    file: String,
    origin: Option<Utf8PathBuf>,
}

/// Runs batches against a container runtime client.
#[derive(Debug)]
pub struct BatchOrchestrator<'a, C> {
    client: &'a C,
    settings: BatchSettings,
}

impl<'a, C> BatchOrchestrator<'a, C>
where
    C: ImageClient + SandboxClient + ContainerExecClient,
{
    /// Create an orchestrator using `client` for every runtime call.
    #[must_use]
    pub const fn new(client: &'a C, settings: BatchSettings) -> Self {
        Self { client, settings }
    }

    /// Return the settings this orchestrator runs with.
    #[must_use]
    pub const fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Run one batch to completion.
    ///
    /// # Errors
    ///
    /// Returns `FilesystemError` when the target folder is outside the
    /// project or cannot be listed, and `ContainerError` when the image or
    /// the sandbox instance cannot be provided. Per-file failures are not
    /// errors; they are listed in the returned report.
    pub async fn run(&self, request: &BatchRequest) -> Result<BatchReport, TangleboxError> {
        let target = normalize_relative(&request.target).ok_or_else(|| {
            FilesystemError::OutsideProject {
                project: request.project.clone().into_std_path_buf(),
                target: request.target.clone().into_std_path_buf(),
            }
        })?;

        let (work, mut failures) = self.plan(request, &target)?;
        if work.is_empty() {
            tracing::info!(operation = %request.operation, folder = %target, "no files to process");
            return Ok(BatchReport {
                operation: request.operation,
                image_built: false,
                processed: vec![],
                failures,
                teardown: TeardownStatus::NotCreated,
            });
        }

        let image_built = ImageProvider::new(self.client)
            .ensure_image(&self.settings.image)
            .await?;

        let sandbox = SandboxManager::new(self.client);
        if self.settings.remove_stale {
            let outcome = sandbox.destroy(&self.settings.instance_name).await?;
            if outcome == DestroyOutcome::Removed {
                tracing::warn!(instance = %self.settings.instance_name, "removed stale sandbox instance");
            }
        }

        let spec = SandboxSpec {
            name: self.settings.instance_name.clone(),
            image: self.settings.image.tag.clone(),
            binding: VolumeBinding::new(request.project.clone(), self.settings.mount_path.clone()),
        };
        let scoped = sandbox
            .with_instance(&spec, |instance| {
                self.process_files(instance, request.operation, &target, work)
            })
            .await?;

        let (processed, file_failures) = scoped.value;
        failures.extend(file_failures);
        let teardown = match scoped.teardown {
            Ok(DestroyOutcome::Removed) => TeardownStatus::Removed,
            Ok(DestroyOutcome::AlreadyGone) => TeardownStatus::AlreadyGone,
            Err(error) => TeardownStatus::Leaked {
                instance: spec.name,
                message: error.to_string(),
            },
        };

        Ok(BatchReport {
            operation: request.operation,
            image_built,
            processed,
            failures,
            teardown,
        })
    }

    /// Select the files to process and resolve SyncBack origins.
    fn plan(
        &self,
        request: &BatchRequest,
        target: &Utf8Path,
    ) -> Result<(Vec<WorkItem>, Vec<FileError>), TangleboxError> {
        let folder = request.project.join(target);
        let dir = Dir::open_ambient_dir(&folder, ambient_authority())
            .map_err(|error| io_error(&folder, &error))?;
        let files = listing::select_files(
            &dir,
            request.operation,
            &self.settings.extension,
            &request.allow_list,
        )
        .map_err(|error| io_error(&folder, &error))?;

        if request.operation != Operation::SyncBack {
            let work = files
                .into_iter()
                .map(|file| WorkItem { file, origin: None })
                .collect();
            return Ok((work, vec![]));
        }

        let scanner = OriginScanner::new(&self.settings.extension)?;
        let mut work = vec![];
        let mut failures = vec![];
        for file in files {
            let contents = match dir.read_to_string(&file) {
                Ok(contents) => contents,
                Err(error) => {
                    tracing::warn!(file = %file, error = %error, "cannot read file; skipping");
                    failures.push(FileError::Unreadable {
                        file,
                        message: error.to_string(),
                    });
                    continue;
                }
            };
            let origins = scanner.origins(&contents, target, &self.settings.mount_path);
            let Some(origin) = origins.first().cloned() else {
                tracing::warn!(file = %file, "no originating document referenced; skipping");
                failures.push(FileError::UnresolvedOrigin { file });
                continue;
            };
            if origins.len() > 1 {
                tracing::warn!(
                    file = %file,
                    chosen = %origin,
                    candidates = origins.len(),
                    "several originating documents referenced; using the first"
                );
            }
            work.push(WorkItem {
                file,
                origin: Some(origin),
            });
        }
        Ok((work, failures))
    }

    async fn process_files(
        &self,
        instance: SandboxInstance,
        operation: Operation,
        target: &Utf8Path,
        work: Vec<WorkItem>,
    ) -> (Vec<String>, Vec<FileError>) {
        let executor = CommandExecutor::new(self.client);
        let command = EngineCommand::new(&self.settings.engine, instance.mount_path());
        let mut processed = vec![];
        let mut failures = vec![];

        for item in work {
            let argv = match (&item.origin, operation) {
                (Some(origin), Operation::SyncBack) => command.sync_back(target, &item.file, origin),
                (_, Operation::Evaluate) => command.evaluate(target, &item.file),
                _ => command.extract(target, &item.file),
            };
            tracing::info!(operation = %operation, file = %item.file, "running engine");

            match executor.run(&instance, &argv).await {
                Ok(result) => {
                    let text = result.text();
                    tracing::debug!(file = %item.file, exit_code = ?result.exit_code, output = %text, "engine finished");
                    let Some(diagnostic) =
                        detect_failure(&text, &self.settings.engine.failure_markers)
                    else {
                        processed.push(item.file);
                        continue;
                    };
                    tracing::warn!(file = %item.file, diagnostic, "engine reported a failure");
                    failures.push(FileError::EngineReported {
                        file: item.file,
                        diagnostic: diagnostic.to_owned(),
                        output: text,
                    });
                }
                Err(error) => {
                    tracing::warn!(file = %item.file, error = %error, "engine could not run");
                    failures.push(FileError::InstanceExec {
                        file: item.file,
                        message: error.to_string(),
                    });
                }
            }
        }
        (processed, failures)
    }
}

fn io_error(path: &Utf8Path, error: &std::io::Error) -> TangleboxError {
    let std_path = path.as_std_path().to_path_buf();
    let filesystem_error = match error.kind() {
        std::io::ErrorKind::NotFound => FilesystemError::NotFound { path: std_path },
        std::io::ErrorKind::PermissionDenied => FilesystemError::PermissionDenied { path: std_path },
        _ => FilesystemError::IoError {
            path: std_path,
            message: error.to_string(),
        },
    };
    TangleboxError::from(filesystem_error)
}
