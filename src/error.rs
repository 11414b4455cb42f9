//! Semantic error types for the tanglebox application.
//!
//! This module defines the error hierarchy for tanglebox, following the
//! principle of using semantic error enums (via `thiserror`) for conditions the
//! caller might inspect or report, while reserving opaque errors
//! (`eyre::Report`) for the application boundary.
//!
//! Batch-level setup failures (image build, sandbox creation) surface as
//! [`TangleboxError`]. Per-file failures never abort a batch; they are
//! collected as [`FileError`] values in the batch report instead.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found at the expected path.
    #[error("configuration file not found: {path}")]
    FileNotFound {
        /// The path where the configuration file was expected.
        path: PathBuf,
    },

    /// The configuration file could not be parsed.
    #[error("failed to parse configuration file: {message}")]
    ParseError {
        /// A description of the parse error.
        message: String,
    },

    /// A required configuration value is missing.
    #[error("missing required configuration: {field}")]
    MissingRequired {
        /// The name of the missing field.
        field: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The name of the invalid field.
        field: String,
        /// The reason the value is invalid.
        reason: String,
    },

    /// The `OrthoConfig` library returned an error during configuration loading.
    #[error("configuration loading failed: {0}")]
    OrthoConfig(Arc<ortho_config::OrthoError>),
}

/// Errors that can occur while talking to the container runtime.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// Failed to connect to the container engine socket.
    #[error("failed to connect to container engine: {message}")]
    ConnectionFailed {
        /// A description of the connection failure.
        message: String,
    },

    /// The container engine socket was not found.
    #[error("container engine socket not found: {path}")]
    SocketNotFound {
        /// The path where the socket was expected.
        path: PathBuf,
    },

    /// Permission denied when accessing the container engine socket.
    #[error("permission denied accessing container socket: {path}")]
    PermissionDenied {
        /// The path to the socket.
        path: PathBuf,
    },

    /// Querying the runtime for an image failed for a reason other than absence.
    #[error("failed to inspect image '{image}': {message}")]
    ImageInspectFailed {
        /// The image tag that was queried.
        image: String,
        /// A description of the failure.
        message: String,
    },

    /// Building the sandbox image failed. There is no fallback image.
    #[error("failed to build image '{image}': {message}")]
    ImageBuildFailed {
        /// The image tag being built.
        image: String,
        /// A description of the build failure.
        message: String,
    },

    /// A sandbox instance with the requested name already exists.
    #[error("sandbox instance '{name}' already exists; remove it before starting a new batch")]
    InstanceExists {
        /// The conflicting instance name.
        name: String,
    },

    /// Failed to create a sandbox instance.
    #[error("failed to create sandbox instance '{name}': {message}")]
    CreateFailed {
        /// The requested instance name.
        name: String,
        /// A description of the creation failure.
        message: String,
    },

    /// Failed to start a created sandbox instance.
    #[error("failed to start sandbox instance '{name}': {message}")]
    StartFailed {
        /// The instance that failed to start.
        name: String,
        /// A description of the start failure.
        message: String,
    },

    /// Failed to execute a command in a sandbox instance.
    #[error("failed to execute command in sandbox instance '{name}': {message}")]
    ExecFailed {
        /// The target instance.
        name: String,
        /// A description of the execution failure.
        message: String,
    },

    /// Force-removal of a sandbox instance failed, leaking the instance.
    #[error("failed to remove sandbox instance '{name}': {message}")]
    RemoveFailed {
        /// The instance that could not be removed.
        name: String,
        /// A description of the removal failure.
        message: String,
    },

    /// Querying the status of a sandbox instance failed.
    #[error("failed to inspect sandbox instance '{name}': {message}")]
    InspectFailed {
        /// The instance that was queried.
        name: String,
        /// A description of the failure.
        message: String,
    },

    /// Failed to create the async runtime required by a synchronous helper.
    #[error("failed to create async runtime: {message}")]
    RuntimeCreationFailed {
        /// A description of the runtime failure.
        message: String,
    },

    /// Health check failed - engine did not respond correctly.
    #[error("container engine health check failed: {message}")]
    HealthCheckFailed {
        /// A description of the health check failure.
        message: String,
    },

    /// Health check timed out.
    #[error("container engine health check timed out after {seconds} seconds")]
    HealthCheckTimeout {
        /// The timeout duration in seconds.
        seconds: u64,
    },
}

/// Errors that can occur during filesystem operations.
#[derive(Debug, Error)]
pub enum FilesystemError {
    /// A file or directory was not found.
    #[error("path not found: {path}")]
    NotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// Permission denied when accessing a path.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be accessed.
        path: PathBuf,
    },

    /// A target folder does not resolve inside its project folder.
    #[error("target folder '{target}' is not inside project folder '{project}'")]
    OutsideProject {
        /// The project folder bound into the sandbox.
        project: PathBuf,
        /// The offending target folder.
        target: PathBuf,
    },

    /// An I/O error occurred.
    #[error("I/O error at '{path}': {message}")]
    IoError {
        /// The path where the error occurred.
        path: PathBuf,
        /// A description of the I/O error.
        message: String,
    },
}

/// Errors raised by the filesystem change monitor.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The notification backend could not be initialised.
    #[error("failed to initialise file watcher: {message}")]
    InitFailed {
        /// A description of the failure.
        message: String,
    },

    /// The project root could not be subscribed to.
    #[error("failed to watch '{path}': {message}")]
    SubscribeFailed {
        /// The directory that could not be watched.
        path: PathBuf,
        /// A description of the failure.
        message: String,
    },
}

/// A per-file failure recorded while a batch keeps running.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileError {
    /// The engine invocation could not be executed at all.
    #[error("could not run the engine for '{file}': {message}")]
    InstanceExec {
        /// The file being processed.
        file: String,
        /// A description of the execution failure.
        message: String,
    },

    /// The engine ran but its output reports a failure.
    #[error("engine reported a failure for '{file}': {diagnostic}")]
    EngineReported {
        /// The file being processed.
        file: String,
        /// The first output line identified as a failure.
        diagnostic: String,
        /// Full engine output, kept for diagnosis.
        output: String,
    },

    /// A generated file carries no back-reference to an originating document.
    #[error("no originating document found for '{file}'")]
    UnresolvedOrigin {
        /// The generated file.
        file: String,
    },

    /// A generated file could not be read as text on the host.
    #[error("could not read '{file}': {message}")]
    Unreadable {
        /// The generated file.
        file: String,
        /// Why reading failed.
        message: String,
    },
}

impl FileError {
    /// Return the file this failure belongs to.
    #[must_use]
    pub fn file(&self) -> &str {
        match self {
            Self::InstanceExec { file, .. }
            | Self::EngineReported { file, .. }
            | Self::UnresolvedOrigin { file }
            | Self::Unreadable { file, .. } => file,
        }
    }
}

/// Top-level error type for the tanglebox application.
///
/// This enum aggregates all domain-specific errors into a single type that can
/// be used throughout the application. At the application boundary (main.rs),
/// these errors are converted to `eyre::Report` for human-readable reporting.
#[derive(Debug, Error)]
pub enum TangleboxError {
    /// An error occurred during configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred during container operations.
    #[error(transparent)]
    Container(#[from] ContainerError),

    /// An error occurred during filesystem operations.
    #[error(transparent)]
    Filesystem(#[from] FilesystemError),

    /// An error occurred while watching for changes.
    #[error(transparent)]
    Watch(#[from] WatchError),
}

/// A specialised `Result` type for tanglebox operations.
pub type Result<T> = std::result::Result<T, TangleboxError>;
