//! Ephemeral sandbox instance lifecycle.
//!
//! A sandbox instance is a named container with the project folder bound
//! read-write at a fixed mount path. Instances exist only for the duration of
//! one batch: [`SandboxManager::with_instance`] creates one, hands it to the
//! batch body, and removes it on every exit path, including a panic inside the
//! body.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use bollard::models::{
    ContainerCreateBody, ContainerCreateResponse, ContainerInspectResponse, HostConfig,
};
use bollard::query_parameters::{
    CreateContainerOptions, CreateContainerOptionsBuilder, InspectContainerOptions,
    RemoveContainerOptions, RemoveContainerOptionsBuilder, StartContainerOptions,
};
use bollard::{Docker, errors::Error as BollardError};
use camino::{Utf8Path, Utf8PathBuf};
use futures_util::FutureExt;

use crate::error::{ContainerError, TangleboxError};

const HTTP_NOT_FOUND: u16 = 404;
const HTTP_CONFLICT: u16 = 409;

/// Boxed future type returned by [`SandboxClient::create_container`].
pub type CreateContainerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ContainerCreateResponse, BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`SandboxClient::start_container`] and
/// [`SandboxClient::remove_container`].
pub type ContainerOpFuture<'a> = Pin<Box<dyn Future<Output = Result<(), BollardError>> + Send + 'a>>;

/// Boxed future type returned by [`SandboxClient::inspect_container`].
pub type InspectContainerFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ContainerInspectResponse, BollardError>> + Send + 'a>>;

/// Runtime operations needed to manage sandbox instances.
pub trait SandboxClient {
    /// Create a container from `Bollard` options and body payload.
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_>;

    /// Start a created container.
    fn start_container(&self, name: &str) -> ContainerOpFuture<'_>;

    /// Remove a container.
    fn remove_container(
        &self,
        name: &str,
        options: Option<RemoveContainerOptions>,
    ) -> ContainerOpFuture<'_>;

    /// Inspect a container by name or id.
    fn inspect_container(&self, name: &str) -> InspectContainerFuture<'_>;
}

impl SandboxClient for Docker {
    fn create_container(
        &self,
        options: Option<CreateContainerOptions>,
        config: ContainerCreateBody,
    ) -> CreateContainerFuture<'_> {
        Box::pin(async move { Self::create_container(self, options, config).await })
    }

    fn start_container(&self, name: &str) -> ContainerOpFuture<'_> {
        let name_owned = String::from(name);
        Box::pin(async move {
            Self::start_container(self, &name_owned, None::<StartContainerOptions>).await
        })
    }

    fn remove_container(
        &self,
        name: &str,
        options: Option<RemoveContainerOptions>,
    ) -> ContainerOpFuture<'_> {
        let name_owned = String::from(name);
        Box::pin(async move { Self::remove_container(self, &name_owned, options).await })
    }

    fn inspect_container(&self, name: &str) -> InspectContainerFuture<'_> {
        let name_owned = String::from(name);
        Box::pin(async move {
            Self::inspect_container(self, &name_owned, None::<InspectContainerOptions>).await
        })
    }
}

/// A host directory mounted read-write inside a sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeBinding {
    host_path: Utf8PathBuf,
    mount_path: Utf8PathBuf,
}

impl VolumeBinding {
    /// Bind `host_path` at `mount_path`.
    #[must_use]
    pub fn new(host_path: impl Into<Utf8PathBuf>, mount_path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            host_path: host_path.into(),
            mount_path: mount_path.into(),
        }
    }

    /// Return the host side of the binding.
    #[must_use]
    pub fn host_path(&self) -> &Utf8Path {
        &self.host_path
    }

    /// Return the path inside the sandbox.
    #[must_use]
    pub fn mount_path(&self) -> &Utf8Path {
        &self.mount_path
    }

    /// Render the binding in the runtime's `host:container:mode` form.
    #[must_use]
    pub fn bind_spec(&self) -> String {
        format!("{}:{}:rw", self.host_path, self.mount_path)
    }
}

/// Everything needed to create one sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxSpec {
    /// Instance name; at most one instance with this name may exist.
    pub name: String,
    /// Image the instance runs.
    pub image: String,
    /// The single project volume.
    pub binding: VolumeBinding,
}

/// A created and started sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxInstance {
    name: String,
    id: String,
    mount_path: Utf8PathBuf,
}

impl SandboxInstance {
    /// Build a handle for an instance that is known to be running.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        id: impl Into<String>,
        mount_path: impl Into<Utf8PathBuf>,
    ) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
            mount_path: mount_path.into(),
        }
    }

    /// Return the instance name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the runtime identifier of the instance.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Return where the project folder is mounted inside the instance.
    #[must_use]
    pub fn mount_path(&self) -> &Utf8Path {
        &self.mount_path
    }
}

/// What force-removal found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyOutcome {
    /// The instance existed and was removed.
    Removed,
    /// No instance with that name existed.
    AlreadyGone,
}

/// Observed state of a named sandbox instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    /// No instance with that name exists.
    Absent,
    /// The instance exists and is running.
    Running,
    /// The instance exists but is not running.
    Stopped {
        /// The runtime's state label, such as `exited` or `created`.
        state: String,
    },
}

/// The value produced inside a scoped sandbox, with the teardown result.
#[derive(Debug)]
pub struct Scoped<T> {
    /// Value returned by the body.
    pub value: T,
    /// Result of removing the instance after the body finished.
    pub teardown: Result<DestroyOutcome, TangleboxError>,
}

/// Creates, queries and destroys sandbox instances through an explicit client.
#[derive(Debug)]
pub struct SandboxManager<'c, C> {
    client: &'c C,
}

impl<'c, C: SandboxClient> SandboxManager<'c, C> {
    /// Create a manager backed by `client`.
    #[must_use]
    pub const fn new(client: &'c C) -> Self {
        Self { client }
    }

    /// Create and start a sandbox instance.
    ///
    /// The instance keeps a TTY and open stdin so its default process stays
    /// alive while engine commands are executed in it.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::InstanceExists` when an instance with the same
    /// name already exists, `ContainerError::CreateFailed` when the runtime
    /// rejects the request and `ContainerError::StartFailed` when the created
    /// instance does not start. A created instance that fails to start is
    /// removed before returning.
    pub async fn create(&self, spec: &SandboxSpec) -> Result<SandboxInstance, TangleboxError> {
        let options = CreateContainerOptionsBuilder::new().name(&spec.name).build();
        let response = self
            .client
            .create_container(Some(options), build_create_body(spec))
            .await
            .map_err(|error| match status_code(&error) {
                Some(HTTP_CONFLICT) => ContainerError::InstanceExists {
                    name: spec.name.clone(),
                },
                _ => ContainerError::CreateFailed {
                    name: spec.name.clone(),
                    message: error.to_string(),
                },
            })?;

        if let Err(error) = self.client.start_container(&response.id).await {
            if let Err(cleanup) = self.destroy(&spec.name).await {
                tracing::warn!(instance = %spec.name, error = %cleanup, "could not remove unstarted instance");
            }
            return Err(ContainerError::StartFailed {
                name: spec.name.clone(),
                message: error.to_string(),
            }
            .into());
        }

        tracing::debug!(instance = %spec.name, id = %response.id, "sandbox instance started");
        Ok(SandboxInstance::new(
            spec.name.clone(),
            response.id,
            spec.binding.mount_path(),
        ))
    }

    /// Force-remove the instance called `name`.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RemoveFailed` when the runtime could not
    /// remove an existing instance.
    pub async fn destroy(&self, name: &str) -> Result<DestroyOutcome, TangleboxError> {
        let options = RemoveContainerOptionsBuilder::new().force(true).build();
        match self.client.remove_container(name, Some(options)).await {
            Ok(()) => Ok(DestroyOutcome::Removed),
            Err(error) if status_code(&error) == Some(HTTP_NOT_FOUND) => {
                Ok(DestroyOutcome::AlreadyGone)
            }
            Err(error) => Err(ContainerError::RemoveFailed {
                name: String::from(name),
                message: error.to_string(),
            }
            .into()),
        }
    }

    /// Report whether the instance called `name` exists and is running.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::InspectFailed` when the runtime query fails
    /// for a reason other than absence.
    pub async fn status(&self, name: &str) -> Result<InstanceStatus, TangleboxError> {
        let response = match self.client.inspect_container(name).await {
            Ok(response) => response,
            Err(error) if status_code(&error) == Some(HTTP_NOT_FOUND) => {
                return Ok(InstanceStatus::Absent);
            }
            Err(error) => {
                return Err(ContainerError::InspectFailed {
                    name: String::from(name),
                    message: error.to_string(),
                }
                .into());
            }
        };

        let state = response.state.unwrap_or_default();
        if state.running.unwrap_or(false) {
            return Ok(InstanceStatus::Running);
        }
        let label = state
            .status
            .map_or_else(|| String::from("unknown"), |status| status.to_string());
        Ok(InstanceStatus::Stopped { state: label })
    }

    /// Run `body` against a fresh instance and destroy it afterwards.
    ///
    /// Exactly one removal is attempted for every successful creation,
    /// whether the body returns normally or panics. A panic is re-raised
    /// once the instance is gone.
    ///
    /// # Errors
    ///
    /// Returns the creation error when no instance could be created; the body
    /// does not run in that case.
    pub async fn with_instance<T, F, Fut>(
        &self,
        spec: &SandboxSpec,
        body: F,
    ) -> Result<Scoped<T>, TangleboxError>
    where
        F: FnOnce(SandboxInstance) -> Fut,
        Fut: Future<Output = T>,
    {
        let instance = self.create(spec).await?;
        let outcome = AssertUnwindSafe(body(instance.clone()))
            .catch_unwind()
            .await;
        let teardown = self.destroy(instance.name()).await;

        match &teardown {
            Ok(DestroyOutcome::Removed) => {
                tracing::debug!(instance = %instance.name(), "sandbox instance removed");
            }
            Ok(DestroyOutcome::AlreadyGone) => {
                tracing::warn!(instance = %instance.name(), "sandbox instance vanished before teardown");
            }
            Err(error) => {
                tracing::error!(instance = %instance.name(), error = %error, "sandbox instance leaked");
            }
        }

        match outcome {
            Ok(value) => Ok(Scoped { value, teardown }),
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

fn build_create_body(spec: &SandboxSpec) -> ContainerCreateBody {
    ContainerCreateBody {
        image: Some(spec.image.clone()),
        tty: Some(true),
        open_stdin: Some(true),
        working_dir: Some(spec.binding.mount_path().to_string()),
        host_config: Some(HostConfig {
            binds: Some(vec![spec.binding.bind_spec()]),
            ..HostConfig::default()
        }),
        ..ContainerCreateBody::default()
    }
}

/// Extract the HTTP status of a runtime response error.
pub(super) const fn status_code(error: &BollardError) -> Option<u16> {
    match error {
        BollardError::DockerResponseServerError { status_code, .. } => Some(*status_code),
        _ => None,
    }
}
