//! Socket resolution and container engine connection.
//!
//! Resolves the runtime socket from configuration, the environment and the
//! platform default, then opens a `Bollard` client for it. The client is the
//! single runtime handle that the image provider, the sandbox manager and the
//! command executor are constructed with.

mod error_classification;
mod exec;
mod health_check;
mod image;
mod sandbox;

use bollard::Docker;

use self::error_classification::classify_connection_error;
use crate::error::TangleboxError;

pub use exec::{
    CommandExecutor, ContainerExecClient, CreateExecFuture, EngineOutput, InspectExecFuture,
    StartExecFuture,
};
pub use image::{
    BuildImageStream, ImageClient, ImageProvider, ImageSpec, InspectImageFuture,
};
pub use sandbox::{
    ContainerOpFuture, CreateContainerFuture, DestroyOutcome, InspectContainerFuture,
    InstanceStatus, SandboxClient, SandboxInstance, SandboxManager, SandboxSpec, Scoped,
    VolumeBinding,
};

/// Environment variable names checked in fallback order after configuration sources.
const FALLBACK_ENV_VARS: &[&str] = &["DOCKER_HOST", "CONTAINER_HOST", "PODMAN_HOST"];

/// Connection timeout in seconds for Docker/Podman API connections.
const CONNECTION_TIMEOUT_SECS: u64 = 120;

/// Timeout in seconds for health check operations.
const HEALTH_CHECK_TIMEOUT_SECS: u64 = 10;

/// Default socket path for Unix platforms.
#[cfg(unix)]
const DEFAULT_SOCKET: &str = "unix:///var/run/docker.sock";

/// Default socket path for Windows platforms.
#[cfg(windows)]
const DEFAULT_SOCKET: &str = "npipe:////./pipe/docker_engine";

/// Resolves container engine socket endpoints from environment variables.
///
/// Environment access goes through `mockable::Env` so resolution can be tested
/// without touching the process environment.
pub struct SocketResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> SocketResolver<'a, E> {
    /// Creates a new socket resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolves the socket endpoint from fallback environment variables.
    ///
    /// Checks `DOCKER_HOST`, `CONTAINER_HOST` and `PODMAN_HOST` in that order,
    /// skipping empty values.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Returns the platform default socket path.
    #[must_use]
    pub const fn default_socket() -> &'static str {
        DEFAULT_SOCKET
    }
}

/// Classifies socket endpoint types for connection handling.
enum SocketType {
    /// Unix socket or Windows named pipe with explicit scheme.
    Socket,
    /// HTTP, HTTPS, or TCP endpoint (TCP is rewritten to HTTP).
    Http,
    /// Bare path without scheme prefix.
    BarePath,
}

impl SocketType {
    fn classify(socket: &str) -> Self {
        if socket.starts_with("unix://") || socket.starts_with("npipe://") {
            Self::Socket
        } else if ["tcp://", "http://", "https://"]
            .iter()
            .any(|scheme| socket.starts_with(scheme))
        {
            Self::Http
        } else {
            Self::BarePath
        }
    }
}

/// Opens clients for Docker or Podman container engines.
pub struct EngineConnector;

impl EngineConnector {
    /// Connect to the container engine at the specified socket path.
    ///
    /// Accepts `unix://`, `npipe://`, `tcp://` (treated as HTTP), `http://`
    /// and `https://` endpoints. Bare paths starting with `\\` or `//` are
    /// treated as named pipes; every other bare path is a Unix socket.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::SocketNotFound`, `PermissionDenied` or
    /// `ConnectionFailed` depending on why the client could not be created.
    pub fn connect(socket: &str) -> Result<Docker, TangleboxError> {
        let socket_uri = match SocketType::classify(socket) {
            SocketType::Socket | SocketType::Http => socket.replacen("tcp://", "http://", 1),
            SocketType::BarePath => Self::normalize_bare_path(socket),
        };

        let connected = match SocketType::classify(&socket_uri) {
            SocketType::Http => Docker::connect_with_http(
                &socket_uri,
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
            SocketType::Socket | SocketType::BarePath => Docker::connect_with_socket(
                &socket_uri,
                CONNECTION_TIMEOUT_SECS,
                bollard::API_DEFAULT_VERSION,
            ),
        };

        connected.map_err(|error| TangleboxError::from(classify_connection_error(&error, &socket_uri)))
    }

    fn normalize_bare_path(path: &str) -> String {
        if path.starts_with("\\\\") || path.starts_with("//") {
            format!("npipe://{path}")
        } else {
            format!("unix://{path}")
        }
    }

    /// Connect using the resolved socket from configuration and environment.
    ///
    /// # Errors
    ///
    /// Returns the same errors as [`Self::connect`].
    pub fn connect_with_fallback<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, TangleboxError> {
        let socket = Self::resolve_socket(config_socket, resolver);
        tracing::debug!(socket = %socket, "connecting to container engine");
        Self::connect(&socket)
    }

    /// Resolves the socket endpoint without establishing a connection.
    ///
    /// Resolution order:
    /// 1. `config_socket` (from CLI, config file, or `TANGLEBOX_ENGINE_SOCKET`)
    /// 2. `DOCKER_HOST`, `CONTAINER_HOST`, `PODMAN_HOST` (via resolver)
    /// 3. Platform default socket
    #[must_use]
    pub fn resolve_socket<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> String {
        config_socket
            .filter(|s| !s.is_empty())
            .map(String::from)
            .or_else(|| resolver.resolve_from_env())
            .unwrap_or_else(|| SocketResolver::<E>::default_socket().to_owned())
    }
}
