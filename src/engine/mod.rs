//! Container engine access for the sandbox.
//!
//! This module connects to Docker or Podman and exposes the three runtime
//! concerns the batch orchestrator needs: the sandbox image, the sandbox
//! instance lifecycle and command execution inside an instance. The socket
//! endpoint is resolved through a priority-based fallback chain:
//!
//! 1. CLI argument (`--engine-socket`)
//! 2. Config file (`engine_socket` in TOML)
//! 3. `TANGLEBOX_ENGINE_SOCKET` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. `CONTAINER_HOST` environment variable
//! 6. `PODMAN_HOST` environment variable
//! 7. Platform default (`/var/run/docker.sock` on Unix)

mod connection;

pub use connection::{
    BuildImageStream, CommandExecutor, ContainerExecClient, ContainerOpFuture,
    CreateContainerFuture, CreateExecFuture, DestroyOutcome, EngineConnector, EngineOutput,
    ImageClient, ImageProvider, ImageSpec, InspectContainerFuture, InspectExecFuture,
    InspectImageFuture, InstanceStatus, SandboxClient, SandboxInstance, SandboxManager,
    SandboxSpec, Scoped, SocketResolver, StartExecFuture, VolumeBinding,
};
