//! Engine liveness checks.
//!
//! A client that was constructed successfully may still point at an engine
//! that is not running; every command pings it before doing real work.

use std::time::Duration;

use bollard::Docker;

use super::{EngineConnector, HEALTH_CHECK_TIMEOUT_SECS, SocketResolver};
use crate::error::{ContainerError, TangleboxError};

impl EngineConnector {
    /// Ping the engine, failing after the health check timeout.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::HealthCheckFailed` if the engine answers with
    /// an error and `ContainerError::HealthCheckTimeout` if it does not answer.
    pub async fn health_check_async(docker: &Docker) -> Result<(), TangleboxError> {
        let timeout = Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS);
        let ping = tokio::time::timeout(timeout, docker.ping())
            .await
            .map_err(|_| ContainerError::HealthCheckTimeout {
                seconds: HEALTH_CHECK_TIMEOUT_SECS,
            })?;
        ping.map_err(|e| ContainerError::HealthCheckFailed {
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Resolve the socket, connect, and verify that the engine responds.
    ///
    /// # Errors
    ///
    /// Returns any connection error from [`Self::connect_with_fallback`] or
    /// health check error from [`Self::health_check_async`].
    pub async fn connect_with_fallback_and_verify_async<E: mockable::Env>(
        config_socket: Option<&str>,
        resolver: &SocketResolver<'_, E>,
    ) -> Result<Docker, TangleboxError> {
        let docker = Self::connect_with_fallback(config_socket, resolver)?;
        Self::health_check_async(&docker).await?;
        Ok(docker)
    }

    /// Build the multi-threaded runtime the command-line entry point drives.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::RuntimeCreationFailed` if tokio cannot start.
    pub fn create_runtime() -> Result<tokio::runtime::Runtime, TangleboxError> {
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                TangleboxError::from(ContainerError::RuntimeCreationFailed {
                    message: e.to_string(),
                })
            })
    }
}
