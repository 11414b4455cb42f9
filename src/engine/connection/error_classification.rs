//! Mapping of low-level `Bollard` connection failures onto `ContainerError`.

use std::io::ErrorKind;
use std::path::Path;

use crate::error::ContainerError;

/// Return the filesystem path behind a `unix://` or `npipe://` URI.
///
/// HTTP endpoints have no filesystem path and yield `None`.
pub(super) fn extract_socket_path(socket_uri: &str) -> Option<&Path> {
    ["unix://", "npipe://"]
        .iter()
        .find_map(|scheme| socket_uri.strip_prefix(scheme))
        .map(Path::new)
}

fn from_io_kind(kind: ErrorKind, socket_path: Option<&Path>, message: String) -> ContainerError {
    match (kind, socket_path) {
        (ErrorKind::PermissionDenied, Some(path)) => ContainerError::PermissionDenied {
            path: path.to_path_buf(),
        },
        (ErrorKind::NotFound, Some(path)) => ContainerError::SocketNotFound {
            path: path.to_path_buf(),
        },
        _ => ContainerError::ConnectionFailed { message },
    }
}

/// Classify a client construction error for the endpoint `socket_uri`.
///
/// A missing socket or a permission problem on a filesystem socket gets its own
/// variant so the user sees which path to fix; everything else is reported as
/// `ConnectionFailed`.
pub(super) fn classify_connection_error(
    bollard_error: &bollard::errors::Error,
    socket_uri: &str,
) -> ContainerError {
    let socket_path = extract_socket_path(socket_uri);
    let message = bollard_error.to_string();

    match bollard_error {
        bollard::errors::Error::SocketNotFoundError(_) if socket_path.is_some() => {
            from_io_kind(ErrorKind::NotFound, socket_path, message)
        }
        bollard::errors::Error::IOError { err } => {
            let kind = io_error_kind_in_chain(err).unwrap_or_else(|| err.kind());
            from_io_kind(kind, socket_path, message)
        }
        other => match io_error_kind_in_chain(other) {
            Some(kind) => from_io_kind(kind, socket_path, message),
            None => ContainerError::ConnectionFailed { message },
        },
    }
}

/// Find the first `io::Error` among the sources of `error`.
fn io_error_kind_in_chain(error: &dyn std::error::Error) -> Option<ErrorKind> {
    std::iter::successors(error.source(), |err| err.source())
        .find_map(|err| err.downcast_ref::<std::io::Error>().map(std::io::Error::kind))
}
