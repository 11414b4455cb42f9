//! Sandbox image provisioning.
//!
//! The image is looked up on every run and never cached. When it is missing
//! it is built from the configured build context; there is no fallback image
//! if that build fails.

mod archive;

use std::future::Future;
use std::pin::Pin;

use bollard::models::{BuildInfo, ImageInspect};
use bollard::query_parameters::{BuildImageOptions, BuildImageOptionsBuilder};
use bollard::{Docker, body_full, errors::Error as BollardError};
use camino::Utf8PathBuf;
use cap_std::ambient_authority;
use cap_std::fs_utf8::Dir;
use futures_util::{Stream, StreamExt};

use super::sandbox::status_code;
use crate::error::{ContainerError, FilesystemError, TangleboxError};

const HTTP_NOT_FOUND: u16 = 404;

/// Boxed future type returned by [`ImageClient::inspect_image`].
pub type InspectImageFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ImageInspect, BollardError>> + Send + 'a>>;

/// Boxed progress stream returned by [`ImageClient::build_image`].
pub type BuildImageStream<'a> =
    Pin<Box<dyn Stream<Item = Result<BuildInfo, BollardError>> + Send + 'a>>;

/// Runtime operations needed to look up and build images.
pub trait ImageClient {
    /// Inspect an image by tag.
    fn inspect_image(&self, tag: &str) -> InspectImageFuture<'_>;

    /// Build an image from a tar-encoded build context.
    fn build_image(&self, options: BuildImageOptions, context: Vec<u8>) -> BuildImageStream<'_>;
}

impl ImageClient for Docker {
    fn inspect_image(&self, tag: &str) -> InspectImageFuture<'_> {
        let tag_owned = String::from(tag);
        Box::pin(async move { Self::inspect_image(self, &tag_owned).await })
    }

    fn build_image(&self, options: BuildImageOptions, context: Vec<u8>) -> BuildImageStream<'_> {
        Box::pin(Self::build_image(
            self,
            options,
            None,
            Some(body_full(context.into())),
        ))
    }
}

/// The image a sandbox runs and where to build it from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSpec {
    /// Image reference in `name:tag` form.
    pub tag: String,
    /// Directory holding the `Dockerfile`.
    pub build_context: Utf8PathBuf,
}

/// Looks up and builds sandbox images through an explicit client.
#[derive(Debug)]
pub struct ImageProvider<'c, C> {
    client: &'c C,
}

impl<'c, C: ImageClient> ImageProvider<'c, C> {
    /// Create a provider backed by `client`.
    #[must_use]
    pub const fn new(client: &'c C) -> Self {
        Self { client }
    }

    /// Report whether the runtime knows the image `tag`.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ImageInspectFailed` when the lookup fails for
    /// a reason other than absence.
    pub async fn exists(&self, tag: &str) -> Result<bool, TangleboxError> {
        match self.client.inspect_image(tag).await {
            Ok(_) => Ok(true),
            Err(error) if status_code(&error) == Some(HTTP_NOT_FOUND) => Ok(false),
            Err(error) => Err(ContainerError::ImageInspectFailed {
                image: tag.to_owned(),
                message: error.to_string(),
            }
            .into()),
        }
    }

    /// Make sure the image exists, building it when it does not.
    ///
    /// Returns `true` when a build happened and `false` when the image was
    /// already present.
    ///
    /// # Errors
    ///
    /// Returns `ContainerError::ImageBuildFailed` when the build context
    /// cannot be packaged or the runtime reports a build error, and the
    /// errors of [`Self::exists`].
    pub async fn ensure_image(&self, spec: &ImageSpec) -> Result<bool, TangleboxError> {
        if self.exists(&spec.tag).await? {
            tracing::debug!(image = %spec.tag, "sandbox image present");
            return Ok(false);
        }

        tracing::info!(image = %spec.tag, context = %spec.build_context, "building sandbox image");
        let context = package_build_context(spec)?;
        let options = BuildImageOptionsBuilder::new()
            .t(&spec.tag)
            .rm(true)
            .build();

        let mut progress = self.client.build_image(options, context);
        while let Some(item) = progress.next().await {
            let info = item.map_err(|error| build_failed(spec, error.to_string()))?;
            if let Some(message) = build_error_message(&info) {
                return Err(build_failed(spec, message));
            }
            if let Some(line) = info
                .stream
                .as_deref()
                .map(str::trim_end)
                .filter(|line| !line.is_empty())
            {
                tracing::debug!(image = %spec.tag, "{line}");
            }
        }

        tracing::info!(image = %spec.tag, "sandbox image built");
        Ok(true)
    }
}

fn package_build_context(spec: &ImageSpec) -> Result<Vec<u8>, TangleboxError> {
    let context_dir = Dir::open_ambient_dir(&spec.build_context, ambient_authority())
        .map_err(|error| FilesystemError::IoError {
            path: spec.build_context.clone().into_std_path_buf(),
            message: error.to_string(),
        })?;
    archive::build_context_archive(&context_dir)
        .map_err(|error| build_failed(spec, format!("failed to package build context: {error}")))
}

fn build_error_message(info: &BuildInfo) -> Option<String> {
    info.error_detail
        .as_ref()
        .and_then(|detail| detail.message.clone())
}

fn build_failed(spec: &ImageSpec, message: impl Into<String>) -> TangleboxError {
    TangleboxError::from(ContainerError::ImageBuildFailed {
        image: spec.tag.clone(),
        message: message.into(),
    })
}
