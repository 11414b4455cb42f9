//! Back-reference scanning for generated files.
//!
//! Org writes a link to the originating document next to each tangled block
//! when the block uses `:comments link` or `:comments both`. Those links are
//! the only evidence of where a generated file came from.

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;

use super::listing::normalize_relative;
use crate::error::{ConfigError, TangleboxError};

/// Finds originating documents referenced from generated file contents.
#[derive(Debug, Clone)]
pub(crate) struct OriginScanner {
    link: Regex,
}

impl OriginScanner {
    /// Build a scanner for documents with the given extension.
    pub(crate) fn new(extension: &str) -> Result<Self, TangleboxError> {
        let pattern = format!(
            r"\[\[file:([^\]:]+\.{})(?:::[^\]]*)?\]",
            regex::escape(extension)
        );
        let link = Regex::new(&pattern).map_err(|error| ConfigError::InvalidValue {
            field: String::from("document.extension"),
            reason: error.to_string(),
        })?;
        Ok(Self { link })
    }

    /// Return the distinct project-relative documents referenced in `contents`.
    ///
    /// Relative links are resolved against `target`, the generated file's
    /// folder. Absolute links are accepted only below `mount_path`. Links that
    /// leave the project are ignored. Order follows first appearance.
    pub(crate) fn origins(
        &self,
        contents: &str,
        target: &Utf8Path,
        mount_path: &Utf8Path,
    ) -> Vec<Utf8PathBuf> {
        let mut found: Vec<Utf8PathBuf> = vec![];
        for captures in self.link.captures_iter(contents) {
            let Some(link) = captures.get(1).map(|m| Utf8Path::new(m.as_str())) else {
                continue;
            };
            let candidate = if link.is_absolute() {
                link.strip_prefix(mount_path)
                    .ok()
                    .and_then(normalize_relative)
            } else {
                normalize_relative(&target.join(link))
            };
            if let Some(origin) = candidate.filter(|origin| !found.contains(origin)) {
                found.push(origin);
            }
        }
        found
    }
}
