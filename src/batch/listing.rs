//! Target folder validation and file selection.

use std::io;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use cap_std::fs_utf8::Dir;

use super::Operation;

/// Lexically normalise a project-relative path.
///
/// Returns `None` for absolute paths and for paths whose `..` components
/// climb above the project root. The project root itself normalises to `.`.
pub(crate) fn normalize_relative(path: &Utf8Path) -> Option<Utf8PathBuf> {
    let mut parts: Vec<&str> = vec![];
    for component in path.components() {
        match component {
            Utf8Component::Normal(part) => parts.push(part),
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                parts.pop()?;
            }
            Utf8Component::RootDir | Utf8Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return Some(Utf8PathBuf::from("."));
    }
    Some(parts.iter().collect())
}

/// Return whether `name` carries the literate-document extension.
pub(crate) fn is_document(name: &str, extension: &str) -> bool {
    name.strip_suffix(extension)
        .and_then(|stem| stem.strip_suffix('.'))
        .is_some_and(|stem| !stem.is_empty())
}

/// List the regular files in `dir` that `operation` should process.
///
/// Extract and Evaluate take documents; SyncBack takes everything else.
/// Hidden files are never selected. A non-empty `allow_list` further limits
/// the selection to the named files. Names are returned in lexical order.
pub(crate) fn select_files(
    dir: &Dir,
    operation: Operation,
    extension: &str,
    allow_list: &[String],
) -> io::Result<Vec<String>> {
    let mut selected = vec![];
    for entry_result in dir.entries()? {
        let entry = entry_result?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name()?;
        if name.starts_with('.') {
            continue;
        }
        let wanted_kind = match operation {
            Operation::Extract | Operation::Evaluate => is_document(&name, extension),
            Operation::SyncBack => !is_document(&name, extension),
        };
        let allowed = allow_list.is_empty() || allow_list.iter().any(|allowed| *allowed == name);
        if wanted_kind && allowed {
            selected.push(name);
        }
    }
    selected.sort_unstable();
    Ok(selected)
}
