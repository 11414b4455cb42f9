//! Engine command lines and failure detection.
//!
//! Every invocation is `<program> --batch --eval <form>` passed as an argv
//! vector, so no shell quoting is involved. Paths embedded in the form are
//! escaped as Emacs Lisp string literals.

use camino::Utf8Path;

use crate::config::EngineConfig;

/// Error text raised when no buffer visits the origin after a detangle.
///
/// Always treated as a failure, whatever markers are configured.
pub(crate) const ORIGIN_NOT_VISITED: &str = "tanglebox: origin document was not visited";

/// Builds engine argv vectors for one sandbox mount point.
#[derive(Debug, Clone, Copy)]
pub(crate) struct EngineCommand<'a> {
    engine: &'a EngineConfig,
    mount_path: &'a Utf8Path,
}

impl<'a> EngineCommand<'a> {
    pub(crate) const fn new(engine: &'a EngineConfig, mount_path: &'a Utf8Path) -> Self {
        Self { engine, mount_path }
    }

    /// Tangle the document `file` in `target`.
    pub(crate) fn extract(&self, target: &Utf8Path, file: &str) -> Vec<String> {
        let path = self.sandbox_path(&target.join(file));
        self.argv(&[
            format!("(find-file {})", lisp_string(&path)),
            String::from("(org-babel-tangle)"),
        ])
    }

    /// Detangle `file` in `target` and save the project-relative `origin`.
    pub(crate) fn sync_back(&self, target: &Utf8Path, file: &str, origin: &Utf8Path) -> Vec<String> {
        let path = self.sandbox_path(&target.join(file));
        let origin_path = self.sandbox_path(origin);
        self.argv(&[
            format!("(org-babel-detangle {})", lisp_string(&path)),
            format!(
                "(let ((buf (find-buffer-visiting {origin}))) (if buf (with-current-buffer buf (save-buffer)) (error \"{ORIGIN_NOT_VISITED}: %s\" {origin})))",
                origin = lisp_string(&origin_path)
            ),
        ])
    }

    /// Execute every code block of the document `file` in `target`.
    pub(crate) fn evaluate(&self, target: &Utf8Path, file: &str) -> Vec<String> {
        let path = self.sandbox_path(&target.join(file));
        self.argv(&[
            String::from("(setq org-confirm-babel-evaluate nil)"),
            format!("(find-file {})", lisp_string(&path)),
            String::from("(org-babel-execute-buffer)"),
        ])
    }

    fn sandbox_path(&self, relative: &Utf8Path) -> String {
        relative
            .components()
            .filter(|component| component.as_str() != ".")
            .fold(self.mount_path.to_path_buf(), |path, component| {
                path.join(component)
            })
            .into_string()
    }

    fn argv(&self, forms: &[String]) -> Vec<String> {
        let body = self
            .engine
            .preamble
            .iter()
            .chain(forms)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        vec![
            self.engine.program.clone(),
            String::from("--batch"),
            String::from("--eval"),
            format!("(progn {body})"),
        ]
    }
}

/// Quote `value` as an Emacs Lisp string literal.
pub(crate) fn lisp_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

/// Return the first output line containing one of `markers` or
/// [`ORIGIN_NOT_VISITED`].
pub(crate) fn detect_failure<'o>(output: &'o str, markers: &[String]) -> Option<&'o str> {
    output.lines().map(str::trim).find(|line| {
        line.contains(ORIGIN_NOT_VISITED)
            || markers.iter().any(|marker| line.contains(marker.as_str()))
    })
}
