//! Command-line argument definitions for tanglebox.

use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};

/// Command-line interface for tanglebox.
#[derive(Debug, Parser)]
#[command(name = "tanglebox")]
#[command(
    author,
    version,
    about = "Keep literate Org documents and generated sources in sync inside a disposable container"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Container engine socket path or URL.
    #[arg(long, global = true)]
    pub engine_socket: Option<String>,

    /// Sandbox image tag to use (built on demand when missing).
    #[arg(long, global = true)]
    pub image: Option<String>,

    /// Enable debug logging, including full engine output.
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Tangle the literate documents in a folder into generated sources.
    Tangle(BatchArgs),

    /// Detangle generated sources in a folder back into their documents.
    Detangle(BatchArgs),

    /// Evaluate every code block of the documents in a folder.
    Evaluate(BatchArgs),

    /// Watch a project folder and tangle or detangle files as they change.
    Monitor(MonitorArgs),

    /// Report whether the sandbox image and instance exist.
    Status,
}

/// Arguments shared by the one-shot batch subcommands.
#[derive(Debug, Parser)]
pub struct BatchArgs {
    /// Folder whose files are processed.
    #[arg(required = true)]
    pub folder: Utf8PathBuf,

    /// Project folder bound into the sandbox (defaults to `folder`).
    #[arg(long)]
    pub project: Option<Utf8PathBuf>,

    /// Restrict the batch to these file names inside `folder`.
    #[arg(long = "file")]
    pub files: Vec<String>,
}

impl BatchArgs {
    /// Resolve the project folder and the target folder relative to it.
    ///
    /// Relative arguments are interpreted against `cwd`. Without `--project`
    /// the folder itself is the project and the target is `.`.
    #[must_use]
    pub fn resolve(&self, cwd: &Utf8Path) -> (Utf8PathBuf, Utf8PathBuf) {
        let folder = absolutize(cwd, &self.folder);
        let Some(project_arg) = self.project.as_ref() else {
            return (folder, Utf8PathBuf::from("."));
        };

        let project = absolutize(cwd, project_arg);
        let target = folder.strip_prefix(&project).map_or_else(
            |_| self.folder.clone(),
            |relative| {
                if relative.as_str().is_empty() {
                    Utf8PathBuf::from(".")
                } else {
                    relative.to_path_buf()
                }
            },
        );
        (project, target)
    }
}

/// Arguments for the `monitor` subcommand.
#[derive(Debug, Parser)]
pub struct MonitorArgs {
    /// Project folder to watch recursively.
    #[arg(required = true)]
    pub folder: Utf8PathBuf,

    /// Override the debounce interval in seconds.
    #[arg(long)]
    pub debounce_secs: Option<u64>,
}

fn absolutize(cwd: &Utf8Path, path: &Utf8Path) -> Utf8PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}
