//! Recursive filesystem subscription feeding [`ChangeEvent`] values.

use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{EventKind, ModifyKind};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use super::ChangeEvent;
use crate::error::{TangleboxError, WatchError};

/// A live subscription; dropping it stops notification delivery.
#[derive(Debug)]
pub struct ProjectWatcher {
    _watcher: RecommendedWatcher,
    root: Utf8PathBuf,
}

impl ProjectWatcher {
    /// Watch `root` recursively and stream content changes into a channel.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::InitFailed` when the platform backend cannot be
    /// created and `WatchError::SubscribeFailed` when `root` cannot be watched.
    pub fn start(root: &Utf8Path) -> Result<(Self, UnboundedReceiver<ChangeEvent>), TangleboxError> {
        let (tx, rx) = unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| forward(&tx, res),
            Config::default(),
        )
        .map_err(|e| WatchError::InitFailed {
            message: e.to_string(),
        })?;

        watcher
            .watch(root.as_std_path(), RecursiveMode::Recursive)
            .map_err(|e| WatchError::SubscribeFailed {
                path: root.as_std_path().to_path_buf(),
                message: e.to_string(),
            })?;

        tracing::info!(root = %root, "watching for changes");
        Ok((
            Self {
                _watcher: watcher,
                root: root.to_path_buf(),
            },
            rx,
        ))
    }

    /// Return the watched root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

fn forward(tx: &UnboundedSender<ChangeEvent>, res: notify::Result<Event>) {
    let event = match res {
        Ok(event) => event,
        Err(error) => {
            tracing::warn!(error = %error, "file watcher error");
            return;
        }
    };
    if !is_content_change(&event.kind) {
        return;
    }

    let timestamp = Instant::now();
    for path in event.paths {
        let Ok(utf8_path) = Utf8PathBuf::from_path_buf(path) else {
            tracing::debug!("ignoring change to a non UTF-8 path");
            continue;
        };
        let is_directory = utf8_path.is_dir();
        if tx
            .send(ChangeEvent {
                path: utf8_path,
                is_directory,
                timestamp,
            })
            .is_err()
        {
            return;
        }
    }
}

/// Return whether `kind` reports modified file contents.
pub(super) const fn is_content_change(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any | ModifyKind::Other)
    )
}
