//! Debounced change-to-action pipeline.
//!
//! Filesystem notifications arrive as [`ChangeEvent`] values on a channel.
//! The [`ChangeMonitor`] drops directory events, suppresses repeats through a
//! [`DebounceWindow`], and turns each remaining change into a single-file
//! batch: documents are tangled, every other file is detangled. Batches run
//! one at a time; the next event is not read until the current batch has
//! finished.
//!
//! A tangle rewrites generated sources and a detangle saves documents, and
//! both writes come back as notifications. Changes observed while the
//! monitor's own batch was running, plus a short grace period after it, are
//! ignored so a batch never triggers the opposite batch. A user edit made in
//! that interval is dropped too and needs another save.

mod debounce;
mod watcher;

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use tokio::sync::mpsc::UnboundedReceiver;

pub use debounce::DebounceWindow;
pub use watcher::ProjectWatcher;

use crate::batch::{BatchOrchestrator, BatchReport, BatchRequest, Operation, normalize_relative};
use crate::engine::{ContainerExecClient, ImageClient, SandboxClient};
use crate::error::TangleboxError;

/// A content change reported by the filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Absolute path of the changed entry.
    pub path: Utf8PathBuf,
    /// Whether the entry was a directory when the event was observed.
    pub is_directory: bool,
    /// When the event was observed.
    pub timestamp: Instant,
}

impl ChangeEvent {
    /// Build an event for a file observed now.
    #[must_use]
    pub fn file(path: impl Into<Utf8PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_directory: false,
            timestamp: Instant::now(),
        }
    }
}

/// Why an event was discarded before debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event concerned a directory.
    Directory,
    /// The path is not below the watched root.
    OutsideRoot,
    /// The path lies in, or is, a hidden entry.
    Hidden,
    /// The change was made while the monitor's own batch was running.
    OwnWrite,
}

/// What the monitor decided to do with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorDecision {
    /// Discarded without consulting the debounce window.
    Ignored(IgnoreReason),
    /// A repeat of a change already handled within the window.
    Suppressed,
    /// Run this single-file batch.
    Dispatch(BatchRequest),
}

/// Boxed future returned by [`BatchDispatcher::dispatch`].
pub type DispatchFuture<'a> = Pin<Box<dyn Future<Output = Result<BatchReport, TangleboxError>> + 'a>>;

/// Something that can run a batch for the monitor.
pub trait BatchDispatcher {
    /// Run `request` to completion.
    fn dispatch<'a>(&'a self, request: &'a BatchRequest) -> DispatchFuture<'a>;
}

impl<C> BatchDispatcher for BatchOrchestrator<'_, C>
where
    C: ImageClient + SandboxClient + ContainerExecClient,
{
    fn dispatch<'a>(&'a self, request: &'a BatchRequest) -> DispatchFuture<'a> {
        Box::pin(self.run(request))
    }
}

/// Return the folder of `path` relative to `root`.
///
/// Files directly inside `root` yield `.`. Paths outside `root` yield `None`.
#[must_use]
pub fn relative_folder(root: &Utf8Path, path: &Utf8Path) -> Option<Utf8PathBuf> {
    let parent = path.parent()?;
    let relative = parent.strip_prefix(root).ok()?;
    normalize_relative(relative)
}

/// Notifications for a batch's writes can trail its completion slightly.
const OWN_WRITE_GRACE: Duration = Duration::from_millis(250);

/// Turns change events into serialised single-file batches.
#[derive(Debug)]
pub struct ChangeMonitor<D> {
    root: Utf8PathBuf,
    extension: String,
    window: DebounceWindow,
    dispatcher: D,
    last_batch: Option<(Instant, Instant)>,
}

impl<D: BatchDispatcher> ChangeMonitor<D> {
    /// Create a monitor for the project at `root`.
    #[must_use]
    pub fn new(
        root: impl Into<Utf8PathBuf>,
        extension: impl Into<String>,
        window: DebounceWindow,
        dispatcher: D,
    ) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            window,
            dispatcher,
            last_batch: None,
        }
    }

    /// Return the dispatcher, mainly for inspection.
    #[must_use]
    pub const fn dispatcher(&self) -> &D {
        &self.dispatcher
    }

    /// Classify `event` and update the debounce window.
    pub fn plan(&mut self, event: &ChangeEvent) -> MonitorDecision {
        if event.is_directory {
            return MonitorDecision::Ignored(IgnoreReason::Directory);
        }
        let (Some(folder), Some(file_name)) =
            (relative_folder(&self.root, &event.path), event.path.file_name())
        else {
            return MonitorDecision::Ignored(IgnoreReason::OutsideRoot);
        };
        let hidden = file_name.starts_with('.')
            || folder
                .components()
                .any(|component| component.as_str().starts_with('.') && component.as_str() != ".");
        if hidden {
            return MonitorDecision::Ignored(IgnoreReason::Hidden);
        }
        if self.during_last_batch(event.timestamp) {
            return MonitorDecision::Ignored(IgnoreReason::OwnWrite);
        }

        if !self.window.admit_at(&event.path, event.timestamp) {
            return MonitorDecision::Suppressed;
        }

        let operation = if crate::batch::is_document(file_name, &self.extension) {
            Operation::Extract
        } else {
            Operation::SyncBack
        };
        MonitorDecision::Dispatch(
            BatchRequest::new(operation, self.root.clone(), folder)
                .with_allow_list(vec![String::from(file_name)]),
        )
    }

    /// Plan `event` and run the resulting batch, if any.
    ///
    /// Batch errors are logged and swallowed so one failure never stops the
    /// monitor.
    pub async fn handle(&mut self, event: &ChangeEvent) -> MonitorDecision {
        let decision = self.plan(event);
        match &decision {
            MonitorDecision::Ignored(reason) => {
                tracing::debug!(path = %event.path, ?reason, "change ignored");
            }
            MonitorDecision::Suppressed => {
                tracing::info!(path = %event.path, "file changed, but ignored");
            }
            MonitorDecision::Dispatch(request) => {
                tracing::info!(path = %event.path, operation = %request.operation, "file changed");
                let started = Instant::now();
                let result = self.dispatcher.dispatch(request).await;
                self.last_batch = Some((started, Instant::now()));
                match result {
                    Ok(report) => report.log_summary(),
                    Err(error) => {
                        tracing::error!(path = %event.path, error = %error, "batch failed");
                    }
                }
            }
        }
        decision
    }

    fn during_last_batch(&self, timestamp: Instant) -> bool {
        self.last_batch.is_some_and(|(started, finished)| {
            timestamp >= started && timestamp <= finished + OWN_WRITE_GRACE
        })
    }

    /// Consume events until `shutdown` resolves or the channel closes.
    ///
    /// Shutdown is only observed between events, so a batch that is already
    /// running always completes, including its sandbox teardown. Returns the
    /// number of batches dispatched.
    pub async fn run<S>(&mut self, events: &mut UnboundedReceiver<ChangeEvent>, shutdown: S) -> usize
    where
        S: Future<Output = ()>,
    {
        let mut dispatched = 0;
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                biased;
                () = &mut shutdown => {
                    tracing::info!("stopping change monitor");
                    break;
                }
                maybe_event = events.recv() => {
                    let Some(event) = maybe_event else {
                        tracing::info!("change notifications ended");
                        break;
                    };
                    if matches!(self.handle(&event).await, MonitorDecision::Dispatch(_)) {
                        dispatched += 1;
                    }
                }
            }
        }
        dispatched
    }
}
