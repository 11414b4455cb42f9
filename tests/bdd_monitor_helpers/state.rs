//! Shared behavioural-test state for change-monitor scenarios.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tanglebox::batch::{BatchReport, BatchRequest, TeardownStatus};
use tanglebox::error::{ContainerError, TangleboxError};
use tanglebox::monitor::{BatchDispatcher, ChangeMonitor, DispatchFuture, MonitorDecision};

/// Step result type for change-monitor BDD tests.
pub type StepResult<T> = Result<T, String>;

/// Dispatcher that records requests instead of running them.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    requests: Mutex<Vec<BatchRequest>>,
    fail: bool,
}

impl RecordingDispatcher {
    /// Create a dispatcher whose batches succeed or fail.
    pub fn new(fail: bool) -> Self {
        Self {
            requests: Mutex::default(),
            fail,
        }
    }

    /// Return the requests dispatched so far.
    pub fn requests(&self) -> StepResult<Vec<BatchRequest>> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .map_err(|_| String::from("dispatcher requests mutex is poisoned"))
    }
}

impl BatchDispatcher for RecordingDispatcher {
    fn dispatch<'a>(&'a self, request: &'a BatchRequest) -> DispatchFuture<'a> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let operation = request.operation;
        let fail = self.fail;
        Box::pin(async move {
            if fail {
                return Err(TangleboxError::from(ContainerError::InstanceExists {
                    name: String::from("tanglebox"),
                }));
            }
            Ok(BatchReport {
                operation,
                image_built: false,
                processed: vec![],
                failures: vec![],
                teardown: TeardownStatus::Removed,
            })
        })
    }
}

/// Monitor under test, shared between steps.
pub type SharedMonitor = Arc<Mutex<ChangeMonitor<RecordingDispatcher>>>;

/// Shared scenario state for change-monitor behavioural tests.
#[derive(Default, ScenarioState)]
pub struct MonitorState {
    /// Watched project root.
    pub(crate) root: Slot<Utf8PathBuf>,

    /// Whether every dispatched batch fails.
    pub(crate) batches_fail: Slot<bool>,

    /// Reference point for event timestamps.
    pub(crate) epoch: Slot<Instant>,

    /// Monitor created on the first change.
    pub(crate) monitor: Slot<SharedMonitor>,

    /// Decisions taken for each change, in order.
    pub(crate) decisions: Slot<Vec<MonitorDecision>>,
}

/// Fixture providing fresh state for each change-monitor scenario.
#[fixture]
pub fn monitor_state() -> MonitorState {
    let state = MonitorState::default();
    state.batches_fail.set(false);
    state.epoch.set(Instant::now());
    state.decisions.set(vec![]);
    state
}
