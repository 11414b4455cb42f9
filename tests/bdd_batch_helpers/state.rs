//! Shared behavioural-test state for batch scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;
use tanglebox::batch::BatchReport;
use tempfile::TempDir;

/// Step result type for batch BDD tests.
pub type StepResult<T> = Result<T, String>;

/// Outcome of the most recent batch run.
#[derive(Clone)]
pub enum BatchOutcome {
    /// The batch got past setup and produced a report.
    Report(BatchReport),

    /// The batch aborted before processing files.
    Aborted {
        /// Whether the abort was caused by a name conflict.
        instance_exists: bool,
        /// Human-readable error message.
        message: String,
    },
}

/// Engine calls observed by the mocked runtime.
#[derive(Clone, Default)]
pub struct EngineCalls {
    /// Last argument of every engine command, in execution order.
    pub forms: Vec<String>,
    /// Number of sandbox creations.
    pub creations: usize,
    /// Number of sandbox removals.
    pub removals: usize,
}

/// Shared scenario state for batch behavioural tests.
#[derive(Default, ScenarioState)]
pub struct BatchState {
    /// Temporary project folder guard.
    pub(crate) project: Slot<Arc<TempDir>>,

    /// UTF-8 path to the project folder.
    pub(crate) project_root: Slot<Utf8PathBuf>,

    /// Whether every engine run prints a Lisp error.
    pub(crate) engine_fails: Slot<bool>,

    /// Whether the engine rejects creation with a name conflict.
    pub(crate) instance_exists: Slot<bool>,

    /// File names the batch is restricted to.
    pub(crate) allow_list: Slot<Vec<String>>,

    /// Outcome of the batch.
    pub(crate) outcome: Slot<BatchOutcome>,

    /// Calls captured from the mocked runtime.
    pub(crate) calls: Slot<EngineCalls>,
}

/// Fixture providing fresh state for each batch scenario.
#[fixture]
pub fn batch_state() -> BatchState {
    let state = BatchState::default();
    state.engine_fails.set(false);
    state.instance_exists.set(false);
    state.allow_list.set(vec![]);
    state
}
