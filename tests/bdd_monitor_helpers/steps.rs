//! Given/when step definitions for change-monitor behavioural scenarios.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use camino::Utf8PathBuf;
use rstest_bdd_macros::{given, when};
use tanglebox::monitor::{ChangeEvent, ChangeMonitor, DebounceWindow};

use super::state::{MonitorState, RecordingDispatcher, SharedMonitor, StepResult};

const DEBOUNCE: Duration = Duration::from_secs(5);

#[given("a monitor watching {root}")]
fn monitor_watching(monitor_state: &MonitorState, root: String) {
    monitor_state.root.set(Utf8PathBuf::from(root));
}

#[given("every batch fails")]
fn every_batch_fails(monitor_state: &MonitorState) {
    monitor_state.batches_fail.set(true);
}

#[when("{path} changes at second {second}")]
fn path_changes(monitor_state: &MonitorState, path: String, second: u64) -> StepResult<()> {
    let monitor = shared_monitor(monitor_state)?;
    let epoch = monitor_state
        .epoch
        .get()
        .ok_or_else(|| String::from("epoch should be set"))?;
    let event = ChangeEvent {
        path: Utf8PathBuf::from(path),
        is_directory: false,
        timestamp: epoch + Duration::from_secs(second),
    };

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|_| String::from("failed to create tokio runtime for scenario"))?;
    let decision = {
        let mut locked = monitor
            .lock()
            .map_err(|_| String::from("monitor mutex is poisoned"))?;
        runtime.block_on(locked.handle(&event))
    };

    let mut decisions = monitor_state.decisions.get().unwrap_or_default();
    decisions.push(decision);
    monitor_state.decisions.set(decisions);
    Ok(())
}

fn shared_monitor(monitor_state: &MonitorState) -> StepResult<SharedMonitor> {
    if let Some(existing) = monitor_state.monitor.get() {
        return Ok(existing);
    }
    let root = monitor_state
        .root
        .get()
        .ok_or_else(|| String::from("monitor root should be set"))?;
    let dispatcher = RecordingDispatcher::new(monitor_state.batches_fail.get().unwrap_or(false));
    let created: SharedMonitor = Arc::new(Mutex::new(ChangeMonitor::new(
        root,
        "org",
        DebounceWindow::new(DEBOUNCE),
        dispatcher,
    )));
    monitor_state.monitor.set(Arc::clone(&created));
    Ok(created)
}
