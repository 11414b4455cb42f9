//! Then-step assertions for change-monitor behavioural scenarios.

use camino::Utf8PathBuf;
use rstest_bdd_macros::then;
use tanglebox::batch::{BatchRequest, Operation};
use tanglebox::monitor::MonitorDecision;

use super::state::{MonitorState, StepResult};

fn dispatched(monitor_state: &MonitorState) -> StepResult<Vec<BatchRequest>> {
    let Some(monitor) = monitor_state.monitor.get() else {
        return Ok(vec![]);
    };
    let locked = monitor
        .lock()
        .map_err(|_| String::from("monitor mutex is poisoned"))?;
    locked.dispatcher().requests()
}

fn count_decisions(
    monitor_state: &MonitorState,
    predicate: fn(&MonitorDecision) -> bool,
) -> usize {
    monitor_state
        .decisions
        .get()
        .unwrap_or_default()
        .iter()
        .filter(|decision| predicate(decision))
        .count()
}

fn assert_single_dispatch(
    monitor_state: &MonitorState,
    operation: Operation,
    folder: &str,
    file: &str,
) -> StepResult<()> {
    let requests = dispatched(monitor_state)?;
    let [request] = requests.as_slice() else {
        return Err(format!("expected one dispatched batch, got {requests:?}"));
    };
    if request.operation != operation {
        return Err(format!("expected {operation}, got {}", request.operation));
    }
    if request.target != Utf8PathBuf::from(folder) {
        return Err(format!("expected folder {folder}, got {}", request.target));
    }
    if request.allow_list != vec![String::from(file)] {
        return Err(format!("expected allow-list [{file}], got {:?}", request.allow_list));
    }
    Ok(())
}

#[then("a tangle batch is dispatched for folder {folder} restricted to {file}")]
fn tangle_dispatched(monitor_state: &MonitorState, folder: String, file: String) -> StepResult<()> {
    assert_single_dispatch(monitor_state, Operation::Extract, &folder, &file)
}

#[then("a detangle batch is dispatched for folder {folder} restricted to {file}")]
fn detangle_dispatched(
    monitor_state: &MonitorState,
    folder: String,
    file: String,
) -> StepResult<()> {
    assert_single_dispatch(monitor_state, Operation::SyncBack, &folder, &file)
}

#[then("{count} batches were dispatched")]
fn batches_dispatched(monitor_state: &MonitorState, count: usize) -> StepResult<()> {
    let requests = dispatched(monitor_state)?;
    if requests.len() == count {
        return Ok(());
    }
    Err(format!("expected {count} batches, got {}", requests.len()))
}

#[then("{count} changes were suppressed")]
fn changes_suppressed(monitor_state: &MonitorState, count: usize) -> StepResult<()> {
    let suppressed = count_decisions(monitor_state, |decision| {
        matches!(decision, MonitorDecision::Suppressed)
    });
    if suppressed == count {
        return Ok(());
    }
    Err(format!("expected {count} suppressed changes, got {suppressed}"))
}

#[then("{count} changes were ignored")]
fn changes_ignored(monitor_state: &MonitorState, count: usize) -> StepResult<()> {
    let ignored = count_decisions(monitor_state, |decision| {
        matches!(decision, MonitorDecision::Ignored(_))
    });
    if ignored == count {
        return Ok(());
    }
    Err(format!("expected {count} ignored changes, got {ignored}"))
}
