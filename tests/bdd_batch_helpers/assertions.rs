//! Then-step assertions for batch behavioural scenarios.

use rstest_bdd_macros::then;
use tanglebox::batch::{BatchReport, TeardownStatus};
use tanglebox::error::FileError;

use super::state::{BatchOutcome, BatchState, EngineCalls, StepResult};

fn report(batch_state: &BatchState) -> StepResult<BatchReport> {
    match batch_state.outcome.get() {
        Some(BatchOutcome::Report(report)) => Ok(report),
        Some(BatchOutcome::Aborted { message, .. }) => {
            Err(format!("expected a report, batch aborted: {message}"))
        }
        None => Err(String::from("batch outcome should be set")),
    }
}

fn calls(batch_state: &BatchState) -> StepResult<EngineCalls> {
    batch_state
        .calls
        .get()
        .ok_or_else(|| String::from("engine calls should be captured"))
}

#[then("the processed files are {files}")]
fn processed_files_are(batch_state: &BatchState, files: String) -> StepResult<()> {
    let processed = report(batch_state)?.processed;
    let expected: Vec<String> = files.split(',').map(|name| name.trim().to_owned()).collect();
    if processed == expected {
        return Ok(());
    }
    Err(format!("expected processed files {expected:?}, got {processed:?}"))
}

#[then("the engine ran {count} times")]
fn engine_ran(batch_state: &BatchState, count: usize) -> StepResult<()> {
    let forms = calls(batch_state)?.forms;
    if forms.len() == count {
        return Ok(());
    }
    Err(format!("expected {count} engine runs, got {}", forms.len()))
}

#[then("the sandbox was removed exactly once")]
fn sandbox_removed_once(batch_state: &BatchState) -> StepResult<()> {
    let observed = calls(batch_state)?;
    if observed.removals != 1 {
        return Err(format!("expected one removal, got {}", observed.removals));
    }
    let teardown = report(batch_state)?.teardown;
    if teardown != TeardownStatus::Removed {
        return Err(format!("expected teardown Removed, got {teardown:?}"));
    }
    Ok(())
}

#[then("no sandbox was created")]
fn no_sandbox_created(batch_state: &BatchState) -> StepResult<()> {
    let observed = calls(batch_state)?;
    if observed.creations != 0 || observed.removals != 0 {
        return Err(format!(
            "expected no sandbox lifecycle calls, got {} creations and {} removals",
            observed.creations, observed.removals
        ));
    }
    let teardown = report(batch_state)?.teardown;
    if teardown != TeardownStatus::NotCreated {
        return Err(format!("expected teardown NotCreated, got {teardown:?}"));
    }
    Ok(())
}

#[then("{count} file failures are reported")]
fn file_failures_reported(batch_state: &BatchState, count: usize) -> StepResult<()> {
    let failures = report(batch_state)?.failures;
    if failures.len() != count {
        return Err(format!("expected {count} failures, got {failures:?}"));
    }
    if failures
        .iter()
        .all(|failure| matches!(failure, FileError::EngineReported { .. }))
    {
        return Ok(());
    }
    Err(format!("expected engine-reported failures, got {failures:?}"))
}

#[then("{file} is reported without an origin")]
fn reported_without_origin(batch_state: &BatchState, file: String) -> StepResult<()> {
    let failures = report(batch_state)?.failures;
    let expected = FileError::UnresolvedOrigin { file };
    if failures == vec![expected.clone()] {
        return Ok(());
    }
    Err(format!("expected only {expected:?}, got {failures:?}"))
}

#[then("the engine command mentions {text}")]
fn engine_command_mentions(batch_state: &BatchState, text: String) -> StepResult<()> {
    let forms = calls(batch_state)?.forms;
    if forms.iter().any(|form| form.contains(&text)) {
        return Ok(());
    }
    Err(format!("expected an engine command mentioning {text}, got {forms:?}"))
}

#[then("the batch fails because the instance exists")]
fn batch_fails_instance_exists(batch_state: &BatchState) -> StepResult<()> {
    match batch_state.outcome.get() {
        Some(BatchOutcome::Aborted {
            instance_exists: true,
            ..
        }) => Ok(()),
        Some(BatchOutcome::Aborted { message, .. }) => {
            Err(format!("expected an instance conflict, got: {message}"))
        }
        Some(BatchOutcome::Report(_)) => Err(String::from("expected the batch to abort")),
        None => Err(String::from("batch outcome should be set")),
    }
}
