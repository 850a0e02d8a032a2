//! Assertion steps for buildx client scenarios.

use buildkeeper::decode::{BuilderRecord, NodeStatus};
use buildkeeper::error::ErrorCategory;
use rstest_bdd_macros::then;

use super::StepResult;
use super::state::{ClientOutcome, ClientState};

fn outcome(client_state: &ClientState) -> StepResult<ClientOutcome> {
    client_state
        .outcome
        .get()
        .ok_or_else(|| String::from("outcome should be set"))
}

fn builders(client_state: &ClientState) -> StepResult<Vec<BuilderRecord>> {
    match outcome(client_state)? {
        ClientOutcome::Builders(records) => Ok(records),
        ClientOutcome::Builder(record) => Ok(record.into_iter().collect()),
        other => Err(format!("expected builders, got {other:?}")),
    }
}

fn builder(client_state: &ClientState, name: &str) -> StepResult<BuilderRecord> {
    builders(client_state)?
        .into_iter()
        .find(|record| record.name().as_str() == name)
        .ok_or_else(|| format!("builder {name} should be present"))
}

#[then("{count} builders are returned")]
fn builders_returned(client_state: &ClientState, count: usize) -> StepResult<()> {
    let found = builders(client_state)?.len();
    if found == count {
        Ok(())
    } else {
        Err(format!("expected {count} builders, got {found}"))
    }
}

#[then("builder {name} has no error")]
fn builder_has_no_error(client_state: &ClientState, name: String) -> StepResult<()> {
    let record = builder(client_state, &name)?;
    if record.error().is_empty() && record.nodes().iter().all(|node| node.error().is_empty()) {
        Ok(())
    } else {
        Err(format!("builder {name} unexpectedly reports an error"))
    }
}

#[then("the first node of {name} is error with message {message}")]
fn first_node_is_error(client_state: &ClientState, name: String, message: String) -> StepResult<()> {
    let record = builder(client_state, &name)?;
    let node = record
        .primary_node()
        .ok_or_else(|| format!("builder {name} should have a node"))?;
    if node.status() == NodeStatus::Error && node.error() == message {
        Ok(())
    } else {
        Err(format!(
            "expected error node with '{message}', got {} with '{}'",
            node.status(),
            node.error()
        ))
    }
}

#[then("builder {name} is running")]
fn builder_is_running(client_state: &ClientState, name: String) -> StepResult<()> {
    let record = builder(client_state, &name)?;
    if record.status() == Some(NodeStatus::Running) {
        Ok(())
    } else {
        Err(format!("expected {name} running, got {:?}", record.status()))
    }
}

#[then("the operation succeeds")]
fn operation_succeeds(client_state: &ClientState) -> StepResult<()> {
    match outcome(client_state)? {
        ClientOutcome::Failed { message, .. } => Err(format!("operation failed: {message}")),
        _ => Ok(()),
    }
}

#[then("the operation fails with a conflict")]
fn operation_conflicts(client_state: &ClientState) -> StepResult<()> {
    match outcome(client_state)? {
        ClientOutcome::Failed {
            category: ErrorCategory::Conflict,
            ..
        } => Ok(()),
        other => Err(format!("expected a conflict, got {other:?}")),
    }
}

#[then("buildx was run {count} times")]
fn buildx_run_count(client_state: &ClientState, count: usize) -> StepResult<()> {
    let calls = client_state.calls.get().unwrap_or_default();
    if calls == count {
        Ok(())
    } else {
        Err(format!("expected {count} executions, got {calls}"))
    }
}
