//! Scenario state for buildx client behavioural tests.

use buildkeeper::decode::BuilderRecord;
use buildkeeper::error::ErrorCategory;
use rstest::fixture;
use rstest_bdd::Slot;
use rstest_bdd_macros::ScenarioState;

/// One scripted buildx answer.
#[derive(Debug, Clone)]
pub(crate) struct Answer {
    pub(crate) stdout: String,
    pub(crate) stderr: String,
    pub(crate) exit_code: i32,
}

/// What the operation under test produced.
#[derive(Debug, Clone)]
pub(crate) enum ClientOutcome {
    /// The operation returned builder records.
    Builders(Vec<BuilderRecord>),
    /// The operation returned at most one builder.
    Builder(Option<BuilderRecord>),
    /// The operation succeeded without a value.
    Done,
    /// The operation failed.
    Failed {
        category: ErrorCategory,
        message: String,
    },
}

#[derive(Default, ScenarioState)]
pub(crate) struct ClientState {
    pub(crate) answers: Slot<Vec<Answer>>,
    pub(crate) outcome: Slot<ClientOutcome>,
    pub(crate) calls: Slot<usize>,
}

#[fixture]
pub(crate) fn client_state() -> ClientState {
    let state = ClientState::default();
    state.answers.set(Vec::new());
    state.calls.set(0);
    state
}
