//! Given/when steps for buildx client scenarios.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use buildkeeper::decode::{BuilderName, NodeStatus};
use buildkeeper::engine::{BuildxClient, CreateBuilderRequest};
use buildkeeper::error::Result as BuildkeeperResult;
use buildkeeper::poll::ReadinessPoller;
use buildkeeper::process::{CommandExecutor, CommandInvocation, CommandResult, ExecuteFuture};
use buildkeeper::retry::{Deadline, RetryCoordinator};
use mockall::mock;
use rstest_bdd_macros::{given, when};

use super::StepResult;
use super::state::{Answer, ClientOutcome, ClientState};

mock! {
    #[derive(Debug)]
    Executor {}

    impl CommandExecutor for Executor {
        fn execute<'a>(&'a self, invocation: CommandInvocation) -> ExecuteFuture<'a>;
    }
}

const TWO_BUILDERS: &str = concat!(
    r#"{"Name":"b1","Driver":"docker-container","Nodes":[{"Name":"b10","Status":"running"}]}"#,
    "\n",
    r#"{"Name":"b2","Driver":"docker-container","Nodes":[{"Name":"b20","Status":"error","Err":"boom"}]}"#,
    "\n",
);

fn push_answer(client_state: &ClientState, answer: Answer) {
    let mut answers = client_state.answers.get().unwrap_or_default();
    answers.push(answer);
    client_state.answers.set(answers);
}

#[given("buildx prints the two-builder listing")]
fn given_two_builders(client_state: &ClientState) {
    push_answer(
        client_state,
        Answer {
            stdout: String::from(TWO_BUILDERS),
            stderr: String::new(),
            exit_code: 0,
        },
    );
}

#[given("buildx answers with exit code {code} and stderr {stderr}")]
fn given_failure(client_state: &ClientState, code: i32, stderr: String) {
    push_answer(
        client_state,
        Answer {
            stdout: String::new(),
            stderr: format!("{stderr}\n"),
            exit_code: code,
        },
    );
}

#[given("buildx prints the inspection of {name} with status {status}")]
fn given_inspection(client_state: &ClientState, name: String, status: String) {
    push_answer(
        client_state,
        Answer {
            stdout: format!(
                "Name:   {name}\nDriver: docker-container\n\nNodes:\nName:   {name}0\nStatus: {status}\n"
            ),
            stderr: String::new(),
            exit_code: 0,
        },
    );
}

/// Build a client whose executor replays the scripted answers, run `operation`
/// on it, and record the outcome and the number of executions.
fn drive<F, Fut>(client_state: &ClientState, operation: F) -> StepResult<()>
where
    F: FnOnce(Arc<BuildxClient<MockExecutor>>) -> Fut,
    Fut: Future<Output = BuildkeeperResult<ClientOutcome>>,
{
    let answers = client_state.answers.get().unwrap_or_default();
    let expected_calls = answers.len();
    let script = Arc::new(Mutex::new(VecDeque::from(answers)));
    let calls = Arc::new(Mutex::new(0_usize));
    let calls_for_mock = Arc::clone(&calls);

    let mut executor = MockExecutor::new();
    executor
        .expect_execute()
        .times(0..=expected_calls)
        .returning(move |invocation| {
            if let Ok(mut count) = calls_for_mock.lock() {
                *count += 1;
            }
            let answer = script.lock().ok().and_then(|mut queue| queue.pop_front());
            let mut command = vec![invocation.program().to_string()];
            command.extend(invocation.args().iter().cloned());
            Box::pin(async move {
                let scripted = answer.unwrap_or_else(|| Answer {
                    stdout: String::new(),
                    stderr: String::from("no scripted answer left"),
                    exit_code: 125,
                });
                Ok(CommandResult::new(
                    command,
                    None,
                    scripted.stdout,
                    scripted.stderr,
                    scripted.exit_code,
                ))
            })
        });

    let client = Arc::new(
        BuildxClient::new(executor, "/usr/bin/docker")
            .with_retry(RetryCoordinator::new(
                Duration::from_millis(1),
                Duration::from_secs(5),
            ))
            .with_poller(ReadinessPoller::new(Duration::from_millis(1))),
    );

    let runtime =
        tokio::runtime::Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;
    let outcome = runtime
        .block_on(operation(client))
        .unwrap_or_else(|error| ClientOutcome::Failed {
            category: error.category(),
            message: error.to_string(),
        });

    client_state.outcome.set(outcome);
    client_state
        .calls
        .set(calls.lock().map(|count| *count).unwrap_or_default());
    Ok(())
}

fn builder_name(name: &str) -> StepResult<BuilderName> {
    BuilderName::new(name).map_err(|e| e.to_string())
}

#[when("the builders are listed")]
fn when_listed(client_state: &ClientState) -> StepResult<()> {
    drive(client_state, |client| async move {
        client.list_builders().await.map(ClientOutcome::Builders)
    })
}

#[when("builder {name} is inspected")]
fn when_inspected(client_state: &ClientState, name: String) -> StepResult<()> {
    let builder = builder_name(&name)?;
    drive(client_state, |client| async move {
        client.inspect_builder(&builder).await.map(ClientOutcome::Builder)
    })
}

#[when("builder {name} is removed twice")]
fn when_removed_twice(client_state: &ClientState, name: String) -> StepResult<()> {
    let builder = builder_name(&name)?;
    drive(client_state, |client| async move {
        client.remove_builder(&builder).await?;
        client.remove_builder(&builder).await?;
        Ok(ClientOutcome::Done)
    })
}

#[when("builder {name} is created")]
fn when_created(client_state: &ClientState, name: String) -> StepResult<()> {
    let request = CreateBuilderRequest::new(builder_name(&name)?);
    drive(client_state, |client| async move {
        client.create_builder(&request).await?;
        Ok(ClientOutcome::Done)
    })
}

#[when("the client waits for {name} to be running")]
fn when_waiting(client_state: &ClientState, name: String) -> StepResult<()> {
    let builder = builder_name(&name)?;
    drive(client_state, |client| async move {
        client
            .wait_until_status(
                &builder,
                NodeStatus::Running,
                Deadline::after(Duration::from_secs(5)),
            )
            .await
            .map(|record| ClientOutcome::Builder(Some(record)))
    })
}
