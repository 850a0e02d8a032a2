//! `buildkeeper` application entry point.
//!
//! This binary drives `docker buildx` through the typed client. It uses `eyre`
//! for opaque error handling at the application boundary, converting
//! domain-specific errors into human-readable reports.
//!
//! Configuration is loaded with layered precedence via `OrthoConfig`:
//! 1. Application defaults
//! 2. Configuration file (`~/.config/buildkeeper/config.toml` or path from
//!    `BUILDKEEPER_CONFIG_PATH`)
//! 3. Environment variables (`BUILDKEEPER_*`)
//! 4. Command-line arguments
//!
//! Diagnostics go to stderr, filtered by `BUILDKEEPER_LOG` (default `warn`).

use std::io::Read;
use std::time::Duration;

use buildkeeper::config::{
    AppConfig, BuildArgs, Cli, Commands, CreateArgs, WaitArgs, load_config,
};
use buildkeeper::decode::{BuilderName, BuilderRecord};
use buildkeeper::engine::{BuildxClient, ExecutableResolver};
use buildkeeper::error::{ConfigError, Result as BuildkeeperResult};
use buildkeeper::poll::ReadinessPoller;
use buildkeeper::process::ProcessRunner;
use buildkeeper::retry::{Deadline, RetryCoordinator};
use clap::Parser;
use eyre::{Report, Result as EyreResult};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding the log filter directives.
const LOG_ENV_VAR: &str = "BUILDKEEPER_LOG";

/// Application entry point.
///
/// Parses the CLI, loads configuration, then runs the selected subcommand on
/// a Tokio runtime. Ctrl-C stops any retry or wait in progress.
fn main() -> EyreResult<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(&cli).map_err(Report::from)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(&cli, &config)).map_err(Report::from)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Execute the CLI command, returning domain-specific errors.
///
/// Keeps semantic errors inside the run loop so the CLI boundary owns
/// conversion to `eyre::Report`.
async fn run(cli: &Cli, config: &AppConfig) -> BuildkeeperResult<()> {
    let cancellation = CancellationToken::new();
    let on_interrupt = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted; abandoning the current operation");
            on_interrupt.cancel();
        }
    });

    let client = build_client(config, &cancellation)?;
    match &cli.command {
        Commands::Ls => list(&client).await,
        Commands::Inspect(args) => inspect(&client, &args.name).await,
        Commands::Create(args) => create(&client, args).await,
        Commands::Rm(args) => remove(&client, &args.name).await,
        Commands::Build(args) => build(&client, args).await,
        Commands::Wait(args) => wait(&client, config, args).await,
    }
}

fn build_client(
    config: &AppConfig,
    cancellation: &CancellationToken,
) -> BuildkeeperResult<BuildxClient> {
    let env = mockable::DefaultEnv::new();
    let docker = ExecutableResolver::new(&env).resolve(config.docker_path.as_deref())?;
    tracing::debug!(%docker, "using docker executable");

    let runner = ProcessRunner::new().with_cancellation(cancellation.clone());
    let retry = RetryCoordinator::new(config.retry.backoff(), config.retry.timeout())
        .with_cancellation(cancellation.clone());
    let poller = ReadinessPoller::new(config.poll.interval()).with_cancellation(cancellation.clone());

    Ok(BuildxClient::new(runner, docker)
        .with_working_dir(config.working_dir.clone())
        .with_retry(retry)
        .with_poller(poller))
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn list(client: &BuildxClient) -> BuildkeeperResult<()> {
    let builders = client.list_builders().await?;
    println!("{:<24} {:<18} STATUS", "NAME", "DRIVER");
    for builder in &builders {
        println!(
            "{:<24} {:<18} {}",
            builder.name(),
            builder.driver().map_or("-", |driver| driver.as_str()),
            status_text(builder)
        );
    }
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn inspect(client: &BuildxClient, name: &str) -> BuildkeeperResult<()> {
    let builder_name = BuilderName::new(name)?;
    let Some(builder) = client.inspect_builder(&builder_name).await? else {
        println!("builder {builder_name} does not exist");
        return Ok(());
    };
    println!("Name:   {}", builder.name());
    if let Some(driver) = builder.driver() {
        println!("Driver: {driver}");
    }
    if !builder.error().is_empty() {
        println!("Error:  {}", builder.error());
    }
    for node in builder.nodes() {
        let status = node.status();
        if node.error().is_empty() {
            println!("Node:   {} ({status})", node.name());
        } else {
            println!("Node:   {} ({status}: {})", node.name(), node.error());
        }
    }
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn create(client: &BuildxClient, args: &CreateArgs) -> BuildkeeperResult<()> {
    let request = args.to_request()?;
    let created = client.create_builder(&request).await?;
    println!("{created}");
    Ok(())
}

async fn remove(client: &BuildxClient, name: &str) -> BuildkeeperResult<()> {
    client.remove_builder(&BuilderName::new(name)?).await
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn build(client: &BuildxClient, args: &BuildArgs) -> BuildkeeperResult<()> {
    let inline = if args.dockerfile_from_stdin() {
        Some(read_stdin()?)
    } else {
        None
    };
    let request = args.to_request(inline)?;
    if let Some(image) = client.build_image(&request).await? {
        println!("{image}");
    }
    Ok(())
}

#[expect(clippy::print_stdout, reason = "CLI output is the intended behaviour")]
async fn wait(client: &BuildxClient, config: &AppConfig, args: &WaitArgs) -> BuildkeeperResult<()> {
    let name = BuilderName::new(args.name.as_str())?;
    let timeout = args
        .timeout_secs
        .map_or_else(|| config.poll.timeout(), Duration::from_secs);
    let builder = client
        .wait_until_status(&name, args.status, Deadline::after(timeout))
        .await?;
    println!("{} {}", builder.name(), status_text(&builder));
    Ok(())
}

fn status_text(builder: &BuilderRecord) -> &'static str {
    builder.status().map_or("-", |status| status.as_str())
}

fn read_stdin() -> BuildkeeperResult<String> {
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .map_err(|error| ConfigError::InvalidValue {
            field: String::from("-f"),
            reason: format!("failed to read Dockerfile from standard input: {error}"),
        })?;
    Ok(text)
}
