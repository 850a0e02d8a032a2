//! Command-line argument definitions for buildkeeper.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};

use crate::decode::{BuilderName, DriverKind, NodeStatus};
use crate::engine::{BuildRequest, CreateBuilderRequest, Dockerfile};
use crate::error::{ConfigError, Result};

/// Command-line interface for buildkeeper.
#[derive(Debug, Parser)]
#[command(name = "buildkeeper")]
#[command(
    author,
    version,
    about = "Manage docker buildx builders and builds"
)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file.
    #[arg(long, global = true)]
    pub config: Option<Utf8PathBuf>,

    /// Path to the docker executable.
    #[arg(long, global = true)]
    pub docker: Option<Utf8PathBuf>,

    /// Directory to run buildx commands in.
    #[arg(long, global = true)]
    pub working_dir: Option<Utf8PathBuf>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List builders.
    Ls,

    /// Describe one builder.
    Inspect(InspectArgs),

    /// Create a builder.
    Create(CreateArgs),

    /// Remove a builder. Removing a missing builder succeeds.
    Rm(RemoveArgs),

    /// Build an image.
    Build(BuildArgs),

    /// Wait until a builder reaches a status.
    Wait(WaitArgs),
}

/// Arguments for the `inspect` subcommand.
#[derive(Debug, Parser)]
pub struct InspectArgs {
    /// Builder name.
    #[arg(required = true)]
    pub name: String,
}

/// Arguments for the `create` subcommand.
#[derive(Debug, Parser)]
pub struct CreateArgs {
    /// Builder name.
    #[arg(required = true)]
    pub name: String,

    /// Driver to run the builder on.
    #[arg(long, value_enum)]
    pub driver: Option<DriverKind>,

    /// Driver option in `key=value` form.
    #[arg(long = "driver-opt", value_name = "KEY=VALUE")]
    pub driver_opts: Vec<String>,

    /// Platform the builder serves; may be repeated.
    #[arg(long = "platform")]
    pub platforms: Vec<String>,

    /// Docker context or endpoint for the node.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Boot the builder immediately.
    #[arg(long)]
    pub bootstrap: bool,

    /// Make the builder the current one.
    #[arg(long = "use")]
    pub use_builder: bool,
}

/// Arguments for the `rm` subcommand.
#[derive(Debug, Parser)]
pub struct RemoveArgs {
    /// Builder name.
    #[arg(required = true)]
    pub name: String,
}

/// Arguments for the `build` subcommand.
#[derive(Debug, Parser)]
pub struct BuildArgs {
    /// Build context directory or URL.
    #[arg(required = true)]
    pub context: String,

    /// Image tag; may be repeated.
    #[arg(short = 't', long = "tag")]
    pub tags: Vec<String>,

    /// Dockerfile path.
    #[arg(short = 'f', long)]
    pub file: Option<Utf8PathBuf>,

    /// Builder to run the build on.
    #[arg(long)]
    pub builder: Option<String>,

    /// Load the result into the local image store.
    #[arg(long)]
    pub load: bool,

    /// Target platform; may be repeated.
    #[arg(long = "platform")]
    pub platforms: Vec<String>,

    /// Build argument in `key=value` form.
    #[arg(long = "build-arg", value_name = "KEY=VALUE")]
    pub build_args: Vec<String>,

    /// Stage to build.
    #[arg(long)]
    pub target: Option<String>,
}

/// Arguments for the `wait` subcommand.
#[derive(Debug, Parser)]
pub struct WaitArgs {
    /// Builder name.
    #[arg(required = true)]
    pub name: String,

    /// Status to wait for.
    #[arg(long, value_enum, default_value_t = NodeStatus::Running)]
    pub status: NodeStatus,

    /// Give up after this many seconds; defaults to `poll.timeout_secs`.
    #[arg(long)]
    pub timeout_secs: Option<u64>,
}

impl CreateArgs {
    /// Translate the arguments into a creation request.
    ///
    /// # Errors
    ///
    /// Returns `BuildxError::InvalidName` for an unusable builder name, or
    /// `ConfigError::InvalidValue` for a driver option without `=`.
    pub fn to_request(&self) -> Result<CreateBuilderRequest> {
        let mut request = CreateBuilderRequest::new(BuilderName::new(self.name.as_str())?)
            .with_driver(self.driver)
            .with_platforms(self.platforms.iter().cloned())
            .with_endpoint(self.endpoint.clone())
            .with_bootstrap(self.bootstrap)
            .with_use(self.use_builder);
        for raw in &self.driver_opts {
            let (key, value) = split_key_value("--driver-opt", raw)?;
            request = request.with_driver_opt(key, value)?;
        }
        Ok(request)
    }
}

impl BuildArgs {
    /// Translate the arguments into a build request.
    ///
    /// `-f -` is left to the caller, which supplies the Dockerfile text as
    /// `inline`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an empty context or a build argument
    /// without `=`, and `BuildxError::InvalidName` for an unusable builder.
    pub fn to_request(&self, inline: Option<String>) -> Result<BuildRequest> {
        let builder = self
            .builder
            .as_deref()
            .map(BuilderName::new)
            .transpose()?;
        let dockerfile = match (inline, &self.file) {
            (Some(text), _) => Dockerfile::Inline(text),
            (None, Some(path)) => Dockerfile::Path(path.clone()),
            (None, None) => Dockerfile::Context,
        };
        let mut request = BuildRequest::new(self.context.as_str())?
            .with_builder(builder)
            .with_dockerfile(dockerfile)
            .with_tags(self.tags.iter().cloned())
            .with_platforms(self.platforms.iter().cloned())
            .with_target(self.target.clone())
            .with_load(self.load);
        for raw in &self.build_args {
            let (key, value) = split_key_value("--build-arg", raw)?;
            request = request.with_build_arg(key, value)?;
        }
        Ok(request)
    }

    /// Whether the Dockerfile is to be read from standard input.
    #[must_use]
    pub fn dockerfile_from_stdin(&self) -> bool {
        self.file.as_ref().is_some_and(|path| path.as_str() == "-")
    }
}

fn split_key_value<'a>(flag: &str, raw: &'a str) -> Result<(&'a str, &'a str)> {
    raw.split_once('=').ok_or_else(|| {
        ConfigError::InvalidValue {
            field: flag.to_owned(),
            reason: format!("expected KEY=VALUE, got '{raw}'"),
        }
        .into()
    })
}
