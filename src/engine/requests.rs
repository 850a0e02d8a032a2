//! Builder-creation and image-build request parameters, and the buildx
//! argument lists they translate into.

use camino::Utf8PathBuf;

use crate::decode::{BuilderName, DriverKind};
use crate::error::{ConfigError, Result};

/// Builder-creation request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateBuilderRequest {
    /// The builder to create.
    name: BuilderName,

    /// Driver to run the builder on; buildx picks one when unset.
    driver: Option<DriverKind>,

    /// Driver options in `key=value` form.
    driver_opts: Vec<String>,

    /// Platforms the builder serves.
    platforms: Vec<String>,

    /// Docker context or endpoint the node connects to.
    endpoint: Option<String>,

    /// Whether to boot the builder immediately.
    bootstrap: bool,

    /// Whether to make the builder the current one.
    use_builder: bool,
}

impl CreateBuilderRequest {
    /// Create a request for a builder with default settings.
    #[must_use]
    pub const fn new(name: BuilderName) -> Self {
        Self {
            name,
            driver: None,
            driver_opts: Vec::new(),
            platforms: Vec::new(),
            endpoint: None,
            bootstrap: false,
            use_builder: false,
        }
    }

    /// Select the builder driver.
    #[must_use]
    pub const fn with_driver(mut self, driver: Option<DriverKind>) -> Self {
        self.driver = driver;
        self
    }

    /// Add one driver option.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the key is empty.
    pub fn with_driver_opt(mut self, key: &str, value: &str) -> Result<Self> {
        self.driver_opts.push(key_value("driver-opt", key, value)?);
        Ok(self)
    }

    /// Add platforms, ignoring blank entries.
    #[must_use]
    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = String>) -> Self {
        self.platforms
            .extend(platforms.into_iter().filter(|p| !p.trim().is_empty()));
        self
    }

    /// Attach the endpoint the node connects to.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint.filter(|value| !value.trim().is_empty());
        self
    }

    /// Boot the builder as part of creation.
    #[must_use]
    pub const fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    /// Switch to the builder once created.
    #[must_use]
    pub const fn with_use(mut self, use_builder: bool) -> Self {
        self.use_builder = use_builder;
        self
    }

    /// Return the builder name.
    #[must_use]
    pub const fn name(&self) -> &BuilderName {
        &self.name
    }

    pub(crate) fn to_args(&self) -> Vec<String> {
        let mut args = buildx(["create", "--name", self.name.as_str()]);
        if let Some(driver) = self.driver {
            args.extend(owned(["--driver", driver.as_str()]));
        }
        for opt in &self.driver_opts {
            args.extend(owned(["--driver-opt", opt]));
        }
        if !self.platforms.is_empty() {
            args.push(String::from("--platform"));
            args.push(self.platforms.join(","));
        }
        if self.bootstrap {
            args.push(String::from("--bootstrap"));
        }
        if self.use_builder {
            args.push(String::from("--use"));
        }
        args.extend(self.endpoint.clone());
        args
    }
}

/// Where the Dockerfile for a build comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Dockerfile {
    /// `Dockerfile` inside the build context.
    #[default]
    Context,
    /// A file on disk.
    Path(Utf8PathBuf),
    /// Dockerfile text written to the process's standard input.
    Inline(String),
}

/// Image-build request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Build context directory or URL.
    context: String,

    /// Builder to run on; the current builder when unset.
    builder: Option<BuilderName>,

    /// Dockerfile source.
    dockerfile: Dockerfile,

    /// Image tags.
    tags: Vec<String>,

    /// Target platforms.
    platforms: Vec<String>,

    /// Build arguments in `KEY=value` form.
    build_args: Vec<String>,

    /// Multi-stage target.
    target: Option<String>,

    /// Whether to load the result into the local image store.
    load: bool,
}

impl BuildRequest {
    /// Create a request building `context` with default settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingRequired` when `context` is empty or
    /// whitespace-only.
    pub fn new(context: impl Into<String>) -> Result<Self> {
        let context_value = context.into();
        if context_value.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: String::from("build context"),
            }
            .into());
        }
        Ok(Self {
            context: context_value,
            builder: None,
            dockerfile: Dockerfile::Context,
            tags: Vec::new(),
            platforms: Vec::new(),
            build_args: Vec::new(),
            target: None,
            load: false,
        })
    }

    /// Run on a specific builder.
    #[must_use]
    pub fn with_builder(mut self, builder: Option<BuilderName>) -> Self {
        self.builder = builder;
        self
    }

    /// Choose the Dockerfile source.
    #[must_use]
    pub fn with_dockerfile(mut self, dockerfile: Dockerfile) -> Self {
        self.dockerfile = dockerfile;
        self
    }

    /// Add image tags, ignoring blank entries.
    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = String>) -> Self {
        self.tags
            .extend(tags.into_iter().filter(|tag| !tag.trim().is_empty()));
        self
    }

    /// Add target platforms, ignoring blank entries.
    #[must_use]
    pub fn with_platforms(mut self, platforms: impl IntoIterator<Item = String>) -> Self {
        self.platforms
            .extend(platforms.into_iter().filter(|p| !p.trim().is_empty()));
        self
    }

    /// Add one build argument.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` when the key is empty.
    pub fn with_build_arg(mut self, key: &str, value: &str) -> Result<Self> {
        self.build_args.push(key_value("build-arg", key, value)?);
        Ok(self)
    }

    /// Build a specific multi-stage target.
    #[must_use]
    pub fn with_target(mut self, target: Option<String>) -> Self {
        self.target = target.filter(|value| !value.trim().is_empty());
        self
    }

    /// Load the result into the local image store.
    #[must_use]
    pub const fn with_load(mut self, load: bool) -> Self {
        self.load = load;
        self
    }

    /// Return the Dockerfile source.
    #[must_use]
    pub const fn dockerfile(&self) -> &Dockerfile {
        &self.dockerfile
    }

    /// Bytes to write to standard input: the inline Dockerfile, if any.
    pub(crate) fn input(&self) -> Vec<u8> {
        match &self.dockerfile {
            Dockerfile::Inline(text) => text.clone().into_bytes(),
            Dockerfile::Context | Dockerfile::Path(_) => Vec::new(),
        }
    }

    pub(crate) fn to_args(&self) -> Vec<String> {
        let mut args = buildx(["build", "--progress", "plain"]);
        if let Some(builder) = &self.builder {
            args.extend(owned(["--builder", builder.as_str()]));
        }
        match &self.dockerfile {
            Dockerfile::Context => {}
            Dockerfile::Path(path) => args.extend(owned(["-f", path.as_str()])),
            Dockerfile::Inline(_) => args.extend(owned(["-f", "-"])),
        }
        for tag in &self.tags {
            args.extend(owned(["-t", tag]));
        }
        if !self.platforms.is_empty() {
            args.push(String::from("--platform"));
            args.push(self.platforms.join(","));
        }
        for arg in &self.build_args {
            args.extend(owned(["--build-arg", arg]));
        }
        if let Some(target) = &self.target {
            args.extend(owned(["--target", target]));
        }
        if self.load {
            args.push(String::from("--load"));
        }
        args.push(self.context.clone());
        args
    }
}

pub(crate) fn list_args() -> Vec<String> {
    buildx(["ls", "--format", "json"])
}

pub(crate) fn inspect_args(name: &BuilderName) -> Vec<String> {
    buildx(["inspect", name.as_str()])
}

pub(crate) fn remove_args(name: &BuilderName) -> Vec<String> {
    buildx(["rm", name.as_str()])
}

fn buildx<const N: usize>(rest: [&str; N]) -> Vec<String> {
    std::iter::once("buildx")
        .chain(rest)
        .map(String::from)
        .collect()
}

fn owned<const N: usize>(items: [&str; N]) -> [String; N] {
    items.map(String::from)
}

fn key_value(flag: &str, key: &str, value: &str) -> Result<String> {
    let trimmed = key.trim();
    if trimmed.is_empty() || trimmed.contains('=') {
        return Err(ConfigError::InvalidValue {
            field: String::from(flag),
            reason: format!("invalid key '{key}'"),
        }
        .into());
    }
    Ok(format!("{trimmed}={value}"))
}
