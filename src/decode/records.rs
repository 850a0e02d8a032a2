//! Typed records describing buildx builders, their nodes and built images.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;

use crate::error::{BuildkeeperError, BuildxError, Result};

/// A validated builder name.
///
/// Names start with an ASCII letter or digit and continue with letters,
/// digits, `_`, `.` or `-`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuilderName(String);

impl BuilderName {
    /// Validate and wrap a builder name.
    ///
    /// # Errors
    ///
    /// Returns `BuildxError::InvalidName` when the name is empty or contains
    /// characters buildx does not accept.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let candidate = name.into();
        let mut chars = candidate.chars();
        let Some(first) = chars.next() else {
            return Err(invalid_name(&candidate, "cannot be empty"));
        };
        if !first.is_ascii_alphanumeric() {
            return Err(invalid_name(&candidate, "must start with a letter or digit"));
        }
        if let Some(bad) = chars.find(|ch| !is_name_char(*ch)) {
            return Err(invalid_name(
                &candidate,
                &format!("contains unsupported character '{bad}'"),
            ));
        }
        Ok(Self(candidate))
    }

    /// Return the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

const fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-')
}

fn invalid_name(name: &str, reason: &str) -> BuildkeeperError {
    BuildxError::InvalidName {
        name: String::from(name),
        reason: String::from(reason),
    }
    .into()
}

impl FromStr for BuilderName {
    type Err = BuildkeeperError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl AsRef<str> for BuilderName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuilderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status of one builder node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum NodeStatus {
    /// The node has been created but never started.
    Created,
    /// The node exists but is not running.
    Inactive,
    /// The node is booting.
    Starting,
    /// The node accepts builds.
    Running,
    /// The node is shutting down.
    Stopping,
    /// The node has stopped.
    Stopped,
    /// The node reported an error.
    Error,
}

impl NodeStatus {
    /// Return the lowercase name buildx prints for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Inactive => "inactive",
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl FromStr for NodeStatus {
    type Err = BuildkeeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(Self::Created),
            "inactive" => Ok(Self::Inactive),
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopping" => Ok(Self::Stopping),
            "stopped" => Ok(Self::Stopped),
            "error" => Ok(Self::Error),
            other => Err(BuildxError::InvalidResponse {
                message: format!("unknown node status '{other}'"),
            }
            .into()),
        }
    }
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The driver a builder runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum DriverKind {
    /// The docker daemon's embedded builder.
    Docker,
    /// `BuildKit` in a dedicated container.
    DockerContainer,
    /// `BuildKit` pods in a Kubernetes cluster.
    Kubernetes,
    /// A remote `BuildKit` daemon.
    Remote,
    /// Docker Build Cloud.
    Cloud,
}

impl DriverKind {
    /// Return the name buildx uses for this driver.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::DockerContainer => "docker-container",
            Self::Kubernetes => "kubernetes",
            Self::Remote => "remote",
            Self::Cloud => "cloud",
        }
    }
}

impl FromStr for DriverKind {
    type Err = BuildkeeperError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "docker-container" => Ok(Self::DockerContainer),
            "kubernetes" => Ok(Self::Kubernetes),
            "remote" => Ok(Self::Remote),
            "cloud" => Ok(Self::Cloud),
            other => Err(BuildxError::InvalidResponse {
                message: format!("unknown builder driver '{other}'"),
            }
            .into()),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of a builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    name: String,
    status: NodeStatus,
    error: String,
}

impl NodeRecord {
    /// Assemble a node.
    ///
    /// A node without a reported status is in error when it carries an error
    /// message.
    ///
    /// # Errors
    ///
    /// Returns `BuildxError::InvalidResponse` when the name is blank or
    /// contains whitespace, or when neither a status nor an error message was
    /// reported.
    pub fn new(name: impl Into<String>, status: Option<NodeStatus>, error: &str) -> Result<Self> {
        let node_name = name.into();
        if node_name.is_empty() || node_name.chars().any(char::is_whitespace) {
            return Err(BuildxError::InvalidResponse {
                message: format!("invalid node name '{node_name}'"),
            }
            .into());
        }
        let message = error.trim();
        let resolved = match (status, message.is_empty()) {
            (Some(reported), _) => reported,
            (None, false) => NodeStatus::Error,
            (None, true) => {
                return Err(BuildxError::InvalidResponse {
                    message: format!("node '{node_name}' has no status"),
                }
                .into());
            }
        };
        Ok(Self {
            name: node_name,
            status: resolved,
            error: String::from(message),
        })
    }

    /// Return the node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the node status.
    #[must_use]
    pub const fn status(&self) -> NodeStatus {
        self.status
    }

    /// Return the node-level error; empty when there is none.
    #[must_use]
    pub fn error(&self) -> &str {
        &self.error
    }
}

/// One builder as reported by `buildx ls` or `buildx inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderRecord {
    name: BuilderName,
    driver: Option<DriverKind>,
    error: String,
    nodes: Vec<NodeRecord>,
}

impl BuilderRecord {
    /// Assemble a builder record.
    ///
    /// # Errors
    ///
    /// Returns `BuildxError::InvalidResponse` when a builder-level error is
    /// reported alongside a driver: buildx omits the driver of a builder it
    /// could not load.
    pub fn new(
        name: BuilderName,
        driver: Option<DriverKind>,
        error: &str,
        nodes: Vec<NodeRecord>,
    ) -> Result<Self> {
        let message = error.trim();
        if let Some(kind) = driver.filter(|_| !message.is_empty()) {
            return Err(BuildxError::InvalidResponse {
                message: format!("builder '{name}' reports driver {kind} with error '{message}'"),
            }
            .into());
        }
        Ok(Self {
            name,
            driver,
            error: String::from(message),
            nodes,
        })
    }

    /// Return the builder name.
    #[must_use]
    pub const fn name(&self) -> &BuilderName {
        &self.name
    }

    /// Return the driver, absent when the builder failed to load.
    #[must_use]
    pub const fn driver(&self) -> Option<DriverKind> {
        self.driver
    }

    /// Return the builder-level error; empty when there is none.
    #[must_use]
    pub fn error(&self) -> &str {
        &self.error
    }

    /// Return the nodes in reported order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    /// Return the first node, whose status stands for the builder's.
    #[must_use]
    pub fn primary_node(&self) -> Option<&NodeRecord> {
        self.nodes.first()
    }

    /// Return the status of the first node.
    #[must_use]
    pub fn status(&self) -> Option<NodeStatus> {
        self.primary_node().map(NodeRecord::status)
    }
}

/// A content-addressed image identifier of the form `sha256:<64 hex>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageId(String);

impl ImageId {
    /// Validate and wrap an image digest.
    ///
    /// # Errors
    ///
    /// Returns `BuildxError::InvalidResponse` when `digest` is not a lowercase
    /// `sha256:` digest of 64 hexadecimal characters.
    pub fn new(digest: impl Into<String>) -> Result<Self> {
        let candidate = digest.into();
        let valid = candidate.strip_prefix("sha256:").is_some_and(|hex| {
            hex.len() == 64
                && hex
                    .chars()
                    .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch))
        });
        if valid {
            Ok(Self(candidate))
        } else {
            Err(BuildxError::InvalidResponse {
                message: format!("malformed image digest '{candidate}'"),
            }
            .into())
        }
    }

    /// Return the digest as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
