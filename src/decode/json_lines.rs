//! Parser for `docker buildx ls --format json`, one document per line.

use serde::Deserialize;

use super::records::{BuilderName, BuilderRecord, DriverKind, NodeRecord, NodeStatus};
use crate::error::{BuildxError, Result};
use crate::process::split_lines;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BuilderLine {
    name: String,
    #[serde(default)]
    driver: Option<String>,
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    nodes: Option<Vec<NodeLine>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct NodeLine {
    name: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    err: Option<String>,
}

impl NodeLine {
    fn into_record(self) -> Result<NodeRecord> {
        let status = self
            .status
            .as_deref()
            .filter(|status| !status.is_empty())
            .map(str::parse::<NodeStatus>)
            .transpose()?;
        NodeRecord::new(self.name, status, self.err.as_deref().unwrap_or_default())
    }
}

impl BuilderLine {
    fn into_record(self) -> Result<BuilderRecord> {
        let driver = self
            .driver
            .as_deref()
            .filter(|driver| !driver.is_empty())
            .map(str::parse::<DriverKind>)
            .transpose()?;
        let nodes = self
            .nodes
            .unwrap_or_default()
            .into_iter()
            .map(NodeLine::into_record)
            .collect::<Result<Vec<_>>>()?;
        BuilderRecord::new(
            BuilderName::new(self.name)?,
            driver,
            self.err.as_deref().unwrap_or_default(),
            nodes,
        )
    }
}

/// Returns whether every non-blank line looks like a JSON object.
pub(super) fn is_json_lines(text: &str) -> bool {
    split_lines(text)
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .all(|line| line.starts_with('{'))
}

/// Parse every non-blank line as one builder document.
pub(super) fn parse_builders(text: &str) -> Result<Vec<BuilderRecord>> {
    split_lines(text)
        .into_iter()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            let parsed: BuilderLine =
                serde_json::from_str(line).map_err(|error| BuildxError::InvalidResponse {
                    message: format!("line {}: {error}", index + 1),
                })?;
            parsed.into_record()
        })
        .collect()
}
