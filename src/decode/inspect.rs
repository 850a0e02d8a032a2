//! Parser for the labelled text printed by `docker buildx inspect`.

use super::records::{BuilderName, BuilderRecord, DriverKind, NodeRecord, NodeStatus};
use crate::error::{BuildxError, Result};
use crate::process::split_lines;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Name,
    Driver,
    Error,
    Status,
}

const LABELS: [(&str, Label); 4] = [
    ("Name:", Label::Name),
    ("Driver:", Label::Driver),
    ("Error:", Label::Error),
    ("Status:", Label::Status),
];

/// Raw labelled values of one block; the first occurrence of a label wins.
#[derive(Debug, Default)]
struct Block<'a> {
    name: Option<&'a str>,
    driver: Option<&'a str>,
    error: Option<&'a str>,
    status: Option<&'a str>,
}

impl<'a> Block<'a> {
    fn set(&mut self, label: Label, value: &'a str) {
        let slot = match label {
            Label::Name => &mut self.name,
            Label::Driver => &mut self.driver,
            Label::Error => &mut self.error,
            Label::Status => &mut self.status,
        };
        slot.get_or_insert(value);
    }

    fn into_node(self) -> Result<NodeRecord> {
        let name = self.name.unwrap_or_default();
        let status = self
            .status
            .filter(|status| !status.is_empty())
            .map(str::parse::<NodeStatus>)
            .transpose()?;
        NodeRecord::new(name, status, self.error.unwrap_or_default())
    }
}

fn labelled(line: &str) -> Option<(Label, &str)> {
    LABELS.iter().find_map(|(prefix, label)| {
        line.strip_prefix(prefix)
            .map(|value| (*label, value.trim()))
    })
}

/// Parse one builder description.
///
/// The header block describes the builder itself. A `Nodes:` line starts the
/// node section, in which every `Name:` label opens a new node.
pub(super) fn parse_builder(text: &str) -> Result<BuilderRecord> {
    let mut header = Block::default();
    let mut nodes = Vec::new();
    let mut current: Option<Block<'_>> = None;
    let mut in_nodes = false;

    for raw in split_lines(text) {
        let line = raw.trim();
        if line.is_empty() {
            nodes.extend(current.take());
            continue;
        }
        if line == "Nodes:" {
            in_nodes = true;
            continue;
        }
        let Some((label, value)) = labelled(line) else {
            continue;
        };
        if !in_nodes {
            header.set(label, value);
            continue;
        }
        if label == Label::Name {
            nodes.extend(current.replace(Block::default()));
        }
        if let Some(node) = current.as_mut() {
            node.set(label, value);
        }
    }
    nodes.extend(current.take());

    let name = header.name.ok_or_else(|| BuildxError::InvalidResponse {
        message: String::from("inspect output names no builder"),
    })?;
    let driver = header
        .driver
        .filter(|driver| !driver.is_empty())
        .map(str::parse::<DriverKind>)
        .transpose()?;
    let node_records = nodes
        .into_iter()
        .map(Block::into_node)
        .collect::<Result<Vec<_>>>()?;
    BuilderRecord::new(
        BuilderName::new(name)?,
        driver,
        header.error.unwrap_or_default(),
        node_records,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BuildkeeperError, ErrorCategory};
    use rstest::rstest;

    const RUNNING: &str = "\
Name:          b1
Driver:        docker-container
Last Activity: 2026-10-01 09:30:00 +0000 UTC

Nodes:
Name:                  b10
Endpoint:              unix:///var/run/docker.sock
Status:                running
BuildKit version:      v0.16.0
Platforms:             linux/amd64, linux/arm64
Labels:
 org.mobyproject.buildkit.worker.executor: oci

Name:      b11
Endpoint:  ssh://builder.internal
Error:     dial ssh: connection refused
";

    #[rstest]
    fn parses_header_and_every_node() -> Result<()> {
        let record = parse_builder(RUNNING)?;

        assert_eq!(record.name().as_str(), "b1");
        assert_eq!(record.driver(), Some(DriverKind::DockerContainer));
        assert!(record.error().is_empty());
        assert_eq!(record.nodes().len(), 2);
        assert_eq!(record.status(), Some(NodeStatus::Running));

        let failing = record.nodes().get(1);
        assert_eq!(failing.map(NodeRecord::name), Some("b11"));
        assert_eq!(failing.map(NodeRecord::status), Some(NodeStatus::Error));
        assert_eq!(
            failing.map(NodeRecord::error),
            Some("dial ssh: connection refused")
        );
        Ok(())
    }

    #[rstest]
    fn builder_level_error_leaves_driver_absent() -> Result<()> {
        let record = parse_builder("Name:   broken\nError:  failed to load driver\n")?;

        assert_eq!(record.driver(), None);
        assert_eq!(record.error(), "failed to load driver");
        assert!(record.nodes().is_empty());
        Ok(())
    }

    #[rstest]
    #[case("Name: b1\nDriver: docker\nError: boom\n")]
    #[case("Driver: docker\n")]
    #[case("Name: b1\nDriver: docker\n\nNodes:\nName: b10\nStatus: melting\n")]
    #[case("Name: b1\nDriver: lxc\n")]
    fn invariant_violations_are_invalid_responses(#[case] text: &str) {
        let error = parse_builder(text).err();
        assert!(matches!(
            error,
            Some(BuildkeeperError::Buildx(BuildxError::InvalidResponse { .. }))
        ));
        assert_eq!(error.map(|e| e.category()), Some(ErrorCategory::Terminal));
    }

    #[rstest]
    fn crlf_output_is_parsed() -> Result<()> {
        let record =
            parse_builder("Name: b1\r\nDriver: docker\r\n\r\nNodes:\r\nName: b1\r\nStatus: Inactive\r\n")?;
        assert_eq!(record.status(), Some(NodeStatus::Inactive));
        Ok(())
    }
}
