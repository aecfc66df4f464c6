//! Worker fleet: which nodes are active and how statements reach them

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::deparse::Statement;
use crate::error::DistResult;

/// SQLSTATE `duplicate_object`, raised for an enum label that already exists
pub const DUPLICATE_OBJECT_SQLSTATE: &str = "42710";

static DUPLICATE_LABEL_RE: Lazy<Result<Regex, regex::Error>> =
    Lazy::new(|| Regex::new(r#"(?i)enum label ".*" already exists"#));

/// An active primary worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerNode {
    pub name: String,
    pub port: u16,
}

impl WorkerNode {
    pub fn new(name: &str, port: u16) -> Self {
        Self { name: name.to_string(), port }
    }
}

impl fmt::Display for WorkerNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

pub trait NodeDirectory {
    /// Primary workers currently accepting metadata changes
    fn active_nodes(&self) -> DistResult<Vec<WorkerNode>>;
}

/// Handle to one dedicated connection opened by a [`ConnectionProvider`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeConnection {
    pub id: String,
    pub node: WorkerNode,
}

/// Result of one statement on one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementOutcome {
    Ok,
    Failed {
        sqlstate: Option<String>,
        message: String,
    },
}

impl StatementOutcome {
    pub fn failed(message: &str) -> Self {
        StatementOutcome::Failed { sqlstate: None, message: message.to_string() }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, StatementOutcome::Ok)
    }

    /// Failure caused by an enum value that the node already has
    pub fn is_duplicate_enum_value(&self) -> bool {
        match self {
            StatementOutcome::Ok => false,
            StatementOutcome::Failed { sqlstate, message } => {
                sqlstate.as_deref() == Some(DUPLICATE_OBJECT_SQLSTATE)
                    || DUPLICATE_LABEL_RE
                        .as_ref()
                        .map(|re| re.is_match(message))
                        .unwrap_or(false)
            }
        }
    }
}

/// Dedicated connections to worker nodes
pub trait ConnectionProvider {
    /// Open a connection as `role`
    ///
    /// # Errors
    /// `NodeUnreachable` when the node cannot be reached, `Cancelled` on interrupt.
    fn open(&mut self, node: &WorkerNode, role: &str) -> DistResult<NodeConnection>;

    /// Run statements in order, one outcome per statement attempted;
    /// stops after the first failure
    fn execute(
        &mut self,
        connection: &NodeConnection,
        statements: &[Statement],
    ) -> DistResult<Vec<StatementOutcome>>;

    fn close(&mut self, connection: NodeConnection);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_enum_value_detection() {
        let by_code = StatementOutcome::Failed {
            sqlstate: Some("42710".to_string()),
            message: "whatever".to_string(),
        };
        let by_message = StatementOutcome::failed("ERROR:  enum label \"archived\" already exists");
        let other = StatementOutcome::failed("could not connect to server");

        assert!(by_code.is_duplicate_enum_value());
        assert!(by_message.is_duplicate_enum_value());
        assert!(!other.is_duplicate_enum_value());
        assert!(!StatementOutcome::Ok.is_duplicate_enum_value());
    }

    #[test]
    fn test_node_display() {
        assert_eq!(WorkerNode::new("w1", 5432).to_string(), "w1:5432");
    }
}
