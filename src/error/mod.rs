use std::fmt;

pub mod testing;

/// Main error type for the pg_distobj propagation engine
#[derive(Debug, Clone, PartialEq)]
pub enum DistError {
    // ============ Object Support Errors (0A000) ============
    /// Object kind is not covered by propagation
    UnsupportedKind {
        kind: String,
    },

    /// Alteration sub-kind is not covered by propagation
    UnsupportedAlteration {
        target: String,
        subtype: String,
    },

    // ============ Lookup Errors (42xxx) ============
    /// Object vanished or name did not resolve locally
    NotFound {
        object: String,
    },

    /// Name resolves to more than one local object
    Ambiguous {
        name: String,
        candidates: usize,
    },

    /// Qualified name could not be parsed
    InvalidQualifiedName {
        name: String,
        reason: String,
    },

    // ============ Remote Errors (08xxx / 58xxx) ============
    /// Worker node could not be reached
    NodeUnreachable {
        node: String,
        reason: String,
    },

    /// A statement failed on a worker node
    RemoteExecutionFailed {
        node: String,
        statement: String,
        sqlstate: Option<String>,
        message: String,
    },

    /// Enum value addition did not reach every node (warning level)
    PartialEnumPropagation {
        type_name: String,
        failed_nodes: Vec<String>,
        recovery_statement: String,
    },

    // ============ Control Errors ============
    /// Propagation was cancelled or timed out while waiting on a node
    Cancelled {
        context: String,
    },

    /// Dependency walk went deeper than the configured maximum
    DependencyDepthExceeded {
        depth: usize,
        max_depth: usize,
    },

    // ============ I/O and System Errors (XX000) ============
    /// PostgreSQL catalog operation failed
    CatalogError {
        operation: String,
        pg_error: String,
    },

    /// SPI operation failed
    SpiError {
        query: String,
        error: String,
    },

    /// Serialization/deserialization failed
    SerializationError {
        message: String,
    },

    /// Configuration error (invalid GUC values)
    ConfigError {
        setting: String,
        value: String,
        reason: String,
    },

    /// Internal error (bug in extension)
    InternalError {
        message: String,
        file: &'static str,
        line: u32,
    },
}

impl DistError {
    /// Get PostgreSQL SQLSTATE code for this error
    pub fn sqlstate(&self) -> &'static str {
        use DistError::*;
        match self {
            UnsupportedKind { .. } => "0A000", // Feature not supported
            UnsupportedAlteration { .. } => "0A000",

            NotFound { .. } => "42704", // Undefined object
            Ambiguous { .. } => "42725", // Ambiguous name
            InvalidQualifiedName { .. } => "42602", // Invalid name

            NodeUnreachable { .. } => "08001", // Unable to establish connection
            RemoteExecutionFailed { .. } => "58000", // System error (remote)
            PartialEnumPropagation { .. } => "01000", // Warning

            Cancelled { .. } => "57014", // Query canceled
            DependencyDepthExceeded { .. } => "54001", // Statement too complex

            CatalogError { .. } => "XX000",
            SpiError { .. } => "XX000",
            SerializationError { .. } => "XX000",
            ConfigError { .. } => "22023", // Invalid parameter value
            InternalError { .. } => "XX000",
        }
    }

    /// Warning-level conditions leave the local change in place
    pub fn is_warning(&self) -> bool {
        matches!(self, DistError::PartialEnumPropagation { .. })
    }

    /// Whether re-running the whole propagation later can succeed
    pub fn is_retryable(&self) -> bool {
        use DistError::*;
        matches!(
            self,
            NotFound { .. }
                | NodeUnreachable { .. }
                | RemoteExecutionFailed { .. }
                | PartialEnumPropagation { .. }
                | Cancelled { .. }
        )
    }

    /// Create internal error with file/line info
    pub fn internal(message: String, file: &'static str, line: u32) -> Self {
        DistError::InternalError { message, file, line }
    }
}

impl fmt::Display for DistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use DistError::*;
        match self {
            UnsupportedKind { kind } => {
                write!(f, "Object kind '{}' is not supported for propagation", kind)
            }
            UnsupportedAlteration { target, subtype } => {
                write!(f, "Unsupported alteration '{}' for {}", subtype, target)
            }
            NotFound { object } => {
                write!(f, "Object {} not found", object)
            }
            Ambiguous { name, candidates } => {
                write!(f, "Name '{}' is ambiguous ({} candidates)", name, candidates)
            }
            InvalidQualifiedName { name, reason } => {
                write!(f, "Invalid qualified name '{}': {}", name, reason)
            }
            NodeUnreachable { node, reason } => {
                write!(f, "Could not connect to node {}: {}", node, reason)
            }
            RemoteExecutionFailed { node, statement, sqlstate, message } => {
                let shown = if statement.len() > 100 { &statement[..100] } else { statement };
                match sqlstate {
                    Some(code) => write!(
                        f,
                        "Statement failed on node {} [{}]: {}\nStatement: {}",
                        node, code, message, shown
                    ),
                    None => write!(
                        f,
                        "Statement failed on node {}: {}\nStatement: {}",
                        node, message, shown
                    ),
                }
            }
            PartialEnumPropagation { type_name, failed_nodes, recovery_statement } => {
                write!(
                    f,
                    "Not all workers applied change to enum {} (failed: {}). Retry with: {}",
                    type_name,
                    failed_nodes.join(", "),
                    recovery_statement
                )
            }
            Cancelled { context } => {
                write!(f, "Propagation cancelled while {}", context)
            }
            DependencyDepthExceeded { depth, max_depth } => {
                write!(f, "Dependency depth {} exceeds maximum {}", depth, max_depth)
            }
            CatalogError { operation, pg_error } => {
                write!(f, "Catalog operation '{}' failed: {}", operation, pg_error)
            }
            SpiError { query, error } => {
                write!(f, "SPI query failed: {}\nQuery: {}", error,
                       if query.len() > 100 { &query[..100] } else { query })
            }
            SerializationError { message } => {
                write!(f, "Serialization error: {}", message)
            }
            ConfigError { setting, value, reason } => {
                write!(f, "Configuration error for '{}': {} (value: {})", setting, reason, value)
            }
            InternalError { message, file, line } => {
                write!(f, "Internal error at {}:{}: {}\nPlease report this bug.",
                       file, line, message)
            }
        }
    }
}

impl std::error::Error for DistError {}

/// Result type for propagation operations
pub type DistResult<T> = Result<T, DistError>;

/// Convert SpiError to DistError
#[cfg(feature = "pg")]
impl From<pgrx::spi::Error> for DistError {
    fn from(e: pgrx::spi::Error) -> Self {
        DistError::SpiError {
            query: "Unknown".to_string(),
            error: e.to_string(),
        }
    }
}

/// Convert serde_json::Error to DistError
impl From<serde_json::Error> for DistError {
    fn from(e: serde_json::Error) -> Self {
        DistError::SerializationError {
            message: format!("JSON serialization error: {}", e),
        }
    }
}

/// Convert regex::Error to DistError
impl From<regex::Error> for DistError {
    fn from(e: regex::Error) -> Self {
        DistError::internal(format!("Regex compilation failed: {}", e), file!(), line!())
    }
}

/// Helper macro for creating internal errors with automatic file/line
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::error::DistError::internal($msg.to_string(), file!(), line!())
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::DistError::internal(format!($fmt, $($arg)*), file!(), line!())
    };
}

/// Helper macro for requiring a value or returning error
#[macro_export]
macro_rules! require {
    ($opt:expr, $err:expr) => {
        match $opt {
            Some(v) => v,
            None => return Err($err),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = DistError::NotFound {
            object: "type app.order_status".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("app.order_status"));
        assert!(msg.contains("not found"));
        assert_eq!(err.sqlstate(), "42704");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_partial_enum_message_carries_recovery() {
        let err = DistError::PartialEnumPropagation {
            type_name: "app.status".to_string(),
            failed_nodes: vec!["w2:5432".to_string()],
            recovery_statement: "ALTER TYPE app.status ADD VALUE IF NOT EXISTS 'archived';"
                .to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("w2:5432"));
        assert!(msg.contains("ADD VALUE IF NOT EXISTS 'archived'"));
        testing::assert_warning(&err);
        assert_eq!(err.sqlstate(), "01000");
    }

    #[test]
    fn test_unsupported_errors_are_not_retryable() {
        let kind = DistError::UnsupportedKind { kind: "function".to_string() };
        let alter = DistError::UnsupportedAlteration {
            target: "type app.t".to_string(),
            subtype: "SET SCHEMA".to_string(),
        };

        assert!(!kind.is_retryable());
        assert!(!alter.is_retryable());
        assert!(!kind.is_warning());
    }

    #[test]
    fn test_remote_failure_truncates_statement() {
        let err = DistError::RemoteExecutionFailed {
            node: "w1:5432".to_string(),
            statement: "x".repeat(300),
            sqlstate: Some("42P07".to_string()),
            message: "boom".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("[42P07]"));
        assert!(msg.len() < 250);
    }

    #[test]
    fn test_internal_error_macro() {
        let err = internal_error!("Test error at {}", "location");

        match err {
            DistError::InternalError { message, file, line } => {
                assert!(message.contains("Test error"));
                assert!(file.ends_with("mod.rs"));
                assert!(line > 0);
            }
            _ => panic!("Wrong error type"),
        }
    }

    #[test]
    fn test_require_macro_returns_error() {
        fn first(values: &[u32]) -> DistResult<u32> {
            let v = require!(values.first(), DistError::NotFound { object: "first".to_string() });
            Ok(*v)
        }

        assert_eq!(first(&[7]), Ok(7));
        assert!(first(&[]).is_err());
    }

    #[test]
    fn test_sqlstates_mostly_distinct() {
        let errors = vec![
            DistError::UnsupportedKind { kind: "t".to_string() },
            DistError::NotFound { object: "t".to_string() },
            DistError::Ambiguous { name: "t".to_string(), candidates: 2 },
            DistError::InvalidQualifiedName { name: "t".to_string(), reason: "t".to_string() },
            DistError::NodeUnreachable { node: "t".to_string(), reason: "t".to_string() },
            DistError::RemoteExecutionFailed {
                node: "t".to_string(),
                statement: "t".to_string(),
                sqlstate: None,
                message: "t".to_string(),
            },
            DistError::PartialEnumPropagation {
                type_name: "t".to_string(),
                failed_nodes: vec![],
                recovery_statement: "t".to_string(),
            },
            DistError::Cancelled { context: "t".to_string() },
            DistError::DependencyDepthExceeded { depth: 1, max_depth: 1 },
            DistError::ConfigError {
                setting: "t".to_string(),
                value: "t".to_string(),
                reason: "t".to_string(),
            },
            DistError::CatalogError { operation: "t".to_string(), pg_error: "t".to_string() },
        ];

        let unique: std::collections::HashSet<&str> = errors.iter().map(|e| e.sqlstate()).collect();
        assert!(unique.len() >= 10, "Too many duplicate SQLSTATE codes");
    }
}
