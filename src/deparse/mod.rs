//! Rendering of local objects into statements a worker can replay

pub mod alter;
pub mod create;
pub mod worker;

use serde::{Deserialize, Serialize};

use crate::config::PropagationConfig;
use crate::error::{DistError, DistResult};
use crate::host::LocalCatalog;
use crate::object::{behavior, ObjectReference};

pub use alter::{render_alteration, render_drop_types, TypeAlteration, ValuePosition};
pub use create::create_type_sql;
pub use worker::{parse_create_type, CreateTypeStatement};

/// One SQL statement destined for a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    pub sql: String,
    /// `false` for statements the server refuses inside a transaction block
    pub transaction_safe: bool,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), transaction_safe: true }
    }

    pub fn non_transactional(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), transaction_safe: false }
    }
}

/// Statements recreating `reference` on a worker; empty when there is nothing to send
///
/// # Errors
/// `UnsupportedKind` for kinds outside the behavior table, `NotFound` if the
/// object vanished.
pub fn render(
    catalog: &dyn LocalCatalog,
    config: &PropagationConfig,
    reference: &ObjectReference,
) -> DistResult<Vec<Statement>> {
    match (behavior(reference.kind()), reference.oid()) {
        (Some(kind_behavior), Some(oid)) => (kind_behavior.render)(catalog, config, oid),
        _ => Err(DistError::UnsupportedKind {
            kind: format!("object {}", reference.address()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ObjectAddress;
    use crate::testing::FakeCatalog;

    #[test]
    fn test_render_dispatches_by_kind() {
        let mut catalog = FakeCatalog::new();
        let app = catalog.add_namespace("app", "alice");
        let status = catalog.add_enum(app, "status", &["a"], "alice");
        let config = PropagationConfig::default();

        let schema = render(&catalog, &config, &ObjectReference::Namespace(app)).unwrap();
        assert_eq!(schema.len(), 1);

        let enum_stmts = render(&catalog, &config, &ObjectReference::EnumType(status)).unwrap();
        assert_eq!(enum_stmts.len(), 2);
        assert!(enum_stmts.iter().all(|s| s.transaction_safe));

        let other = ObjectReference::Other(ObjectAddress::type_(23));
        assert_eq!(render(&catalog, &config, &other).unwrap_err().sqlstate(), "0A000");
    }
}
