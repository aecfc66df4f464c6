//! Persistent registry of objects known to exist on every worker
//!
//! A row in `distobj.pg_dist_object` means the object was created on every
//! node that was active when the row was written. Rows are only ever added by
//! this crate.

use crate::error::{DistError, DistResult};
use crate::object::{ObjectKind, PortableIdentifier};

/// Table holding one row per distributed object
pub const DIST_OBJECT_TABLE: &str = "distobj.pg_dist_object";

pub trait DistObjectCatalog {
    /// Insert the identifier if absent; returns whether a row was added
    fn record(&mut self, id: &PortableIdentifier) -> DistResult<bool>;

    fn contains(&self, id: &PortableIdentifier) -> DistResult<bool>;

    /// Every recorded identifier, in insertion order where the store keeps one
    fn records(&self) -> DistResult<Vec<PortableIdentifier>>;
}

/// Rebuild an identifier from a stored `(kind, qualified_name)` row
pub fn identifier_from_row(kind: &str, qualified_name: &str) -> DistResult<PortableIdentifier> {
    let kind: ObjectKind = kind.parse().map_err(|_| DistError::CatalogError {
        operation: format!("read {}", DIST_OBJECT_TABLE),
        pg_error: format!("unknown object kind '{}' for {}", kind, qualified_name),
    })?;

    Ok(PortableIdentifier::new(kind, qualified_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryObjectCatalog;

    #[test]
    fn test_record_is_idempotent() {
        let mut catalog = MemoryObjectCatalog::default();
        let id = PortableIdentifier::new(ObjectKind::Namespace, "app");

        assert!(catalog.record(&id).unwrap());
        assert!(!catalog.record(&id).unwrap());
        assert!(catalog.contains(&id).unwrap());
        assert_eq!(catalog.records().unwrap(), vec![id]);
    }

    #[test]
    fn test_kind_is_part_of_the_key() {
        let mut catalog = MemoryObjectCatalog::default();
        catalog.record(&PortableIdentifier::new(ObjectKind::EnumType, "app.t")).unwrap();

        let composite = PortableIdentifier::new(ObjectKind::CompositeType, "app.t");
        assert!(!catalog.contains(&composite).unwrap());
    }

    #[test]
    fn test_identifier_from_row() {
        let id = identifier_from_row("composite", "app.order_status").unwrap();
        assert_eq!(id.kind, ObjectKind::CompositeType);

        let err = identifier_from_row("function", "app.f").unwrap_err();
        assert_eq!(err.sqlstate(), "XX000");
    }
}
