//! Dependency edges as recorded by the host and the walk over them

pub mod resolver;

use serde::{Deserialize, Serialize};

use crate::error::DistResult;
use crate::object::ObjectAddress;

pub use resolver::DependencyResolver;

/// `pg_depend.deptype`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DependencyKind {
    Normal,
    Auto,
    Internal,
    PartitionPrimary,
    PartitionSecondary,
    Extension,
    AutoExtension,
    Pin,
    Unknown(char),
}

impl DependencyKind {
    pub fn from_deptype(deptype: char) -> Self {
        match deptype {
            'n' => DependencyKind::Normal,
            'a' => DependencyKind::Auto,
            'i' => DependencyKind::Internal,
            'P' => DependencyKind::PartitionPrimary,
            'S' => DependencyKind::PartitionSecondary,
            'e' => DependencyKind::Extension,
            'x' => DependencyKind::AutoExtension,
            'p' => DependencyKind::Pin,
            other => DependencyKind::Unknown(other),
        }
    }
}

/// `dependent` cannot exist without `referenced`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub dependent: ObjectAddress,
    pub referenced: ObjectAddress,
    pub kind: DependencyKind,
}

impl DependencyEdge {
    pub fn new(dependent: ObjectAddress, referenced: ObjectAddress, kind: DependencyKind) -> Self {
        Self { dependent, referenced, kind }
    }
}

/// Outgoing dependency edges of an object, as stored by the host
pub trait DependencyStore {
    /// Edges whose `dependent` is `address`, in store order
    fn dependencies_of(&self, address: &ObjectAddress) -> DistResult<Vec<DependencyEdge>>;

    /// Objects created by an extension script are managed by the extension itself
    fn is_owned_by_extension(&self, address: &ObjectAddress) -> DistResult<bool> {
        Ok(self
            .dependencies_of(address)?
            .iter()
            .any(|edge| edge.kind == DependencyKind::Extension))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::ClassId;
    use crate::testing::FakeDependencies;

    #[test]
    fn test_deptype_mapping() {
        assert_eq!(DependencyKind::from_deptype('n'), DependencyKind::Normal);
        assert_eq!(DependencyKind::from_deptype('e'), DependencyKind::Extension);
        assert_eq!(DependencyKind::from_deptype('P'), DependencyKind::PartitionPrimary);
        assert_eq!(DependencyKind::from_deptype('z'), DependencyKind::Unknown('z'));
    }

    #[test]
    fn test_extension_ownership_requires_extension_edge() {
        let mut deps = FakeDependencies::default();
        let owned = ObjectAddress::type_(16500);
        let plain = ObjectAddress::type_(16501);
        let ext = ObjectAddress::new(ClassId::Other(3079), crate::object::Oid(16400));

        deps.add(owned, ext, DependencyKind::Extension);
        deps.add(plain, ext, DependencyKind::AutoExtension);

        assert!(deps.is_owned_by_extension(&owned).unwrap());
        assert!(!deps.is_owned_by_extension(&plain).unwrap());
    }
}
