//! Object identity: local addresses, portable identifiers and the per-kind table
//!
//! The host addresses catalog objects by `(class, oid, subid)`. Oids differ
//! between independently bootstrapped nodes, so anything persisted or sent to a
//! worker uses a [`PortableIdentifier`] instead: the object kind plus its
//! quoting-normalized qualified name.

pub mod codec;
pub mod kinds;
pub mod naming;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DistError;

pub use codec::{classify, from_portable, resolve_type, to_portable};
pub use kinds::{behavior, follow_policy, FollowPolicy, KindBehavior};
pub use naming::{quote_identifier, quote_literal, quote_qualified_identifier, QualifiedName};

/// Object identifier local to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Oid(pub u32);

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `pg_namespace` relation oid (fixed across servers)
pub const NAMESPACE_RELATION_ID: u32 = 2615;
/// `pg_type` relation oid (fixed across servers)
pub const TYPE_RELATION_ID: u32 = 1247;

/// Catalog a dependency row points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassId {
    Namespace,
    Type,
    Other(u32),
}

impl ClassId {
    pub fn from_relation_oid(oid: u32) -> Self {
        match oid {
            NAMESPACE_RELATION_ID => ClassId::Namespace,
            TYPE_RELATION_ID => ClassId::Type,
            other => ClassId::Other(other),
        }
    }

    pub fn relation_oid(self) -> u32 {
        match self {
            ClassId::Namespace => NAMESPACE_RELATION_ID,
            ClassId::Type => TYPE_RELATION_ID,
            ClassId::Other(oid) => oid,
        }
    }
}

/// Local `(class, oid, subid)` address as stored in the dependency catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectAddress {
    pub class_id: ClassId,
    pub object_id: Oid,
    /// Column number for sub-objects, 0 for the whole object
    pub sub_id: i32,
}

impl ObjectAddress {
    pub fn new(class_id: ClassId, object_id: Oid) -> Self {
        Self { class_id, object_id, sub_id: 0 }
    }

    pub fn namespace(oid: u32) -> Self {
        Self::new(ClassId::Namespace, Oid(oid))
    }

    pub fn type_(oid: u32) -> Self {
        Self::new(ClassId::Type, Oid(oid))
    }

    pub fn with_sub_id(mut self, sub_id: i32) -> Self {
        self.sub_id = sub_id;
        self
    }

    /// Same object with the sub-object part cleared
    pub fn whole_object(self) -> Self {
        Self { sub_id: 0, ..self }
    }
}

impl fmt::Display for ObjectAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.class_id.relation_oid(), self.object_id, self.sub_id)
    }
}

/// Object kinds the engine distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Namespace,
    EnumType,
    CompositeType,
    Other,
}

impl ObjectKind {
    /// Value stored in the `kind` column of the distributed object catalog
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Namespace => "schema",
            ObjectKind::EnumType => "enum",
            ObjectKind::CompositeType => "composite",
            ObjectKind::Other => "other",
        }
    }

    pub fn is_type(self) -> bool {
        matches!(self, ObjectKind::EnumType | ObjectKind::CompositeType)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = DistError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "schema" | "namespace" => Ok(ObjectKind::Namespace),
            "enum" => Ok(ObjectKind::EnumType),
            "composite" | "composite type" => Ok(ObjectKind::CompositeType),
            other => Err(DistError::UnsupportedKind { kind: other.to_string() }),
        }
    }
}

/// A resolved local object, tagged by kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectReference {
    Namespace(Oid),
    EnumType(Oid),
    CompositeType(Oid),
    Other(ObjectAddress),
}

impl ObjectReference {
    pub fn kind(&self) -> ObjectKind {
        match self {
            ObjectReference::Namespace(_) => ObjectKind::Namespace,
            ObjectReference::EnumType(_) => ObjectKind::EnumType,
            ObjectReference::CompositeType(_) => ObjectKind::CompositeType,
            ObjectReference::Other(_) => ObjectKind::Other,
        }
    }

    pub fn address(&self) -> ObjectAddress {
        match *self {
            ObjectReference::Namespace(oid) => ObjectAddress::new(ClassId::Namespace, oid),
            ObjectReference::EnumType(oid) | ObjectReference::CompositeType(oid) => {
                ObjectAddress::new(ClassId::Type, oid)
            }
            ObjectReference::Other(address) => address,
        }
    }

    /// Local oid for supported kinds
    pub fn oid(&self) -> Option<Oid> {
        match *self {
            ObjectReference::Namespace(oid)
            | ObjectReference::EnumType(oid)
            | ObjectReference::CompositeType(oid) => Some(oid),
            ObjectReference::Other(_) => None,
        }
    }
}

/// Node-independent name of an object: what gets persisted and sent to workers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PortableIdentifier {
    pub kind: ObjectKind,
    pub qualified_name: String,
}

impl PortableIdentifier {
    pub fn new(kind: ObjectKind, qualified_name: impl Into<String>) -> Self {
        Self { kind, qualified_name: qualified_name.into() }
    }
}

impl fmt::Display for PortableIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.qualified_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_id_round_trip() {
        assert_eq!(ClassId::from_relation_oid(2615), ClassId::Namespace);
        assert_eq!(ClassId::from_relation_oid(1247), ClassId::Type);
        assert_eq!(ClassId::from_relation_oid(1259), ClassId::Other(1259));
        assert_eq!(ClassId::Other(1259).relation_oid(), 1259);
    }

    #[test]
    fn test_reference_address_is_whole_object() {
        let reference = ObjectReference::CompositeType(Oid(16400));
        let address = reference.address();
        assert_eq!(address.class_id, ClassId::Type);
        assert_eq!(address.sub_id, 0);
        assert_eq!(reference.kind(), ObjectKind::CompositeType);
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("schema".parse::<ObjectKind>().unwrap(), ObjectKind::Namespace);
        assert_eq!("Enum".parse::<ObjectKind>().unwrap(), ObjectKind::EnumType);
        assert!("function".parse::<ObjectKind>().is_err());
    }

    #[test]
    fn test_portable_identifier_serializes_kind_snake_case() {
        let id = PortableIdentifier::new(ObjectKind::CompositeType, "app.order_status");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, r#"{"kind":"composite_type","qualified_name":"app.order_status"}"#);
    }
}
