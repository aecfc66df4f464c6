//! Read-only view of the local system catalogs
//!
//! The engine never touches catalog storage directly. Everything it needs to
//! know about a local object (its name, owner, sub-kind, attributes or enum
//! labels) comes through [`LocalCatalog`]. The pgrx backend implements it with
//! SPI queries; tests use an in-memory catalog.

use serde::{Deserialize, Serialize};

use crate::error::DistResult;
use crate::object::{Oid, QualifiedName};

/// `pg_type.typtype` categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeCategory {
    Base,
    Composite,
    Domain,
    Enum,
    Pseudo,
    Range,
    Multirange,
    Unknown(char),
}

impl TypeCategory {
    pub fn from_typtype(typtype: char) -> Self {
        match typtype {
            'b' => TypeCategory::Base,
            'c' => TypeCategory::Composite,
            'd' => TypeCategory::Domain,
            'e' => TypeCategory::Enum,
            'p' => TypeCategory::Pseudo,
            'r' => TypeCategory::Range,
            'm' => TypeCategory::Multirange,
            other => TypeCategory::Unknown(other),
        }
    }
}

/// One attribute of a composite type, as read from `pg_attribute`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeDef {
    /// Physical position (`attnum`)
    pub attnum: i16,
    pub name: String,
    /// Fully qualified, typmod-aware type name
    pub type_name: String,
    /// Qualified collation name when it differs from the type's default
    pub collation: Option<String>,
    pub is_dropped: bool,
}

impl AttributeDef {
    pub fn new(attnum: i16, name: &str, type_name: &str) -> Self {
        Self {
            attnum,
            name: name.to_string(),
            type_name: type_name.to_string(),
            collation: None,
            is_dropped: false,
        }
    }

    pub fn with_collation(mut self, collation: &str) -> Self {
        self.collation = Some(collation.to_string());
        self
    }

    pub fn dropped(mut self) -> Self {
        self.is_dropped = true;
        self
    }
}

/// Local catalog lookups; `Ok(None)` means the object does not exist
pub trait LocalCatalog {
    fn namespace_name(&self, oid: Oid) -> DistResult<Option<String>>;

    fn namespace_owner(&self, oid: Oid) -> DistResult<Option<String>>;

    fn lookup_namespace(&self, name: &str) -> DistResult<Option<Oid>>;

    /// `typtype` of a type, `None` when the oid is unknown
    fn type_category(&self, oid: Oid) -> DistResult<Option<TypeCategory>>;

    /// Schema-qualified name of a type
    fn type_name(&self, oid: Oid) -> DistResult<Option<QualifiedName>>;

    fn type_owner(&self, oid: Oid) -> DistResult<Option<String>>;

    /// All types matching the name; unqualified names are matched against the search path
    fn lookup_types(&self, name: &QualifiedName) -> DistResult<Vec<Oid>>;

    /// Enum labels in their stored sort order
    fn enum_labels(&self, oid: Oid) -> DistResult<Vec<String>>;

    /// Attributes of a composite type, including dropped ones
    fn composite_attributes(&self, oid: Oid) -> DistResult<Vec<AttributeDef>>;
}
