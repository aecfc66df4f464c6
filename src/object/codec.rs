//! Mapping between local object references and portable identifiers

use crate::error::{DistError, DistResult};
use crate::host::{LocalCatalog, TypeCategory};

use super::kinds::behavior;
use super::{ClassId, ObjectAddress, ObjectKind, ObjectReference, Oid, PortableIdentifier, QualifiedName};

/// Translate a local reference into its node-independent identifier
///
/// # Errors
/// `UnsupportedKind` for objects outside the supported kinds, `NotFound` when
/// the backing object has disappeared.
pub fn to_portable(
    catalog: &dyn LocalCatalog,
    reference: &ObjectReference,
) -> DistResult<PortableIdentifier> {
    let (kind_behavior, oid) = match (behavior(reference.kind()), reference.oid()) {
        (Some(b), Some(oid)) => (b, oid),
        _ => {
            return Err(DistError::UnsupportedKind {
                kind: format!("object {}", reference.address()),
            })
        }
    };

    let name = (kind_behavior.identify)(catalog, oid)?;
    Ok(PortableIdentifier::new(reference.kind(), name.to_string()))
}

/// Resolve a portable identifier against the local catalog
///
/// # Errors
/// `NotFound` when nothing (or an object of another kind) carries the name,
/// `Ambiguous` when several objects do.
pub fn from_portable(
    catalog: &dyn LocalCatalog,
    id: &PortableIdentifier,
) -> DistResult<ObjectReference> {
    let kind_behavior = behavior(id.kind).ok_or_else(|| DistError::UnsupportedKind {
        kind: id.kind.to_string(),
    })?;

    let name = QualifiedName::parse(&id.qualified_name)?;
    let oid = (kind_behavior.lookup)(catalog, &name)?;
    Ok((kind_behavior.wrap)(oid))
}

/// Turn a raw dependency address into a tagged reference
///
/// Types are split by sub-kind; other classes are returned as `Other`.
pub fn classify(catalog: &dyn LocalCatalog, address: &ObjectAddress) -> DistResult<ObjectReference> {
    let oid = address.object_id;
    match address.class_id {
        ClassId::Namespace => match catalog.namespace_name(oid)? {
            Some(_) => Ok(ObjectReference::Namespace(oid)),
            None => Err(not_found("schema", oid)),
        },
        ClassId::Type => match catalog.type_category(oid)? {
            Some(TypeCategory::Enum) => Ok(ObjectReference::EnumType(oid)),
            Some(TypeCategory::Composite) => Ok(ObjectReference::CompositeType(oid)),
            Some(_) => Ok(ObjectReference::Other(*address)),
            None => Err(not_found("type", oid)),
        },
        ClassId::Other(_) => Ok(ObjectReference::Other(*address)),
    }
}

/// Resolve a type name of either supported sub-kind
///
/// # Errors
/// `NotFound`/`Ambiguous` as for [`from_portable`], `UnsupportedKind` when the
/// name belongs to a base, domain or range type.
pub fn resolve_type(catalog: &dyn LocalCatalog, name: &QualifiedName) -> DistResult<ObjectReference> {
    let oid = match catalog.lookup_types(name)?.as_slice() {
        [] => {
            return Err(DistError::NotFound {
                object: format!("type {}", name),
            })
        }
        [oid] => *oid,
        many => {
            return Err(DistError::Ambiguous {
                name: name.to_string(),
                candidates: many.len(),
            })
        }
    };

    match classify(catalog, &ObjectAddress::new(ClassId::Type, oid))? {
        ObjectReference::Other(_) => Err(DistError::UnsupportedKind {
            kind: format!("type {}", name),
        }),
        reference => Ok(reference),
    }
}

fn not_found(what: &str, oid: Oid) -> DistError {
    DistError::NotFound {
        object: format!("{} with oid {}", what, oid),
    }
}

pub(crate) fn identify_namespace(catalog: &dyn LocalCatalog, oid: Oid) -> DistResult<QualifiedName> {
    catalog
        .namespace_name(oid)?
        .map(|name| QualifiedName::new(None, &name))
        .ok_or_else(|| not_found("schema", oid))
}

pub(crate) fn identify_type(catalog: &dyn LocalCatalog, oid: Oid) -> DistResult<QualifiedName> {
    catalog.type_name(oid)?.ok_or_else(|| not_found("type", oid))
}

pub(crate) fn lookup_namespace(catalog: &dyn LocalCatalog, name: &QualifiedName) -> DistResult<Oid> {
    if name.len() != 1 {
        return Err(DistError::InvalidQualifiedName {
            name: name.to_string(),
            reason: "schema names cannot be qualified".to_string(),
        });
    }

    catalog
        .lookup_namespace(name.name())?
        .ok_or_else(|| DistError::NotFound {
            object: format!("schema {}", name),
        })
}

pub(crate) fn lookup_enum(catalog: &dyn LocalCatalog, name: &QualifiedName) -> DistResult<Oid> {
    lookup_type_of_kind(catalog, name, ObjectKind::EnumType)
}

pub(crate) fn lookup_composite(catalog: &dyn LocalCatalog, name: &QualifiedName) -> DistResult<Oid> {
    lookup_type_of_kind(catalog, name, ObjectKind::CompositeType)
}

fn lookup_type_of_kind(
    catalog: &dyn LocalCatalog,
    name: &QualifiedName,
    kind: ObjectKind,
) -> DistResult<Oid> {
    let candidates = catalog.lookup_types(name)?;
    let oid = match candidates.as_slice() {
        [] => {
            return Err(DistError::NotFound {
                object: format!("{} type {}", kind, name),
            })
        }
        [oid] => *oid,
        many => {
            return Err(DistError::Ambiguous {
                name: name.to_string(),
                candidates: many.len(),
            })
        }
    };

    let expected = match kind {
        ObjectKind::EnumType => TypeCategory::Enum,
        _ => TypeCategory::Composite,
    };
    match catalog.type_category(oid)? {
        Some(category) if category == expected => Ok(oid),
        _ => Err(DistError::NotFound {
            object: format!("{} type {}", kind, name),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::{assert_error_contains, assert_error_sqlstate};
    use crate::testing::FakeCatalog;

    fn catalog() -> FakeCatalog {
        let mut catalog = FakeCatalog::new();
        let app = catalog.add_namespace("app", "alice");
        let sales = catalog.add_namespace("Sales", "bob");
        catalog.add_enum(app, "status", &["active"], "alice");
        catalog.add_composite(app, "order_status", &[], "alice");
        catalog.add_composite(sales, "Order", &[], "bob");
        catalog
    }

    #[test]
    fn test_to_portable_qualifies_and_quotes() {
        let catalog = catalog();
        let sales = catalog.namespace_oid("Sales");
        let order = catalog.type_oid("Sales", "Order");

        let ns = to_portable(&catalog, &ObjectReference::Namespace(sales)).unwrap();
        assert_eq!(ns, PortableIdentifier::new(ObjectKind::Namespace, "\"Sales\""));

        let ty = to_portable(&catalog, &ObjectReference::CompositeType(order)).unwrap();
        assert_eq!(ty, PortableIdentifier::new(ObjectKind::CompositeType, "\"Sales\".\"Order\""));
    }

    #[test]
    fn test_to_portable_rejects_other_kinds() {
        let catalog = catalog();
        let other = ObjectReference::Other(ObjectAddress::new(ClassId::Other(1255), Oid(1)));
        assert_error_sqlstate(to_portable(&catalog, &other), "0A000");
    }

    #[test]
    fn test_portable_round_trip() {
        let catalog = catalog();
        let status = ObjectReference::EnumType(catalog.type_oid("app", "status"));

        let id = to_portable(&catalog, &status).unwrap();
        assert_eq!(from_portable(&catalog, &id).unwrap(), status);
    }

    #[test]
    fn test_from_portable_not_found_on_fresh_node() {
        let catalog = FakeCatalog::new();
        let id = PortableIdentifier::new(ObjectKind::EnumType, "app.status");
        assert_error_sqlstate(from_portable(&catalog, &id), "42704");
    }

    #[test]
    fn test_from_portable_kind_mismatch_is_not_found() {
        let catalog = catalog();
        let id = PortableIdentifier::new(ObjectKind::EnumType, "app.order_status");
        assert_error_contains(from_portable(&catalog, &id), "enum type app.order_status");
    }

    #[test]
    fn test_from_portable_ambiguous_unqualified_name() {
        let mut catalog = catalog();
        let other = catalog.add_namespace("other", "alice");
        catalog.add_enum(other, "status", &["x"], "alice");

        let id = PortableIdentifier::new(ObjectKind::EnumType, "status");
        assert_error_sqlstate(from_portable(&catalog, &id), "42725");
    }

    #[test]
    fn test_classify_splits_type_sub_kinds() {
        let mut catalog = catalog();
        let app = catalog.namespace_oid("app");
        let base = catalog.add_base_type(app, "money2");

        let status = catalog.type_oid("app", "status");
        assert_eq!(
            classify(&catalog, &ObjectAddress::new(ClassId::Type, status)).unwrap(),
            ObjectReference::EnumType(status)
        );
        assert!(matches!(
            classify(&catalog, &ObjectAddress::new(ClassId::Type, base)).unwrap(),
            ObjectReference::Other(_)
        ));
        assert_error_sqlstate(classify(&catalog, &ObjectAddress::type_(999_999)), "42704");
    }

    #[test]
    fn test_resolve_type_either_sub_kind() {
        let mut catalog = catalog();
        let app = catalog.namespace_oid("app");
        catalog.add_base_type(app, "money2");

        let status = QualifiedName::parse("app.status").unwrap();
        let order = QualifiedName::parse("app.order_status").unwrap();
        assert_eq!(
            resolve_type(&catalog, &status).unwrap(),
            ObjectReference::EnumType(catalog.type_oid("app", "status"))
        );
        assert_eq!(
            resolve_type(&catalog, &order).unwrap(),
            ObjectReference::CompositeType(catalog.type_oid("app", "order_status"))
        );

        let base = QualifiedName::parse("app.money2").unwrap();
        assert_error_sqlstate(resolve_type(&catalog, &base), "0A000");
        let missing = QualifiedName::parse("app.nope").unwrap();
        assert_error_contains(resolve_type(&catalog, &missing), "type app.nope");
    }
}
