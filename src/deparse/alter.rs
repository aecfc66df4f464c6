//! `ALTER TYPE` and `DROP TYPE` statements for distributed types

use serde::{Deserialize, Serialize};

use crate::catalog::DistObjectCatalog;
use crate::error::{DistError, DistResult};
use crate::host::{AttributeDef, LocalCatalog};
use crate::object::{quote_identifier, quote_literal, to_portable, ObjectKind, ObjectReference};

use super::Statement;

/// Where a new enum label goes relative to an existing one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValuePosition {
    Before(String),
    After(String),
}

/// A change to an existing enum or composite type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeAlteration {
    EnumAddValue {
        value: String,
        if_not_exists: bool,
        position: Option<ValuePosition>,
    },
    EnumRenameValue {
        old: String,
        new: String,
    },
    CompositeAddAttribute {
        attribute: AttributeDef,
        cascade: bool,
    },
    CompositeDropAttribute {
        name: String,
        if_exists: bool,
        cascade: bool,
    },
    CompositeAlterAttributeType {
        name: String,
        type_name: String,
        collation: Option<String>,
        cascade: bool,
    },
    CompositeRenameAttribute {
        old: String,
        new: String,
        cascade: bool,
    },
    /// Anything else the DDL layer hands over (`SET SCHEMA`, `OWNER TO`, …)
    Unrecognized {
        subtype: String,
    },
}

impl TypeAlteration {
    /// Short name used in error messages
    pub fn subtype(&self) -> &str {
        match self {
            TypeAlteration::EnumAddValue { .. } => "ADD VALUE",
            TypeAlteration::EnumRenameValue { .. } => "RENAME VALUE",
            TypeAlteration::CompositeAddAttribute { .. } => "ADD ATTRIBUTE",
            TypeAlteration::CompositeDropAttribute { .. } => "DROP ATTRIBUTE",
            TypeAlteration::CompositeAlterAttributeType { .. } => "ALTER ATTRIBUTE",
            TypeAlteration::CompositeRenameAttribute { .. } => "RENAME ATTRIBUTE",
            TypeAlteration::Unrecognized { subtype } => subtype,
        }
    }

    /// Kind of type this alteration applies to
    fn applies_to(&self) -> Option<ObjectKind> {
        match self {
            TypeAlteration::EnumAddValue { .. } | TypeAlteration::EnumRenameValue { .. } => {
                Some(ObjectKind::EnumType)
            }
            TypeAlteration::CompositeAddAttribute { .. }
            | TypeAlteration::CompositeDropAttribute { .. }
            | TypeAlteration::CompositeAlterAttributeType { .. }
            | TypeAlteration::CompositeRenameAttribute { .. } => Some(ObjectKind::CompositeType),
            TypeAlteration::Unrecognized { .. } => None,
        }
    }

    pub fn is_enum_add_value(&self) -> bool {
        matches!(self, TypeAlteration::EnumAddValue { .. })
    }

    /// The same value addition, made safe to re-run on nodes that already have it
    pub fn with_if_not_exists(&self) -> Self {
        match self {
            TypeAlteration::EnumAddValue { value, position, .. } => TypeAlteration::EnumAddValue {
                value: value.clone(),
                if_not_exists: true,
                position: position.clone(),
            },
            other => other.clone(),
        }
    }
}

fn cascade_clause(cascade: bool) -> &'static str {
    if cascade {
        " CASCADE"
    } else {
        ""
    }
}

/// Render an alteration against a type, by its portable name
///
/// # Errors
/// `UnsupportedAlteration` when the alteration does not fit the target's
/// kind or is unrecognized, `NotFound` if the type vanished.
pub fn render_alteration(
    catalog: &dyn LocalCatalog,
    target: &ObjectReference,
    alteration: &TypeAlteration,
) -> DistResult<Statement> {
    if alteration.applies_to() != Some(target.kind()) {
        return Err(DistError::UnsupportedAlteration {
            target: format!("{} {}", target.kind(), target.address()),
            subtype: alteration.subtype().to_string(),
        });
    }

    let name = to_portable(catalog, target)?.qualified_name;
    let sql = match alteration {
        TypeAlteration::EnumAddValue { value, if_not_exists, position } => {
            let mut sql = format!("ALTER TYPE {} ADD VALUE ", name);
            if *if_not_exists {
                sql.push_str("IF NOT EXISTS ");
            }
            sql.push_str(&quote_literal(value));
            match position {
                Some(ValuePosition::Before(neighbor)) => {
                    sql.push_str(&format!(" BEFORE {}", quote_literal(neighbor)));
                }
                Some(ValuePosition::After(neighbor)) => {
                    sql.push_str(&format!(" AFTER {}", quote_literal(neighbor)));
                }
                None => {}
            }
            return Ok(Statement::non_transactional(sql));
        }
        TypeAlteration::EnumRenameValue { old, new } => format!(
            "ALTER TYPE {} RENAME VALUE {} TO {}",
            name,
            quote_literal(old),
            quote_literal(new)
        ),
        TypeAlteration::CompositeAddAttribute { attribute, cascade } => {
            let collate = attribute
                .collation
                .as_ref()
                .map(|c| format!(" COLLATE {}", c))
                .unwrap_or_default();
            format!(
                "ALTER TYPE {} ADD ATTRIBUTE {} {}{}{}",
                name,
                quote_identifier(&attribute.name),
                attribute.type_name,
                collate,
                cascade_clause(*cascade)
            )
        }
        TypeAlteration::CompositeDropAttribute { name: attr, if_exists, cascade } => format!(
            "ALTER TYPE {} DROP ATTRIBUTE {}{}{}",
            name,
            if *if_exists { "IF EXISTS " } else { "" },
            quote_identifier(attr),
            cascade_clause(*cascade)
        ),
        TypeAlteration::CompositeAlterAttributeType { name: attr, type_name, collation, cascade } => {
            let collate = collation
                .as_ref()
                .map(|c| format!(" COLLATE {}", c))
                .unwrap_or_default();
            format!(
                "ALTER TYPE {} ALTER ATTRIBUTE {} SET DATA TYPE {}{}{}",
                name,
                quote_identifier(attr),
                type_name,
                collate,
                cascade_clause(*cascade)
            )
        }
        TypeAlteration::CompositeRenameAttribute { old, new, cascade } => format!(
            "ALTER TYPE {} RENAME ATTRIBUTE {} TO {}{}",
            name,
            quote_identifier(old),
            quote_identifier(new),
            cascade_clause(*cascade)
        ),
        TypeAlteration::Unrecognized { subtype } => {
            return Err(DistError::UnsupportedAlteration {
                target: name,
                subtype: subtype.clone(),
            })
        }
    };

    Ok(Statement::new(sql))
}

/// `DROP TYPE` limited to the targets recorded as distributed
///
/// Returns `None` when none of the targets is distributed, so local-only drops
/// never reach the workers.
pub fn render_drop_types(
    catalog: &dyn LocalCatalog,
    distributed: &dyn DistObjectCatalog,
    targets: &[ObjectReference],
    if_exists: bool,
    cascade: bool,
) -> DistResult<Option<Statement>> {
    let mut names = Vec::new();
    for target in targets.iter().filter(|t| t.kind().is_type()) {
        let id = to_portable(catalog, target)?;
        if distributed.contains(&id)? {
            names.push(id.qualified_name);
        }
    }

    if names.is_empty() {
        return Ok(None);
    }

    Ok(Some(Statement::new(format!(
        "DROP TYPE {}{}{}",
        if if_exists { "IF EXISTS " } else { "" },
        names.join(", "),
        cascade_clause(cascade)
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{Oid, PortableIdentifier};
    use crate::testing::{FakeCatalog, MemoryObjectCatalog};
    use pretty_assertions::assert_eq;

    fn setup() -> (FakeCatalog, Oid, Oid) {
        let mut catalog = FakeCatalog::new();
        let app = catalog.add_namespace("app", "alice");
        let status = catalog.add_enum(app, "status", &["active"], "alice");
        let order = catalog.add_composite(app, "order_status", &[], "alice");
        (catalog, status, order)
    }

    #[test]
    fn test_enum_add_value_is_not_transaction_safe() {
        let (catalog, status, _) = setup();
        let add = TypeAlteration::EnumAddValue {
            value: "archived".to_string(),
            if_not_exists: false,
            position: Some(ValuePosition::After("active".to_string())),
        };

        let statement = render_alteration(&catalog, &ObjectReference::EnumType(status), &add).unwrap();
        assert_eq!(statement.sql, "ALTER TYPE app.status ADD VALUE 'archived' AFTER 'active'");
        assert!(!statement.transaction_safe);

        let retry = render_alteration(
            &catalog,
            &ObjectReference::EnumType(status),
            &add.with_if_not_exists(),
        )
        .unwrap();
        assert_eq!(
            retry.sql,
            "ALTER TYPE app.status ADD VALUE IF NOT EXISTS 'archived' AFTER 'active'"
        );
    }

    #[test]
    fn test_rename_value() {
        let (catalog, status, _) = setup();
        let rename = TypeAlteration::EnumRenameValue {
            old: "active".to_string(),
            new: "live".to_string(),
        };

        let statement = render_alteration(&catalog, &ObjectReference::EnumType(status), &rename).unwrap();
        assert_eq!(statement.sql, "ALTER TYPE app.status RENAME VALUE 'active' TO 'live'");
        assert!(statement.transaction_safe);
    }

    #[test]
    fn test_composite_alterations() {
        let (catalog, _, order) = setup();
        let target = ObjectReference::CompositeType(order);

        let cases = vec![
            (
                TypeAlteration::CompositeAddAttribute {
                    attribute: AttributeDef::new(0, "note", "text").with_collation("\"C\""),
                    cascade: false,
                },
                "ALTER TYPE app.order_status ADD ATTRIBUTE note text COLLATE \"C\"",
            ),
            (
                TypeAlteration::CompositeDropAttribute {
                    name: "Legacy".to_string(),
                    if_exists: true,
                    cascade: true,
                },
                "ALTER TYPE app.order_status DROP ATTRIBUTE IF EXISTS \"Legacy\" CASCADE",
            ),
            (
                TypeAlteration::CompositeAlterAttributeType {
                    name: "amount".to_string(),
                    type_name: "numeric(12,2)".to_string(),
                    collation: None,
                    cascade: false,
                },
                "ALTER TYPE app.order_status ALTER ATTRIBUTE amount SET DATA TYPE numeric(12,2)",
            ),
            (
                TypeAlteration::CompositeRenameAttribute {
                    old: "amount".to_string(),
                    new: "total".to_string(),
                    cascade: false,
                },
                "ALTER TYPE app.order_status RENAME ATTRIBUTE amount TO total",
            ),
        ];

        for (alteration, expected) in cases {
            assert_eq!(render_alteration(&catalog, &target, &alteration).unwrap().sql, expected);
        }
    }

    #[test]
    fn test_mismatched_and_unknown_alterations() {
        let (catalog, status, order) = setup();
        let add = TypeAlteration::EnumAddValue {
            value: "x".to_string(),
            if_not_exists: false,
            position: None,
        };
        let unknown = TypeAlteration::Unrecognized { subtype: "SET SCHEMA".to_string() };

        let err = render_alteration(&catalog, &ObjectReference::CompositeType(order), &add).unwrap_err();
        assert!(matches!(err, DistError::UnsupportedAlteration { .. }));

        let err = render_alteration(&catalog, &ObjectReference::EnumType(status), &unknown).unwrap_err();
        assert_eq!(err.sqlstate(), "0A000");
        assert!(err.to_string().contains("SET SCHEMA"));
    }

    #[test]
    fn test_drop_only_mentions_distributed_types() {
        let (catalog, status, order) = setup();
        let mut distributed = MemoryObjectCatalog::default();
        let targets = [ObjectReference::EnumType(status), ObjectReference::CompositeType(order)];

        assert_eq!(
            render_drop_types(&catalog, &distributed, &targets, false, false).unwrap(),
            None
        );

        distributed
            .record(&PortableIdentifier::new(ObjectKind::CompositeType, "app.order_status"))
            .unwrap();
        let statement = render_drop_types(&catalog, &distributed, &targets, true, true)
            .unwrap()
            .unwrap();
        assert_eq!(statement.sql, "DROP TYPE IF EXISTS app.order_status CASCADE");
    }
}
