//! Creation statements for schemas, enums and composite types

use crate::config::PropagationConfig;
use crate::error::{DistError, DistResult};
use crate::host::{LocalCatalog, TypeCategory};
use crate::object::{quote_identifier, quote_literal, Oid, QualifiedName};

use super::Statement;

/// Schemas every node already has
const BUILTIN_SCHEMAS: &[&str] = &["public", "pg_catalog", "information_schema", "pg_toast"];

fn is_builtin_schema(name: &str) -> bool {
    BUILTIN_SCHEMAS.contains(&name) || name.starts_with("pg_temp_") || name.starts_with("pg_toast_temp_")
}

fn missing(what: &str, oid: Oid) -> DistError {
    DistError::NotFound {
        object: format!("{} with oid {}", what, oid),
    }
}

/// `CREATE SCHEMA IF NOT EXISTS … AUTHORIZATION …`, nothing for built-in schemas
pub fn render_namespace(
    catalog: &dyn LocalCatalog,
    _config: &PropagationConfig,
    oid: Oid,
) -> DistResult<Vec<Statement>> {
    let name = catalog.namespace_name(oid)?.ok_or_else(|| missing("schema", oid))?;
    if is_builtin_schema(&name) {
        return Ok(Vec::new());
    }

    let owner = catalog.namespace_owner(oid)?.ok_or_else(|| missing("schema", oid))?;
    Ok(vec![Statement::new(format!(
        "CREATE SCHEMA IF NOT EXISTS {} AUTHORIZATION {}",
        quote_identifier(&name),
        quote_identifier(&owner)
    ))])
}

/// Enum creation through the worker helper, then ownership
pub fn render_enum(
    catalog: &dyn LocalCatalog,
    config: &PropagationConfig,
    oid: Oid,
) -> DistResult<Vec<Statement>> {
    let name = catalog.type_name(oid)?.ok_or_else(|| missing("type", oid))?;
    let create = create_enum_sql(&name, &catalog.enum_labels(oid)?);
    replay_type(catalog, config, oid, &name, &create)
}

/// Composite creation through the worker helper, then ownership
pub fn render_composite(
    catalog: &dyn LocalCatalog,
    config: &PropagationConfig,
    oid: Oid,
) -> DistResult<Vec<Statement>> {
    let name = catalog.type_name(oid)?.ok_or_else(|| missing("type", oid))?;
    let create = create_composite_sql(catalog, &name, oid)?;
    replay_type(catalog, config, oid, &name, &create)
}

fn replay_type(
    catalog: &dyn LocalCatalog,
    config: &PropagationConfig,
    oid: Oid,
    name: &QualifiedName,
    create: &str,
) -> DistResult<Vec<Statement>> {
    let owner = catalog.type_owner(oid)?.ok_or_else(|| missing("type", oid))?;

    Ok(vec![
        Statement::new(format!(
            "SELECT {}({})",
            config.create_if_not_exists_function,
            quote_literal(create)
        )),
        Statement::new(format!("ALTER TYPE {} OWNER TO {}", name, quote_identifier(&owner))),
    ])
}

/// Bare `CREATE TYPE` statement for a type whose sub-kind is not known yet
///
/// # Errors
/// `NotFound` if the type is gone, `UnsupportedKind` for other type categories.
pub fn create_type_sql(catalog: &dyn LocalCatalog, oid: Oid) -> DistResult<String> {
    let name = catalog.type_name(oid)?.ok_or_else(|| missing("type", oid))?;

    match catalog.type_category(oid)? {
        Some(TypeCategory::Enum) => Ok(create_enum_sql(&name, &catalog.enum_labels(oid)?)),
        Some(TypeCategory::Composite) => create_composite_sql(catalog, &name, oid),
        Some(other) => Err(DistError::UnsupportedKind {
            kind: format!("{:?} type {}", other, name),
        }),
        None => Err(missing("type", oid)),
    }
}

fn create_enum_sql(name: &QualifiedName, labels: &[String]) -> String {
    let values: Vec<String> = labels.iter().map(|l| quote_literal(l)).collect();
    format!("CREATE TYPE {} AS ENUM ({})", name, values.join(", "))
}

fn create_composite_sql(catalog: &dyn LocalCatalog, name: &QualifiedName, oid: Oid) -> DistResult<String> {
    let mut attributes = catalog.composite_attributes(oid)?;
    attributes.retain(|a| !a.is_dropped);
    attributes.sort_by_key(|a| a.attnum);

    let columns: Vec<String> = attributes
        .iter()
        .map(|a| match &a.collation {
            Some(collation) => format!("{} {} COLLATE {}", quote_identifier(&a.name), a.type_name, collation),
            None => format!("{} {}", quote_identifier(&a.name), a.type_name),
        })
        .collect();

    Ok(format!("CREATE TYPE {} AS ({})", name, columns.join(", ")))
}
