//! SQL-callable functions

use pgrx::pg_sys::panic::ErrorReport;
use pgrx::prelude::*;
use pgrx::JsonB;
use serde::Serialize;

use crate::cluster::WorkerNode;
use crate::deparse::{create_type_sql, parse_create_type, TypeAlteration, ValuePosition};
use crate::error::{DistError, DistResult};
use crate::metrics::metrics_api;
use crate::object::{from_portable, resolve_type, ObjectKind, PortableIdentifier, QualifiedName};
use crate::propagate::{AlterationOutcome, EnumValueOutcome, PartialFailure};
use crate::dist_debug;

use super::guc;
use super::spi::SpiCatalog;
use super::with_propagator;

fn error_code(e: &DistError) -> PgSqlErrorCode {
    use DistError::*;
    match e {
        UnsupportedKind { .. } | UnsupportedAlteration { .. } => {
            PgSqlErrorCode::ERRCODE_FEATURE_NOT_SUPPORTED
        }
        NotFound { .. } => PgSqlErrorCode::ERRCODE_UNDEFINED_OBJECT,
        Ambiguous { .. } => PgSqlErrorCode::ERRCODE_AMBIGUOUS_FUNCTION,
        InvalidQualifiedName { .. } => PgSqlErrorCode::ERRCODE_INVALID_NAME,
        NodeUnreachable { .. } => {
            PgSqlErrorCode::ERRCODE_SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
        }
        RemoteExecutionFailed { .. } => PgSqlErrorCode::ERRCODE_SYSTEM_ERROR,
        PartialEnumPropagation { .. } => PgSqlErrorCode::ERRCODE_WARNING,
        Cancelled { .. } => PgSqlErrorCode::ERRCODE_QUERY_CANCELED,
        DependencyDepthExceeded { .. } => PgSqlErrorCode::ERRCODE_STATEMENT_TOO_COMPLEX,
        ConfigError { .. } => PgSqlErrorCode::ERRCODE_INVALID_PARAMETER_VALUE,
        CatalogError { .. } | SpiError { .. } | SerializationError { .. } | InternalError { .. } => {
            PgSqlErrorCode::ERRCODE_INTERNAL_ERROR
        }
    }
}

/// Raise `e` as an ERROR carrying its SQLSTATE
fn raise(e: &DistError) -> ! {
    ErrorReport::new(error_code(e), e.to_string(), "pg_distobj").report(PgLogLevel::ERROR);
    unreachable!("ERROR reports do not return")
}

fn unwrap_or_raise<T>(result: DistResult<T>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => raise(&e),
    }
}

fn to_jsonb<T: Serialize>(value: &T) -> JsonB {
    JsonB(unwrap_or_raise(serde_json::to_value(value).map_err(DistError::from)))
}

fn parse_type_name(type_name: &str) -> QualifiedName {
    unwrap_or_raise(QualifiedName::parse(type_name))
}

fn warn_partial_failure(failure: &PartialFailure) {
    ErrorReport::new(
        PgSqlErrorCode::ERRCODE_WARNING,
        "not all workers applied change to enum",
        "pg_distobj",
    )
    .set_detail(format!("retry with: {}", failure.recovery_statement))
    .set_hint("make sure the coordinators can communicate with all workers")
    .report(PgLogLevel::WARNING);
}

/// Get the version of the pg_distobj extension
#[pg_extern]
fn distobj_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Create every missing prerequisite of an object on all active workers
///
/// Returns NULL when `distobj.enable_ddl_propagation` is off.
#[pg_extern]
fn distobj_ensure_dependencies(kind: &str, name: &str) -> Option<JsonB> {
    if !guc::propagation_enabled() {
        dist_debug!("pg_distobj: propagation disabled, not ensuring {} {}", kind, name);
        return None;
    }

    let kind: ObjectKind = unwrap_or_raise(kind.parse());
    let report = unwrap_or_raise(with_propagator(|propagator| {
        let target = from_portable(&SpiCatalog, &PortableIdentifier::new(kind, name))?;
        propagator.propagate_to_fleet(&target)
    }));

    Some(to_jsonb(&report))
}

/// Send an enum value that was just added locally to every worker
///
/// Returns false, after a WARNING with a retry statement, when some workers
/// did not apply it.
#[pg_extern]
fn distobj_alter_enum_add_value(
    type_name: &str,
    value: &str,
    if_not_exists: default!(bool, false),
    before: default!(Option<&str>, "NULL"),
    after: default!(Option<&str>, "NULL"),
) -> bool {
    if !guc::propagation_enabled() {
        return true;
    }

    let position = match (before, after) {
        (Some(_), Some(_)) => raise(&DistError::ConfigError {
            setting: "before/after".to_string(),
            value: value.to_string(),
            reason: "only one of BEFORE and AFTER can be given".to_string(),
        }),
        (Some(label), None) => Some(ValuePosition::Before(label.to_string())),
        (None, Some(label)) => Some(ValuePosition::After(label.to_string())),
        (None, None) => None,
    };
    let alteration = TypeAlteration::EnumAddValue {
        value: value.to_string(),
        if_not_exists,
        position,
    };

    let name = parse_type_name(type_name);
    let outcome = unwrap_or_raise(with_propagator(|propagator| {
        let target = resolve_type(&SpiCatalog, &name)?;
        propagator.propagate_alteration(&target, &alteration)
    }));

    match outcome {
        AlterationOutcome::NotDistributed | AlterationOutcome::Applied(_) => true,
        AlterationOutcome::EnumValue(EnumValueOutcome::Success) => true,
        AlterationOutcome::EnumValue(EnumValueOutcome::PartiallyFailed(failure)) => {
            warn_partial_failure(&failure);
            false
        }
        AlterationOutcome::EnumValue(EnumValueOutcome::Aborted(e)) => raise(&e),
    }
}

/// Replay an alteration of a distributed type on every worker
///
/// `alteration` is the JSON form of the change, e.g.
/// `{"EnumRenameValue": {"old": "a", "new": "b"}}`.
#[pg_extern]
fn distobj_alter_type(type_name: &str, alteration: JsonB) -> Option<JsonB> {
    if !guc::propagation_enabled() {
        return None;
    }

    let alteration: TypeAlteration =
        unwrap_or_raise(serde_json::from_value(alteration.0).map_err(DistError::from));
    let name = parse_type_name(type_name);
    let outcome = unwrap_or_raise(with_propagator(|propagator| {
        let target = resolve_type(&SpiCatalog, &name)?;
        propagator.propagate_alteration(&target, &alteration)
    }));

    match outcome {
        AlterationOutcome::NotDistributed => None,
        AlterationOutcome::Applied(report) => Some(to_jsonb(&report)),
        AlterationOutcome::EnumValue(EnumValueOutcome::Success) => None,
        AlterationOutcome::EnumValue(EnumValueOutcome::PartiallyFailed(failure)) => {
            warn_partial_failure(&failure);
            Some(to_jsonb(&failure))
        }
        AlterationOutcome::EnumValue(EnumValueOutcome::Aborted(e)) => raise(&e),
    }
}

/// Drop the distributed subset of the given types on every worker
///
/// Call before dropping them locally; local-only types are skipped.
#[pg_extern]
fn distobj_drop_types(
    type_names: Vec<String>,
    if_exists: default!(bool, false),
    cascade: default!(bool, false),
) -> Option<JsonB> {
    if !guc::propagation_enabled() {
        return None;
    }

    let names: Vec<QualifiedName> = type_names.iter().map(|n| parse_type_name(n)).collect();
    let report = unwrap_or_raise(with_propagator(|propagator| {
        let mut targets = Vec::with_capacity(names.len());
        for name in &names {
            match resolve_type(&SpiCatalog, name) {
                Ok(target) => targets.push(target),
                Err(DistError::NotFound { .. }) if if_exists => {}
                Err(e) => return Err(e),
            }
        }
        propagator.propagate_drop_types(&targets, if_exists, cascade)
    }));

    Some(to_jsonb(&report))
}

/// Replay every distributed object onto a node that just joined
#[pg_extern]
fn distobj_activate_node(node_name: &str, node_port: default!(i32, 5432)) -> JsonB {
    let port = unwrap_or_raise(u16::try_from(node_port).map_err(|_| DistError::ConfigError {
        setting: "node_port".to_string(),
        value: node_port.to_string(),
        reason: "must be between 0 and 65535".to_string(),
    }));
    let node = WorkerNode::new(node_name, port);

    let report = unwrap_or_raise(with_propagator(|propagator| propagator.activate_node(&node)));
    to_jsonb(&report)
}

/// Run a replayed `CREATE TYPE` unless the type already exists
///
/// Executed on workers; returns whether the type was created.
#[pg_extern]
fn worker_create_if_not_exists(statement: &str) -> bool {
    let parsed = unwrap_or_raise(parse_create_type(statement));
    let id = PortableIdentifier::new(parsed.kind, parsed.name.to_string());

    match from_portable(&SpiCatalog, &id) {
        Ok(_) => {
            dist_debug!("pg_distobj: {} already exists, skipping", id);
            false
        }
        Err(DistError::NotFound { .. }) => {
            unwrap_or_raise(Spi::run(statement).map_err(DistError::from));
            true
        }
        Err(e) => raise(&e),
    }
}

/// `CREATE TYPE` statement that recreates an existing enum or composite type
#[pg_extern]
fn type_recreate_command(type_name: &str) -> String {
    let name = parse_type_name(type_name);
    unwrap_or_raise(resolve_type(&SpiCatalog, &name).and_then(|target| match target.oid() {
        Some(oid) => create_type_sql(&SpiCatalog, oid),
        None => Err(DistError::UnsupportedKind {
            kind: format!("type {}", name),
        }),
    }))
}

/// Propagation counters of this backend as JSON
#[pg_extern]
fn distobj_propagation_stats() -> JsonB {
    let stats = metrics_api::snapshot();
    let mut value = unwrap_or_raise(serde_json::to_value(&stats).map_err(DistError::from));
    if let Some(object) = value.as_object_mut() {
        object.insert("total_timing_ms".to_string(), stats.total_timing_ms().into());
        object.insert(
            "statements_per_propagation".to_string(),
            stats.statements_per_propagation().into(),
        );
    }
    JsonB(value)
}

/// Reset this backend's propagation counters
#[pg_extern]
fn distobj_reset_stats() {
    metrics_api::reset_metrics();
}

#[cfg(feature = "pg_test")]
#[pg_schema]
mod tests {
    use pgrx::prelude::*;

    #[pg_test]
    fn test_version_callable_from_sql() {
        let version = Spi::get_one::<String>("SELECT distobj_version()").unwrap();
        assert_eq!(version.as_deref(), Some(env!("CARGO_PKG_VERSION")));
    }

    #[pg_test]
    fn test_worker_create_if_not_exists_runs_once() {
        Spi::run("CREATE SCHEMA app").unwrap();
        let create = "SELECT worker_create_if_not_exists('CREATE TYPE app.status AS ENUM (''a'', ''b'')')";

        assert_eq!(Spi::get_one::<bool>(create).unwrap(), Some(true));
        assert_eq!(Spi::get_one::<bool>(create).unwrap(), Some(false));

        let labels = Spi::get_one::<i64>(
            "SELECT count(*) FROM pg_enum WHERE enumtypid = 'app.status'::regtype",
        )
        .unwrap();
        assert_eq!(labels, Some(2));
    }

    #[pg_test]
    #[should_panic(expected = "is not supported for propagation")]
    fn test_worker_create_rejects_chained_statements() {
        Spi::run("CREATE SCHEMA app").unwrap();
        Spi::run("CREATE TABLE app.important (id int)").unwrap();
        let _ = Spi::get_one::<bool>(
            "SELECT worker_create_if_not_exists('CREATE TYPE app.t AS (x int); DROP TABLE app.important; SELECT (1)')",
        );
    }

    #[pg_test]
    fn test_type_recreate_command() {
        Spi::run("CREATE SCHEMA app").unwrap();
        Spi::run("CREATE TYPE app.status AS ENUM ('open', 'it''s done')").unwrap();

        let sql = Spi::get_one::<String>("SELECT type_recreate_command('app.status')").unwrap();
        assert_eq!(
            sql.as_deref(),
            Some("CREATE TYPE app.status AS ENUM ('open', 'it''s done')")
        );
    }

    #[pg_test]
    fn test_ensure_dependencies_without_nodes_records_nothing() {
        Spi::run("CREATE SCHEMA app").unwrap();
        Spi::run("CREATE TYPE app.status AS ENUM ('open')").unwrap();

        let status = Spi::get_one::<String>(
            "SELECT distobj_ensure_dependencies('enum', 'app.status')->>'status'",
        )
        .unwrap();
        assert_eq!(status.as_deref(), Some("no_active_nodes"));

        let recorded = Spi::get_one::<i64>("SELECT count(*) FROM distobj.pg_dist_object").unwrap();
        assert_eq!(recorded, Some(0));
    }
}
