//! SPI implementations of the catalog traits

use std::ffi::CStr;

use pgrx::prelude::*;
use pgrx::spi::{self, SpiClient};
use pgrx::{FromDatum, IntoDatum, PgBuiltInOids, PgOid};

use crate::catalog::{identifier_from_row, DistObjectCatalog, DIST_OBJECT_TABLE};
use crate::cluster::{NodeDirectory, WorkerNode};
use crate::dependency::{DependencyEdge, DependencyKind, DependencyStore};
use crate::error::{DistError, DistResult};
use crate::host::{AttributeDef, LocalCatalog, TypeCategory};
use crate::object::{ClassId, ObjectAddress, Oid, PortableIdentifier, QualifiedName};

pub(crate) type SpiArgs = Vec<(PgOid, Option<pg_sys::Datum>)>;

pub(crate) fn oid_arg(oid: Oid) -> (PgOid, Option<pg_sys::Datum>) {
    (
        PgOid::BuiltIn(PgBuiltInOids::OIDOID),
        pg_sys::Oid::from(oid.0).into_datum(),
    )
}

pub(crate) fn text_arg(value: &str) -> (PgOid, Option<pg_sys::Datum>) {
    (PgOid::BuiltIn(PgBuiltInOids::TEXTOID), value.into_datum())
}

pub(crate) fn int_arg(value: i32) -> (PgOid, Option<pg_sys::Datum>) {
    (PgOid::BuiltIn(PgBuiltInOids::INT4OID), value.into_datum())
}

fn spi_error(query: &str, e: spi::Error) -> DistError {
    DistError::SpiError {
        query: query.to_string(),
        error: e.to_string(),
    }
}

/// First column of the first row, `None` for no rows or NULL
pub(crate) fn query_one<T: FromDatum + IntoDatum>(query: &str, args: SpiArgs) -> DistResult<Option<T>> {
    Spi::connect(|mut client| -> Result<Option<T>, spi::Error> {
        let table = client.update(query, Some(1), Some(args))?;
        match table.into_iter().next() {
            Some(row) => row[1].value::<T>(),
            None => Ok(None),
        }
    })
    .map_err(|e| spi_error(query, e))
}

/// Run a read-only query and map each row
fn query_rows<T>(
    query: &str,
    args: SpiArgs,
    mut map: impl FnMut(&spi::SpiHeapTupleData<'_>) -> Result<Option<T>, spi::Error>,
) -> DistResult<Vec<T>> {
    Spi::connect(|client: SpiClient<'_>| -> Result<Vec<T>, spi::Error> {
        let mut out = Vec::new();
        for row in client.select(query, None, Some(args))? {
            if let Some(value) = map(&row)? {
                out.push(value);
            }
        }
        Ok(out)
    })
    .map_err(|e| spi_error(query, e))
}

fn char_column(row: &spi::SpiHeapTupleData<'_>, name: &str) -> Result<Option<char>, spi::Error> {
    Ok(row[name].value::<i8>()?.map(|c| c as u8 as char))
}

fn oid_column(row: &spi::SpiHeapTupleData<'_>, name: &str) -> Result<Option<u32>, spi::Error> {
    Ok(row[name].value::<pg_sys::Oid>()?.map(|oid| oid.as_u32()))
}

/// Schema-qualified, typmod-aware type name as the server prints it
fn qualified_type_name(type_oid: u32, typmod: i32) -> String {
    let flags = (pg_sys::FORMAT_TYPE_TYPEMOD_GIVEN | pg_sys::FORMAT_TYPE_FORCE_QUALIFY) as u16;
    unsafe {
        let raw = pg_sys::format_type_extended(pg_sys::Oid::from(type_oid), typmod, flags);
        if raw.is_null() {
            return format!("{}", type_oid);
        }
        CStr::from_ptr(raw).to_string_lossy().into_owned()
    }
}

/// System catalogs of the local node, read through SPI
#[derive(Debug, Default, Clone, Copy)]
pub struct SpiCatalog;

impl LocalCatalog for SpiCatalog {
    fn namespace_name(&self, oid: Oid) -> DistResult<Option<String>> {
        query_one::<String>(
            "SELECT nspname::text FROM pg_catalog.pg_namespace WHERE oid = $1",
            vec![oid_arg(oid)],
        )
    }

    fn namespace_owner(&self, oid: Oid) -> DistResult<Option<String>> {
        query_one::<String>(
            "SELECT pg_catalog.pg_get_userbyid(nspowner)::text \
             FROM pg_catalog.pg_namespace WHERE oid = $1",
            vec![oid_arg(oid)],
        )
    }

    fn lookup_namespace(&self, name: &str) -> DistResult<Option<Oid>> {
        let oid = query_one::<pg_sys::Oid>(
            "SELECT oid FROM pg_catalog.pg_namespace WHERE nspname = $1",
            vec![text_arg(name)],
        )?;
        Ok(oid.map(|o| Oid(o.as_u32())))
    }

    fn type_category(&self, oid: Oid) -> DistResult<Option<TypeCategory>> {
        let typtype = query_one::<i8>(
            "SELECT typtype FROM pg_catalog.pg_type WHERE oid = $1",
            vec![oid_arg(oid)],
        )?;
        Ok(typtype.map(|c| TypeCategory::from_typtype(c as u8 as char)))
    }

    fn type_name(&self, oid: Oid) -> DistResult<Option<QualifiedName>> {
        let names = query_rows(
            "SELECT n.nspname::text AS schema_name, t.typname::text AS type_name \
             FROM pg_catalog.pg_type t \
             JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace \
             WHERE t.oid = $1",
            vec![oid_arg(oid)],
            |row| {
                let schema = row["schema_name"].value::<String>()?;
                let name = row["type_name"].value::<String>()?;
                Ok(name.map(|name| QualifiedName::new(schema.as_deref(), &name)))
            },
        )?;
        Ok(names.into_iter().next())
    }

    fn type_owner(&self, oid: Oid) -> DistResult<Option<String>> {
        query_one::<String>(
            "SELECT pg_catalog.pg_get_userbyid(typowner)::text FROM pg_catalog.pg_type WHERE oid = $1",
            vec![oid_arg(oid)],
        )
    }

    fn lookup_types(&self, name: &QualifiedName) -> DistResult<Vec<Oid>> {
        let (query, args) = match name.schema() {
            Some(schema) => (
                "SELECT t.oid FROM pg_catalog.pg_type t \
                 JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace \
                 WHERE n.nspname = $1 AND t.typname = $2",
                vec![text_arg(schema), text_arg(name.name())],
            ),
            None => (
                "SELECT t.oid FROM pg_catalog.pg_type t \
                 WHERE t.typname = $1 AND pg_catalog.pg_type_is_visible(t.oid)",
                vec![text_arg(name.name())],
            ),
        };

        query_rows(query, args, |row| Ok(oid_column(row, "oid")?.map(Oid)))
    }

    fn enum_labels(&self, oid: Oid) -> DistResult<Vec<String>> {
        query_rows(
            "SELECT enumlabel::text AS label FROM pg_catalog.pg_enum \
             WHERE enumtypid = $1 ORDER BY enumsortorder",
            vec![oid_arg(oid)],
            |row| row["label"].value::<String>(),
        )
    }

    fn composite_attributes(&self, oid: Oid) -> DistResult<Vec<AttributeDef>> {
        let rows = query_rows(
            "SELECT a.attnum, a.attname::text AS attname, a.attisdropped, \
                    a.atttypid, a.atttypmod, \
                    CASE WHEN a.attcollation <> 0 AND a.attcollation <> t.typcollation \
                         THEN pg_catalog.quote_ident(cn.nspname) || '.' || pg_catalog.quote_ident(co.collname) \
                    END AS collation_name \
             FROM pg_catalog.pg_attribute a \
             LEFT JOIN pg_catalog.pg_type t ON t.oid = a.atttypid \
             LEFT JOIN pg_catalog.pg_collation co ON co.oid = a.attcollation \
             LEFT JOIN pg_catalog.pg_namespace cn ON cn.oid = co.collnamespace \
             WHERE a.attrelid = (SELECT typrelid FROM pg_catalog.pg_type WHERE oid = $1) \
               AND a.attnum > 0 \
             ORDER BY a.attnum",
            vec![oid_arg(oid)],
            |row| {
                let attnum = row["attnum"].value::<i16>()?.unwrap_or_default();
                let name = row["attname"].value::<String>()?.unwrap_or_default();
                let dropped = row["attisdropped"].value::<bool>()?.unwrap_or(false);
                let type_oid = oid_column(row, "atttypid")?.unwrap_or(0);
                let typmod = row["atttypmod"].value::<i32>()?.unwrap_or(-1);
                let collation = row["collation_name"].value::<String>()?;
                Ok(Some((attnum, name, dropped, type_oid, typmod, collation)))
            },
        )?;

        // format_type_extended needs no SPI, so it runs after the scan
        Ok(rows
            .into_iter()
            .map(|(attnum, name, dropped, type_oid, typmod, collation)| {
                if dropped {
                    return AttributeDef::new(attnum, &name, "").dropped();
                }
                let mut attribute = AttributeDef::new(attnum, &name, &qualified_type_name(type_oid, typmod));
                attribute.collation = collation;
                attribute
            })
            .collect())
    }
}

impl DependencyStore for SpiCatalog {
    /// Composite types keep their attribute dependencies on the backing
    /// relation; those edges are reported as edges of the type
    fn dependencies_of(&self, address: &ObjectAddress) -> DistResult<Vec<DependencyEdge>> {
        let dependent = *address;
        query_rows(
            "SELECT d.refclassid, d.refobjid, d.refobjsubid, d.deptype \
             FROM pg_catalog.pg_depend d \
             WHERE (d.classid = $1 AND d.objid = $2 AND ($3 = 0 OR d.objsubid = $3)) \
                OR ($1 = 'pg_catalog.pg_type'::regclass::oid \
                    AND d.classid = 'pg_catalog.pg_class'::regclass::oid \
                    AND d.objid = (SELECT typrelid FROM pg_catalog.pg_type \
                                   WHERE oid = $2 AND typtype = 'c'))",
            vec![
                oid_arg(Oid(address.class_id.relation_oid())),
                oid_arg(address.object_id),
                int_arg(address.sub_id),
            ],
            |row| {
                let (Some(class), Some(object)) =
                    (oid_column(row, "refclassid")?, oid_column(row, "refobjid")?)
                else {
                    return Ok(None);
                };
                let sub_id = row["refobjsubid"].value::<i32>()?.unwrap_or(0);
                let kind = DependencyKind::from_deptype(char_column(row, "deptype")?.unwrap_or('n'));
                let referenced =
                    ObjectAddress::new(ClassId::from_relation_oid(class), Oid(object)).with_sub_id(sub_id);
                Ok(Some(DependencyEdge::new(dependent, referenced, kind)))
            },
        )
    }
}

/// `distobj.pg_dist_object`
#[derive(Debug, Default, Clone, Copy)]
pub struct SpiObjectCatalog;

impl DistObjectCatalog for SpiObjectCatalog {
    fn record(&mut self, id: &PortableIdentifier) -> DistResult<bool> {
        let inserted = query_one::<i32>(
            &format!(
                "INSERT INTO {} (kind, qualified_name) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING RETURNING 1",
                DIST_OBJECT_TABLE
            ),
            vec![text_arg(id.kind.as_str()), text_arg(&id.qualified_name)],
        )?;
        Ok(inserted.is_some())
    }

    fn contains(&self, id: &PortableIdentifier) -> DistResult<bool> {
        let exists = query_one::<bool>(
            &format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE kind = $1 AND qualified_name = $2)",
                DIST_OBJECT_TABLE
            ),
            vec![text_arg(id.kind.as_str()), text_arg(&id.qualified_name)],
        )?;
        Ok(exists.unwrap_or(false))
    }

    fn records(&self) -> DistResult<Vec<PortableIdentifier>> {
        let rows = query_rows(
            &format!(
                "SELECT kind, qualified_name FROM {} ORDER BY recorded_at, kind, qualified_name",
                DIST_OBJECT_TABLE
            ),
            Vec::new(),
            |row| {
                let kind = row["kind"].value::<String>()?;
                let name = row["qualified_name"].value::<String>()?;
                Ok(kind.zip(name))
            },
        )?;

        rows.iter()
            .map(|(kind, name)| identifier_from_row(kind, name))
            .collect()
    }
}

/// Active primaries from `distobj.pg_dist_node`
#[derive(Debug, Default, Clone, Copy)]
pub struct SpiNodeDirectory;

impl NodeDirectory for SpiNodeDirectory {
    fn active_nodes(&self) -> DistResult<Vec<WorkerNode>> {
        let rows = query_rows(
            "SELECT nodename, nodeport FROM distobj.pg_dist_node \
             WHERE isactive AND noderole = 'primary' ORDER BY nodeid",
            Vec::new(),
            |row| {
                let name = row["nodename"].value::<String>()?;
                let port = row["nodeport"].value::<i32>()?;
                Ok(name.zip(port))
            },
        )?;

        rows.into_iter()
            .map(|(name, port)| {
                let port = u16::try_from(port).map_err(|_| DistError::CatalogError {
                    operation: "read distobj.pg_dist_node".to_string(),
                    pg_error: format!("invalid port {} for node {}", port, name),
                })?;
                Ok(WorkerNode::new(&name, port))
            })
            .collect()
    }
}

#[cfg(feature = "pg_test")]
#[pg_schema]
mod tests {
    use pgrx::prelude::*;

    use super::*;
    use crate::config::PropagationConfig;
    use crate::dependency::DependencyResolver;
    use crate::object::{resolve_type, to_portable};

    fn type_named(name: &str) -> crate::object::ObjectReference {
        resolve_type(&SpiCatalog, &QualifiedName::parse(name).unwrap()).unwrap()
    }

    #[pg_test]
    fn test_composite_resolves_enum_in_other_schema() {
        Spi::run("CREATE SCHEMA core").unwrap();
        Spi::run("CREATE SCHEMA app").unwrap();
        Spi::run("CREATE TYPE core.status AS ENUM ('open', 'closed')").unwrap();
        Spi::run("CREATE TYPE app.line AS (id integer, status core.status)").unwrap();

        let config = PropagationConfig::default();
        let objects = SpiObjectCatalog;
        let resolved = DependencyResolver::new(&SpiCatalog, &SpiCatalog, &objects, &config)
            .resolve(&type_named("app.line"))
            .unwrap();
        let names: Vec<String> = resolved
            .iter()
            .map(|r| to_portable(&SpiCatalog, r).unwrap().to_string())
            .collect();

        let position = |wanted: &str| names.iter().position(|n| n == wanted);
        let core = position("schema core").expect("schema core resolved");
        let status = position("enum core.status").expect("enum core.status resolved");
        assert!(position("schema app").is_some(), "{:?}", names);
        assert!(core < status, "{:?}", names);
        // built-in types are not followed
        assert_eq!(names.len(), 3, "{:?}", names);
    }

    #[pg_test]
    fn test_composite_attributes_flag_dropped_and_collation() {
        Spi::run("CREATE SCHEMA app").unwrap();
        Spi::run(r#"CREATE TYPE app.pair AS (a integer, b text, c text COLLATE "C")"#).unwrap();
        Spi::run("ALTER TYPE app.pair DROP ATTRIBUTE b").unwrap();

        let oid = type_named("app.pair").oid().unwrap();
        let attributes = SpiCatalog.composite_attributes(oid).unwrap();
        let live: Vec<&str> = attributes
            .iter()
            .filter(|a| !a.is_dropped)
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(live, vec!["a", "c"]);

        let c = attributes.iter().find(|a| a.name == "c").unwrap();
        assert_eq!(c.collation.as_deref(), Some(r#"pg_catalog."C""#));
        let a = attributes.iter().find(|a| a.name == "a").unwrap();
        assert_eq!(a.type_name, "integer");
        assert_eq!(a.collation, None);

        let sql = crate::deparse::create_type_sql(&SpiCatalog, oid).unwrap();
        assert!(!sql.contains(" b "), "{}", sql);
        assert!(sql.contains(r#"c pg_catalog.text COLLATE pg_catalog."C""#), "{}", sql);
    }

    #[pg_test]
    fn test_record_is_idempotent() {
        let mut objects = SpiObjectCatalog;
        let id = PortableIdentifier::new(crate::object::ObjectKind::Namespace, "app");

        assert!(objects.record(&id).unwrap());
        assert!(!objects.record(&id).unwrap());
        assert!(objects.contains(&id).unwrap());
        assert_eq!(objects.records().unwrap(), vec![id]);
    }

    #[pg_test]
    fn test_extension_member_is_owned() {
        let table = query_one::<pg_sys::Oid>(
            "SELECT 'distobj.pg_dist_object'::regclass::oid",
            Vec::new(),
        )
        .unwrap()
        .unwrap();
        let address = ObjectAddress::new(ClassId::Other(1259), Oid(table.as_u32()));

        assert!(SpiCatalog.is_owned_by_extension(&address).unwrap());
    }

    #[pg_test]
    fn test_active_nodes_skip_inactive_and_secondaries() {
        Spi::run(
            "INSERT INTO distobj.pg_dist_node (nodename, nodeport, isactive, noderole) VALUES \
             ('w1', 5432, true, 'primary'), ('w2', 5433, false, 'primary'), \
             ('w3', 5434, true, 'secondary')",
        )
        .unwrap();

        assert_eq!(SpiNodeDirectory.active_nodes().unwrap(), vec![WorkerNode::new("w1", 5432)]);
    }
}
