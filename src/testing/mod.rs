//! In-memory collaborators shared by unit tests

use std::collections::{BTreeMap, HashSet};

use crate::catalog::DistObjectCatalog;
use crate::cluster::{ConnectionProvider, NodeConnection, NodeDirectory, StatementOutcome, WorkerNode};
use crate::config::PropagationConfig;
use crate::dependency::{DependencyEdge, DependencyKind, DependencyStore};
use crate::deparse::Statement;
use crate::error::{DistError, DistResult};
use crate::host::{AttributeDef, LocalCatalog, TypeCategory};
use crate::object::{ObjectAddress, ObjectKind, Oid, PortableIdentifier, QualifiedName};
use crate::propagate::Session;

struct FakeNamespace {
    name: String,
    owner: Option<String>,
}

struct FakeType {
    namespace: Oid,
    name: String,
    category: TypeCategory,
    owner: String,
    labels: Vec<String>,
    attributes: Vec<AttributeDef>,
}

/// Local catalog with schemas and types added by hand
pub struct FakeCatalog {
    next_oid: u32,
    namespaces: BTreeMap<Oid, FakeNamespace>,
    types: BTreeMap<Oid, FakeType>,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self {
            next_oid: 16384,
            namespaces: BTreeMap::new(),
            types: BTreeMap::new(),
        }
    }

    fn allocate(&mut self) -> Oid {
        let oid = Oid(self.next_oid);
        self.next_oid += 1;
        oid
    }

    pub fn add_namespace(&mut self, name: &str, owner: &str) -> Oid {
        let oid = self.allocate();
        self.namespaces.insert(
            oid,
            FakeNamespace { name: name.to_string(), owner: Some(owner.to_string()) },
        );
        oid
    }

    fn add_type(
        &mut self,
        namespace: Oid,
        name: &str,
        category: TypeCategory,
        owner: &str,
        labels: Vec<String>,
        attributes: Vec<AttributeDef>,
    ) -> Oid {
        let oid = self.allocate();
        self.types.insert(
            oid,
            FakeType {
                namespace,
                name: name.to_string(),
                category,
                owner: owner.to_string(),
                labels,
                attributes,
            },
        );
        oid
    }

    pub fn add_enum(&mut self, namespace: Oid, name: &str, labels: &[&str], owner: &str) -> Oid {
        let labels = labels.iter().map(|l| l.to_string()).collect();
        self.add_type(namespace, name, TypeCategory::Enum, owner, labels, Vec::new())
    }

    pub fn add_composite(
        &mut self,
        namespace: Oid,
        name: &str,
        attributes: &[AttributeDef],
        owner: &str,
    ) -> Oid {
        self.add_type(namespace, name, TypeCategory::Composite, owner, Vec::new(), attributes.to_vec())
    }

    pub fn add_base_type(&mut self, namespace: Oid, name: &str) -> Oid {
        self.add_type(namespace, name, TypeCategory::Base, "postgres", Vec::new(), Vec::new())
    }

    /// Simulate a catalog row that disappeared underneath a propagation
    pub fn remove_namespace_owner(&mut self, oid: Oid) {
        if let Some(ns) = self.namespaces.get_mut(&oid) {
            ns.owner = None;
        }
    }

    pub fn namespace_oid(&self, name: &str) -> Oid {
        self.namespaces
            .iter()
            .find(|(_, ns)| ns.name == name)
            .map(|(oid, _)| *oid)
            .unwrap_or_else(|| panic!("no schema {}", name))
    }

    pub fn type_oid(&self, schema: &str, name: &str) -> Oid {
        let namespace = self.namespace_oid(schema);
        self.types
            .iter()
            .find(|(_, t)| t.namespace == namespace && t.name == name)
            .map(|(oid, _)| *oid)
            .unwrap_or_else(|| panic!("no type {}.{}", schema, name))
    }

    /// Dependency store holding the type-to-schema edges the server records
    pub fn dependencies(&self) -> FakeDependencies {
        let mut deps = FakeDependencies::default();
        for (oid, t) in &self.types {
            deps.add(
                ObjectAddress::type_(oid.0),
                ObjectAddress::namespace(t.namespace.0),
                DependencyKind::Normal,
            );
        }
        deps
    }
}

impl Default for FakeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalCatalog for FakeCatalog {
    fn namespace_name(&self, oid: Oid) -> DistResult<Option<String>> {
        Ok(self.namespaces.get(&oid).map(|ns| ns.name.clone()))
    }

    fn namespace_owner(&self, oid: Oid) -> DistResult<Option<String>> {
        Ok(self.namespaces.get(&oid).and_then(|ns| ns.owner.clone()))
    }

    fn lookup_namespace(&self, name: &str) -> DistResult<Option<Oid>> {
        Ok(self
            .namespaces
            .iter()
            .find(|(_, ns)| ns.name == name)
            .map(|(oid, _)| *oid))
    }

    fn type_category(&self, oid: Oid) -> DistResult<Option<TypeCategory>> {
        Ok(self.types.get(&oid).map(|t| t.category))
    }

    fn type_name(&self, oid: Oid) -> DistResult<Option<QualifiedName>> {
        let Some(t) = self.types.get(&oid) else {
            return Ok(None);
        };
        let schema = self
            .namespaces
            .get(&t.namespace)
            .map(|ns| ns.name.as_str())
            .ok_or_else(|| DistError::CatalogError {
                operation: "type_name".to_string(),
                pg_error: format!("dangling namespace {}", t.namespace),
            })?;
        Ok(Some(QualifiedName::new(Some(schema), &t.name)))
    }

    fn type_owner(&self, oid: Oid) -> DistResult<Option<String>> {
        Ok(self.types.get(&oid).map(|t| t.owner.clone()))
    }

    /// Every schema counts as being on the search path
    fn lookup_types(&self, name: &QualifiedName) -> DistResult<Vec<Oid>> {
        let schema = match name.schema() {
            Some(schema) => match self.lookup_namespace(schema)? {
                Some(oid) => Some(oid),
                None => return Ok(Vec::new()),
            },
            None => None,
        };

        Ok(self
            .types
            .iter()
            .filter(|(_, t)| t.name == name.name() && (schema.is_none() || schema == Some(t.namespace)))
            .map(|(oid, _)| *oid)
            .collect())
    }

    fn enum_labels(&self, oid: Oid) -> DistResult<Vec<String>> {
        Ok(self.types.get(&oid).map(|t| t.labels.clone()).unwrap_or_default())
    }

    fn composite_attributes(&self, oid: Oid) -> DistResult<Vec<AttributeDef>> {
        Ok(self.types.get(&oid).map(|t| t.attributes.clone()).unwrap_or_default())
    }
}

#[derive(Default)]
pub struct FakeDependencies {
    edges: Vec<DependencyEdge>,
}

impl FakeDependencies {
    pub fn add(&mut self, dependent: ObjectAddress, referenced: ObjectAddress, kind: DependencyKind) {
        self.edges.push(DependencyEdge::new(dependent, referenced, kind));
    }
}

impl DependencyStore for FakeDependencies {
    fn dependencies_of(&self, address: &ObjectAddress) -> DistResult<Vec<DependencyEdge>> {
        Ok(self
            .edges
            .iter()
            .filter(|e| e.dependent == *address)
            .copied()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryObjectCatalog {
    rows: Vec<PortableIdentifier>,
}

impl DistObjectCatalog for MemoryObjectCatalog {
    fn record(&mut self, id: &PortableIdentifier) -> DistResult<bool> {
        if self.rows.contains(id) {
            return Ok(false);
        }
        self.rows.push(id.clone());
        Ok(true)
    }

    fn contains(&self, id: &PortableIdentifier) -> DistResult<bool> {
        Ok(self.rows.contains(id))
    }

    fn records(&self) -> DistResult<Vec<PortableIdentifier>> {
        Ok(self.rows.clone())
    }
}

pub struct StaticNodes {
    pub nodes: Vec<WorkerNode>,
    pub fail: bool,
}

impl NodeDirectory for StaticNodes {
    fn active_nodes(&self) -> DistResult<Vec<WorkerNode>> {
        if self.fail {
            return Err(DistError::CatalogError {
                operation: "list active nodes".to_string(),
                pg_error: "relation \"distobj.pg_dist_node\" does not exist".to_string(),
            });
        }
        Ok(self.nodes.clone())
    }
}

/// Connection provider that records statements per node and fails on request
#[derive(Default)]
pub struct ScriptedConnections {
    executed: BTreeMap<String, Vec<String>>,
    unreachable: HashSet<String>,
    failures: Vec<(String, String, StatementOutcome)>,
    cancellations: Vec<(String, String)>,
    pub opened: usize,
    pub closed: usize,
}

impl ScriptedConnections {
    pub fn unreachable(&mut self, node: &str) {
        self.unreachable.insert(node.to_string());
    }

    /// Statements on `node` containing `fragment` fail with `outcome`
    pub fn fail_statement(&mut self, node: &str, fragment: &str, outcome: StatementOutcome) {
        self.failures.push((node.to_string(), fragment.to_string(), outcome));
    }

    /// Statements on `node` containing `fragment` are interrupted
    pub fn cancel_on(&mut self, node: &str, fragment: &str) {
        self.cancellations.push((node.to_string(), fragment.to_string()));
    }

    /// Statements that succeeded on `node`
    pub fn statements_for(&self, node: &str) -> Vec<String> {
        self.executed.get(node).cloned().unwrap_or_default()
    }

    pub fn total_statements(&self) -> usize {
        self.executed.values().map(Vec::len).sum()
    }

    /// Connections opened and not yet closed
    pub fn open_count(&self) -> usize {
        self.opened - self.closed
    }
}

impl ConnectionProvider for ScriptedConnections {
    fn open(&mut self, node: &WorkerNode, _role: &str) -> DistResult<NodeConnection> {
        let key = node.to_string();
        if self.unreachable.contains(&key) {
            return Err(DistError::NodeUnreachable {
                node: key,
                reason: "connection refused".to_string(),
            });
        }
        self.opened += 1;
        Ok(NodeConnection { id: format!("conn{}", self.opened), node: node.clone() })
    }

    fn execute(
        &mut self,
        connection: &NodeConnection,
        statements: &[Statement],
    ) -> DistResult<Vec<StatementOutcome>> {
        let key = connection.node.to_string();
        let mut outcomes = Vec::new();

        for statement in statements {
            if self
                .cancellations
                .iter()
                .any(|(node, fragment)| *node == key && statement.sql.contains(fragment.as_str()))
            {
                return Err(DistError::Cancelled {
                    context: format!("waiting for {}", key),
                });
            }

            let failure = self
                .failures
                .iter()
                .find(|(node, fragment, _)| *node == key && statement.sql.contains(fragment.as_str()))
                .map(|(_, _, outcome)| outcome.clone());
            if let Some(outcome) = failure {
                outcomes.push(outcome);
                break;
            }

            self.executed.entry(key.clone()).or_default().push(statement.sql.clone());
            outcomes.push(StatementOutcome::Ok);
        }

        Ok(outcomes)
    }

    fn close(&mut self, _connection: NodeConnection) {
        self.closed += 1;
    }
}

/// Everything a [`Session`] needs, owned in one place
pub struct FakeCluster {
    pub catalog: FakeCatalog,
    pub dependencies: FakeDependencies,
    pub distributed: MemoryObjectCatalog,
    pub nodes: StaticNodes,
    pub connections: ScriptedConnections,
    pub config: PropagationConfig,
}

impl FakeCluster {
    /// Nodes listen on port 5432
    pub fn new(catalog: FakeCatalog, nodes: &[&str]) -> Self {
        let dependencies = catalog.dependencies();
        Self {
            catalog,
            dependencies,
            distributed: MemoryObjectCatalog::default(),
            nodes: StaticNodes {
                nodes: nodes.iter().map(|n| WorkerNode::new(n, 5432)).collect(),
                fail: false,
            },
            connections: ScriptedConnections::default(),
            config: PropagationConfig::default(),
        }
    }

    pub fn mark_distributed(&mut self, kind: ObjectKind, qualified_name: &str) {
        self.distributed
            .record(&PortableIdentifier::new(kind, qualified_name))
            .unwrap();
    }

    pub fn session(&mut self) -> Session<'_> {
        Session::new(
            &self.catalog,
            &self.dependencies,
            &mut self.distributed,
            &self.nodes,
            &mut self.connections,
            self.config.clone(),
        )
    }
}
