/// Propagation Engine: Dependency-Ordered DDL Fan-Out
///
/// This module brings worker nodes up to date with objects created or altered
/// on the coordinator:
/// - **Resolution**: ordered list of prerequisites still missing on the fleet
/// - **Rendering**: every statement is built before any node is contacted
/// - **Fan-out**: one dedicated connection per active node, prerequisite after prerequisite
/// - **Recording**: a prerequisite is recorded once every node accepted it
///
/// ## Failure Model
///
/// 1. Resolution or rendering errors abort before any network call
/// 2. A node failure aborts the remaining prerequisites; nothing is recorded
///    for the one in flight, earlier ones stay recorded
/// 3. Enum `ADD VALUE` cannot run inside a transaction block: it is sent
///    optimistically and failures are reported as a warning carrying a
///    re-runnable statement
///
/// Connections are closed on every exit path by [`ConnectionSet`].
use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::DistObjectCatalog;
use crate::cluster::{ConnectionProvider, NodeConnection, NodeDirectory, StatementOutcome, WorkerNode};
use crate::config::PropagationConfig;
use crate::dependency::{DependencyResolver, DependencyStore};
use crate::deparse::{self, render_alteration, render_drop_types, Statement, TypeAlteration};
use crate::error::{DistError, DistResult};
use crate::host::LocalCatalog;
use crate::metrics::metrics_api;
use crate::object::{from_portable, to_portable, ObjectReference, PortableIdentifier};
use crate::{dist_debug, dist_info, dist_warning, internal_error};

/// Collaborators for one propagation, scoped to the current transaction
pub struct Session<'a> {
    pub local: &'a dyn LocalCatalog,
    pub dependencies: &'a dyn DependencyStore,
    pub distributed: &'a mut dyn DistObjectCatalog,
    pub nodes: &'a dyn NodeDirectory,
    pub connections: &'a mut dyn ConnectionProvider,
    pub config: PropagationConfig,
}

impl<'a> Session<'a> {
    pub fn new(
        local: &'a dyn LocalCatalog,
        dependencies: &'a dyn DependencyStore,
        distributed: &'a mut dyn DistObjectCatalog,
        nodes: &'a dyn NodeDirectory,
        connections: &'a mut dyn ConnectionProvider,
        config: PropagationConfig,
    ) -> Self {
        Self { local, dependencies, distributed, nodes, connections, config }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationStatus {
    /// Every prerequisite reached every node
    Completed,
    /// No statement had to leave the coordinator
    NothingToSend,
    /// Statements were pending but the fleet is empty; nothing was recorded
    NoActiveNodes,
}

/// What one propagation did, returned to SQL callers as JSON
#[derive(Debug, Clone, Serialize)]
pub struct PropagationReport {
    pub target: String,
    pub prerequisites: Vec<PortableIdentifier>,
    pub recorded: Vec<PortableIdentifier>,
    pub statements_sent: usize,
    pub nodes: Vec<WorkerNode>,
    pub status: PropagationStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PropagationReport {
    fn start(target: String) -> Self {
        let now = Utc::now();
        Self {
            target,
            prerequisites: Vec::new(),
            recorded: Vec::new(),
            statements_sent: 0,
            nodes: Vec::new(),
            status: PropagationStatus::NothingToSend,
            started_at: now,
            finished_at: now,
        }
    }

    fn finish(mut self) -> Self {
        self.finished_at = Utc::now();
        self
    }
}

/// Enum value addition that did not reach every node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PartialFailure {
    pub type_name: String,
    pub failed_nodes: Vec<String>,
    /// `ADD VALUE IF NOT EXISTS` form, safe to run on every node
    pub recovery_statement: String,
}

impl From<PartialFailure> for DistError {
    fn from(failure: PartialFailure) -> Self {
        DistError::PartialEnumPropagation {
            type_name: failure.type_name,
            failed_nodes: failure.failed_nodes,
            recovery_statement: failure.recovery_statement,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnumValueOutcome {
    /// Every node has the value (some may have had it already)
    Success,
    /// Some nodes failed; the local change stands and must be repaired manually
    PartiallyFailed(PartialFailure),
    /// Nothing was sent
    Aborted(DistError),
}

#[derive(Debug, Clone)]
pub enum AlterationOutcome {
    /// Target is not distributed; the change stays local
    NotDistributed,
    Applied(PropagationReport),
    EnumValue(EnumValueOutcome),
}

/// A unit of work: statements to send everywhere, then an identifier to record
struct PlannedStep {
    record: Option<PortableIdentifier>,
    statements: Vec<Statement>,
}

/// Open connections, closed when dropped
struct ConnectionSet<'p> {
    provider: &'p mut dyn ConnectionProvider,
    open: Vec<NodeConnection>,
}

impl<'p> ConnectionSet<'p> {
    fn new(provider: &'p mut dyn ConnectionProvider) -> Self {
        Self { provider, open: Vec::new() }
    }

    fn open_all(&mut self, nodes: &[WorkerNode], role: &str) -> DistResult<()> {
        for node in nodes {
            match self.provider.open(node, role) {
                Ok(connection) => self.open.push(connection),
                Err(e) => {
                    metrics_api::record_remote_failure();
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Run the batch on every open connection, node after node
    fn run_everywhere(&mut self, batch: &[Statement]) -> DistResult<usize> {
        let mut sent = 0;
        for connection in &self.open {
            sent += run_batch(&mut *self.provider, connection, batch)?;
        }
        Ok(sent)
    }
}

impl Drop for ConnectionSet<'_> {
    fn drop(&mut self) {
        for connection in self.open.drain(..) {
            self.provider.close(connection);
        }
    }
}

/// Execute a batch on one connection; the first failing statement aborts
fn run_batch(
    provider: &mut dyn ConnectionProvider,
    connection: &NodeConnection,
    batch: &[Statement],
) -> DistResult<usize> {
    let outcomes = match provider.execute(connection, batch) {
        Ok(outcomes) => outcomes,
        Err(e) => {
            metrics_api::record_remote_failure();
            return Err(e);
        }
    };

    for (statement, outcome) in batch.iter().zip(&outcomes) {
        if let StatementOutcome::Failed { sqlstate, message } = outcome {
            metrics_api::record_remote_failure();
            return Err(DistError::RemoteExecutionFailed {
                node: connection.node.to_string(),
                statement: statement.sql.clone(),
                sqlstate: sqlstate.clone(),
                message: message.clone(),
            });
        }
    }

    if outcomes.len() < batch.len() {
        return Err(internal_error!(
            "node {} reported {} outcome(s) for {} statement(s)",
            connection.node,
            outcomes.len(),
            batch.len()
        ));
    }

    metrics_api::record_statements_sent(batch.len());
    Ok(batch.len())
}

pub struct ClusterPropagator<'a> {
    session: Session<'a>,
}

impl<'a> ClusterPropagator<'a> {
    pub fn new(session: Session<'a>) -> Self {
        Self { session }
    }

    /// Make every prerequisite of `target` exist on every active node
    ///
    /// The target itself is created by the DDL that triggered the call.
    ///
    /// # Errors
    /// Resolution and rendering errors (before any network call),
    /// `NodeUnreachable`/`RemoteExecutionFailed`/`Cancelled` from the fleet.
    pub fn propagate_to_fleet(&mut self, target: &ObjectReference) -> DistResult<PropagationReport> {
        let timer = metrics_api::record_propagation_start();
        let result = self.fleet(target, Vec::new());
        let resolved = result.as_ref().map(|r| r.prerequisites.len()).unwrap_or(0);
        metrics_api::record_propagation_complete(resolved, timer);
        result
    }

    /// Replay an alteration of a distributed type on the fleet
    ///
    /// Enum value additions take the optimistic path, everything else is sent
    /// all-or-nothing after the target's prerequisites.
    pub fn propagate_alteration(
        &mut self,
        target: &ObjectReference,
        alteration: &TypeAlteration,
    ) -> DistResult<AlterationOutcome> {
        let id = to_portable(self.session.local, target)?;
        if !self.session.distributed.contains(&id)? {
            dist_debug!("{} is not distributed, keeping {} local", id, alteration.subtype());
            return Ok(AlterationOutcome::NotDistributed);
        }

        if alteration.is_enum_add_value() {
            return Ok(AlterationOutcome::EnumValue(
                self.propagate_enum_add_value(target, alteration),
            ));
        }

        let timer = metrics_api::record_propagation_start();
        let result = render_alteration(self.session.local, target, alteration).and_then(|statement| {
            self.fleet(
                target,
                vec![PlannedStep { record: None, statements: vec![statement] }],
            )
        });
        let resolved = result.as_ref().map(|r| r.prerequisites.len()).unwrap_or(0);
        metrics_api::record_propagation_complete(resolved, timer);

        result.map(AlterationOutcome::Applied)
    }

    /// Optimistic `ADD VALUE`: run on each node independently, tolerate
    /// nodes that already have the value, collect the rest
    pub fn propagate_enum_add_value(
        &mut self,
        target: &ObjectReference,
        alteration: &TypeAlteration,
    ) -> EnumValueOutcome {
        let timer = metrics_api::record_propagation_start();
        let outcome = self.enum_add_value(target, alteration);
        metrics_api::record_propagation_complete(0, timer);
        outcome
    }

    fn enum_add_value(&mut self, target: &ObjectReference, alteration: &TypeAlteration) -> EnumValueOutcome {
        let prepared = render_alteration(self.session.local, target, alteration).and_then(|statement| {
            let retry = render_alteration(self.session.local, target, &alteration.with_if_not_exists())?;
            let type_name = to_portable(self.session.local, target)?.qualified_name;
            let nodes = self.session.nodes.active_nodes()?;
            Ok((statement, retry, type_name, nodes))
        });
        let (statement, retry, type_name, nodes) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => return EnumValueOutcome::Aborted(e),
        };

        let batch = vec![
            Statement::new(self.session.config.disable_propagation_command()),
            statement,
        ];
        let role = self.session.config.connection_role.clone();
        let mut failed_nodes = Vec::new();

        for node in &nodes {
            let mut set = ConnectionSet::new(&mut *self.session.connections);
            let result = set
                .open_all(std::slice::from_ref(node), &role)
                .and_then(|()| {
                    let connection = set.open.first().cloned().ok_or_else(|| {
                        internal_error!("no connection to {}", node)
                    })?;
                    set.provider.execute(&connection, &batch)
                });

            match result {
                Err(e @ DistError::Cancelled { .. }) => return EnumValueOutcome::Aborted(e),
                Err(e) => {
                    dist_warning!("could not add enum value on node {}: {}", node, e);
                    failed_nodes.push(node.to_string());
                }
                Ok(outcomes) => match outcomes.iter().find(|o| !o.is_ok()) {
                    None if outcomes.len() == batch.len() => {
                        metrics_api::record_statements_sent(batch.len());
                    }
                    Some(failure) if failure.is_duplicate_enum_value() => {
                        metrics_api::record_tolerated_duplicate();
                        dist_debug!("node {} already has the enum value", node);
                    }
                    _ => {
                        metrics_api::record_remote_failure();
                        dist_warning!("could not add enum value on node {}: {:?}", node, outcomes.last());
                        failed_nodes.push(node.to_string());
                    }
                },
            }
        }

        if failed_nodes.is_empty() {
            return EnumValueOutcome::Success;
        }

        metrics_api::record_partial_enum_failure();
        EnumValueOutcome::PartiallyFailed(PartialFailure {
            type_name,
            failed_nodes,
            recovery_statement: retry.sql,
        })
    }

    /// Send `DROP TYPE` for the distributed subset of `targets`
    ///
    /// Catalog rows are left in place; removing them belongs to the drop path.
    pub fn propagate_drop_types(
        &mut self,
        targets: &[ObjectReference],
        if_exists: bool,
        cascade: bool,
    ) -> DistResult<PropagationReport> {
        let timer = metrics_api::record_propagation_start();
        let label = targets
            .iter()
            .map(|t| describe(self.session.local, t))
            .collect::<Vec<_>>()
            .join(", ");

        let result = render_drop_types(
            self.session.local,
            &*self.session.distributed,
            targets,
            if_exists,
            cascade,
        )
        .and_then(|statement| {
            let steps: Vec<PlannedStep> = statement
                .into_iter()
                .map(|s| PlannedStep { record: None, statements: vec![s] })
                .collect();
            let mut report = PropagationReport::start(label);
            self.execute_plan(&steps, None, &mut report)?;
            Ok(report.finish())
        });

        metrics_api::record_propagation_complete(0, timer);
        result
    }

    /// Replay every recorded object onto one node, dependencies first
    ///
    /// Used when a node joins after objects were recorded.
    pub fn activate_node(&mut self, node: &WorkerNode) -> DistResult<PropagationReport> {
        let timer = metrics_api::record_propagation_start();
        let result = self.activate(node);
        let resolved = result.as_ref().map(|r| r.prerequisites.len()).unwrap_or(0);
        metrics_api::record_propagation_complete(resolved, timer);
        result
    }

    fn activate(&mut self, node: &WorkerNode) -> DistResult<PropagationReport> {
        let session = &self.session;
        let records = session.distributed.records()?;
        let resolver = DependencyResolver::new(
            session.local,
            session.dependencies,
            &*session.distributed,
            &session.config,
        )
        .skip_distributed(false);

        let mut ordered: Vec<(ObjectReference, PortableIdentifier)> = Vec::new();
        let mut seen: HashSet<ObjectReference> = HashSet::new();
        for id in &records {
            let reference = from_portable(session.local, id)?;
            for prerequisite in resolver.resolve(&reference)? {
                if seen.contains(&prerequisite) {
                    continue;
                }
                let prerequisite_id = to_portable(session.local, &prerequisite)?;
                if session.distributed.contains(&prerequisite_id)? {
                    seen.insert(prerequisite);
                    ordered.push((prerequisite, prerequisite_id));
                }
            }
            if seen.insert(reference) {
                ordered.push((reference, id.clone()));
            }
        }

        let mut steps = Vec::with_capacity(ordered.len());
        for (reference, _) in &ordered {
            steps.push(PlannedStep {
                record: None,
                statements: deparse::render(session.local, &session.config, reference)?,
            });
        }

        let mut report = PropagationReport::start(format!("node {}", node));
        report.prerequisites = ordered.into_iter().map(|(_, id)| id).collect();
        self.execute_plan(&steps, Some(node), &mut report)?;

        dist_info!(
            "activated node {}: replayed {} object(s), {} statement(s)",
            node,
            report.prerequisites.len(),
            report.statements_sent
        );
        Ok(report.finish())
    }

    /// Resolve, render, then run prerequisites followed by `extra` steps
    fn fleet(&mut self, target: &ObjectReference, extra: Vec<PlannedStep>) -> DistResult<PropagationReport> {
        let session = &self.session;
        let prerequisites = DependencyResolver::new(
            session.local,
            session.dependencies,
            &*session.distributed,
            &session.config,
        )
        .resolve(target)?;

        let mut report = PropagationReport::start(describe(session.local, target));
        let mut steps = Vec::with_capacity(prerequisites.len() + extra.len());
        for prerequisite in &prerequisites {
            let id = to_portable(session.local, prerequisite)?;
            let statements = deparse::render(session.local, &session.config, prerequisite)?;
            report.prerequisites.push(id.clone());
            if statements.is_empty() {
                // exists everywhere already (built-in schema); neither sent nor recorded
                dist_debug!("{} needs no statement on workers", id);
                continue;
            }
            steps.push(PlannedStep { record: Some(id), statements });
        }
        steps.extend(extra);

        self.execute_plan(&steps, None, &mut report)?;

        if report.status == PropagationStatus::Completed {
            dist_info!(
                "propagated {} prerequisite(s) of {} to {} node(s)",
                report.prerequisites.len(),
                report.target,
                report.nodes.len()
            );
        }
        Ok(report.finish())
    }

    /// Send the steps in order to `only` or to every active node, recording as
    /// each step completes everywhere
    fn execute_plan(
        &mut self,
        steps: &[PlannedStep],
        only: Option<&WorkerNode>,
        report: &mut PropagationReport,
    ) -> DistResult<()> {
        let session = &mut self.session;

        if steps.iter().all(|step| step.statements.is_empty()) {
            report.status = PropagationStatus::NothingToSend;
            return Ok(());
        }

        let nodes = match only {
            Some(node) => vec![node.clone()],
            None => session.nodes.active_nodes()?,
        };
        if nodes.is_empty() {
            dist_warning!("no active worker nodes, {} not propagated", report.target);
            report.status = PropagationStatus::NoActiveNodes;
            return Ok(());
        }

        let mut set = ConnectionSet::new(&mut *session.connections);
        set.open_all(&nodes, &session.config.connection_role)?;
        report.nodes = nodes;

        for step in steps {
            if !step.statements.is_empty() {
                let mut batch = Vec::with_capacity(step.statements.len() + 1);
                batch.push(Statement::new(session.config.disable_propagation_command()));
                batch.extend(step.statements.iter().cloned());
                report.statements_sent += set.run_everywhere(&batch)?;
            }
            if let Some(id) = &step.record {
                record(&mut *session.distributed, id, report)?;
            }
        }

        report.status = PropagationStatus::Completed;
        Ok(())
    }
}

fn record(
    distributed: &mut dyn DistObjectCatalog,
    id: &PortableIdentifier,
    report: &mut PropagationReport,
) -> DistResult<()> {
    if distributed.record(id)? {
        metrics_api::record_object_recorded();
        report.recorded.push(id.clone());
    }
    Ok(())
}

/// Human-readable label; falls back to the raw address for unsupported kinds
fn describe(local: &dyn LocalCatalog, target: &ObjectReference) -> String {
    to_portable(local, target)
        .map(|id| id.to_string())
        .unwrap_or_else(|_| format!("object {}", target.address()))
}
