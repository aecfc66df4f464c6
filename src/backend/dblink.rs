//! Worker connections over the `dblink` extension

use std::sync::atomic::{AtomicU32, Ordering};

use pgrx::prelude::*;

use crate::cluster::{ConnectionProvider, NodeConnection, StatementOutcome, WorkerNode};
use crate::deparse::Statement;
use crate::dist_warning;
use crate::error::{DistError, DistResult};

use super::spi::{query_one, text_arg};

// Connection names must stay unique for the backend's lifetime
static NEXT_CONNECTION: AtomicU32 = AtomicU32::new(1);

/// Value for a libpq connection string: single-quoted, `'` and `\` escaped
fn conninfo_value(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

pub struct DblinkConnections {
    connect_timeout_secs: u32,
}

impl DblinkConnections {
    pub fn new(connect_timeout_secs: u32) -> Self {
        Self { connect_timeout_secs }
    }

    fn connection_string(&self, node: &WorkerNode, role: &str) -> DistResult<String> {
        let database = query_one::<String>("SELECT pg_catalog.current_database()::text", Vec::new())?
            .unwrap_or_default();

        Ok(format!(
            "host={} port={} dbname={} user={} connect_timeout={} application_name='pg_distobj'",
            conninfo_value(&node.name),
            node.port,
            conninfo_value(&database),
            conninfo_value(role),
            self.connect_timeout_secs,
        ))
    }
}

impl ConnectionProvider for DblinkConnections {
    fn open(&mut self, node: &WorkerNode, role: &str) -> DistResult<NodeConnection> {
        pg_sys::check_for_interrupts!();

        let id = format!(
            "distobj_{}_{}",
            std::process::id(),
            NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed)
        );
        let conninfo = self.connection_string(node, role)?;

        let failure = query_one::<String>(
            "SELECT distobj.try_connect($1, $2)",
            vec![text_arg(&id), text_arg(&conninfo)],
        )?;

        match failure {
            None => Ok(NodeConnection { id, node: node.clone() }),
            Some(reason) => Err(DistError::NodeUnreachable {
                node: node.to_string(),
                reason,
            }),
        }
    }

    fn execute(
        &mut self,
        connection: &NodeConnection,
        statements: &[Statement],
    ) -> DistResult<Vec<StatementOutcome>> {
        let mut outcomes = Vec::with_capacity(statements.len());

        for statement in statements {
            // Raises on cancel or statement_timeout
            pg_sys::check_for_interrupts!();

            let status = query_one::<String>(
                "SELECT dblink_exec($1, $2, false)",
                vec![text_arg(&connection.id), text_arg(&statement.sql)],
            )?;

            if status.as_deref() == Some("ERROR") {
                let message = query_one::<String>(
                    "SELECT dblink_error_message($1)",
                    vec![text_arg(&connection.id)],
                )?
                .unwrap_or_else(|| "unknown error".to_string());
                outcomes.push(StatementOutcome::failed(&message));
                break;
            }

            outcomes.push(StatementOutcome::Ok);
        }

        Ok(outcomes)
    }

    fn close(&mut self, connection: NodeConnection) {
        if let Err(e) = query_one::<String>(
            "SELECT dblink_disconnect($1)",
            vec![text_arg(&connection.id)],
        ) {
            dist_warning!("pg_distobj: could not close connection to {}: {}", connection.node, e);
        }
    }
}

