//! Server-side wiring: SPI-backed collaborators, dblink connections, GUCs
//! and the SQL-callable entry points.

pub mod dblink;
pub mod guc;
pub mod metadata;
pub mod spi;
pub mod udf;

use crate::error::DistResult;
use crate::propagate::{ClusterPropagator, Session};

use self::dblink::DblinkConnections;
use self::spi::{SpiCatalog, SpiNodeDirectory, SpiObjectCatalog};

/// Run `f` against a propagator wired to this backend's catalogs and the
/// current GUC values. Connections do not outlive the call.
pub fn with_propagator<R>(
    f: impl FnOnce(&mut ClusterPropagator<'_>) -> DistResult<R>,
) -> DistResult<R> {
    let config = guc::session_config()?;
    let catalog = SpiCatalog;
    let mut objects = SpiObjectCatalog;
    let nodes = SpiNodeDirectory;
    let mut connections = DblinkConnections::new(config.connect_timeout_secs);

    let session = Session::new(
        &catalog,
        &catalog,
        &mut objects,
        &nodes,
        &mut connections,
        config,
    );
    let mut propagator = ClusterPropagator::new(session);
    f(&mut propagator)
}
