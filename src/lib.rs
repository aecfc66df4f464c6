//! pg_distobj: makes schemas, enum types and composite types exist on every
//! worker node before anything that depends on them is created there.
//!
//! The engine (`object`, `dependency`, `deparse`, `propagate`) is plain Rust
//! over the traits in `host`, `catalog` and `cluster`. Built with one of the
//! `pg1x` features it is loaded as an extension and `backend` supplies SPI and
//! dblink implementations of those traits.

#[cfg(feature = "pg")]
use pgrx::prelude::*;

pub mod catalog;
pub mod cluster;
pub mod config;
pub mod dependency;
pub mod deparse;
pub mod error;
pub mod host;
pub mod log;
pub mod metrics;
pub mod object;
pub mod propagate;

#[cfg(feature = "pg")]
pub mod backend;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{DistError, DistResult};

#[cfg(feature = "pg")]
pg_module_magic!();

/// Initialize the extension
/// Registers the `distobj.*` settings
#[cfg(feature = "pg")]
#[pg_guard]
extern "C" fn _PG_init() {
    backend::guc::register();
    pgrx::debug1!("pg_distobj: settings registered");
}
