//! Server settings under the `distobj.` prefix

use std::ffi::CStr;

use pgrx::{GucContext, GucFlags, GucRegistry, GucSetting};

use crate::config::{PropagationConfig, DEFAULT_CONNECT_TIMEOUT_SECS};
use crate::error::DistResult;

use super::spi::{query_one, text_arg};

pub static CONNECTION_ROLE: GucSetting<Option<&'static CStr>> =
    GucSetting::<Option<&'static CStr>>::new(None);

pub static ENABLE_DDL_PROPAGATION: GucSetting<bool> = GucSetting::<bool>::new(true);

pub static CONNECT_TIMEOUT: GucSetting<i32> =
    GucSetting::<i32>::new(DEFAULT_CONNECT_TIMEOUT_SECS as i32);

/// Called once from `_PG_init`
pub fn register() {
    GucRegistry::define_string_guc(
        "distobj.connection_role",
        "Role used for connections to worker nodes",
        "Defaults to the owner of the pg_distobj extension.",
        &CONNECTION_ROLE,
        GucContext::Suset,
        GucFlags::default(),
    );

    GucRegistry::define_bool_guc(
        "distobj.enable_ddl_propagation",
        "Propagate distributed objects to worker nodes",
        "Switched off on workers while they replay statements from the coordinator.",
        &ENABLE_DDL_PROPAGATION,
        GucContext::Userset,
        GucFlags::default(),
    );

    GucRegistry::define_int_guc(
        "distobj.connect_timeout",
        "Seconds to wait when connecting to a worker node",
        "",
        &CONNECT_TIMEOUT,
        1,
        3600,
        GucContext::Userset,
        GucFlags::UNIT_S,
    );
}

pub fn propagation_enabled() -> bool {
    ENABLE_DDL_PROPAGATION.get()
}

/// Settings for one propagation, read from the GUCs
pub fn session_config() -> DistResult<PropagationConfig> {
    let mut config = PropagationConfig::default();

    let role = match CONNECTION_ROLE.get() {
        Some(role) => Some(role.to_string_lossy().into_owned()),
        None => query_one::<String>(
            "SELECT pg_catalog.pg_get_userbyid(extowner)::text \
             FROM pg_catalog.pg_extension WHERE extname = $1",
            vec![text_arg("pg_distobj")],
        )?,
    };
    if let Some(role) = role.filter(|r| !r.is_empty()) {
        config.connection_role = role;
    }

    config.connect_timeout_secs = u32::try_from(CONNECT_TIMEOUT.get()).unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
    config.validate()?;
    Ok(config)
}
