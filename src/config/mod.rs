use serde::{Deserialize, Serialize};

use crate::error::{DistError, DistResult};

/// Maximum depth of the explicit dependency stack
/// Guards against pathological catalogs, not against cycles (those are tracked)
pub const MAX_DEPENDENCY_DEPTH: usize = 1000;

/// Enable verbose dependency logging (for debugging)
pub const DEBUG_DEPENDENCIES: bool = false;

/// Setting switched off on workers before replaying DDL so they do not re-propagate
pub const DDL_PROPAGATION_SETTING: &str = "distobj.enable_ddl_propagation";

/// Worker function that creates a type only when it is missing
pub const CREATE_IF_NOT_EXISTS_FUNCTION: &str = "worker_create_if_not_exists";

/// Role used for dedicated worker connections
pub const DEFAULT_CONNECTION_ROLE: &str = "postgres";

pub const DEFAULT_CONNECT_TIMEOUT_SECS: u32 = 10;

/// Runtime knobs for one propagation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropagationConfig {
    pub connection_role: String,
    pub ddl_propagation_setting: String,
    pub max_dependency_depth: usize,
    pub connect_timeout_secs: u32,
    pub create_if_not_exists_function: String,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            connection_role: DEFAULT_CONNECTION_ROLE.to_string(),
            ddl_propagation_setting: DDL_PROPAGATION_SETTING.to_string(),
            max_dependency_depth: MAX_DEPENDENCY_DEPTH,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            create_if_not_exists_function: CREATE_IF_NOT_EXISTS_FUNCTION.to_string(),
        }
    }
}

impl PropagationConfig {
    pub fn validate(&self) -> DistResult<()> {
        if self.connection_role.trim().is_empty() {
            return Err(DistError::ConfigError {
                setting: "connection_role".to_string(),
                value: self.connection_role.clone(),
                reason: "role name cannot be empty".to_string(),
            });
        }

        if !is_setting_name(&self.ddl_propagation_setting) {
            return Err(DistError::ConfigError {
                setting: "ddl_propagation_setting".to_string(),
                value: self.ddl_propagation_setting.clone(),
                reason: "expected a dotted custom setting name such as ext.name".to_string(),
            });
        }

        if self.max_dependency_depth == 0 {
            return Err(DistError::ConfigError {
                setting: "max_dependency_depth".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        if !is_setting_name(&format!("fn.{}", self.create_if_not_exists_function)) {
            return Err(DistError::ConfigError {
                setting: "create_if_not_exists_function".to_string(),
                value: self.create_if_not_exists_function.clone(),
                reason: "must be a plain function name".to_string(),
            });
        }

        Ok(())
    }

    /// Statement sent ahead of every replayed batch
    pub fn disable_propagation_command(&self) -> String {
        format!("SET {} TO 'off'", self.ddl_propagation_setting)
    }
}

fn is_setting_name(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 2
        && parts.iter().all(|p| {
            !p.is_empty()
                && p.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
                && !p.starts_with(|c: char| c.is_ascii_digit())
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::testing::assert_error_sqlstate;

    #[test]
    fn test_defaults_are_valid() {
        let config = PropagationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.disable_propagation_command(),
            "SET distobj.enable_ddl_propagation TO 'off'"
        );
    }

    #[test]
    fn test_json_settings_keep_defaults_for_missing_keys() {
        let config: PropagationConfig =
            serde_json::from_str(r#"{"connection_role": "citus"}"#).unwrap();
        assert_eq!(config.connection_role, "citus");
        assert_eq!(config.max_dependency_depth, MAX_DEPENDENCY_DEPTH);
    }

    #[test]
    fn test_invalid_setting_rejected() {
        let config = PropagationConfig {
            ddl_propagation_setting: "enable_ddl_propagation; DROP".to_string(),
            ..PropagationConfig::default()
        };
        assert_error_sqlstate(config.validate(), "22023");
    }

    #[test]
    fn test_zero_depth_rejected() {
        let config = PropagationConfig {
            max_dependency_depth: 0,
            ..PropagationConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
