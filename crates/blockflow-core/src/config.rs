//! Runtime configuration. Defaults are usable as-is; [`RuntimeConfig::from_env`] reads
//! `BLOCKFLOW_*` overrides (binaries load `.env` first).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Operations one script evaluation may perform before it is aborted.
pub const DEFAULT_MAX_OPERATIONS: u64 = 1_000_000;

/// Limits applied to the embedded script engine. `None` keeps the engine default; a
/// `max_operations` of `0` lifts the operation limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScriptLimits {
    pub max_operations: Option<u64>,
    pub max_call_levels: Option<usize>,
    pub max_expr_depth: Option<usize>,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            max_operations: Some(DEFAULT_MAX_OPERATIONS),
            max_call_levels: None,
            max_expr_depth: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    /// Run each block configuration's semantic checks while building the graph.
    pub validate_schemas: bool,
    pub script: ScriptLimits,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            validate_schemas: true,
            script: ScriptLimits::default(),
        }
    }
}

pub(crate) fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(event = "config.invalid_env", key = key, value = %raw);
            None
        }
    }
}

impl RuntimeConfig {
    /// Defaults overridden by:
    /// - `BLOCKFLOW_VALIDATE_SCHEMAS`: bool flag.
    /// - `BLOCKFLOW_SCRIPT_MAX_OPERATIONS`, `BLOCKFLOW_SCRIPT_MAX_CALL_LEVELS`,
    ///   `BLOCKFLOW_SCRIPT_MAX_EXPR_DEPTH`: script engine limits.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("BLOCKFLOW_VALIDATE_SCHEMAS") {
            match parse_bool_env(&raw) {
                Some(flag) => config.validate_schemas = flag,
                None => warn!(
                    event = "config.invalid_env",
                    key = "BLOCKFLOW_VALIDATE_SCHEMAS",
                    value = %raw
                ),
            }
        }
        if let Some(max) = env_parse("BLOCKFLOW_SCRIPT_MAX_OPERATIONS") {
            config.script.max_operations = Some(max);
        }
        if let Some(max) = env_parse("BLOCKFLOW_SCRIPT_MAX_CALL_LEVELS") {
            config.script.max_call_levels = Some(max);
        }
        if let Some(max) = env_parse("BLOCKFLOW_SCRIPT_MAX_EXPR_DEPTH") {
            config.script.max_expr_depth = Some(max);
        }
        config
    }

    pub fn with_validation(mut self, validate: bool) -> Self {
        self.validate_schemas = validate;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_flags_accept_common_spellings() {
        assert_eq!(parse_bool_env(" Yes "), Some(true));
        assert_eq!(parse_bool_env("off"), Some(false));
        assert_eq!(parse_bool_env("maybe"), None);
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"script": {"maxOperations": 5000}}"#).unwrap();
        assert!(config.validate_schemas);
        assert_eq!(config.script.max_operations, Some(5000));
        assert_eq!(config.script.max_call_levels, None);
    }

    #[test]
    fn operations_are_bounded_by_default() {
        assert_eq!(
            RuntimeConfig::default().script.max_operations,
            Some(DEFAULT_MAX_OPERATIONS)
        );
        let config: RuntimeConfig = serde_json::from_str(r#"{"script": {}}"#).unwrap();
        assert_eq!(config.script.max_operations, Some(DEFAULT_MAX_OPERATIONS));
    }
}
