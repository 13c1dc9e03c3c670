//! # Script evaluation
//!
//! Any string-typed configuration field may start with [`SCRIPT_PREFIX`] (`js:`), meaning
//! "evaluate the remainder against the current variable scope". Blocks obtain an
//! [`Evaluator`] from the run context; the evaluator only ever sees a frozen snapshot of
//! the scope, so scripts can read variables but never write them back.
//!
//! The scripting engine is pluggable through [`ScriptEngine`]; the default is
//! [`RhaiScriptEngine`].

mod condition;
mod rhai_vm;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

pub use condition::{
    Chain, ComparisonOperator, Condition, compare, evaluate, evaluate_conditions, loose_cmp,
    loose_eq, resolve_chain,
};
pub use rhai_vm::{RhaiScriptEngine, RhaiVm};

/// Sentinel marking a string value as a script. Case-sensitive, exactly three characters.
pub const SCRIPT_PREFIX: &str = "js:";

/// Script failure raised by an [`Evaluator`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScriptError {
    #[error("script evaluation failed: {0}")]
    Eval(String),
    #[error("script value conversion failed: {0}")]
    Conversion(String),
    #[error("script task failed: {0}")]
    Join(String),
}

/// Evaluator bound to one frozen variable scope.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluate `code` and return the value of its last expression.
    fn run(&self, code: &str) -> Result<Value, ScriptError>;

    /// Same as [`run`](Evaluator::run), off the async executor thread.
    async fn run_async(&self, code: &str) -> Result<Value, ScriptError>;

    fn truthy(&self, value: &Value) -> bool {
        truthy(value)
    }

    fn falsy(&self, value: &Value) -> bool {
        !self.truthy(value)
    }
}

/// Host function callable from a script by name: one JSON argument in, JSON out.
pub type HostFn = Arc<dyn Fn(Value) -> Result<Value, String> + Send + Sync>;

/// Factory for evaluators: binds a scope snapshot into a ready-to-run [`Evaluator`].
pub trait ScriptEngine: Send + Sync {
    fn bind(&self, scope: Map<String, Value>) -> Box<dyn Evaluator>;

    /// Like [`bind`](ScriptEngine::bind), with `grants` callable only from the returned
    /// evaluator. Engines without host functions ignore the grants.
    fn bind_granting(
        &self,
        scope: Map<String, Value>,
        grants: &[(&str, HostFn)],
    ) -> Box<dyn Evaluator> {
        let _ = grants;
        self.bind(scope)
    }
}

/// Value to boolean coercion: `null` is false, objects and arrays (even empty) are true,
/// numbers are true unless zero, strings are true unless empty.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Script body of a `js:`-prefixed string value, if it is one.
pub fn script_body(value: &Value) -> Option<&str> {
    value.as_str().and_then(|s| s.strip_prefix(SCRIPT_PREFIX))
}

/// Strip the sentinel from raw script text if present; plain text is returned as-is.
pub fn strip_prefix(code: &str) -> &str {
    code.strip_prefix(SCRIPT_PREFIX).unwrap_or(code)
}

/// Resolve one value: `js:` strings are evaluated, everything else is returned unchanged.
pub fn resolve(vm: &dyn Evaluator, value: &Value) -> Result<Value, ScriptError> {
    match script_body(value) {
        Some(code) => vm.run(code),
        None => Ok(value.clone()),
    }
}

/// Resolve `js:` strings at any depth inside arrays and objects.
pub fn resolve_deep(vm: &dyn Evaluator, value: &Value) -> Result<Value, ScriptError> {
    match value {
        Value::String(_) => resolve(vm, value),
        Value::Array(items) => items
            .iter()
            .map(|item| resolve_deep(vm, item))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(fields) => {
            let mut out = Map::with_capacity(fields.len());
            for (key, field) in fields {
                out.insert(key.clone(), resolve_deep(vm, field)?);
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vm(scope: Value) -> Box<dyn Evaluator> {
        let Value::Object(map) = scope else {
            panic!("scope must be an object")
        };
        RhaiScriptEngine::new().bind(map)
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&json!(0)));
        assert!(!truthy(&json!("")));
        assert!(!truthy(&json!(false)));
        assert!(truthy(&json!(0.5)));
        assert!(truthy(&json!("0")));
        assert!(truthy(&json!({})));
        assert!(truthy(&json!([])));
    }

    #[test]
    fn prefix_is_case_sensitive() {
        assert_eq!(script_body(&json!("js:x + 1")), Some("x + 1"));
        assert_eq!(script_body(&json!("JS:x + 1")), None);
        assert_eq!(script_body(&json!("js :x")), None);
        assert_eq!(script_body(&json!(3)), None);
    }

    #[test]
    fn resolve_only_touches_prefixed_strings() {
        let vm = vm(json!({"x": 2}));
        assert_eq!(resolve(vm.as_ref(), &json!("js:x * 3")).unwrap(), json!(6));
        assert_eq!(resolve(vm.as_ref(), &json!("x * 3")).unwrap(), json!("x * 3"));
        assert_eq!(resolve(vm.as_ref(), &json!(7)).unwrap(), json!(7));
    }

    #[test]
    fn resolve_deep_walks_nested_values() {
        let vm = vm(json!({"name": "ada"}));
        let out = resolve_deep(
            vm.as_ref(),
            &json!({"user": {"name": "js:name", "tags": ["js:name + \"!\"", 1]}}),
        )
        .unwrap();
        assert_eq!(out, json!({"user": {"name": "ada", "tags": ["ada!", 1]}}));
    }
}
