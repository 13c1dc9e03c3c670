//! Rhai-backed evaluator. The scope snapshot is converted once per VM and every
//! variable is pushed as a constant, so assignments inside a script fail instead of
//! leaking into later evaluations.

use std::sync::Arc;

use async_trait::async_trait;
use rhai::packages::{Package, StandardPackage};
use rhai::{Dynamic, Engine, EvalAltResult, Module, OptimizationLevel, Scope, Shared};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::{Evaluator, HostFn, ScriptEngine, ScriptError};
use crate::config::ScriptLimits;

/// Name under which the whole scope is bound, for keys that are not valid identifiers.
const SCOPE_BINDING: &str = "vars";

/// Shared rhai engine; cheap to clone into many [`RhaiVm`]s.
#[derive(Clone)]
pub struct RhaiScriptEngine {
    engine: Arc<Engine>,
    limits: ScriptLimits,
    packages: Shared<Module>,
}

impl RhaiScriptEngine {
    pub fn new() -> Self {
        Self::with_limits(&ScriptLimits::default())
    }

    pub fn with_limits(limits: &ScriptLimits) -> Self {
        let packages = StandardPackage::new().as_shared_module();
        Self {
            engine: Arc::new(configured(limits, &packages)),
            limits: limits.clone(),
            packages,
        }
    }
}

/// Fresh engine with the standard library, the limits and the log hooks installed.
fn configured(limits: &ScriptLimits, packages: &Shared<Module>) -> Engine {
    let mut engine = Engine::new_raw();
    engine.register_global_module(packages.clone());
    // Constant propagation would fold a bound variable into `user.name = ..` and turn
    // the assignment target into a literal, which rhai does not report as an error.
    engine.set_optimization_level(OptimizationLevel::None);
    if let Some(max) = limits.max_operations {
        engine.set_max_operations(max);
    }
    if let Some(max) = limits.max_call_levels {
        engine.set_max_call_levels(max);
    }
    if let Some(max) = limits.max_expr_depth {
        engine.set_max_expr_depths(max, max);
    }
    engine.on_print(|text| {
        info!(event = "script.print", domain = "script", text = text);
    });
    engine.on_debug(|text, source, pos| {
        debug!(
            event = "script.debug",
            domain = "script",
            text = text,
            source = source.unwrap_or("inline"),
            position = %pos
        );
    });
    engine
}

/// Register `host` under `name`; its error string surfaces as a script runtime error.
fn register_grant(engine: &mut Engine, name: &str, host: &HostFn) {
    let host = Arc::clone(host);
    engine.register_fn(name, move |arg: Dynamic| -> Result<Dynamic, Box<EvalAltResult>> {
        let arg = to_value(&arg).map_err(|e| e.to_string())?;
        let out = host(arg)?;
        Ok(to_dynamic(&out))
    });
}

impl Default for RhaiScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine for RhaiScriptEngine {
    fn bind(&self, scope: Map<String, Value>) -> Box<dyn Evaluator> {
        Box::new(RhaiVm::new(Arc::clone(&self.engine), scope))
    }

    fn bind_granting(
        &self,
        scope: Map<String, Value>,
        grants: &[(&str, HostFn)],
    ) -> Box<dyn Evaluator> {
        if grants.is_empty() {
            return self.bind(scope);
        }
        // Functions live on the engine, so a grant gets its own engine over the shared
        // standard library.
        let mut engine = configured(&self.limits, &self.packages);
        for (name, host) in grants {
            register_grant(&mut engine, name, host);
        }
        Box::new(RhaiVm::new(Arc::new(engine), scope))
    }
}

/// Evaluator over one frozen scope snapshot.
pub struct RhaiVm {
    engine: Arc<Engine>,
    scope: Scope<'static>,
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn to_dynamic(value: &Value) -> Dynamic {
    rhai::serde::to_dynamic(value).unwrap_or(Dynamic::UNIT)
}

fn to_value(value: &Dynamic) -> Result<Value, ScriptError> {
    rhai::serde::from_dynamic::<Value>(value).map_err(|e| ScriptError::Conversion(e.to_string()))
}

fn eval(engine: &Engine, scope: &Scope<'static>, code: &str) -> Result<Value, ScriptError> {
    let mut scope = scope.clone();
    let result = engine
        .eval_with_scope::<Dynamic>(&mut scope, code)
        .map_err(|e| ScriptError::Eval(e.to_string()))?;
    to_value(&result)
}

impl RhaiVm {
    pub fn new(engine: Arc<Engine>, vars: Map<String, Value>) -> Self {
        let mut scope = Scope::new();
        for (name, value) in &vars {
            if name != SCOPE_BINDING && is_identifier(name) {
                scope.push_constant_dynamic(name.clone(), to_dynamic(value));
            }
        }
        scope.push_constant_dynamic(SCOPE_BINDING, to_dynamic(&Value::Object(vars)));
        Self { engine, scope }
    }
}

#[async_trait]
impl Evaluator for RhaiVm {
    fn run(&self, code: &str) -> Result<Value, ScriptError> {
        eval(&self.engine, &self.scope, code)
    }

    async fn run_async(&self, code: &str) -> Result<Value, ScriptError> {
        let engine = Arc::clone(&self.engine);
        let scope = self.scope.clone();
        let code = code.to_string();
        tokio::task::spawn_blocking(move || eval(&engine, &scope, &code))
            .await
            .map_err(|e| ScriptError::Join(e.to_string()))?
    }
}
