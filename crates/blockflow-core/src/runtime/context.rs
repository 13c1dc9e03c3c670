use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::Vars;
use crate::capability::{DbAdapter, HttpClient, Interceptor, RequestData, ResponseState, RouteMeta};
use crate::script::{Evaluator, HostFn, RhaiScriptEngine, ScriptEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

/// Line written by a `consoleLogger` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub block_id: String,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Per-run state shared by the top-level engine and every nested engine.
pub struct RunContext {
    run_id: Uuid,
    vars: Vars,
    scripts: Arc<dyn ScriptEngine>,
    route: RouteMeta,
    request: RequestData,
    response: Mutex<ResponseState>,
    logs: Mutex<Vec<LogEntry>>,
    http: Option<Arc<dyn HttpClient>>,
    db: Option<Arc<dyn DbAdapter>>,
    interceptor: Option<Arc<dyn Interceptor>>,
}

impl RunContext {
    pub fn builder() -> RunContextBuilder {
        RunContextBuilder::default()
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    pub fn route(&self) -> &RouteMeta {
        &self.route
    }

    pub fn request(&self) -> &RequestData {
        &self.request
    }

    /// Evaluator over a frozen snapshot of the current scope.
    pub fn vm(&self) -> Box<dyn Evaluator> {
        self.scripts.bind(self.vars.snapshot())
    }

    /// Like [`vm`](Self::vm) with one extra binding (usually `params`) layered on top.
    pub fn vm_with(&self, name: &str, value: &Value) -> Box<dyn Evaluator> {
        self.vm_granting(name, value, &[])
    }

    /// Like [`vm_with`](Self::vm_with), with host functions callable only from this evaluator.
    pub fn vm_granting(
        &self,
        name: &str,
        value: &Value,
        grants: &[(&str, HostFn)],
    ) -> Box<dyn Evaluator> {
        let mut scope: Map<String, Value> = self.vars.snapshot();
        scope.insert(name.to_string(), value.clone());
        self.scripts.bind_granting(scope, grants)
    }

    pub fn http(&self) -> Option<&Arc<dyn HttpClient>> {
        self.http.as_ref()
    }

    pub fn db(&self) -> Option<&Arc<dyn DbAdapter>> {
        self.db.as_ref()
    }

    pub fn interceptor(&self) -> Option<&Arc<dyn Interceptor>> {
        self.interceptor.as_ref()
    }

    pub fn response(&self) -> ResponseState {
        lock(&self.response).clone()
    }

    pub fn update_response<R>(&self, f: impl FnOnce(&mut ResponseState) -> R) -> R {
        f(&mut lock(&self.response))
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>, block_id: &str) {
        lock(&self.logs).push(LogEntry {
            level,
            message: message.into(),
            block_id: block_id.to_string(),
        });
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        lock(&self.logs).clone()
    }
}

#[derive(Default)]
pub struct RunContextBuilder {
    run_id: Option<Uuid>,
    vars: Option<Vars>,
    scripts: Option<Arc<dyn ScriptEngine>>,
    route: RouteMeta,
    request: RequestData,
    http: Option<Arc<dyn HttpClient>>,
    db: Option<Arc<dyn DbAdapter>>,
    interceptor: Option<Arc<dyn Interceptor>>,
}

impl RunContextBuilder {
    pub fn run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }

    pub fn vars(mut self, vars: Vars) -> Self {
        self.vars = Some(vars);
        self
    }

    pub fn script_engine(mut self, engine: Arc<dyn ScriptEngine>) -> Self {
        self.scripts = Some(engine);
        self
    }

    pub fn route(mut self, route: RouteMeta) -> Self {
        self.route = route;
        self
    }

    pub fn request(mut self, request: RequestData) -> Self {
        self.request = request;
        self
    }

    pub fn http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn db(mut self, db: Arc<dyn DbAdapter>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn build(self) -> RunContext {
        RunContext {
            run_id: self.run_id.unwrap_or_else(Uuid::new_v4),
            vars: self.vars.unwrap_or_default(),
            scripts: self
                .scripts
                .unwrap_or_else(|| Arc::new(RhaiScriptEngine::new())),
            route: self.route,
            request: self.request,
            response: Mutex::new(ResponseState::default()),
            logs: Mutex::new(Vec::new()),
            http: self.http,
            db: self.db,
            interceptor: self.interceptor,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vm_reads_vars_but_cannot_write_them() {
        let vars = Vars::new();
        vars.set("x", json!(1));
        let ctx = RunContext::builder().vars(vars.clone()).build();
        let vm = ctx.vm();
        assert_eq!(vm.run("x + 1").unwrap(), json!(2));
        assert!(vm.run("x = 5").is_err());
        assert_eq!(vars.get("x"), Some(json!(1)));
    }

    #[test]
    fn vm_with_layers_params_over_scope() {
        let ctx = RunContext::builder().build();
        ctx.vars().set("base", json!(10));
        let vm = ctx.vm_with("params", &json!({"n": 5}));
        assert_eq!(vm.run("base + params.n").unwrap(), json!(15));
        assert!(!ctx.vars().contains("params"));
    }

    #[test]
    fn logs_and_response_accumulate() {
        let ctx = RunContext::builder().build();
        ctx.log(LogLevel::Warn, "careful", "log1");
        ctx.update_response(|r| r.status = Some(201));
        assert_eq!(ctx.logs()[0].message, "careful");
        assert_eq!(ctx.logs()[0].level, LogLevel::Warn);
        assert_eq!(ctx.response().status, Some(201));
    }
}
