//! Process-wide tracing setup plus the span every graph run executes in.
//!
//! Console output goes to stderr so that a runner printing run results on stdout keeps
//! its stdout machine-readable.

use once_cell::sync::OnceCell;
use tracing::Span;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use uuid::Uuid;

use crate::capability::RouteMeta;
use crate::config::parse_bool_env;

static INIT: OnceCell<()> = OnceCell::new();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConsoleFormat {
    Compact,
    Pretty,
    Json,
}

impl ConsoleFormat {
    fn from_env() -> Self {
        match std::env::var("BLOCKFLOW_LOG_FORMAT")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            Ok("pretty") => ConsoleFormat::Pretty,
            Ok("json") => ConsoleFormat::Json,
            _ => ConsoleFormat::Compact,
        }
    }
}

fn observability_enabled() -> bool {
    for key in ["BLOCKFLOW_OBSERVABILITY_ENABLED", "BLOCKFLOW_OBSERVABILITY"] {
        if let Ok(value) = std::env::var(key) {
            return parse_bool_env(&value).unwrap_or(true);
        }
    }
    true
}

fn resolve_env_filter() -> tracing_subscriber::EnvFilter {
    if let Ok(level) = std::env::var("BLOCKFLOW_LOG_LEVEL")
        && let Ok(filter) = tracing_subscriber::EnvFilter::try_new(level)
    {
        return filter;
    }
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
}

fn init_json_file(env_filter: tracing_subscriber::EnvFilter, path_raw: String) {
    let path = std::path::PathBuf::from(path_raw);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        let _ = std::fs::create_dir_all(parent);
    }
    let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("blockflow.logs.jsonl");
    let writer = tracing_appender::rolling::never(dir, file_name);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_target(false)
        .with_writer(writer);
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .try_init();
}

fn init_console(env_filter: tracing_subscriber::EnvFilter, format: ConsoleFormat) {
    let registry = tracing_subscriber::registry().with(env_filter);
    let base = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = match format {
        ConsoleFormat::Compact => registry.with(base.compact()).try_init(),
        ConsoleFormat::Pretty => registry.with(base.pretty()).try_init(),
        ConsoleFormat::Json => registry.with(base.json().with_current_span(true)).try_init(),
    };
}

/// Initialize logging once per process.
///
/// Environment variables:
/// - `BLOCKFLOW_OBSERVABILITY_ENABLED` / `BLOCKFLOW_OBSERVABILITY`: optional enable/disable flag (default enabled).
/// - `BLOCKFLOW_LOG_LEVEL`: optional level/filter override (`info`, `debug`, etc.).
/// - `BLOCKFLOW_LOG_FORMAT`: `compact` (default), `pretty` or `json` for console output.
/// - `BLOCKFLOW_JSON_LOG_PATH`: optional log file path. If set, logs are JSONL in that file
///   instead of the console.
/// - `RUST_LOG`: optional filter override.
pub fn init_observability() {
    INIT.get_or_init(|| {
        if !observability_enabled() {
            return;
        }
        let env_filter = resolve_env_filter();
        match std::env::var("BLOCKFLOW_JSON_LOG_PATH") {
            Ok(path_raw) => init_json_file(env_filter, path_raw),
            Err(_) => init_console(env_filter, ConsoleFormat::from_env()),
        }
    });
}

/// Span a whole graph run executes in; nested engines inherit it.
pub fn run_span(run_id: Uuid, route: &RouteMeta) -> Span {
    tracing::info_span!(
        "graph_run",
        run_id = %run_id,
        route_id = %route.id,
        method = %route.method,
        path = %route.path
    )
}
