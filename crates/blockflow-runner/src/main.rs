//! Command-line runner: build a graph file and execute it against local adapters.

use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use blockflow_adapters::{MemoryDb, ReqwestHttpClient};
use blockflow_core::capability::{RequestData, RouteMeta};
use blockflow_core::observability::init_observability;
use blockflow_core::script::RhaiScriptEngine;
use blockflow_core::{GraphDefinition, Program, RunContext, RuntimeConfig, Vars};
use clap::{Args, Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::info;

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Build and run block graphs from JSON definitions.
#[derive(Parser, Debug)]
#[command(name = "blockflow", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a graph and print its result, response and logs as JSON.
    Run(RunArgs),
    /// Build a graph without running it.
    Validate(ValidateArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Graph definition file.
    #[arg(long)]
    graph: PathBuf,

    /// JSON object file with the initial variables.
    #[arg(long)]
    vars: Option<PathBuf>,

    /// Inline JSON passed to the first block.
    #[arg(long)]
    params: Option<String>,

    /// JSON file with the inbound request (headers, cookies, params, query, body).
    #[arg(long)]
    request: Option<PathBuf>,

    /// JSON file with the in-memory database tables.
    #[arg(long)]
    db_seed: Option<PathBuf>,

    /// Start block id. Defaults to the graph's entrypoint.
    #[arg(long)]
    start: Option<String>,

    /// Skip block configuration validation.
    #[arg(long, default_value_t = false)]
    no_validate: bool,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    /// Graph definition file.
    #[arg(long)]
    graph: PathBuf,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&raw).map_err(|e| format!("invalid JSON in {}: {e}", path.display()).into())
}

fn load_graph(path: &Path) -> CliResult<GraphDefinition> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {e}", path.display()))?;
    Ok(GraphDefinition::from_json(&raw)?)
}

fn compile(
    graph: &GraphDefinition,
    config: &RuntimeConfig,
    start: Option<&str>,
) -> CliResult<Program> {
    let program = match start {
        Some(start) => Program::compile_at(graph, config, start)?,
        None => Program::compile(graph, config)?,
    };
    Ok(program)
}

fn route_for(path: &Path) -> RouteMeta {
    let id = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    RouteMeta {
        path: format!("/{id}"),
        method: "POST".into(),
        id,
    }
}

async fn run(args: RunArgs) -> CliResult<Value> {
    let graph = load_graph(&args.graph)?;
    let config = RuntimeConfig::from_env().with_validation(!args.no_validate);
    let program = compile(&graph, &config, args.start.as_deref())?;

    let vars: Map<String, Value> = match &args.vars {
        Some(path) => read_json(path)?,
        None => Map::new(),
    };
    let request: RequestData = match &args.request {
        Some(path) => read_json(path)?,
        None => RequestData::default(),
    };
    let db = match &args.db_seed {
        Some(path) => MemoryDb::from_seed(&read_json::<Value>(path)?)?,
        None => MemoryDb::new(),
    };
    let params = match &args.params {
        Some(raw) => serde_json::from_str(raw).map_err(|e| format!("invalid --params: {e}"))?,
        None => Value::Null,
    };

    let ctx = RunContext::builder()
        .vars(Vars::from(vars))
        .script_engine(Arc::new(RhaiScriptEngine::with_limits(&config.script)))
        .route(route_for(&args.graph))
        .request(request)
        .http_client(Arc::new(ReqwestHttpClient::new()?))
        .db(Arc::new(db))
        .build();

    let mut report = json!({ "runId": ctx.run_id() });
    match program.run(&ctx, params).await {
        Ok(output) => {
            report["successful"] = json!(output.successful);
            report["output"] = output.output.unwrap_or(Value::Null);
        }
        Err(err) => {
            report["successful"] = json!(false);
            report["error"] = json!({ "blockId": err.block_id(), "message": err.to_string() });
        }
    }
    report["response"] = serde_json::to_value(ctx.response())?;
    report["logs"] = serde_json::to_value(ctx.logs())?;
    report["vars"] = Value::Object(ctx.vars().snapshot());
    Ok(report)
}

fn validate(args: &ValidateArgs) -> CliResult<Value> {
    let graph = load_graph(&args.graph)?;
    let program = compile(&graph, &RuntimeConfig::from_env().with_validation(true), None)?;
    Ok(json!({
        "valid": true,
        "entrypoint": program.entrypoint(),
        "blocks": program.engine().blocks().len(),
    }))
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let _ = dotenvy::dotenv();
    init_observability();
    match Cli::parse().command {
        Command::Run(args) => {
            info!(event = "runner.run", graph = %args.graph.display());
            let report = run(args).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if report.get("error").is_some() {
                std::process::exit(1);
            }
        }
        Command::Validate(args) => {
            println!("{}", serde_json::to_string_pretty(&validate(&args)?)?);
        }
    }
    Ok(())
}
