mod builder;
mod context;
mod vars;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{Instrument as _, debug, info, warn};

use crate::block::{Block, BlockError, BlockOutput};
use crate::config::RuntimeConfig;
use crate::core::GraphDefinition;
use crate::observability::run_span;

pub use builder::{BlockBuilder, BuildError, ChildEngineFactory, default_child_factory};
pub use context::{LogEntry, LogLevel, RunContext, RunContextBuilder};
pub use vars::Vars;

/// Block id to block instance, one per graph scope.
pub type BlockMap = HashMap<String, Arc<dyn Block>>;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("block not found: {0}")]
    BlockNotFound(String),
    #[error("block {block_id} raised an error: {source}")]
    Block { block_id: String, source: BlockError },
    #[error("block {block_id} failed: {message}")]
    BlockFailed { block_id: String, message: String },
}

impl RuntimeError {
    /// Id of the block the failure is attributed to, innermost first.
    pub fn block_id(&self) -> &str {
        match self {
            RuntimeError::BlockNotFound(id) => id,
            RuntimeError::Block { source, block_id } => match source {
                BlockError::Run(inner) => inner.block_id(),
                _ => block_id,
            },
            RuntimeError::BlockFailed { block_id, .. } => block_id,
        }
    }
}

/// Sequential walker over one block map.
///
/// There is no cycle detection: a graph that keeps routing back to an earlier block runs
/// until something outside the engine stops it.
pub struct Engine {
    blocks: BlockMap,
}

impl Engine {
    pub fn new(blocks: BlockMap) -> Self {
        Self { blocks }
    }

    pub fn blocks(&self) -> &BlockMap {
        &self.blocks
    }

    pub fn contains(&self, block_id: &str) -> bool {
        self.blocks.contains_key(block_id)
    }

    fn block(&self, block_id: &str) -> Result<&Arc<dyn Block>, RuntimeError> {
        self.blocks
            .get(block_id)
            .ok_or_else(|| RuntimeError::BlockNotFound(block_id.to_string()))
    }

    /// Execute from `start_id`, threading each block's `output` into the next block, until a
    /// block names no successor. That block's output is returned.
    pub async fn start(
        &self,
        ctx: &RunContext,
        start_id: &str,
        params: Value,
    ) -> Result<BlockOutput, RuntimeError> {
        let mut current = self.block(start_id)?;
        let mut params = params;
        loop {
            let block_id = current.id();
            let result = current
                .execute(ctx, params)
                .await
                .map_err(|source| RuntimeError::Block {
                    block_id: block_id.to_string(),
                    source,
                })?;
            debug!(
                event = "engine.block_executed",
                domain = "engine",
                block_id = block_id,
                block_type = %current.kind(),
                successful = result.successful,
                next = result.next.as_deref().unwrap_or("")
            );
            if result.is_fatal() {
                let message = result.error.unwrap_or_else(|| "block failed".to_string());
                warn!(
                    event = "engine.block_failed",
                    domain = "engine",
                    block_id = block_id,
                    error = %message
                );
                return Err(RuntimeError::BlockFailed {
                    block_id: block_id.to_string(),
                    message,
                });
            }
            let Some(next) = result.next.as_deref() else {
                return Ok(result);
            };
            current = self.block(next)?;
            params = result.output.unwrap_or(Value::Null);
            // Block boundary is a suspension point even for blocks that never await.
            tokio::task::yield_now().await;
        }
    }
}

/// A compiled top-level graph together with the block it starts from.
pub struct Program {
    engine: Engine,
    entrypoint: String,
}

impl Program {
    /// Build from the graph's single `entrypoint` block.
    pub fn compile(graph: &GraphDefinition, config: &RuntimeConfig) -> Result<Self, BuildError> {
        let mut builder = BlockBuilder::from_graph(graph, config)?;
        let entrypoint = builder.entrypoint()?.to_string();
        Self::build(&mut builder, entrypoint)
    }

    /// Build from an explicit start block; no entrypoint block is required.
    pub fn compile_at(
        graph: &GraphDefinition,
        config: &RuntimeConfig,
        start: &str,
    ) -> Result<Self, BuildError> {
        let mut builder = BlockBuilder::from_graph(graph, config)?;
        Self::build(&mut builder, start.to_string())
    }

    fn build(builder: &mut BlockBuilder, entrypoint: String) -> Result<Self, BuildError> {
        let blocks = builder.build_graph(&entrypoint)?;
        let engine = Engine::new(blocks);
        if !engine.contains(&entrypoint) {
            return Err(BuildError::UnknownStart(entrypoint));
        }
        info!(
            event = "program.compiled",
            domain = "builder",
            entrypoint = %entrypoint,
            blocks = engine.blocks().len()
        );
        Ok(Self { engine, entrypoint })
    }

    pub fn entrypoint(&self) -> &str {
        &self.entrypoint
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub async fn run(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, RuntimeError> {
        let span = run_span(ctx.run_id(), ctx.route());
        async {
            info!(event = "run.started", domain = "engine", entrypoint = %self.entrypoint);
            let result = self.engine.start(ctx, &self.entrypoint, params).await;
            match &result {
                Ok(output) => info!(
                    event = "run.finished",
                    domain = "engine",
                    successful = output.successful
                ),
                Err(err) => warn!(event = "run.aborted", domain = "engine", error = %err),
            }
            result
        }
        .instrument(span)
        .await
    }
}
