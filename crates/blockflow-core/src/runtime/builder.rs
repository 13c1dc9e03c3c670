use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use super::{BlockMap, Engine};
use crate::block::{
    ArrayOpsBlock, Block, BlockConfig, BlockKind, CodeBlock, ConsoleLoggerBlock, DbBlock,
    DbOperation, EntrypointBlock, ForBlock, ForEachBlock, GetVarBlock, HttpRequestBlock, IfBlock,
    InterceptorBlock, Link, LoopBody, RequestRead, RequestReadBlock, ResponseBlock,
    SetCookieBlock, SetHeaderBlock, SetVarBlock, TransactionBlock, TransformerBlock, handles,
};
use crate::config::RuntimeConfig;
use crate::core::{BlockDef, EdgeDef, GraphDefinition};

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("graph parse error: {0}")]
    Parse(String),
    #[error("graph has no entrypoint block")]
    MissingEntrypoint,
    #[error("graph has more than one entrypoint block: {0:?}")]
    MultipleEntrypoints(Vec<String>),
    #[error("duplicate block id: {0}")]
    DuplicateBlock(String),
    #[error("invalid config for {kind} block {block_id}: {message}")]
    InvalidConfig {
        block_id: String,
        kind: BlockKind,
        message: String,
    },
    #[error("start block not found: {0}")]
    UnknownStart(String),
    #[error("sub-graph starting at {0} contains itself")]
    RecursiveSubgraph(String),
}

/// Builds the child engine for a loop or transaction body. Receives the builder so the
/// body is compiled from the same block and edge maps.
pub type ChildEngineFactory =
    Arc<dyn Fn(&mut BlockBuilder, &str) -> Result<Engine, BuildError> + Send + Sync>;

/// Factory used unless one is injected: compiles the body with [`BlockBuilder::build_child`].
pub fn default_child_factory() -> ChildEngineFactory {
    Arc::new(|builder: &mut BlockBuilder, entry: &str| builder.build_child(entry))
}

/// Compiles block and edge definitions into block maps.
pub struct BlockBuilder {
    definitions: HashMap<String, BlockDef>,
    /// from -> handle -> to
    edges: HashMap<String, BTreeMap<String, String>>,
    entrypoint: Option<String>,
    validate: bool,
    child_factory: ChildEngineFactory,
    /// Executor entries whose sub-graph is currently being compiled.
    building: Vec<String>,
}

impl BlockBuilder {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            definitions: HashMap::new(),
            edges: HashMap::new(),
            entrypoint: None,
            validate: config.validate_schemas,
            child_factory: default_child_factory(),
            building: Vec::new(),
        }
    }

    pub fn from_graph(graph: &GraphDefinition, config: &RuntimeConfig) -> Result<Self, BuildError> {
        let entrypoints = graph.entrypoints();
        if entrypoints.len() > 1 {
            return Err(BuildError::MultipleEntrypoints(
                entrypoints.into_iter().map(str::to_string).collect(),
            ));
        }
        let mut builder = Self::new(config);
        builder.load_blocks(graph.blocks())?;
        builder.load_edges(graph.edges());
        Ok(builder)
    }

    pub fn with_child_factory(mut self, factory: ChildEngineFactory) -> Self {
        self.child_factory = factory;
        self
    }

    /// Index definitions by id and record the entrypoint.
    pub fn load_blocks(&mut self, defs: &[BlockDef]) -> Result<(), BuildError> {
        for def in defs {
            if self.definitions.contains_key(&def.id) {
                return Err(BuildError::DuplicateBlock(def.id.clone()));
            }
            if def.kind == BlockKind::Entrypoint {
                if let Some(existing) = &self.entrypoint {
                    return Err(BuildError::MultipleEntrypoints(vec![
                        existing.clone(),
                        def.id.clone(),
                    ]));
                }
                self.entrypoint = Some(def.id.clone());
            }
            self.definitions.insert(def.id.clone(), def.clone());
        }
        Ok(())
    }

    /// Group edges by source block and handle. The first edge for a (block, handle) pair wins.
    pub fn load_edges(&mut self, defs: &[EdgeDef]) {
        for edge in defs {
            self.edges
                .entry(edge.from.clone())
                .or_default()
                .entry(edge.to_handle.clone())
                .or_insert_with(|| edge.to.clone());
        }
    }

    pub fn entrypoint(&self) -> Result<&str, BuildError> {
        self.entrypoint
            .as_deref()
            .ok_or(BuildError::MissingEntrypoint)
    }

    /// Target of `block_id`'s outgoing `handle`, if wired.
    pub fn successor(&self, block_id: &str, handle: &str) -> Option<String> {
        self.edges
            .get(block_id)
            .and_then(|out| out.get(handle))
            .cloned()
    }

    /// Construct every block reachable from `start`. Each id is built once; ids without a
    /// definition are skipped.
    pub fn build_graph(&mut self, start: &str) -> Result<BlockMap, BuildError> {
        let mut blocks = BlockMap::new();
        let mut pending = vec![start.to_string()];
        while let Some(id) = pending.pop() {
            if blocks.contains_key(&id) {
                continue;
            }
            let Some(def) = self.definitions.get(&id).cloned() else {
                debug!(event = "builder.block_undefined", domain = "builder", block_id = %id);
                continue;
            };
            let block = self.build_block(&def)?;
            debug!(
                event = "builder.block_built",
                domain = "builder",
                block_id = %id,
                block_type = %def.kind
            );
            blocks.insert(id.clone(), block);
            if let Some(out) = self.edges.get(&id) {
                pending.extend(out.values().filter(|to| !blocks.contains_key(*to)).cloned());
            }
        }
        Ok(blocks)
    }

    /// Compile the sub-graph starting at `entry` into its own engine.
    pub fn build_child(&mut self, entry: &str) -> Result<Engine, BuildError> {
        if self.building.iter().any(|id| id == entry) {
            return Err(BuildError::RecursiveSubgraph(entry.to_string()));
        }
        self.building.push(entry.to_string());
        let blocks = self.build_graph(entry);
        self.building.pop();
        Ok(Engine::new(blocks?))
    }

    fn invalid(def: &BlockDef, message: impl Into<String>) -> BuildError {
        BuildError::InvalidConfig {
            block_id: def.id.clone(),
            kind: def.kind,
            message: message.into(),
        }
    }

    fn config_for<C: BlockConfig>(&self, def: &BlockDef) -> Result<C, BuildError> {
        let data = match &def.data {
            Value::Null => Value::Object(Map::new()),
            data => data.clone(),
        };
        let config: C =
            serde_json::from_value(data).map_err(|e| Self::invalid(def, e.to_string()))?;
        if self.validate {
            config.validate().map_err(|m| Self::invalid(def, m))?;
        }
        Ok(config)
    }

    /// Kind-specific checks that depend on more than the config alone.
    fn check(&self, def: &BlockDef, outcome: Result<(), String>) -> Result<(), BuildError> {
        match outcome {
            Err(message) if self.validate => Err(Self::invalid(def, message)),
            _ => Ok(()),
        }
    }

    fn link(&self, def: &BlockDef) -> Link {
        Link::new(def.id.clone(), self.successor(&def.id, handles::SOURCE))
    }

    fn loop_body(&mut self, def: &BlockDef) -> Result<Option<LoopBody>, BuildError> {
        let Some(entry) = self.successor(&def.id, handles::EXECUTOR) else {
            return Ok(None);
        };
        let factory = Arc::clone(&self.child_factory);
        let engine = factory(self, &entry)?;
        Ok(Some(LoopBody::new(Arc::new(engine), entry)))
    }

    fn db_block(&self, def: &BlockDef, operation: DbOperation) -> Result<Arc<dyn Block>, BuildError> {
        let config = self.config_for(def)?;
        self.check(def, operation.check(&config))?;
        Ok(Arc::new(DbBlock::new(self.link(def), operation, config)))
    }

    fn request_read(&self, def: &BlockDef, read: RequestRead) -> Result<Arc<dyn Block>, BuildError> {
        let config = self.config_for(def)?;
        self.check(def, read.check(&config))?;
        Ok(Arc::new(RequestReadBlock::new(self.link(def), read, config)))
    }

    fn build_block(&mut self, def: &BlockDef) -> Result<Arc<dyn Block>, BuildError> {
        let body = if def.kind.has_executor() { self.loop_body(def)? } else { None };
        let block: Arc<dyn Block> = match def.kind {
            BlockKind::Entrypoint => Arc::new(EntrypointBlock::new(self.link(def))),
            BlockKind::Code => Arc::new(CodeBlock::new(self.link(def), self.config_for(def)?)),
            BlockKind::If => Arc::new(IfBlock::new(
                def.id.clone(),
                self.config_for(def)?,
                self.successor(&def.id, handles::SUCCESS),
                self.successor(&def.id, handles::FAILURE),
            )),
            BlockKind::For => {
                let config = self.config_for(def)?;
                Arc::new(ForBlock::new(self.link(def), config, body))
            }
            BlockKind::ForEach => {
                let config = self.config_for(def)?;
                Arc::new(ForEachBlock::new(self.link(def), config, body))
            }
            BlockKind::Transaction => Arc::new(TransactionBlock::new(self.link(def), body)),
            BlockKind::SetVar => Arc::new(SetVarBlock::new(self.link(def), self.config_for(def)?)),
            BlockKind::GetVar => Arc::new(GetVarBlock::new(self.link(def), self.config_for(def)?)),
            BlockKind::Transformer => {
                Arc::new(TransformerBlock::new(self.link(def), self.config_for(def)?))
            }
            BlockKind::ArrayOps => {
                Arc::new(ArrayOpsBlock::new(self.link(def), self.config_for(def)?))
            }
            BlockKind::DbGetAll => self.db_block(def, DbOperation::GetAll)?,
            BlockKind::DbGetSingle => self.db_block(def, DbOperation::GetSingle)?,
            BlockKind::DbInsert => self.db_block(def, DbOperation::Insert)?,
            BlockKind::DbInsertBulk => self.db_block(def, DbOperation::InsertBulk)?,
            BlockKind::DbUpdate => self.db_block(def, DbOperation::Update)?,
            BlockKind::DbDelete => self.db_block(def, DbOperation::Delete)?,
            BlockKind::DbRaw => self.db_block(def, DbOperation::Raw)?,
            BlockKind::HttpRequest => {
                Arc::new(HttpRequestBlock::new(self.link(def), self.config_for(def)?))
            }
            BlockKind::HttpGetHeader => self.request_read(def, RequestRead::Header)?,
            BlockKind::HttpGetCookie => self.request_read(def, RequestRead::Cookie)?,
            BlockKind::HttpGetParam => self.request_read(def, RequestRead::Param)?,
            BlockKind::HttpGetBody => self.request_read(def, RequestRead::Body)?,
            BlockKind::HttpSetHeader => {
                Arc::new(SetHeaderBlock::new(self.link(def), self.config_for(def)?))
            }
            BlockKind::HttpSetCookie => {
                Arc::new(SetCookieBlock::new(self.link(def), self.config_for(def)?))
            }
            BlockKind::Response => Arc::new(ResponseBlock::new(self.link(def), self.config_for(def)?)),
            BlockKind::ConsoleLogger => {
                Arc::new(ConsoleLoggerBlock::new(self.link(def), self.config_for(def)?))
            }
            BlockKind::Interceptor => {
                Arc::new(InterceptorBlock::new(self.link(def), self.config_for(def)?))
            }
        };
        Ok(block)
    }
}
