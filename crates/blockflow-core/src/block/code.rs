//! `code` block: runs a user script with the block input bound as `params`.
//!
//! When the run has a database, the script may also call `dbQuery(query)`, which runs a
//! raw query and returns its rows. The function exists only inside this block's script.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::runtime::Handle;
use tracing::debug;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link};
use crate::capability::DbAdapter;
use crate::runtime::RunContext;
use crate::script::{HostFn, strip_prefix};

/// Script-visible name of the raw query grant.
const DB_QUERY: &str = "dbQuery";

/// Scripts run on a blocking thread, so the query future is driven from there.
fn db_query(db: Arc<dyn DbAdapter>) -> HostFn {
    Arc::new(move |query: Value| {
        let Value::String(query) = query else {
            return Err(format!("{DB_QUERY} expects a query string"));
        };
        let handle = Handle::try_current().map_err(|e| e.to_string())?;
        debug!(event = "code.db_query", domain = "script", query = %query);
        handle.block_on(db.raw(&query)).map_err(|e| e.to_string())
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeConfig {
    pub code: String,
}

impl BlockConfig for CodeConfig {
    fn validate(&self) -> Result<(), String> {
        if strip_prefix(&self.code).trim().is_empty() {
            return Err("code must not be empty".into());
        }
        Ok(())
    }
}

pub struct CodeBlock {
    link: Link,
    config: CodeConfig,
}

impl CodeBlock {
    pub fn new(link: Link, config: CodeConfig) -> Self {
        Self { link, config }
    }
}

#[async_trait]
impl Block for CodeBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Code
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let grants: Vec<(&str, HostFn)> = ctx
            .db()
            .map(|db| vec![(DB_QUERY, db_query(Arc::clone(db)))])
            .unwrap_or_default();
        let vm = ctx.vm_granting("params", &params, &grants);
        match vm.run_async(strip_prefix(&self.config.code)).await {
            Ok(output) => Ok(self.link.success(output)),
            Err(err) => {
                debug!(event = "code.failed", domain = "script", block_id = %self.link.id, error = %err);
                Ok(BlockOutput::failure(err.to_string()))
            }
        }
    }
}
