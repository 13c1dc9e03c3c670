//! `transaction` block: runs its body with the database adapter in transaction mode.
//!
//! The body's result is committed when the body returns (successful or not) and rolled
//! back when it raises or fails fatally. Either way the adapter is put back into normal
//! mode before the block returns.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::{Block, BlockError, BlockKind, BlockOutput, Link, LoopBody};
use crate::capability::{DbAdapter, DbMode};
use crate::runtime::RunContext;

pub struct TransactionBlock {
    link: Link,
    body: Option<LoopBody>,
}

impl TransactionBlock {
    pub fn new(link: Link, body: Option<LoopBody>) -> Self {
        Self { link, body }
    }

    async fn rollback(&self, db: &dyn DbAdapter) {
        if let Err(err) = db.rollback_transaction().await {
            warn!(
                event = "transaction.rollback_failed",
                domain = "db",
                block_id = %self.link.id,
                error = %err
            );
        }
    }
}

#[async_trait]
impl Block for TransactionBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Transaction
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let Some(db) = ctx.db() else {
            return Ok(BlockOutput::failure(
                "transaction block requires a database adapter",
            ));
        };
        let Some(body) = &self.body else {
            return Ok(self.link.success(params));
        };

        db.set_mode(DbMode::Transaction).await?;
        let output = match body.run(ctx, params).await {
            Ok(result) => match db.commit_transaction().await {
                Ok(()) => {
                    debug!(event = "transaction.committed", domain = "db", block_id = %self.link.id);
                    self.link.success(result.output.unwrap_or(Value::Null))
                }
                Err(err) => {
                    self.rollback(db.as_ref()).await;
                    BlockOutput::failure(format!("transaction commit failed: {err}"))
                }
            },
            Err(err) => {
                self.rollback(db.as_ref()).await;
                debug!(
                    event = "transaction.rolled_back",
                    domain = "db",
                    block_id = %self.link.id,
                    error = %err
                );
                BlockOutput::failure(format!("transaction rolled back: {err}"))
            }
        };
        if let Err(err) = db.set_mode(DbMode::Normal).await {
            warn!(
                event = "transaction.reset_failed",
                domain = "db",
                block_id = %self.link.id,
                error = %err
            );
        }
        Ok(output)
    }
}
