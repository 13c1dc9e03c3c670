use async_trait::async_trait;
use serde_json::Value;

use super::{Block, BlockError, BlockKind, BlockOutput, Link};
use crate::runtime::RunContext;

/// Start of a graph; hands its input to the first real block.
pub struct EntrypointBlock {
    link: Link,
}

impl EntrypointBlock {
    pub fn new(link: Link) -> Self {
        Self { link }
    }
}

#[async_trait]
impl Block for EntrypointBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Entrypoint
    }

    async fn execute(&self, _ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        Ok(self.link.success(params))
    }
}
