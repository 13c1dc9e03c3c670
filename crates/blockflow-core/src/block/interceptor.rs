use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link};
use crate::capability::InterceptEvent;
use crate::runtime::RunContext;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptorConfig {
    pub label: Option<String>,
}

impl BlockConfig for InterceptorConfig {}

/// `interceptor`: hands its input to the context's hook, if one is installed, and passes
/// it on unchanged.
pub struct InterceptorBlock {
    link: Link,
    config: InterceptorConfig,
}

impl InterceptorBlock {
    pub fn new(link: Link, config: InterceptorConfig) -> Self {
        Self { link, config }
    }
}

#[async_trait]
impl Block for InterceptorBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Interceptor
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        debug!(
            event = "block.intercepted",
            domain = "interceptor",
            block_id = %self.link.id,
            label = self.config.label.as_deref().unwrap_or("")
        );
        if let Some(hook) = ctx.interceptor() {
            hook.intercept(InterceptEvent {
                block_id: self.link.id.clone(),
                label: self.config.label.clone(),
                params: params.clone(),
            });
        }
        Ok(self.link.success(params))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::capability::RecordingInterceptor;

    #[tokio::test]
    async fn reports_input_with_label() {
        let recorder = Arc::new(RecordingInterceptor::new());
        let ctx = RunContext::builder().interceptor(recorder.clone()).build();
        let block = InterceptorBlock::new(
            Link::new("spy", Some("next".into())),
            InterceptorConfig {
                label: Some("after-load".into()),
            },
        );
        let out = block.execute(&ctx, json!({"n": 1})).await.unwrap();
        assert_eq!(out.output, Some(json!({"n": 1})));
        assert_eq!(recorder.params(Some("after-load")), vec![json!({"n": 1})]);
        assert!(recorder.params(Some("other")).is_empty());
        assert_eq!(recorder.events()[0].block_id, "spy");
    }

    #[tokio::test]
    async fn without_hook_is_a_passthrough() {
        let ctx = RunContext::builder().build();
        let out = InterceptorBlock::new(Link::new("spy", None), InterceptorConfig::default())
            .execute(&ctx, json!(3))
            .await
            .unwrap();
        assert_eq!(out.output, Some(json!(3)));
    }
}
