use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link};
use crate::runtime::{LogLevel, RunContext};
use crate::script::resolve;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleLoggerConfig {
    /// Literal or script. Unset logs the block input.
    pub message: Option<Value>,
    pub level: LogLevel,
}

impl BlockConfig for ConsoleLoggerConfig {}

/// `consoleLogger`: writes a line to tracing and to the run's log buffer, then passes its
/// input through unchanged.
pub struct ConsoleLoggerBlock {
    link: Link,
    config: ConsoleLoggerConfig,
}

impl ConsoleLoggerBlock {
    pub fn new(link: Link, config: ConsoleLoggerConfig) -> Self {
        Self { link, config }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl Block for ConsoleLoggerBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::ConsoleLogger
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let message = match &self.config.message {
            None => render(&params),
            Some(raw) => {
                let vm = ctx.vm_with("params", &params);
                match resolve(vm.as_ref(), raw) {
                    Ok(value) => render(&value),
                    Err(err) => return Ok(BlockOutput::failure(err.to_string())),
                }
            }
        };
        let block_id = self.link.id.as_str();
        match self.config.level {
            LogLevel::Debug => debug!(event = "block.log", block_id, "{message}"),
            LogLevel::Info => info!(event = "block.log", block_id, "{message}"),
            LogLevel::Warn => warn!(event = "block.log", block_id, "{message}"),
            LogLevel::Error => error!(event = "block.log", block_id, "{message}"),
        }
        ctx.log(self.config.level, message, block_id);
        Ok(self.link.success(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block(config: Value) -> ConsoleLoggerBlock {
        ConsoleLoggerBlock::new(
            Link::new("log", Some("next".into())),
            serde_json::from_value(config).unwrap(),
        )
    }

    #[tokio::test]
    async fn logs_resolved_message_and_passes_input_through() {
        let ctx = RunContext::builder().build();
        ctx.vars().set("user", json!("ada"));
        let out = block(json!({"message": "js:\"hello \" + user", "level": "warn"}))
            .execute(&ctx, json!({"keep": 1}))
            .await
            .unwrap();
        assert_eq!(out.output, Some(json!({"keep": 1})));
        let logs = ctx.logs();
        assert_eq!(logs[0].message, "hello ada");
        assert_eq!(logs[0].level, LogLevel::Warn);
        assert_eq!(logs[0].block_id, "log");
    }

    #[tokio::test]
    async fn without_message_logs_the_input() {
        let ctx = RunContext::builder().build();
        block(json!({})).execute(&ctx, json!([1, 2])).await.unwrap();
        assert_eq!(ctx.logs()[0].message, "[1,2]");
        assert_eq!(ctx.logs()[0].level, LogLevel::Info);
    }

    #[tokio::test]
    async fn failing_message_script_is_a_fatal_output() {
        let ctx = RunContext::builder().build();
        let out = block(json!({"message": "js:no_such"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.is_fatal());
        assert!(ctx.logs().is_empty());
    }
}
