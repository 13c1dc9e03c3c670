//! `if` block: evaluates an and/or chain of conditions and routes to one of two branches.
//! A false result is a normal outcome; the block never fails on it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput};
use crate::runtime::RunContext;
use crate::script::{ComparisonOperator, Condition, evaluate_conditions};

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IfConfig {
    pub conditions: Vec<Condition>,
}

impl BlockConfig for IfConfig {
    fn validate(&self) -> Result<(), String> {
        for (index, condition) in self.conditions.iter().enumerate() {
            match condition.operator {
                ComparisonOperator::Unknown => {
                    return Err(format!("condition {index}: unknown operator"));
                }
                ComparisonOperator::Js
                    if condition.js.as_deref().is_none_or(|s| s.trim().is_empty()) =>
                {
                    return Err(format!("condition {index}: js operator requires a script"));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

pub struct IfBlock {
    id: String,
    config: IfConfig,
    on_success: Option<String>,
    on_failure: Option<String>,
}

impl IfBlock {
    pub fn new(
        id: String,
        config: IfConfig,
        on_success: Option<String>,
        on_failure: Option<String>,
    ) -> Self {
        Self {
            id,
            config,
            on_success,
            on_failure,
        }
    }
}

#[async_trait]
impl Block for IfBlock {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::If
    }

    /// Script errors inside a condition are raised, not turned into a failure output.
    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let vm = ctx.vm_with("params", &params);
        let passed = evaluate_conditions(vm.as_ref(), &self.config.conditions)?;
        debug!(event = "if.evaluated", domain = "control", block_id = %self.id, passed = passed);
        let next = if passed {
            self.on_success.clone()
        } else {
            self.on_failure.clone()
        };
        Ok(BlockOutput::success(next, Value::Bool(passed)))
    }
}
