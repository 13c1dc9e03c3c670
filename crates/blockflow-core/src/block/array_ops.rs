//! `arrayOps` block: in-place push/pop/shift/unshift on an array variable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link, value_kind_name};
use crate::runtime::RunContext;
use crate::script::resolve;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayOperation {
    Push,
    Pop,
    Shift,
    Unshift,
}

impl ArrayOperation {
    fn takes_value(self) -> bool {
        matches!(self, ArrayOperation::Push | ArrayOperation::Unshift)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayOpsConfig {
    /// Name of the array variable.
    pub datasource: String,
    pub operation: ArrayOperation,
    #[serde(default)]
    pub value: Option<Value>,
    /// Push/unshift the block input instead of `value`.
    #[serde(default)]
    pub use_param: bool,
}

impl BlockConfig for ArrayOpsConfig {
    fn validate(&self) -> Result<(), String> {
        if self.datasource.trim().is_empty() {
            return Err("datasource must not be empty".into());
        }
        if self.operation.takes_value() && !self.use_param && self.value.is_none() {
            return Err(format!("{:?} requires a value", self.operation).to_lowercase());
        }
        Ok(())
    }
}

pub struct ArrayOpsBlock {
    link: Link,
    config: ArrayOpsConfig,
}

impl ArrayOpsBlock {
    pub fn new(link: Link, config: ArrayOpsConfig) -> Self {
        Self { link, config }
    }

    /// Value to insert, resolved before the variable is touched.
    fn operand(&self, ctx: &RunContext, params: &Value) -> Result<Option<Value>, String> {
        if !self.config.operation.takes_value() {
            return Ok(None);
        }
        let raw = match (&self.config.value, self.config.use_param) {
            (_, true) => params,
            (Some(value), false) => value,
            (None, false) => {
                return Err(format!(
                    "arrayOps {:?} requires a value",
                    self.config.operation
                ));
            }
        };
        let vm = ctx.vm_with("params", params);
        resolve(vm.as_ref(), raw)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    fn apply(&self, ctx: &RunContext, operand: Option<Value>) -> Result<Value, String> {
        let key = &self.config.datasource;
        match ctx.vars().get(key) {
            Some(Value::Array(_)) => {}
            Some(other) => {
                return Err(format!(
                    "datasource {key} is not an array, got {}",
                    value_kind_name(&other)
                ));
            }
            None => return Err(format!("datasource {key} not found")),
        }
        let operation = self.config.operation;
        let outcome = ctx.vars().update(key, move |current| {
            let Value::Array(items) = current else {
                return None;
            };
            let output = match (operation, operand) {
                (ArrayOperation::Push, Some(value)) => {
                    items.push(value);
                    Value::Array(items.clone())
                }
                (ArrayOperation::Unshift, Some(value)) => {
                    items.insert(0, value);
                    Value::Array(items.clone())
                }
                (ArrayOperation::Pop, _) => items.pop().unwrap_or(Value::Null),
                (ArrayOperation::Shift, _) if items.is_empty() => Value::Null,
                (ArrayOperation::Shift, _) => items.remove(0),
                (ArrayOperation::Push | ArrayOperation::Unshift, None) => return None,
            };
            Some(output)
        });
        outcome
            .flatten()
            .ok_or_else(|| format!("datasource {key} changed during arrayOps"))
    }
}

#[async_trait]
impl Block for ArrayOpsBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::ArrayOps
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let result = self
            .operand(ctx, &params)
            .and_then(|operand| self.apply(ctx, operand));
        Ok(match result {
            Ok(output) => {
                debug!(
                    event = "vars.array_op",
                    domain = "vars",
                    block_id = %self.link.id,
                    datasource = %self.config.datasource,
                    operation = ?self.config.operation
                );
                self.link.success(output)
            }
            Err(message) => BlockOutput::failure(message),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block(config: Value) -> ArrayOpsBlock {
        ArrayOpsBlock::new(
            Link::new("ops", None),
            serde_json::from_value(config).unwrap(),
        )
    }

    fn context_with_list() -> RunContext {
        let ctx = RunContext::builder().build();
        ctx.vars().set("list", json!([1, 2, 3]));
        ctx
    }

    #[tokio::test]
    async fn push_and_unshift_return_the_array() {
        let ctx = context_with_list();
        ctx.vars().set("n", json!(9));
        let out = block(json!({"datasource": "list", "operation": "push", "value": "js:n"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert_eq!(out.output, Some(json!([1, 2, 3, 9])));
        let out = block(json!({"datasource": "list", "operation": "unshift", "value": 0}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert_eq!(out.output, Some(json!([0, 1, 2, 3, 9])));
        assert_eq!(ctx.vars().get("list"), Some(json!([0, 1, 2, 3, 9])));
    }

    #[tokio::test]
    async fn pop_and_shift_return_the_removed_element() {
        let ctx = context_with_list();
        let out = block(json!({"datasource": "list", "operation": "pop"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert_eq!(out.output, Some(json!(3)));
        let out = block(json!({"datasource": "list", "operation": "shift"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert_eq!(out.output, Some(json!(1)));
        assert_eq!(ctx.vars().get("list"), Some(json!([2])));
    }

    #[tokio::test]
    async fn popping_an_empty_array_yields_null() {
        let ctx = RunContext::builder().build();
        ctx.vars().set("list", json!([]));
        let out = block(json!({"datasource": "list", "operation": "shift"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.successful);
        assert_eq!(out.output, Some(Value::Null));
    }

    #[tokio::test]
    async fn use_param_pushes_the_input() {
        let ctx = context_with_list();
        block(json!({"datasource": "list", "operation": "push", "useParam": true}))
            .execute(&ctx, json!({"id": 4}))
            .await
            .unwrap();
        assert_eq!(ctx.vars().get("list"), Some(json!([1, 2, 3, {"id": 4}])));
    }

    #[tokio::test]
    async fn missing_or_non_array_datasource_fails() {
        let ctx = RunContext::builder().build();
        ctx.vars().set("scalar", json!(5));
        let out = block(json!({"datasource": "absent", "operation": "pop"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.is_fatal());
        let out = block(json!({"datasource": "scalar", "operation": "pop"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.is_fatal());
        assert_eq!(ctx.vars().get("scalar"), Some(json!(5)));
    }

    #[test]
    fn push_without_value_fails_validation() {
        let config: ArrayOpsConfig =
            serde_json::from_value(json!({"datasource": "list", "operation": "push"})).unwrap();
        assert!(config.validate().is_err());
        let config: ArrayOpsConfig =
            serde_json::from_value(json!({"datasource": "list", "operation": "pop"})).unwrap();
        assert!(config.validate().is_ok());
    }
}
