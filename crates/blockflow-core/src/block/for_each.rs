use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{
    Block, BlockConfig, BlockError, BlockKind, BlockOutput, BoundedIterator, Link, LoopBody,
    value_kind_name,
};
use crate::runtime::RunContext;
use crate::script::resolve;

/// `values` is a literal array or a `js:` script producing one. With `use_param` the
/// block input is iterated instead.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ForEachConfig {
    pub values: Value,
    pub use_param: bool,
}

impl BlockConfig for ForEachConfig {
    fn validate(&self) -> Result<(), String> {
        match &self.values {
            _ if self.use_param => Ok(()),
            Value::Array(_) | Value::String(_) => Ok(()),
            other => Err(format!(
                "values must be an array or script, got {}",
                value_kind_name(other)
            )),
        }
    }
}

/// Runs its body once per element, passing the element (never the index).
pub struct ForEachBlock {
    link: Link,
    config: ForEachConfig,
    body: Option<LoopBody>,
}

impl ForEachBlock {
    pub fn new(link: Link, config: ForEachConfig, body: Option<LoopBody>) -> Self {
        Self { link, config, body }
    }

    fn items(&self, ctx: &RunContext, params: &Value) -> Result<Vec<Value>, String> {
        if self.config.use_param {
            return match params {
                Value::Array(items) => Ok(items.clone()),
                other => Err(format!(
                    "forEach with useParam expects an array input, got {}",
                    value_kind_name(other)
                )),
            };
        }
        let vm = ctx.vm_with("params", params);
        match resolve(vm.as_ref(), &self.config.values).map_err(|e| e.to_string())? {
            Value::Array(items) => Ok(items),
            other => Err(format!(
                "forEach values must resolve to an array, got {}",
                value_kind_name(&other)
            )),
        }
    }
}

#[async_trait]
impl Block for ForEachBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::ForEach
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let items = match self.items(ctx, &params) {
            Ok(items) => items,
            Err(message) => return Ok(BlockOutput::failure(message)),
        };
        let iterator = BoundedIterator::new(0.0, items.len() as f64, 1.0);
        let iterations = iterator
            .drive(ctx, self.body.as_ref(), |index| {
                items.get(index as usize).cloned().unwrap_or(Value::Null)
            })
            .await?;
        debug!(
            event = "for_each.completed",
            domain = "control",
            block_id = %self.link.id,
            iterations = iterations
        );
        Ok(self.link.success(params))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::iteration::tests::{spied_context, spy_body};
    use serde_json::json;

    fn block(config: Value) -> ForEachBlock {
        ForEachBlock::new(
            Link::new("each", Some("after".into())),
            serde_json::from_value(config).unwrap(),
            Some(spy_body()),
        )
    }

    #[tokio::test]
    async fn visits_each_element_in_order() {
        let (ctx, recorder) = spied_context();
        let out = block(json!({"values": ["apple", "banana", "cherry"]}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.successful);
        assert_eq!(
            recorder.params(None),
            vec![json!("apple"), json!("banana"), json!("cherry")]
        );
    }

    #[tokio::test]
    async fn iterates_the_input_with_use_param() {
        let (ctx, recorder) = spied_context();
        block(json!({"useParam": true}))
            .execute(&ctx, json!([1, {"a": 2}]))
            .await
            .unwrap();
        assert_eq!(recorder.params(None), vec![json!(1), json!({"a": 2})]);
    }

    #[tokio::test]
    async fn non_array_input_with_use_param_fails_before_iterating() {
        let (ctx, recorder) = spied_context();
        let out = block(json!({"useParam": true}))
            .execute(&ctx, json!({"not": "a list"}))
            .await
            .unwrap();
        assert!(!out.successful);
        assert!(out.is_fatal());
        assert!(out.error.unwrap().contains("object"));
        assert!(recorder.events().is_empty());
    }

    #[tokio::test]
    async fn script_values_are_resolved_against_vars() {
        let (ctx, recorder) = spied_context();
        ctx.vars().set("users", json!([{"name": "ada"}, {"name": "linus"}]));
        block(json!({"values": "js:users"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert_eq!(recorder.events().len(), 2);
    }

    #[tokio::test]
    async fn empty_array_runs_zero_times() {
        let (ctx, recorder) = spied_context();
        let out = block(json!({"values": []}))
            .execute(&ctx, json!("in"))
            .await
            .unwrap();
        assert!(recorder.events().is_empty());
        assert_eq!(out.output, Some(json!("in")));
    }
}
