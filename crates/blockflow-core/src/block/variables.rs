use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link};
use crate::runtime::RunContext;
use crate::script::resolve;

fn require_key(key: &str) -> Result<(), String> {
    if key.trim().is_empty() {
        return Err("key must not be empty".into());
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVarConfig {
    pub key: String,
    #[serde(default)]
    pub value: Value,
    /// Store the block input instead of `value`.
    #[serde(default)]
    pub use_param: bool,
}

impl BlockConfig for SetVarConfig {
    fn validate(&self) -> Result<(), String> {
        require_key(&self.key)
    }
}

/// Writes a value into the run's variable scope and outputs it.
pub struct SetVarBlock {
    link: Link,
    config: SetVarConfig,
}

impl SetVarBlock {
    pub fn new(link: Link, config: SetVarConfig) -> Self {
        Self { link, config }
    }
}

#[async_trait]
impl Block for SetVarBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::SetVar
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let raw = if self.config.use_param {
            &params
        } else {
            &self.config.value
        };
        let resolved = {
            let vm = ctx.vm_with("params", &params);
            resolve(vm.as_ref(), raw)
        };
        let value = match resolved {
            Ok(value) => value,
            Err(err) => return Ok(BlockOutput::failure(err.to_string())),
        };
        debug!(event = "vars.set", domain = "vars", block_id = %self.link.id, key = %self.config.key);
        ctx.vars().set(self.config.key.clone(), value.clone());
        Ok(self.link.success(value))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetVarConfig {
    pub key: String,
}

impl BlockConfig for GetVarConfig {
    fn validate(&self) -> Result<(), String> {
        require_key(&self.key)
    }
}

/// Outputs a variable, or `null` when it is not set.
pub struct GetVarBlock {
    link: Link,
    config: GetVarConfig,
}

impl GetVarBlock {
    pub fn new(link: Link, config: GetVarConfig) -> Self {
        Self { link, config }
    }
}

#[async_trait]
impl Block for GetVarBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::GetVar
    }

    async fn execute(&self, ctx: &RunContext, _params: Value) -> Result<BlockOutput, BlockError> {
        let value = ctx.vars().get(&self.config.key).unwrap_or(Value::Null);
        Ok(self.link.success(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn set_var(config: Value) -> SetVarBlock {
        SetVarBlock::new(
            Link::new("set", Some("next".into())),
            serde_json::from_value(config).unwrap(),
        )
    }

    fn get_var(key: &str) -> GetVarBlock {
        GetVarBlock::new(
            Link::new("get", None),
            GetVarConfig { key: key.into() },
        )
    }

    #[tokio::test]
    async fn stores_literal_and_script_values() {
        let ctx = RunContext::builder().build();
        ctx.vars().set("base", json!(40));

        let out = set_var(json!({"key": "plain", "value": {"a": 1}}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert_eq!(out.output, Some(json!({"a": 1})));

        set_var(json!({"key": "sum", "value": "js:base + 2"}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert_eq!(ctx.vars().get("plain"), Some(json!({"a": 1})));
        assert_eq!(ctx.vars().get("sum"), Some(json!(42)));
    }

    #[tokio::test]
    async fn use_param_stores_the_input_resolving_scripts() {
        let ctx = RunContext::builder().build();
        ctx.vars().set("n", json!(2));
        set_var(json!({"key": "copy", "useParam": true}))
            .execute(&ctx, json!([1, 2]))
            .await
            .unwrap();
        set_var(json!({"key": "scripted", "useParam": true}))
            .execute(&ctx, json!("js:n * 10"))
            .await
            .unwrap();
        assert_eq!(ctx.vars().get("copy"), Some(json!([1, 2])));
        assert_eq!(ctx.vars().get("scripted"), Some(json!(20)));
    }

    #[tokio::test]
    async fn failing_script_is_a_fatal_output_and_leaves_vars_alone() {
        let ctx = RunContext::builder().build();
        let out = set_var(json!({"key": "x", "value": "js:nope("}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.is_fatal());
        assert!(!ctx.vars().contains("x"));
    }

    #[tokio::test]
    async fn field_assignment_in_value_script_fails_without_touching_vars() {
        let ctx = RunContext::builder().build();
        ctx.vars().set("user", json!({"name": "ada"}));
        let out = set_var(json!({"key": "x", "value": "js:user.name = \"eve\""}))
            .execute(&ctx, Value::Null)
            .await
            .unwrap();
        assert!(out.is_fatal());
        assert_eq!(ctx.vars().get("user"), Some(json!({"name": "ada"})));
        assert!(!ctx.vars().contains("x"));
    }

    #[tokio::test]
    async fn get_var_reads_or_yields_null() {
        let ctx = RunContext::builder().build();
        ctx.vars().set("name", json!("ada"));
        let out = get_var("name").execute(&ctx, Value::Null).await.unwrap();
        assert_eq!(out.output, Some(json!("ada")));
        let out = get_var("missing").execute(&ctx, Value::Null).await.unwrap();
        assert!(out.successful);
        assert_eq!(out.output, Some(Value::Null));
    }

    #[test]
    fn empty_key_fails_validation() {
        assert!(GetVarConfig { key: " ".into() }.validate().is_err());
    }
}
