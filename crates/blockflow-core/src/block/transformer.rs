//! `transformer` block: reshapes its input either with a script or with a static
//! `source key -> target key` rename map.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link, value_kind_name};
use crate::runtime::RunContext;
use crate::script::strip_prefix;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TransformerConfig {
    pub use_js: bool,
    pub js: Option<String>,
    pub field_map: BTreeMap<String, String>,
}

impl BlockConfig for TransformerConfig {
    fn validate(&self) -> Result<(), String> {
        if self.use_js
            && self
                .js
                .as_deref()
                .is_none_or(|code| strip_prefix(code).trim().is_empty())
        {
            return Err("useJs requires a js script".into());
        }
        Ok(())
    }
}

pub struct TransformerBlock {
    link: Link,
    config: TransformerConfig,
}

impl TransformerBlock {
    pub fn new(link: Link, config: TransformerConfig) -> Self {
        Self { link, config }
    }

    fn map_fields(&self, params: &Value) -> Result<Value, String> {
        let Value::Object(source) = params else {
            return Err(format!(
                "transformer expects an object input, got {}",
                value_kind_name(params)
            ));
        };
        let mut mapped = Map::with_capacity(self.config.field_map.len());
        for (from, to) in &self.config.field_map {
            let value = source
                .get(from)
                .ok_or_else(|| format!("Key {from} not found in params"))?;
            mapped.insert(to.clone(), value.clone());
        }
        Ok(Value::Object(mapped))
    }
}

#[async_trait]
impl Block for TransformerBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Transformer
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        if self.config.use_js {
            let code = self.config.js.as_deref().map(strip_prefix).unwrap_or_default();
            let vm = ctx.vm_with("params", &params);
            return Ok(match vm.run_async(code).await {
                Ok(output) => self.link.success(output),
                Err(err) => BlockOutput::failure(err.to_string()),
            });
        }
        Ok(match self.map_fields(&params) {
            Ok(output) => self.link.success(output),
            Err(message) => BlockOutput::failure(message),
        })
    }
}
