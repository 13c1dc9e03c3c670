//! # Block SDK
//!
//! Blocks are the units of work in a graph. Each block implements [`Block`] and returns a
//! [`BlockOutput`], the message the engine routes to the next block.
//!
//! ## Return contract
//!
//! - A block that completed its work returns `successful: true` and names its successor in
//!   `next` (or `None` to end the run).
//! - A recoverable problem (missing data, a script that failed inside a block that catches
//!   script errors) is reported as `successful: false`. With `continue_if_fail: false` the
//!   engine turns it into a fatal [`RuntimeError`](crate::runtime::RuntimeError).
//! - Truly exceptional conditions are raised as [`BlockError`]; they unwind every nested
//!   engine up to the nearest catcher (the `transaction` block).
//!
//! ## Configuration
//!
//! Each kind deserializes its `data` into a typed config implementing [`BlockConfig`]. The
//! builder runs [`BlockConfig::validate`] when schema validation is enabled.

mod array_ops;
mod code;
mod conditional;
mod db;
mod entrypoint;
mod for_each;
mod http_access;
mod http_request;
mod interceptor;
mod iteration;
mod kind;
mod logger;
mod transaction;
mod transformer;
mod variables;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capability::{DbError, HttpError};
use crate::runtime::{RunContext, RuntimeError};
use crate::script::ScriptError;

pub use array_ops::{ArrayOperation, ArrayOpsBlock, ArrayOpsConfig};
pub use code::{CodeBlock, CodeConfig};
pub use conditional::{IfBlock, IfConfig};
pub use db::{DbBlock, DbBlockConfig, DbOperation};
pub use entrypoint::EntrypointBlock;
pub use for_each::{ForEachBlock, ForEachConfig};
pub use http_access::{
    CookieConfig, HeaderConfig, ParamSource, RequestReadBlock, RequestReadConfig, RequestRead,
    ResponseBlock, ResponseConfig, SetCookieBlock, SetHeaderBlock,
};
pub use http_request::{HttpRequestBlock, HttpRequestConfig};
pub use interceptor::{InterceptorBlock, InterceptorConfig};
pub use iteration::{BoundedIterator, ForBlock, ForConfig, LoopBody};
pub use kind::BlockKind;
pub use logger::{ConsoleLoggerBlock, ConsoleLoggerConfig};
pub use transaction::TransactionBlock;
pub use transformer::{TransformerBlock, TransformerConfig};
pub use variables::{GetVarBlock, GetVarConfig, SetVarBlock, SetVarConfig};

/// Outgoing slot names an edge's `toHandle` may carry.
pub mod handles {
    /// Normal successor.
    pub const SOURCE: &str = "source";
    /// `if` branch taken when the conditions hold.
    pub const SUCCESS: &str = "success";
    /// `if` branch taken otherwise.
    pub const FAILURE: &str = "failure";
    /// Entry block of a loop or transaction body.
    pub const EXECUTOR: &str = "executor";
}

/// Structured result passed between blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockOutput {
    pub successful: bool,
    pub continue_if_fail: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BlockOutput {
    pub fn success(next: Option<String>, output: Value) -> Self {
        Self {
            successful: true,
            continue_if_fail: true,
            next,
            output: Some(output),
            error: None,
        }
    }

    /// Non-continuable failure: the engine aborts the run when it sees this.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            successful: false,
            continue_if_fail: false,
            next: None,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn is_fatal(&self) -> bool {
        !self.successful && !self.continue_if_fail
    }
}

/// Error a block raises instead of returning a [`BlockOutput`].
#[derive(Debug, thiserror::Error)]
pub enum BlockError {
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Http(#[from] HttpError),
    #[error("nested run failed: {0}")]
    Run(Box<RuntimeError>),
    #[error("block error: {0}")]
    Other(String),
}

impl From<RuntimeError> for BlockError {
    fn from(err: RuntimeError) -> Self {
        BlockError::Run(Box::new(err))
    }
}

/// Unit of work the engine executes.
#[async_trait]
pub trait Block: Send + Sync {
    fn id(&self) -> &str;

    fn kind(&self) -> BlockKind;

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError>;
}

/// Typed block configuration deserialized from a block definition's `data`.
pub trait BlockConfig: DeserializeOwned {
    /// Semantic checks serde cannot express. Runs at build time when validation is on.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Identity and single successor shared by most block kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub id: String,
    pub next: Option<String>,
}

impl Link {
    pub fn new(id: impl Into<String>, next: Option<String>) -> Self {
        Self {
            id: id.into(),
            next,
        }
    }

    pub fn success(&self, output: Value) -> BlockOutput {
        BlockOutput::success(self.next.clone(), output)
    }
}

/// Short type name of a JSON value, for error messages.
pub(crate) fn value_kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn output_serializes_with_wire_names() {
        let out = BlockOutput::success(Some("b".into()), json!(1));
        assert_eq!(
            serde_json::to_value(&out).unwrap(),
            json!({"successful": true, "continueIfFail": true, "next": "b", "output": 1})
        );
    }

    #[test]
    fn failure_is_fatal_only_when_not_continuable() {
        let mut out = BlockOutput::failure("boom");
        assert!(out.is_fatal());
        out.continue_if_fail = true;
        assert!(!out.is_fatal());
        assert!(!BlockOutput::success(None, Value::Null).is_fatal());
    }
}
