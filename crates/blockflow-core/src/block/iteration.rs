//! Counting loops.
//!
//! [`BoundedIterator`] is the shared primitive: it steps an index over `[start, end)` and
//! asks a caller-supplied mapping for the value handed to the loop body on each step. The
//! `for` block maps an index to itself; `forEach` maps it to an array element.
//!
//! Iterations run strictly in order and each one drains its body engine before the next
//! starts. A body failure is not caught here; it aborts the enclosing run.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use tracing::debug;

use super::{Block, BlockConfig, BlockError, BlockKind, BlockOutput, Link, value_kind_name};
use crate::runtime::{Engine, RunContext, RuntimeError};
use crate::script::{Evaluator, strip_prefix};

/// Child engine plus the block it starts from.
pub struct LoopBody {
    engine: Arc<Engine>,
    entry: String,
}

impl LoopBody {
    pub fn new(engine: Arc<Engine>, entry: String) -> Self {
        Self { engine, entry }
    }

    pub async fn run(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, RuntimeError> {
        self.engine.start(ctx, &self.entry, params).await
    }
}

/// `for (i = start; i < end; i += step)`. A non-positive step runs zero times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundedIterator {
    pub start: f64,
    pub end: f64,
    pub step: f64,
}

impl BoundedIterator {
    pub fn new(start: f64, end: f64, step: f64) -> Self {
        Self { start, end, step }
    }

    pub fn indices(&self) -> impl Iterator<Item = f64> + Send {
        let Self { start, end, step } = *self;
        let mut current = start;
        std::iter::from_fn(move || {
            if step.is_nan() || step <= 0.0 || current.is_nan() || current >= end {
                return None;
            }
            let index = current;
            current += step;
            Some(index)
        })
    }

    /// Run `body` once per index with `value_at(index)` as its input. Returns the number
    /// of iterations.
    pub async fn drive<F>(
        &self,
        ctx: &RunContext,
        body: Option<&LoopBody>,
        mut value_at: F,
    ) -> Result<usize, RuntimeError>
    where
        F: FnMut(f64) -> Value + Send,
    {
        let mut iterations = 0;
        for index in self.indices() {
            let value = value_at(index);
            if let Some(body) = body {
                body.run(ctx, value).await?;
            }
            iterations += 1;
        }
        Ok(iterations)
    }
}

/// Integral floats become JSON integers so scripts see `3`, not `3.0`.
pub(crate) fn number_value(value: f64) -> Value {
    if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
        return Value::from(value as i64);
    }
    Number::from_f64(value).map_or(Value::Null, Value::Number)
}

fn default_start() -> Value {
    Value::from(0)
}

fn default_step() -> Value {
    Value::from(1)
}

/// Each bound is a number or a string evaluated once by the VM before the loop starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForConfig {
    #[serde(default = "default_start")]
    pub start: Value,
    pub end: Value,
    #[serde(default = "default_step")]
    pub step: Value,
}

impl BlockConfig for ForConfig {
    fn validate(&self) -> Result<(), String> {
        for (name, bound) in [("start", &self.start), ("end", &self.end), ("step", &self.step)] {
            match bound {
                Value::Number(_) => {}
                Value::String(s) if !strip_prefix(s).trim().is_empty() => {}
                other => {
                    return Err(format!(
                        "{name} must be a number or script, got {}",
                        value_kind_name(other)
                    ));
                }
            }
        }
        Ok(())
    }
}

fn resolve_bound(vm: &dyn Evaluator, name: &str, raw: &Value) -> Result<f64, String> {
    let value = match raw {
        Value::String(code) => vm
            .run(strip_prefix(code))
            .map_err(|e| format!("{name}: {e}"))?,
        other => other.clone(),
    };
    match &value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| format!("{name} is not representable as a number")),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| format!("{name} must resolve to a number, got \"{s}\"")),
        other => Err(format!(
            "{name} must resolve to a number, got {}",
            value_kind_name(other)
        )),
    }
}

pub struct ForBlock {
    link: Link,
    config: ForConfig,
    body: Option<LoopBody>,
}

impl ForBlock {
    pub fn new(link: Link, config: ForConfig, body: Option<LoopBody>) -> Self {
        Self { link, config, body }
    }

    fn bounds(&self, vm: &dyn Evaluator) -> Result<BoundedIterator, String> {
        Ok(BoundedIterator::new(
            resolve_bound(vm, "start", &self.config.start)?,
            resolve_bound(vm, "end", &self.config.end)?,
            resolve_bound(vm, "step", &self.config.step)?,
        ))
    }
}

#[async_trait]
impl Block for ForBlock {
    fn id(&self) -> &str {
        &self.link.id
    }

    fn kind(&self) -> BlockKind {
        BlockKind::For
    }

    async fn execute(&self, ctx: &RunContext, params: Value) -> Result<BlockOutput, BlockError> {
        let bounds = {
            let vm = ctx.vm_with("params", &params);
            self.bounds(vm.as_ref())
        };
        let bounds = match bounds {
            Ok(bounds) => bounds,
            Err(message) => return Ok(BlockOutput::failure(message)),
        };
        let iterations = bounds.drive(ctx, self.body.as_ref(), number_value).await?;
        debug!(
            event = "for.completed",
            domain = "control",
            block_id = %self.link.id,
            iterations = iterations
        );
        Ok(self.link.success(params))
    }
}
