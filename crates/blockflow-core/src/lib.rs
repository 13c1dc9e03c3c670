//! Block graph execution for a visual backend builder.
//!
//! A [`GraphDefinition`] (blocks plus handle-labelled edges, usually loaded from JSON) is
//! compiled by the [`BlockBuilder`] into an [`Engine`], which runs blocks one at a time
//! against a [`RunContext`] holding the run's variables, request data and capabilities.

pub mod block;
pub mod capability;
pub mod config;
pub mod core;
pub mod observability;
pub mod runtime;
pub mod script;

pub use block::{Block, BlockError, BlockKind, BlockOutput};
pub use config::RuntimeConfig;
pub use crate::core::{BlockDef, EdgeDef, GraphDefinition};
pub use runtime::{BlockBuilder, BuildError, Engine, Program, RunContext, RuntimeError, Vars};
pub use script::{Evaluator, HostFn, ScriptEngine, ScriptError};
