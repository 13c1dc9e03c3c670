use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::block::BlockKind;
use crate::runtime::BuildError;

/// Layout metadata written by the editor canvas. The engine never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A persisted block: kind plus kind-specific configuration in `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl BlockDef {
    pub fn new(id: impl Into<String>, kind: BlockKind, data: Value) -> Self {
        Self {
            id: id.into(),
            kind,
            data,
            position: None,
        }
    }
}

/// A persisted edge. `to_handle` names the outgoing slot of the `from` block
/// (`source`, `success`, `failure`, `executor`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDef {
    #[serde(default)]
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub from_handle: Option<String>,
    pub to_handle: String,
}

/// Graph definition as produced by the editor: blocks and edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GraphDefinition {
    #[serde(default)]
    pub blocks: Vec<BlockDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
}

impl GraphDefinition {
    pub fn from_json(raw: &str) -> Result<Self, BuildError> {
        serde_json::from_str(raw).map_err(|e| BuildError::Parse(e.to_string()))
    }

    pub fn blocks(&self) -> &[BlockDef] {
        &self.blocks
    }

    pub fn edges(&self) -> &[EdgeDef] {
        &self.edges
    }

    /// Ids of every block whose kind is `entrypoint`, in definition order.
    pub fn entrypoints(&self) -> Vec<&str> {
        self.blocks
            .iter()
            .filter(|b| b.kind == BlockKind::Entrypoint)
            .map(|b| b.id.as_str())
            .collect()
    }
}
