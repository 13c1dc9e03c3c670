use serde_json::Value;

use super::{BlockDef, EdgeDef, GraphDefinition};
use crate::block::BlockKind;

/// Fluent builder for [`GraphDefinition`].
#[derive(Debug, Default)]
pub struct GraphDefinitionBuilder {
    blocks: Vec<BlockDef>,
    edges: Vec<EdgeDef>,
}

impl GraphDefinitionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block(mut self, id: impl Into<String>, kind: BlockKind, data: Value) -> Self {
        self.blocks.push(BlockDef::new(id, kind, data));
        self
    }

    /// Add an edge leaving `from` through its `handle` slot.
    pub fn edge(mut self, from: impl Into<String>, to: impl Into<String>, handle: &str) -> Self {
        let from = from.into();
        let to = to.into();
        self.edges.push(EdgeDef {
            id: format!("{}-{}-{}", from, handle, to),
            from,
            to,
            from_handle: None,
            to_handle: handle.to_string(),
        });
        self
    }

    /// Shorthand for a `source` edge.
    pub fn link(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edge(from, to, crate::block::handles::SOURCE)
    }

    pub fn build(self) -> GraphDefinition {
        GraphDefinition {
            blocks: self.blocks,
            edges: self.edges,
        }
    }
}

impl GraphDefinition {
    pub fn builder() -> GraphDefinitionBuilder {
        GraphDefinitionBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::handles;
    use serde_json::json;

    #[test]
    fn builder_builds_definition_with_blocks_and_edges() {
        let def = GraphDefinition::builder()
            .block("start", BlockKind::Entrypoint, json!({}))
            .block("check", BlockKind::If, json!({"conditions": []}))
            .block("yes", BlockKind::ConsoleLogger, json!({"message": "yes"}))
            .link("start", "check")
            .edge("check", "yes", handles::SUCCESS)
            .build();

        assert_eq!(def.blocks().len(), 3);
        assert_eq!(def.edges().len(), 2);
        assert_eq!(def.edges()[1].to_handle, "success");
        assert_eq!(def.edges()[1].id, "check-success-yes");
        assert_eq!(def.entrypoints(), vec!["start"]);
    }
}
