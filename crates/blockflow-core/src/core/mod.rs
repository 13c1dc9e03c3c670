mod builder;
mod definition;

pub use builder::GraphDefinitionBuilder;
pub use definition::{BlockDef, EdgeDef, GraphDefinition, Position};
