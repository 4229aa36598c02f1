mod registry;
mod types;

pub use registry::SchemaRegistry;
pub use types::{Descriptor, Entity, EntitySchema, Field, TableSchema};
