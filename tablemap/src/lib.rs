pub mod cache;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod filter;
pub mod mapper;
pub mod record;
pub mod schema;
pub mod value;

pub use cache::{
    load_once, read_through, reset_locked, MemoryTableCache, SqliteTableCache, TableCache,
};
pub use client::{BatchOperation, MemoryTableClient, TableClient};
pub use config::{parse_config, MapperConfig};
pub use error::{Result, TableMapError};
pub use filter::Comparison;
pub use mapper::TableMapper;
pub use record::Record;
pub use schema::{Descriptor, Entity, EntitySchema, Field, SchemaRegistry, TableSchema};
pub use value::{Conversion, Row, Scalar, ScalarKind, Value};
