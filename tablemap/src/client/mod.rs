// Boundary to the table store service

mod memory;

pub use memory::MemoryTableClient;

use crate::error::Result;
use crate::value::Row;
use async_trait::async_trait;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Insert, or replace an existing row with the same keys.
    Upsert,
    Delete,
}

/// One entry of a batch submitted to the table store.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOperation {
    pub kind: OperationKind,
    pub row: Row,
}

impl BatchOperation {
    pub fn upsert(row: Row) -> Self {
        BatchOperation {
            kind: OperationKind::Upsert,
            row,
        }
    }

    pub fn delete(row: Row) -> Self {
        BatchOperation {
            kind: OperationKind::Delete,
            row,
        }
    }
}

/// Client for a partitioned key/value table store.
///
/// Implementations own transport, authentication and retry policy. Every
/// method is one round trip; failures are returned as
/// [`TableMapError::Store`](crate::TableMapError::Store) and are not retried
/// by the mapper.
#[async_trait]
pub trait TableClient: Send + Sync {
    async fn create_table_if_missing(&self, table: &str) -> Result<()>;

    /// Rows of `table` matching `filter` (all rows when `None`). With a
    /// projection, only the named columns are returned; the two key
    /// columns are always present.
    async fn query(
        &self,
        table: &str,
        filter: Option<&str>,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Row>>;

    /// Apply all operations in a single round trip.
    async fn submit_batch(&self, table: &str, operations: Vec<BatchOperation>) -> Result<()>;
}
