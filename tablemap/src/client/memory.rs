use super::{BatchOperation, OperationKind, TableClient};
use crate::error::{Result, TableMapError};
use crate::filter::parse as parse_filter;
use crate::value::Row;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// An in-process table store.
///
/// Rows are kept ordered by partition key, then row key. Batches apply
/// all-or-nothing. Every call counts as one round trip.
#[derive(Default)]
pub struct MemoryTableClient {
    tables: Mutex<HashMap<String, Vec<Row>>>,
    round_trips: AtomicUsize,
    failing: AtomicBool,
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of calls made against this store so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Make every following call fail until switched off again.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of a table's rows, bypassing the round-trip counter.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables.lock().get(table).cloned().unwrap_or_default()
    }

    fn begin(&self, action: &str, table: &str) -> Result<()> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TableMapError::Store(format!("{action} on '{table}' failed")));
        }
        Ok(())
    }
}

fn not_found(table: &str) -> TableMapError {
    TableMapError::Store(format!("Table '{table}' does not exist"))
}

fn project(row: &Row, columns: &[&str]) -> Row {
    let mut out = row.keys_only();
    for column in columns {
        if let Some(value) = row.properties.get(*column) {
            out.properties.insert(column.to_string(), value.clone());
        }
    }
    out
}

fn position(rows: &[Row], row: &Row) -> std::result::Result<usize, usize> {
    rows.binary_search_by(|probe| {
        (probe.partition_key.as_str(), probe.row_key.as_str())
            .cmp(&(row.partition_key.as_str(), row.row_key.as_str()))
    })
}

#[async_trait]
impl TableClient for MemoryTableClient {
    async fn create_table_if_missing(&self, table: &str) -> Result<()> {
        self.begin("create", table)?;
        let mut tables = self.tables.lock();
        if !tables.contains_key(table) {
            log::debug!("Creating table '{table}'");
            tables.insert(table.to_string(), Vec::new());
        }
        Ok(())
    }

    async fn query(
        &self,
        table: &str,
        filter: Option<&str>,
        projection: Option<&[&str]>,
    ) -> Result<Vec<Row>> {
        self.begin("query", table)?;
        let expr = filter.map(parse_filter).transpose()?;

        let tables = self.tables.lock();
        let rows = tables.get(table).ok_or_else(|| not_found(table))?;
        let matched = rows
            .iter()
            .filter(|row| expr.as_ref().map_or(true, |e| e.matches(row)))
            .map(|row| match projection {
                Some(columns) => project(row, columns),
                None => row.clone(),
            })
            .collect();
        Ok(matched)
    }

    async fn submit_batch(&self, table: &str, operations: Vec<BatchOperation>) -> Result<()> {
        self.begin("batch", table)?;

        let mut tables = self.tables.lock();
        let current = tables.get(table).ok_or_else(|| not_found(table))?;

        // Work on a copy so a failing operation leaves the table untouched
        let mut next = current.clone();
        for op in operations {
            match (op.kind, position(&next, &op.row)) {
                (OperationKind::Upsert, Ok(i)) => next[i] = op.row,
                (OperationKind::Upsert, Err(i)) => next.insert(i, op.row),
                (OperationKind::Delete, Ok(i)) => {
                    next.remove(i);
                }
                (OperationKind::Delete, Err(_)) => {
                    return Err(TableMapError::Store(format!(
                        "Row '{}'/'{}' not found in '{table}'",
                        op.row.partition_key, op.row.row_key
                    )));
                }
            }
        }
        tables.insert(table.to_string(), next);
        Ok(())
    }
}
