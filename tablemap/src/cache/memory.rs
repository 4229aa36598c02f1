use super::{TableCache, TableGuard, TableLocks};
use crate::error::Result;
use crate::value::Row;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

struct CacheEntry {
    items: Arc<Vec<Row>>,
    loaded: bool,
}

/// Keeps cached tables in process memory.
#[derive(Default)]
pub struct MemoryTableCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    locks: TableLocks,
}

impl MemoryTableCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TableCache for MemoryTableCache {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn is_loaded(&self, table: &str) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .get(table)
            .map_or(false, |entry| entry.loaded))
    }

    async fn reset(&self, table: &str) -> Result<()> {
        if self.entries.write().remove(table).is_some() {
            log::debug!("Cleared cache for '{table}'");
        }
        Ok(())
    }

    async fn set_items(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        self.entries.write().insert(
            table.to_string(),
            CacheEntry {
                items: Arc::new(rows),
                loaded: true,
            },
        );
        Ok(())
    }

    async fn get_items(&self, table: &str) -> Result<Arc<Vec<Row>>> {
        Ok(self
            .entries
            .read()
            .get(table)
            .map(|entry| Arc::clone(&entry.items))
            .unwrap_or_default())
    }

    async fn lock_table(&self, table: &str) -> Result<TableGuard> {
        Ok(self.locks.acquire(table).await)
    }
}
