//! Whole-table caches for tables marked cacheable.
//!
//! A cache holds every row of a table, populated at most once per
//! invalidation cycle through [`load_once`]. Population is serialized per
//! table by an exclusive lock; tables never contend with each other.

mod memory;
mod sqlite;

pub use memory::MemoryTableCache;
pub use sqlite::SqliteTableCache;

use crate::error::Result;
use crate::value::Row;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;

/// Exclusive hold on one table's cache entry. Dropping it releases the lock.
pub struct TableGuard {
    table: String,
    _guard: OwnedMutexGuard<()>,
}

impl TableGuard {
    pub fn table(&self) -> &str {
        &self.table
    }
}

/// Lazily created async locks, one per table name.
#[derive(Default)]
pub struct TableLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl TableLocks {
    pub async fn acquire(&self, table: &str) -> TableGuard {
        let lock = {
            let mut locks = self.locks.lock();
            Arc::clone(locks.entry(table.to_string()).or_default())
        };
        TableGuard {
            table: table.to_string(),
            _guard: lock.lock_owned().await,
        }
    }
}

#[async_trait]
pub trait TableCache: Send + Sync {
    /// Prepare backing storage. Safe to call more than once.
    async fn initialize(&self) -> Result<()>;

    async fn is_loaded(&self, table: &str) -> Result<bool>;

    /// Drop every cached row of `table` and mark it unloaded.
    async fn reset(&self, table: &str) -> Result<()>;

    /// Replace the rows of `table` and mark it loaded.
    async fn set_items(&self, table: &str, rows: Vec<Row>) -> Result<()>;

    /// The cached rows of `table`. Empty when nothing is cached. The
    /// returned rows are shared and must not be changed in place.
    async fn get_items(&self, table: &str) -> Result<Arc<Vec<Row>>>;

    /// Wait for exclusive access to `table`.
    async fn lock_table(&self, table: &str) -> Result<TableGuard>;

    fn unlock_table(&self, guard: TableGuard) {
        drop(guard);
    }
}

/// Populate `table` with `loader` unless it is already loaded.
///
/// The loaded check happens under the table lock, so concurrent callers
/// run the loader once and nobody observes a half-filled table. The lock
/// is released on every path, including loader failure. Returns whether
/// this call ran the loader.
pub async fn load_once<C, F, Fut>(cache: &C, table: &str, loader: F) -> Result<bool>
where
    C: TableCache + ?Sized,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<Vec<Row>>>,
{
    let guard = cache.lock_table(table).await?;
    let loaded = populate(cache, table, loader).await;
    cache.unlock_table(guard);
    loaded
}

/// Like [`load_once`], but also returns the table's rows, read while the
/// lock is still held so a concurrent [`reset_locked`] cannot empty them.
pub async fn read_through<C, F, Fut>(
    cache: &C,
    table: &str,
    loader: F,
) -> Result<Arc<Vec<Row>>>
where
    C: TableCache + ?Sized,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<Vec<Row>>>,
{
    let guard = cache.lock_table(table).await?;
    let items = match populate(cache, table, loader).await {
        Ok(_) => cache.get_items(table).await,
        Err(err) => Err(err),
    };
    cache.unlock_table(guard);
    items
}

/// Clear `table` under its lock, so readers inside [`read_through`] see
/// either the old rows or none loaded, never a half-way state.
pub async fn reset_locked<C: TableCache + ?Sized>(cache: &C, table: &str) -> Result<()> {
    let guard = cache.lock_table(table).await?;
    let result = cache.reset(table).await;
    cache.unlock_table(guard);
    result
}

/// Caller holds the table lock.
async fn populate<C, F, Fut>(cache: &C, table: &str, loader: F) -> Result<bool>
where
    C: TableCache + ?Sized,
    F: FnOnce(String) -> Fut,
    Fut: Future<Output = Result<Vec<Row>>>,
{
    if cache.is_loaded(table).await? {
        return Ok(false);
    }

    let rows = loader(table.to_string()).await?;
    log::debug!("Loaded {} rows into cache for '{table}'", rows.len());
    cache.set_items(table, rows).await?;
    Ok(true)
}
