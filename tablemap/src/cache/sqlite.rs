use super::{TableCache, TableGuard, TableLocks};
use crate::error::Result;
use crate::value::Row;
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

/// Persists cached tables in a SQLite database, so a restarted process
/// can serve reads without reloading from the table store.
///
/// Table locks are per process; two processes sharing one file do not
/// serialize population against each other.
pub struct SqliteTableCache {
    conn: Mutex<Connection>,
    locks: TableLocks,
}

impl SqliteTableCache {
    /// Open or create the cache database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        let cache = SqliteTableCache {
            conn: Mutex::new(conn),
            locks: TableLocks::default(),
        };
        cache.initialize_tables()?;
        Ok(cache)
    }

    /// Open an in-memory cache database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = SqliteTableCache {
            conn: Mutex::new(conn),
            locks: TableLocks::default(),
        };
        cache.initialize_tables()?;
        Ok(cache)
    }

    fn initialize_tables(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache_state (
                table_name TEXT PRIMARY KEY,
                loaded INTEGER NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS cache_items (
                table_name TEXT NOT NULL,
                position INTEGER NOT NULL,
                data_json TEXT NOT NULL,
                PRIMARY KEY (table_name, position)
            );
            ",
        )?;
        Ok(())
    }
}

#[async_trait]
impl TableCache for SqliteTableCache {
    async fn initialize(&self) -> Result<()> {
        self.initialize_tables()
    }

    async fn is_loaded(&self, table: &str) -> Result<bool> {
        let loaded: Option<bool> = self
            .conn
            .lock()
            .query_row(
                "SELECT loaded FROM cache_state WHERE table_name = ?1",
                params![table],
                |row| row.get(0),
            )
            .optional()?;
        Ok(loaded.unwrap_or(false))
    }

    async fn reset(&self, table: &str) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cache_items WHERE table_name = ?1", params![table])?;
        tx.execute("DELETE FROM cache_state WHERE table_name = ?1", params![table])?;
        tx.commit()?;
        log::debug!("Cleared cache for '{table}'");
        Ok(())
    }

    async fn set_items(&self, table: &str, rows: Vec<Row>) -> Result<()> {
        let encoded = rows
            .iter()
            .map(serde_json::to_string)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM cache_items WHERE table_name = ?1", params![table])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO cache_items (table_name, position, data_json) VALUES (?1, ?2, ?3)",
            )?;
            for (position, json) in encoded.iter().enumerate() {
                stmt.execute(params![table, position as i64, json])?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO cache_state (table_name, loaded, updated_at) VALUES (?1, 1, datetime('now'))",
            params![table],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn get_items(&self, table: &str) -> Result<Arc<Vec<Row>>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT data_json FROM cache_items WHERE table_name = ?1 ORDER BY position",
        )?;
        let encoded = stmt
            .query_map(params![table], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(encoded.len());
        for json in &encoded {
            rows.push(serde_json::from_str(json)?);
        }
        Ok(Arc::new(rows))
    }

    async fn lock_table(&self, table: &str) -> Result<TableGuard> {
        Ok(self.locks.acquire(table).await)
    }
}
