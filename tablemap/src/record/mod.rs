// Record handle: range filters plus read/store/delete against one table

use crate::cache::{read_through, reset_locked};
use crate::client::BatchOperation;
use crate::convert::{from_row, to_row};
use crate::error::{Result, TableMapError};
use crate::filter::{combine_all, condition, Comparison};
use crate::mapper::TableMapper;
use crate::schema::{Entity, EntitySchema, TableSchema};
use crate::value::{Row, Value, PARTITION_KEY, ROW_KEY};
use std::collections::HashSet;
use std::sync::Arc;

const KEY_COLUMNS: [&str; 2] = [PARTITION_KEY, ROW_KEY];

/// A per-operation handle for reading and writing records of type `E`.
///
/// Range filters accumulate until [`reset`](Record::reset) and are
/// "and"-combined in the order they were added. The handle keeps no rows
/// between calls and is not meant to be shared between concurrent callers.
pub struct Record<'a, E: Entity> {
    mapper: &'a TableMapper,
    schema: Arc<EntitySchema<E>>,
    filters: Vec<String>,
}

impl<'a, E: Entity> Record<'a, E> {
    pub(crate) fn new(mapper: &'a TableMapper, schema: Arc<EntitySchema<E>>) -> Self {
        Record {
            mapper,
            schema,
            filters: Vec::new(),
        }
    }

    fn table(&self) -> &TableSchema {
        self.schema.table()
    }

    pub fn schema(&self) -> &Arc<EntitySchema<E>> {
        &self.schema
    }

    /// Filter on `property` equal to `value`.
    pub fn set_range(&mut self, property: &str, value: impl Into<Value>) -> Result<&mut Self> {
        self.set_range_with(property, Comparison::Equal, value)
    }

    /// Filter on `property` compared against `value` with `op`.
    pub fn set_range_with(
        &mut self,
        property: &str,
        op: Comparison,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        let field = self
            .table()
            .field_by_property_name(property)
            .ok_or_else(|| TableMapError::UnknownField {
                table: self.table().table_name.clone(),
                name: property.to_string(),
            })?;

        let value = value.into();
        let value = if field.is_key() {
            // Keys are stored as text
            let text = value.canonical_text().ok_or_else(|| {
                TableMapError::UnsupportedFilterValue(format!(
                    "{} values cannot be used as keys",
                    value.kind()
                ))
            })?;
            Value::String(text)
        } else {
            value
        };

        let fragment = condition(&field.storage_name, op, &value)?;
        self.filters.push(fragment);
        Ok(self)
    }

    /// Like [`set_range_with`](Record::set_range_with), applied only when
    /// `apply` is true.
    pub fn set_range_if(
        &mut self,
        apply: bool,
        property: &str,
        op: Comparison,
        value: impl Into<Value>,
    ) -> Result<&mut Self> {
        if apply {
            self.set_range_with(property, op, value)
        } else {
            Ok(self)
        }
    }

    /// Drop all accumulated filters.
    pub fn reset(&mut self) -> &mut Self {
        self.filters.clear();
        self
    }

    /// The filter fragments added so far.
    pub fn filters(&self) -> &[String] {
        &self.filters
    }

    /// The expression sent to the table store, including the implicit
    /// fixed partition key condition.
    pub fn filter_expression(&self) -> Result<Option<String>> {
        let mut fragments = Vec::with_capacity(self.filters.len() + 1);
        if let Some(fixed) = &self.table().fixed_partition_key {
            fragments.push(condition(
                PARTITION_KEY,
                Comparison::Equal,
                &Value::String(fixed.clone()),
            )?);
        }
        fragments.extend(self.filters.iter().cloned());
        Ok(combine_all(&fragments))
    }

    fn uses_cache(&self) -> bool {
        self.table().cacheable && self.mapper.cache().is_some()
    }

    fn in_partition(&self, row: &Row) -> bool {
        self.table()
            .fixed_partition_key
            .as_ref()
            .map_or(true, |fixed| &row.partition_key == fixed)
    }

    async fn resolve_rows(&self, keys_only: bool) -> Result<Arc<Vec<Row>>> {
        let table_name = self.table().table_name.as_str();

        if let Some(cache) = self.mapper.cache().filter(|_| self.table().cacheable) {
            if !self.filters.is_empty() {
                return Err(TableMapError::FiltersNotSupportedOnCacheableTable {
                    table: table_name.to_string(),
                });
            }
            let client = Arc::clone(self.mapper.client());
            return read_through(&**cache, table_name, |table| async move {
                client.query(&table, None, None).await
            })
            .await;
        }

        let filter = self.filter_expression()?;
        let projection = keys_only.then_some(&KEY_COLUMNS[..]);
        log::debug!(
            "Querying '{table_name}' with filter {}",
            filter.as_deref().unwrap_or("<none>")
        );
        let rows = self
            .mapper
            .client()
            .query(table_name, filter.as_deref(), projection)
            .await?;
        Ok(Arc::new(rows))
    }

    /// Rows and their records, keeping those accepted by `predicate`.
    async fn materialize<P>(&self, predicate: P) -> Result<Vec<(Row, E)>>
    where
        P: Fn(&E) -> bool,
    {
        let rows = self.resolve_rows(false).await?;
        let conv = self.mapper.conversion();
        let mut matched = Vec::new();
        for row in rows.iter().filter(|row| self.in_partition(row)) {
            let item = from_row(row, &self.schema, conv)?;
            if predicate(&item) {
                matched.push((row.keys_only(), item));
            }
        }
        Ok(matched)
    }

    /// All records matching the accumulated filters.
    pub async fn read(&self) -> Result<Vec<E>> {
        self.read_where(|_| true).await
    }

    /// Records matching the accumulated filters and `predicate`, which is
    /// applied after conversion.
    pub async fn read_where<P>(&self, predicate: P) -> Result<Vec<E>>
    where
        P: Fn(&E) -> bool,
    {
        let matched = self.materialize(predicate).await?;
        Ok(matched.into_iter().map(|(_, item)| item).collect())
    }

    pub async fn read_first(&self) -> Result<Option<E>> {
        Ok(self.read().await?.into_iter().next())
    }

    pub async fn read_first_where<P>(&self, predicate: P) -> Result<Option<E>>
    where
        P: Fn(&E) -> bool,
    {
        Ok(self.read_where(predicate).await?.into_iter().next())
    }

    /// Upsert every item in one batch. Accumulated filters are ignored.
    pub async fn store(&self, items: &[E]) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let operations = items
            .iter()
            .map(|item| to_row(item, &self.schema).map(BatchOperation::upsert))
            .collect::<Result<Vec<_>>>()?;

        let table_name = &self.table().table_name;
        log::debug!("Storing {} rows into '{table_name}'", operations.len());
        self.mapper
            .client()
            .submit_batch(table_name, operations)
            .await?;
        self.invalidate().await
    }

    /// Delete everything the accumulated filters match. Only key columns
    /// are fetched from the store.
    pub async fn delete_all(&self) -> Result<usize> {
        let rows = self.resolve_rows(true).await?;
        let keys = rows
            .iter()
            .filter(|row| self.in_partition(row))
            .map(Row::keys_only)
            .collect();
        self.delete_rows(keys).await
    }

    /// Delete the records matching the accumulated filters and `predicate`.
    /// Rows are fully read so the predicate sees every field.
    pub async fn delete_all_where<P>(&self, predicate: P) -> Result<usize>
    where
        P: Fn(&E) -> bool,
    {
        let keys = self
            .materialize(predicate)
            .await?
            .into_iter()
            .map(|(keys, _)| keys)
            .collect();
        self.delete_rows(keys).await
    }

    /// Delete exactly `items`, by key. Accumulated filters are ignored and
    /// repeated keys are deleted once.
    pub async fn delete(&self, items: &[E]) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut keys = Vec::with_capacity(items.len());
        for item in items {
            let row = to_row(item, &self.schema)?.keys_only();
            if seen.insert((row.partition_key.clone(), row.row_key.clone())) {
                keys.push(row);
            }
        }
        self.delete_rows(keys).await
    }

    async fn delete_rows(&self, keys: Vec<Row>) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }
        let count = keys.len();
        let operations = keys.into_iter().map(BatchOperation::delete).collect();

        let table_name = &self.table().table_name;
        log::debug!("Deleting {count} rows from '{table_name}'");
        self.mapper
            .client()
            .submit_batch(table_name, operations)
            .await?;
        self.invalidate().await?;
        Ok(count)
    }

    /// Runs only after the store operation succeeded.
    async fn invalidate(&self) -> Result<()> {
        if !self.uses_cache() {
            return Ok(());
        }
        if let Some(cache) = self.mapper.cache() {
            reset_locked(&**cache, &self.table().table_name).await?;
        }
        Ok(())
    }
}
