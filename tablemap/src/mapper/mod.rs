use crate::cache::TableCache;
use crate::client::TableClient;
use crate::config::{MapperConfig, TableOptions};
use crate::error::Result;
use crate::record::Record;
use crate::schema::{Entity, EntitySchema, SchemaRegistry};
use crate::value::Conversion;
use std::collections::HashMap;
use std::sync::Arc;

/// The main entry point: ties the schema registry, the table store client,
/// and the optional table cache together, and hands out [`Record`] handles.
pub struct TableMapper {
    registry: Arc<SchemaRegistry>,
    client: Arc<dyn TableClient>,
    cache: Option<Arc<dyn TableCache>>,
    conversion: Conversion,
    tables: HashMap<String, TableOptions>,
}

impl TableMapper {
    /// A mapper with a fresh registry, no cache and lenient conversion.
    pub fn new(client: Arc<dyn TableClient>) -> Self {
        TableMapper {
            registry: Arc::new(SchemaRegistry::new()),
            client,
            cache: None,
            conversion: Conversion::default(),
            tables: HashMap::new(),
        }
    }

    /// Build a mapper from configuration: conversion mode, cache backend
    /// and per-table overrides.
    pub fn from_config(config: &MapperConfig, client: Arc<dyn TableClient>) -> Result<Self> {
        let mut mapper = TableMapper::new(client).with_conversion(config.conversion());
        mapper.cache = config.build_cache()?;
        mapper.tables = config.tables.clone();
        Ok(mapper)
    }

    pub fn with_cache(mut self, cache: Arc<dyn TableCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a registry between several mappers.
    pub fn with_registry(mut self, registry: Arc<SchemaRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_conversion(mut self, conversion: Conversion) -> Self {
        self.conversion = conversion;
        self
    }

    /// Register `E`, applying any configured override for `table_name`.
    pub fn register<E: Entity>(
        &self,
        table_name: &str,
        fixed_partition_key: Option<&str>,
    ) -> Result<Arc<EntitySchema<E>>> {
        let cacheable = self.tables.get(table_name).and_then(|t| t.cacheable);
        self.registry
            .register_with::<E>(table_name, fixed_partition_key, cacheable)
    }

    /// A fresh query/record handle for `E`.
    pub fn record<E: Entity>(&self) -> Result<Record<'_, E>> {
        let schema = self.registry.get::<E>()?;
        Ok(Record::new(self, schema))
    }

    /// Create every registered table that does not exist yet, then
    /// prepare the cache.
    pub async fn ensure_tables(&self) -> Result<()> {
        for table in self.registry.list() {
            self.client.create_table_if_missing(&table.table_name).await?;
        }
        if let Some(cache) = &self.cache {
            cache.initialize().await?;
        }
        Ok(())
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn client(&self) -> &Arc<dyn TableClient> {
        &self.client
    }

    pub fn cache(&self) -> Option<&Arc<dyn TableCache>> {
        self.cache.as_ref()
    }

    pub fn conversion(&self) -> &Conversion {
        &self.conversion
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryTableClient;
    use crate::config::parse_config_str;
    use crate::error::TableMapError;
    use crate::schema::Descriptor;

    #[derive(Debug, Default)]
    struct Setting {
        key: String,
        value: String,
    }

    impl Entity for Setting {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::new()
                .row_key("Key", |s: &Self| &s.key, |s| &mut s.key)
                .field("Value", |s: &Self| &s.value, |s| &mut s.value)
        }
    }

    #[tokio::test]
    async fn test_ensure_tables_creates_registered() {
        let client = Arc::new(MemoryTableClient::new());
        let mapper = TableMapper::new(client.clone());
        mapper.register::<Setting>("settings", Some("ALL")).unwrap();

        mapper.ensure_tables().await.unwrap();
        assert!(client.query("settings", None, None).await.is_ok());
    }

    #[test]
    fn test_record_requires_registration() {
        let mapper = TableMapper::new(Arc::new(MemoryTableClient::new()));
        let err = mapper.record::<Setting>().err().unwrap();
        assert!(matches!(err, TableMapError::NotRegistered(_)));
    }

    #[test]
    fn test_config_overrides_cacheable() {
        let config = parse_config_str(
            "strict_conversion: true\ntables:\n  settings: { cacheable: true }\n",
        )
        .unwrap();
        let mapper =
            TableMapper::from_config(&config, Arc::new(MemoryTableClient::new())).unwrap();

        let schema = mapper.register::<Setting>("settings", Some("ALL")).unwrap();
        assert!(schema.table().cacheable);
        assert!(mapper.cache().is_some());
        assert!(mapper.conversion().strict);
    }

    #[test]
    fn test_shared_registry() {
        let registry = Arc::new(SchemaRegistry::new());
        let first = TableMapper::new(Arc::new(MemoryTableClient::new()))
            .with_registry(Arc::clone(&registry));
        first.register::<Setting>("settings", Some("ALL")).unwrap();

        let second = TableMapper::new(Arc::new(MemoryTableClient::new())).with_registry(registry);
        assert!(second.record::<Setting>().is_ok());
    }
}
