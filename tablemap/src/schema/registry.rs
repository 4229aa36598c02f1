use super::types::{Entity, EntitySchema, TableSchema};
use crate::error::{Result, TableMapError};
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
struct Registered {
    by_type: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
    by_name: HashMap<String, Arc<TableSchema>>,
    ordered: Vec<Arc<TableSchema>>,
}

/// Holds every registered schema for the lifetime of the mapper.
///
/// Each type registers once, usually at startup. Lookups by table name
/// return the most recently registered schema for that name.
#[derive(Default)]
pub struct SchemaRegistry {
    inner: RwLock<Registered>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `E` against `table_name`.
    pub fn register<E: Entity>(
        &self,
        table_name: &str,
        fixed_partition_key: Option<&str>,
    ) -> Result<Arc<EntitySchema<E>>> {
        self.register_with(table_name, fixed_partition_key, None)
    }

    /// Register `E`, optionally overriding the descriptor's cacheable flag.
    pub fn register_with<E: Entity>(
        &self,
        table_name: &str,
        fixed_partition_key: Option<&str>,
        cacheable: Option<bool>,
    ) -> Result<Arc<EntitySchema<E>>> {
        let schema =
            EntitySchema::build(E::descriptor(), table_name, fixed_partition_key, cacheable)?;
        let schema = Arc::new(schema);

        let mut inner = self.inner.write();
        let type_id = TypeId::of::<E>();
        if inner.by_type.contains_key(&type_id) {
            return Err(TableMapError::Schema(format!(
                "Type {} is already registered",
                type_name::<E>()
            )));
        }

        let table = schema.shared_table();
        if inner.by_name.contains_key(table_name) {
            log::warn!("Table '{table_name}' is registered by more than one type; name lookups use the latest");
        }
        inner.by_type.insert(type_id, schema.clone() as Arc<dyn Any + Send + Sync>);
        inner.by_name.insert(table_name.to_string(), Arc::clone(&table));
        inner.ordered.push(table);

        log::info!("Registered {} as table '{table_name}'", type_name::<E>());
        Ok(schema)
    }

    pub fn get<E: Entity>(&self) -> Result<Arc<EntitySchema<E>>> {
        let inner = self.inner.read();
        inner
            .by_type
            .get(&TypeId::of::<E>())
            .cloned()
            .and_then(|any| any.downcast::<EntitySchema<E>>().ok())
            .ok_or_else(|| TableMapError::NotRegistered(type_name::<E>().to_string()))
    }

    pub fn get_by_name(&self, table_name: &str) -> Option<Arc<TableSchema>> {
        self.inner.read().by_name.get(table_name).cloned()
    }

    /// All registered schemas in registration order.
    pub fn list(&self) -> Vec<Arc<TableSchema>> {
        self.inner.read().ordered.clone()
    }

    pub fn contains<E: Entity>(&self) -> bool {
        self.inner.read().by_type.contains_key(&TypeId::of::<E>())
    }
}
