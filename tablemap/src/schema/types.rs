use crate::error::{Result, TableMapError};
use crate::value::{Conversion, Scalar, ScalarKind, Value, PARTITION_KEY, ROW_KEY};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;

/// A record type that can be mapped onto a table.
///
/// Implementors declare their shape once through a [`Descriptor`]:
///
/// ```
/// use tablemap::{Descriptor, Entity};
///
/// #[derive(Default)]
/// struct Instrument {
///     name: String,
///     manufacturer: String,
///     strings: i32,
/// }
///
/// impl Entity for Instrument {
///     fn descriptor() -> Descriptor<Self> {
///         Descriptor::new()
///             .row_key("Name", |i: &Self| &i.name, |i| &mut i.name)
///             .partition_key("Manufacturer", |i: &Self| &i.manufacturer, |i| &mut i.manufacturer)
///             .field("Strings", |i: &Self| &i.strings, |i| &mut i.strings)
///     }
/// }
/// ```
pub trait Entity: Default + Send + Sync + 'static {
    fn descriptor() -> Descriptor<Self>;
}

/// A mapped property: where it lives in the table and what it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Field {
    pub storage_name: String,
    pub property_name: String,
    /// Always `String` for the two key fields.
    pub storage_type: ScalarKind,
    pub declared_type: ScalarKind,
}

impl Field {
    pub fn is_partition_key(&self) -> bool {
        self.storage_name == PARTITION_KEY
    }

    pub fn is_row_key(&self) -> bool {
        self.storage_name == ROW_KEY
    }

    pub fn is_key(&self) -> bool {
        self.is_partition_key() || self.is_row_key()
    }
}

/// The untyped shape of a registered table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSchema {
    pub table_name: String,
    pub fixed_partition_key: Option<String>,
    pub partition_key: Option<Field>,
    pub row_key: Field,
    pub fields: Vec<Field>,
    pub cacheable: bool,
}

impl TableSchema {
    /// Key fields first (partition, then row), then mapped fields.
    fn lookup_order(&self) -> impl Iterator<Item = &Field> {
        self.partition_key
            .iter()
            .chain(std::iter::once(&self.row_key))
            .chain(self.fields.iter())
    }

    pub fn field_by_property_name(&self, name: &str) -> Option<&Field> {
        self.lookup_order().find(|f| f.property_name == name)
    }

    pub fn field_by_storage_name(&self, name: &str) -> Option<&Field> {
        self.lookup_order().find(|f| f.storage_name == name)
    }
}

type Getter<E> = Box<dyn Fn(&E) -> Option<Value> + Send + Sync>;
type Setter<E> = Box<dyn Fn(&mut E, &Value, &Conversion) -> Result<()> + Send + Sync>;
type KeyGetter<E> = Box<dyn Fn(&E) -> String + Send + Sync>;
type KeySetter<E> = Box<dyn Fn(&mut E, &str, &Conversion) -> Result<()> + Send + Sync>;

/// Type-erased accessors for one property of `E`.
pub(crate) struct Binding<E> {
    pub(crate) get_value: Getter<E>,
    pub(crate) set_value: Setter<E>,
    pub(crate) get_key: KeyGetter<E>,
    pub(crate) set_key: KeySetter<E>,
}

impl<E: 'static> Binding<E> {
    fn new<T: Scalar>(get: fn(&E) -> &T, get_mut: fn(&mut E) -> &mut T) -> Self {
        Binding {
            get_value: Box::new(move |item| get(item).to_value()),
            set_value: Box::new(move |item, value, conv| {
                *get_mut(item) = T::from_value(value, conv)?;
                Ok(())
            }),
            get_key: Box::new(move |item| get(item).to_key()),
            set_key: Box::new(move |item, text, conv| {
                *get_mut(item) = T::from_key(text, conv)?;
                Ok(())
            }),
        }
    }
}

enum Role {
    PartitionKey,
    RowKey,
    Field { storage_name: Option<String> },
}

struct Declaration<E> {
    property: String,
    role: Role,
    kind: ScalarKind,
    binding: Binding<E>,
}

/// Statically declared shape of an [`Entity`].
pub struct Descriptor<E> {
    declarations: Vec<Declaration<E>>,
    cacheable: bool,
}

impl<E: 'static> Default for Descriptor<E> {
    fn default() -> Self {
        Descriptor {
            declarations: Vec::new(),
            cacheable: false,
        }
    }
}

impl<E: 'static> Descriptor<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn partition_key<T: Scalar>(
        self,
        property: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        self.declare::<T>(property, Role::PartitionKey, get, get_mut)
    }

    pub fn row_key<T: Scalar>(
        self,
        property: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        self.declare::<T>(property, Role::RowKey, get, get_mut)
    }

    /// Map a property stored under its own name.
    pub fn field<T: Scalar>(
        self,
        property: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        self.declare::<T>(property, Role::Field { storage_name: None }, get, get_mut)
    }

    /// Map a property stored under a different column name.
    pub fn field_as<T: Scalar>(
        self,
        property: &str,
        storage_name: &str,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        let role = Role::Field {
            storage_name: Some(storage_name.to_string()),
        };
        self.declare::<T>(property, role, get, get_mut)
    }

    /// Serve reads of this table from the table cache.
    pub fn cacheable(mut self) -> Self {
        self.cacheable = true;
        self
    }

    fn declare<T: Scalar>(
        mut self,
        property: &str,
        role: Role,
        get: fn(&E) -> &T,
        get_mut: fn(&mut E) -> &mut T,
    ) -> Self {
        self.declarations.push(Declaration {
            property: property.to_string(),
            role,
            kind: T::KIND,
            binding: Binding::new(get, get_mut),
        });
        self
    }
}

/// A validated table schema together with the typed accessors for `E`.
pub struct EntitySchema<E> {
    table: Arc<TableSchema>,
    pub(crate) partition_key: Option<Binding<E>>,
    pub(crate) row_key: Binding<E>,
    /// Parallel to `table.fields`.
    pub(crate) fields: Vec<Binding<E>>,
}

impl<E: 'static> EntitySchema<E> {
    /// Validate a descriptor and bind it to `table_name`.
    pub fn build(
        descriptor: Descriptor<E>,
        table_name: &str,
        fixed_partition_key: Option<&str>,
        cacheable: Option<bool>,
    ) -> Result<Self> {
        if table_name.trim().is_empty() {
            return Err(TableMapError::Schema("Table name must not be empty".into()));
        }
        let fixed_partition_key = fixed_partition_key
            .filter(|pk| !pk.is_empty())
            .map(str::to_string);

        let mut partition_key = None;
        let mut row_key = None;
        let mut fields = Vec::new();
        let mut bindings = Vec::new();
        let mut seen = HashSet::new();

        for decl in descriptor.declarations {
            match decl.role {
                Role::PartitionKey => {
                    if partition_key.is_some() {
                        return Err(TableMapError::Schema(format!(
                            "Table '{table_name}' declares more than one partition key"
                        )));
                    }
                    let field = key_field(PARTITION_KEY, &decl.property, decl.kind);
                    partition_key = Some((field, decl.binding));
                }
                Role::RowKey => {
                    if row_key.is_some() {
                        return Err(TableMapError::Schema(format!(
                            "Table '{table_name}' declares more than one row key"
                        )));
                    }
                    let field = key_field(ROW_KEY, &decl.property, decl.kind);
                    row_key = Some((field, decl.binding));
                }
                Role::Field { storage_name } => {
                    let storage_name = storage_name.unwrap_or_else(|| decl.property.clone());
                    if storage_name == PARTITION_KEY || storage_name == ROW_KEY {
                        return Err(TableMapError::Schema(format!(
                            "Field '{}' on table '{table_name}' uses reserved name '{storage_name}'",
                            decl.property
                        )));
                    }
                    if !seen.insert(storage_name.clone()) {
                        return Err(TableMapError::Schema(format!(
                            "Table '{table_name}' maps '{storage_name}' more than once"
                        )));
                    }
                    fields.push(Field {
                        storage_name,
                        property_name: decl.property,
                        storage_type: decl.kind,
                        declared_type: decl.kind,
                    });
                    bindings.push(decl.binding);
                }
            }
        }

        let (row_key_field, row_key) = row_key.ok_or_else(|| {
            TableMapError::Schema(format!("Table '{table_name}' has no row key field"))
        })?;

        match (&partition_key, &fixed_partition_key) {
            (None, None) => {
                return Err(TableMapError::Schema(format!(
                    "Table '{table_name}' has neither a partition key field nor a fixed partition key"
                )));
            }
            (Some(_), Some(fixed)) => {
                return Err(TableMapError::Schema(format!(
                    "Table '{table_name}' declares a partition key field and fixed partition key '{fixed}'"
                )));
            }
            _ => {}
        }
        let (partition_key_field, partition_key) = partition_key.unzip();

        let table = TableSchema {
            table_name: table_name.to_string(),
            fixed_partition_key,
            partition_key: partition_key_field,
            row_key: row_key_field,
            fields,
            cacheable: cacheable.unwrap_or(descriptor.cacheable),
        };

        Ok(EntitySchema {
            table: Arc::new(table),
            partition_key,
            row_key,
            fields: bindings,
        })
    }

    pub fn table(&self) -> &TableSchema {
        &self.table
    }

    pub fn shared_table(&self) -> Arc<TableSchema> {
        Arc::clone(&self.table)
    }

    pub fn table_name(&self) -> &str {
        &self.table.table_name
    }
}

fn key_field(storage_name: &str, property: &str, declared: ScalarKind) -> Field {
    Field {
        storage_name: storage_name.to_string(),
        property_name: property.to_string(),
        storage_type: ScalarKind::String,
        declared_type: declared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Instrument {
        name: String,
        manufacturer: String,
        strings: i32,
        price: f64,
    }

    fn instrument() -> Descriptor<Instrument> {
        Descriptor::new()
            .row_key("Name", |i: &Instrument| &i.name, |i| &mut i.name)
            .partition_key(
                "Manufacturer",
                |i: &Instrument| &i.manufacturer,
                |i| &mut i.manufacturer,
            )
            .field("Strings", |i: &Instrument| &i.strings, |i| &mut i.strings)
            .field_as("Price", "ListPrice", |i: &Instrument| &i.price, |i| &mut i.price)
    }

    #[test]
    fn test_build_schema() {
        let schema = EntitySchema::build(instrument(), "instruments", None, None).unwrap();
        let table = schema.table();

        assert_eq!(table.table_name, "instruments");
        assert_eq!(table.row_key.storage_name, ROW_KEY);
        assert_eq!(table.row_key.property_name, "Name");
        assert!(table.row_key.is_row_key());
        assert!(table.partition_key.as_ref().unwrap().is_partition_key());
        assert_eq!(
            table.fields.iter().map(|f| f.storage_name.as_str()).collect::<Vec<_>>(),
            vec!["Strings", "ListPrice"]
        );
        assert_eq!(schema.fields.len(), table.fields.len());
        assert!(!table.cacheable);
    }

    #[test]
    fn test_key_storage_type_is_string() {
        #[derive(Default)]
        struct Reading {
            sequence: i32,
            value: f64,
        }
        let descriptor = Descriptor::new()
            .row_key("Sequence", |r: &Reading| &r.sequence, |r| &mut r.sequence)
            .field("Value", |r: &Reading| &r.value, |r| &mut r.value);
        let schema = EntitySchema::build(descriptor, "readings", Some("ALL"), None).unwrap();

        assert_eq!(schema.table().row_key.storage_type, ScalarKind::String);
        assert_eq!(schema.table().row_key.declared_type, ScalarKind::Int);
        assert_eq!(schema.table().fixed_partition_key.as_deref(), Some("ALL"));
    }

    #[test]
    fn test_missing_row_key_fails() {
        let descriptor = Descriptor::new().partition_key(
            "Manufacturer",
            |i: &Instrument| &i.manufacturer,
            |i| &mut i.manufacturer,
        );
        let err = EntitySchema::build(descriptor, "instruments", None, None).err().unwrap();
        assert!(matches!(err, TableMapError::Schema(_)));
    }

    #[test]
    fn test_missing_partition_key_fails() {
        let descriptor =
            Descriptor::new().row_key("Name", |i: &Instrument| &i.name, |i| &mut i.name);
        assert!(EntitySchema::build(descriptor, "instruments", None, None).is_err());

        // An empty fixed key does not count
        let descriptor =
            Descriptor::new().row_key("Name", |i: &Instrument| &i.name, |i| &mut i.name);
        assert!(EntitySchema::build(descriptor, "instruments", Some(""), None).is_err());

        let descriptor =
            Descriptor::new().row_key("Name", |i: &Instrument| &i.name, |i| &mut i.name);
        assert!(EntitySchema::build(descriptor, "instruments", Some("ALL"), None).is_ok());
    }

    #[test]
    fn test_partition_key_field_and_fixed_key_conflict() {
        assert!(EntitySchema::build(instrument(), "instruments", Some("ALL"), None).is_err());
    }

    #[test]
    fn test_duplicate_keys_fail() {
        let descriptor = instrument().row_key("Other", |i: &Instrument| &i.name, |i| &mut i.name);
        assert!(EntitySchema::build(descriptor, "instruments", None, None).is_err());
    }

    #[test]
    fn test_reserved_and_duplicate_storage_names_fail() {
        let descriptor =
            instrument().field_as("Alias", ROW_KEY, |i: &Instrument| &i.name, |i| &mut i.name);
        assert!(EntitySchema::build(descriptor, "instruments", None, None).is_err());

        let descriptor =
            instrument().field("Strings", |i: &Instrument| &i.strings, |i| &mut i.strings);
        assert!(EntitySchema::build(descriptor, "instruments", None, None).is_err());
    }

    #[test]
    fn test_field_lookup_order() {
        let schema = EntitySchema::build(instrument(), "instruments", None, None).unwrap();
        let table = schema.table();

        assert!(table.field_by_property_name("Manufacturer").unwrap().is_partition_key());
        assert!(table.field_by_property_name("Name").unwrap().is_row_key());
        assert_eq!(
            table.field_by_property_name("Price").unwrap().storage_name,
            "ListPrice"
        );
        assert_eq!(
            table.field_by_storage_name("ListPrice").unwrap().property_name,
            "Price"
        );
        assert!(table.field_by_storage_name("Price").is_none());
        assert!(table.field_by_property_name("Missing").is_none());
    }

    #[test]
    fn test_cacheable_override() {
        let schema =
            EntitySchema::build(instrument().cacheable(), "instruments", None, None).unwrap();
        assert!(schema.table().cacheable);

        let descriptor = instrument().cacheable();
        let schema = EntitySchema::build(descriptor, "instruments", None, Some(false)).unwrap();
        assert!(!schema.table().cacheable);
    }
}
