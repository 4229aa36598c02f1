// Entity converter: typed records <-> generic rows

use crate::error::{Result, TableMapError};
use crate::schema::{Entity, EntitySchema, Field};
use crate::value::{Conversion, Row};

fn unsupported(field: &Field, kind: impl ToString) -> TableMapError {
    TableMapError::UnsupportedType {
        field: field.property_name.clone(),
        kind: kind.to_string(),
    }
}

/// Convert a record into the row stored for it.
pub fn to_row<E: Entity>(item: &E, schema: &EntitySchema<E>) -> Result<Row> {
    let table = schema.table();

    let partition_key = match (&table.fixed_partition_key, &schema.partition_key) {
        (Some(fixed), _) => fixed.clone(),
        (None, Some(binding)) => (binding.get_key)(item),
        (None, None) => {
            return Err(TableMapError::Schema(format!(
                "Table '{}' has no partition key",
                table.table_name
            )))
        }
    };
    let row_key = (schema.row_key.get_key)(item);

    let mut row = Row::new(partition_key, row_key);
    for (field, binding) in table.fields.iter().zip(&schema.fields) {
        if !field.declared_type.is_mapped() {
            return Err(unsupported(field, field.declared_type));
        }
        if let Some(value) = (binding.get_value)(item) {
            row.properties.insert(field.storage_name.clone(), value);
        }
    }
    Ok(row)
}

/// Build a record from a stored row.
///
/// Fixed-partition tables never write the partition key back onto the
/// record. Properties absent from the row keep their default value.
pub fn from_row<E: Entity>(row: &Row, schema: &EntitySchema<E>, conv: &Conversion) -> Result<E> {
    let table = schema.table();
    let mut item = E::default();

    if table.fixed_partition_key.is_none() {
        if let Some(binding) = &schema.partition_key {
            (binding.set_key)(&mut item, &row.partition_key, conv)?;
        }
    }
    (schema.row_key.set_key)(&mut item, &row.row_key, conv)?;

    for (field, binding) in table.fields.iter().zip(&schema.fields) {
        if !field.declared_type.is_mapped() {
            return Err(unsupported(field, field.declared_type));
        }
        let Some(value) = row.properties.get(&field.storage_name) else {
            continue;
        };
        if !value.kind().is_mapped() {
            return Err(unsupported(field, value.kind()));
        }
        (binding.set_value)(&mut item, value, conv)?;
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Descriptor, SchemaRegistry};
    use crate::value::{Scalar, ScalarKind, Value};
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Everything {
        id: i32,
        group: Uuid,
        label: String,
        ratio: f64,
        active: bool,
        token: Uuid,
        created: DateTime<Utc>,
        shifted: DateTime<FixedOffset>,
        wall_clock: NaiveDateTime,
        note: Option<String>,
        retries: Option<i32>,
    }

    impl Entity for Everything {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::new()
                .row_key("Id", |e: &Self| &e.id, |e| &mut e.id)
                .partition_key("Group", |e: &Self| &e.group, |e| &mut e.group)
                .field("Label", |e: &Self| &e.label, |e| &mut e.label)
                .field("Ratio", |e: &Self| &e.ratio, |e| &mut e.ratio)
                .field("Active", |e: &Self| &e.active, |e| &mut e.active)
                .field("Token", |e: &Self| &e.token, |e| &mut e.token)
                .field("Created", |e: &Self| &e.created, |e| &mut e.created)
                .field("Shifted", |e: &Self| &e.shifted, |e| &mut e.shifted)
                .field("WallClock", |e: &Self| &e.wall_clock, |e| &mut e.wall_clock)
                .field_as("Note", "Comment", |e: &Self| &e.note, |e| &mut e.note)
                .field("Retries", |e: &Self| &e.retries, |e| &mut e.retries)
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Setting {
        scope: String,
        key: String,
        value: String,
    }

    impl Entity for Setting {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::new()
                .partition_key("Scope", |s: &Self| &s.scope, |s| &mut s.scope)
                .row_key("Key", |s: &Self| &s.key, |s| &mut s.key)
                .field("Value", |s: &Self| &s.value, |s| &mut s.value)
        }
    }

    #[derive(Debug, Default)]
    struct Counter {
        name: String,
        total: BigCount,
    }

    #[derive(Debug, Default)]
    struct BigCount(i64);

    impl Scalar for BigCount {
        const KIND: ScalarKind = ScalarKind::Int64;

        fn to_value(&self) -> Option<Value> {
            Some(Value::Int64(self.0))
        }

        fn from_value(value: &Value, _conv: &Conversion) -> Result<Self> {
            match value {
                Value::Int64(i) => Ok(BigCount(*i)),
                _ => Ok(BigCount(0)),
            }
        }

        fn to_key(&self) -> String {
            self.0.to_string()
        }

        fn from_key(text: &str, _conv: &Conversion) -> Result<Self> {
            Ok(BigCount(text.parse().unwrap_or_default()))
        }
    }

    impl Entity for Counter {
        fn descriptor() -> Descriptor<Self> {
            Descriptor::new()
                .row_key("Name", |c: &Self| &c.name, |c| &mut c.name)
                .field("Total", |c: &Self| &c.total, |c| &mut c.total)
        }
    }

    fn sample() -> Everything {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        Everything {
            id: 17,
            group: Uuid::new_v4(),
            label: "O'Brien".into(),
            ratio: 0.25,
            active: true,
            token: Uuid::new_v4(),
            created: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
            shifted: offset.with_ymd_and_hms(2024, 1, 2, 5, 4, 5).unwrap(),
            wall_clock: NaiveDate::from_ymd_opt(2024, 7, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap(),
            note: Some("hello".into()),
            retries: None,
        }
    }

    #[test]
    fn test_to_row_shape() {
        let registry = SchemaRegistry::new();
        let schema = registry.register::<Everything>("everything", None).unwrap();
        let item = sample();

        let row = to_row(&item, &schema).unwrap();
        assert_eq!(row.partition_key, item.group.to_string());
        assert_eq!(row.row_key, "17");
        assert_eq!(row.properties.get("Comment"), Some(&Value::from("hello")));
        assert!(!row.properties.contains_key("Retries"));
        assert_eq!(
            row.properties.get("Shifted"),
            Some(&Value::DateTime(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()))
        );
    }

    #[test]
    fn test_round_trip() {
        let registry = SchemaRegistry::new();
        let schema = registry.register::<Everything>("everything", None).unwrap();
        let item = sample();

        let row = to_row(&item, &schema).unwrap();
        let back: Everything = from_row(&row, &schema, &Conversion::strict()).unwrap();

        assert_eq!(back.id, item.id);
        assert_eq!(back.group, item.group);
        assert_eq!(back.label, item.label);
        assert_eq!(back.ratio, item.ratio);
        assert_eq!(back.active, item.active);
        assert_eq!(back.token, item.token);
        assert_eq!(back.created, item.created);
        // Same instant, normalized to UTC
        assert_eq!(back.shifted, item.shifted);
        assert_eq!(back.shifted.offset().local_minus_utc(), 0);
        assert_eq!(back.wall_clock, item.wall_clock);
        assert_eq!(back.note, item.note);
        assert_eq!(back.retries, None);
    }

    #[test]
    fn test_fixed_partition_key_not_written_back() {
        let registry = SchemaRegistry::new();
        let schema = registry.register::<Setting>("settings", None).unwrap();
        let item = Setting {
            scope: "global".into(),
            key: "theme".into(),
            value: "dark".into(),
        };
        let row = to_row(&item, &schema).unwrap();
        assert_eq!(row.partition_key, "global");

        let fixed_registry = SchemaRegistry::new();
        #[derive(Debug, Default)]
        struct Flag {
            key: String,
        }
        impl Entity for Flag {
            fn descriptor() -> Descriptor<Self> {
                Descriptor::new().row_key("Key", |f: &Self| &f.key, |f| &mut f.key)
            }
        }
        let fixed = fixed_registry.register::<Flag>("flags", Some("ALL")).unwrap();
        let row = to_row(&Flag { key: "beta".into() }, &fixed).unwrap();
        assert_eq!(row.partition_key, "ALL");
        assert_eq!(row.row_key, "beta");

        let back: Flag =
            from_row(&Row::new("OTHER", "beta"), &fixed, &Conversion::default()).unwrap();
        assert_eq!(back.key, "beta");
    }

    #[test]
    fn test_missing_properties_keep_defaults() {
        let registry = SchemaRegistry::new();
        let schema = registry.register::<Setting>("settings", None).unwrap();
        let back: Setting =
            from_row(&Row::new("global", "theme"), &schema, &Conversion::strict()).unwrap();
        assert_eq!(
            back,
            Setting {
                scope: "global".into(),
                key: "theme".into(),
                value: String::new(),
            }
        );
    }

    #[test]
    fn test_key_parse_strict_and_lenient() {
        let registry = SchemaRegistry::new();
        let schema = registry.register::<Everything>("everything", None).unwrap();
        let row = Row::new(Uuid::nil().to_string(), "not-a-number");

        let err = from_row::<Everything>(&row, &schema, &Conversion::strict()).unwrap_err();
        assert!(matches!(err, TableMapError::Conversion { .. }));

        let back: Everything = from_row(&row, &schema, &Conversion::default()).unwrap();
        assert_eq!(back.id, 0);
    }

    #[test]
    fn test_stored_string_coerced_into_field() {
        let registry = SchemaRegistry::new();
        let schema = registry.register::<Everything>("everything", None).unwrap();
        let row = Row::new(Uuid::nil().to_string(), "1")
            .with("Ratio", "1.5")
            .with("Active", "True")
            .with("Created", "2024-05-06T07:08:09Z");

        let back: Everything = from_row(&row, &schema, &Conversion::strict()).unwrap();
        assert_eq!(back.ratio, 1.5);
        assert!(back.active);
        assert_eq!(back.created, Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap());
    }

    #[test]
    fn test_unsupported_stored_kind() {
        let registry = SchemaRegistry::new();
        let schema = registry.register::<Setting>("settings", None).unwrap();
        let row = Row::new("global", "theme").with("Value", Value::Binary(vec![1, 2, 3]));

        let err = from_row::<Setting>(&row, &schema, &Conversion::default()).unwrap_err();
        assert!(matches!(err, TableMapError::UnsupportedType { .. }));
    }

    #[test]
    fn test_unsupported_declared_type() {
        let registry = SchemaRegistry::new();
        let schema = registry.register::<Counter>("counters", Some("ALL")).unwrap();
        let item = Counter {
            name: "hits".into(),
            total: BigCount(5),
        };
        let err = to_row(&item, &schema).unwrap_err();
        assert!(matches!(err, TableMapError::UnsupportedType { .. }));

        let err = from_row::<Counter>(&Row::new("ALL", "hits"), &schema, &Conversion::default())
            .unwrap_err();
        assert!(matches!(err, TableMapError::UnsupportedType { .. }));
    }
}
