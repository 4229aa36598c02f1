// Scalar values, rows, and the string coercion table shared by keys and fields

use crate::error::{Result, TableMapError};
use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Reserved storage name of the partition key column.
pub const PARTITION_KEY: &str = "PartitionKey";
/// Reserved storage name of the row key column.
pub const ROW_KEY: &str = "RowKey";

/// The kinds of scalar a table property can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    String,
    Int,
    Double,
    Bool,
    Guid,
    DateTime,
    /// Stored by the table service but not mapped onto record fields.
    Int64,
    /// Stored by the table service but not mapped onto record fields.
    Binary,
}

impl ScalarKind {
    /// Whether records can carry this kind.
    pub fn is_mapped(self) -> bool {
        !matches!(self, ScalarKind::Int64 | ScalarKind::Binary)
    }

    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Int => "int",
            ScalarKind::Double => "double",
            ScalarKind::Bool => "bool",
            ScalarKind::Guid => "guid",
            ScalarKind::DateTime => "datetime",
            ScalarKind::Int64 => "int64",
            ScalarKind::Binary => "binary",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single property value as held in a [`Row`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Int(i32),
    Double(f64),
    Bool(bool),
    Guid(Uuid),
    DateTime(DateTime<Utc>),
    Int64(i64),
    Binary(Vec<u8>),
}

impl Value {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Value::String(_) => ScalarKind::String,
            Value::Int(_) => ScalarKind::Int,
            Value::Double(_) => ScalarKind::Double,
            Value::Bool(_) => ScalarKind::Bool,
            Value::Guid(_) => ScalarKind::Guid,
            Value::DateTime(_) => ScalarKind::DateTime,
            Value::Int64(_) => ScalarKind::Int64,
            Value::Binary(_) => ScalarKind::Binary,
        }
    }

    /// Locale-independent text form used for key storage.
    /// `None` for kinds that have no key representation.
    pub fn canonical_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Int(i) => Some(i.to_string()),
            Value::Double(d) => Some(d.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Guid(g) => Some(g.to_string()),
            Value::DateTime(dt) => Some(format_datetime(dt)),
            Value::Int64(_) | Value::Binary(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int64(i) => write!(f, "{i}"),
            Value::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            other => f.write_str(&other.canonical_text().unwrap_or_default()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<Uuid> for Value {
    fn from(value: Uuid) -> Self {
        Value::Guid(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Value::DateTime(value.with_timezone(&Utc))
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Value::DateTime(local_to_utc(&value))
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

/// The generic wire-level record exchanged with the table store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub partition_key: String,
    pub row_key: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl Row {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Row {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: BTreeMap::new(),
        }
    }

    /// Builder-style property setter.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Look up a column by storage name, including the two key columns.
    pub fn get(&self, name: &str) -> Option<Value> {
        match name {
            PARTITION_KEY => Some(Value::String(self.partition_key.clone())),
            ROW_KEY => Some(Value::String(self.row_key.clone())),
            _ => self.properties.get(name).cloned(),
        }
    }

    /// A copy of this row carrying only the key columns.
    pub fn keys_only(&self) -> Row {
        Row::new(self.partition_key.clone(), self.row_key.clone())
    }

    pub fn same_key(&self, other: &Row) -> bool {
        self.partition_key == other.partition_key && self.row_key == other.row_key
    }
}

/// Options controlling how text and mismatched values are coerced.
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// Fail with a conversion error instead of substituting a default.
    pub strict: bool,
    /// Substituted for unparsable date/time text in lenient mode.
    pub default_datetime: DateTime<Utc>,
}

impl Default for Conversion {
    fn default() -> Self {
        Conversion {
            strict: false,
            default_datetime: DateTime::<Utc>::default(),
        }
    }
}

impl Conversion {
    pub fn strict() -> Self {
        Conversion {
            strict: true,
            ..Conversion::default()
        }
    }

    /// Either fail (strict) or hand back `default` with a warning.
    pub fn fallback<T>(&self, target: ScalarKind, input: &str, default: T) -> Result<T> {
        if self.strict {
            return Err(TableMapError::Conversion {
                target: target.to_string(),
                input: input.to_string(),
            });
        }
        log::warn!("Cannot convert '{input}' to {target}, using default");
        Ok(default)
    }
}

/// Canonical ISO-8601 UTC form, e.g. `2024-03-01T10:00:00Z`.
pub fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse RFC 3339 text, or offset-less ISO text taken as UTC.
pub fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Interpret a naive value as local wall-clock time and normalize to UTC.
pub fn local_to_utc(naive: &NaiveDateTime) -> DateTime<Utc> {
    match Local.from_local_datetime(naive).earliest() {
        Some(local) => local.with_timezone(&Utc),
        // Wall-clock time skipped by a DST transition
        None => Utc.from_utc_datetime(naive),
    }
}

pub fn utc_to_local(dt: &DateTime<Utc>) -> NaiveDateTime {
    dt.with_timezone(&Local).naive_local()
}

fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// A Rust type that can be bound to a table property.
pub trait Scalar: Sized + Send + Sync + 'static {
    const KIND: ScalarKind;

    /// `None` means the property is absent from the row.
    fn to_value(&self) -> Option<Value>;

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self>;

    /// Canonical text used when the property is a partition or row key.
    fn to_key(&self) -> String;

    fn from_key(text: &str, conv: &Conversion) -> Result<Self>;
}

/// Shared decode path: exact kind first, then text through the coercion
/// table, otherwise a conversion failure.
fn decode<T: Scalar>(
    value: &Value,
    conv: &Conversion,
    exact: impl FnOnce(&Value) -> Option<T>,
    default: impl FnOnce() -> T,
) -> Result<T> {
    if let Some(v) = exact(value) {
        return Ok(v);
    }
    if let Value::String(text) = value {
        return T::from_key(text, conv);
    }
    conv.fallback(T::KIND, &value.to_string(), default())
}

impl Scalar for String {
    const KIND: ScalarKind = ScalarKind::String;

    fn to_value(&self) -> Option<Value> {
        Some(Value::String(self.clone()))
    }

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        match value.canonical_text() {
            Some(text) => Ok(text),
            None => conv.fallback(Self::KIND, &value.to_string(), String::new()),
        }
    }

    fn to_key(&self) -> String {
        self.clone()
    }

    fn from_key(text: &str, _conv: &Conversion) -> Result<Self> {
        Ok(text.to_string())
    }
}

impl Scalar for i32 {
    const KIND: ScalarKind = ScalarKind::Int;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Int(*self))
    }

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        decode(
            value,
            conv,
            |v| match v {
                Value::Int(i) => Some(*i),
                _ => None,
            },
            || 0,
        )
    }

    fn to_key(&self) -> String {
        self.to_string()
    }

    fn from_key(text: &str, conv: &Conversion) -> Result<Self> {
        match text.trim().parse() {
            Ok(i) => Ok(i),
            Err(_) => conv.fallback(Self::KIND, text, 0),
        }
    }
}

impl Scalar for f64 {
    const KIND: ScalarKind = ScalarKind::Double;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Double(*self))
    }

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        decode(
            value,
            conv,
            |v| match v {
                Value::Double(d) => Some(*d),
                Value::Int(i) => Some(f64::from(*i)),
                _ => None,
            },
            || 0.0,
        )
    }

    fn to_key(&self) -> String {
        self.to_string()
    }

    fn from_key(text: &str, conv: &Conversion) -> Result<Self> {
        match text.trim().parse() {
            Ok(d) => Ok(d),
            Err(_) => conv.fallback(Self::KIND, text, 0.0),
        }
    }
}

impl Scalar for bool {
    const KIND: ScalarKind = ScalarKind::Bool;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Bool(*self))
    }

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        decode(
            value,
            conv,
            |v| match v {
                Value::Bool(b) => Some(*b),
                _ => None,
            },
            || false,
        )
    }

    fn to_key(&self) -> String {
        self.to_string()
    }

    fn from_key(text: &str, conv: &Conversion) -> Result<Self> {
        match parse_bool(text) {
            Some(b) => Ok(b),
            None => conv.fallback(Self::KIND, text, false),
        }
    }
}

impl Scalar for Uuid {
    const KIND: ScalarKind = ScalarKind::Guid;

    fn to_value(&self) -> Option<Value> {
        Some(Value::Guid(*self))
    }

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        decode(
            value,
            conv,
            |v| match v {
                Value::Guid(g) => Some(*g),
                _ => None,
            },
            Uuid::nil,
        )
    }

    fn to_key(&self) -> String {
        self.to_string()
    }

    fn from_key(text: &str, conv: &Conversion) -> Result<Self> {
        match Uuid::parse_str(text.trim()) {
            Ok(g) => Ok(g),
            Err(_) => conv.fallback(Self::KIND, text, Uuid::nil()),
        }
    }
}

impl Scalar for DateTime<Utc> {
    const KIND: ScalarKind = ScalarKind::DateTime;

    fn to_value(&self) -> Option<Value> {
        Some(Value::DateTime(*self))
    }

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        decode(
            value,
            conv,
            |v| match v {
                Value::DateTime(dt) => Some(*dt),
                _ => None,
            },
            || conv.default_datetime,
        )
    }

    fn to_key(&self) -> String {
        format_datetime(self)
    }

    fn from_key(text: &str, conv: &Conversion) -> Result<Self> {
        match parse_datetime(text) {
            Some(dt) => Ok(dt),
            None => conv.fallback(Self::KIND, text, conv.default_datetime),
        }
    }
}

impl Scalar for DateTime<FixedOffset> {
    const KIND: ScalarKind = ScalarKind::DateTime;

    fn to_value(&self) -> Option<Value> {
        Some(Value::DateTime(self.with_timezone(&Utc)))
    }

    // Zone-carrying: the stored UTC instant is kept as-is.
    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        DateTime::<Utc>::from_value(value, conv).map(DateTime::<FixedOffset>::from)
    }

    fn to_key(&self) -> String {
        format_datetime(&self.with_timezone(&Utc))
    }

    fn from_key(text: &str, conv: &Conversion) -> Result<Self> {
        DateTime::<Utc>::from_key(text, conv).map(DateTime::<FixedOffset>::from)
    }
}

/// Naive values are local wall-clock time in records and UTC in rows.
impl Scalar for NaiveDateTime {
    const KIND: ScalarKind = ScalarKind::DateTime;

    fn to_value(&self) -> Option<Value> {
        Some(Value::DateTime(local_to_utc(self)))
    }

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        DateTime::<Utc>::from_value(value, conv).map(|dt| utc_to_local(&dt))
    }

    fn to_key(&self) -> String {
        format_datetime(&local_to_utc(self))
    }

    fn from_key(text: &str, conv: &Conversion) -> Result<Self> {
        DateTime::<Utc>::from_key(text, conv).map(|dt| utc_to_local(&dt))
    }
}

impl<T: Scalar> Scalar for Option<T> {
    const KIND: ScalarKind = T::KIND;

    fn to_value(&self) -> Option<Value> {
        self.as_ref().and_then(T::to_value)
    }

    fn from_value(value: &Value, conv: &Conversion) -> Result<Self> {
        T::from_value(value, conv).map(Some)
    }

    fn to_key(&self) -> String {
        self.as_ref().map(T::to_key).unwrap_or_default()
    }

    fn from_key(text: &str, conv: &Conversion) -> Result<Self> {
        if text.is_empty() {
            return Ok(None);
        }
        T::from_key(text, conv).map(Some)
    }
}
