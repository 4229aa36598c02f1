//! Filter expressions in the table store's text query grammar.
//!
//! A condition renders as `<field> <op> <literal>`, and conditions combine
//! as `(<a>) and (<b>)`. Literals are typed:
//!
//! | value    | literal                           |
//! |----------|-----------------------------------|
//! | string   | `'O''Brien'`                      |
//! | int/bool | `42`, `true`                      |
//! | double   | `5.0` (always has a decimal point)|
//! | datetime | `datetime'2024-01-02T03:04:05Z'`  |
//! | guid     | `guid'<hyphenated>'`              |

mod parser;

pub use parser::{evaluate, parse, FilterExpr};

use crate::error::{Result, TableMapError};
use crate::value::{format_datetime, Value};
use std::fmt;

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Comparison {
    #[default]
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Comparison {
    pub fn code(self) -> &'static str {
        match self {
            Comparison::Equal => "eq",
            Comparison::NotEqual => "ne",
            Comparison::GreaterThan => "gt",
            Comparison::GreaterThanOrEqual => "ge",
            Comparison::LessThan => "lt",
            Comparison::LessThanOrEqual => "le",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "eq" => Some(Comparison::Equal),
            "ne" => Some(Comparison::NotEqual),
            "gt" => Some(Comparison::GreaterThan),
            "ge" => Some(Comparison::GreaterThanOrEqual),
            "lt" => Some(Comparison::LessThan),
            "le" => Some(Comparison::LessThanOrEqual),
            _ => None,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Operator joining two filter fragments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Logical {
    And,
    Or,
}

impl fmt::Display for Logical {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Logical::And => f.write_str("and"),
            Logical::Or => f.write_str("or"),
        }
    }
}

/// Render a value as a literal of the query grammar.
pub fn render_literal(value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Value::Int(i) => Ok(i.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Double(d) => {
            if !d.is_finite() {
                return Err(TableMapError::UnsupportedFilterValue(format!(
                    "non-finite double {d}"
                )));
            }
            let text = d.to_string();
            if text.contains('.') {
                Ok(text)
            } else {
                Ok(format!("{text}.0"))
            }
        }
        Value::DateTime(dt) => Ok(format!("datetime'{}'", format_datetime(dt))),
        Value::Guid(g) => Ok(format!("guid'{g}'")),
        Value::Int64(_) | Value::Binary(_) => Err(TableMapError::UnsupportedFilterValue(
            format!("{} values cannot be used in filters", value.kind()),
        )),
    }
}

/// Render one `field op literal` condition.
pub fn condition(field: &str, op: Comparison, value: &Value) -> Result<String> {
    Ok(format!("{field} {op} {}", render_literal(value)?))
}

/// Join two fragments: `(a) op (b)`.
pub fn combine(a: &str, op: Logical, b: &str) -> String {
    format!("({a}) {op} ({b})")
}

/// "And" together fragments left to right. `None` when there are none.
pub fn combine_all<S: AsRef<str>>(fragments: &[S]) -> Option<String> {
    let mut iter = fragments.iter();
    let first = iter.next()?.as_ref().to_string();
    Some(iter.fold(first, |acc, next| combine(&acc, Logical::And, next.as_ref())))
}
