use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableMapError {
    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Type not registered: {0}")]
    NotRegistered(String),

    #[error("Unknown field '{name}' on table '{table}'")]
    UnknownField { table: String, name: String },

    #[error("Unsupported type for field '{field}': {kind}")]
    UnsupportedType { field: String, kind: String },

    #[error("Unsupported filter value: {0}")]
    UnsupportedFilterValue(String),

    #[error("Cannot convert '{input}' to {target}")]
    Conversion { target: String, input: String },

    #[error("Table '{table}' is cacheable and does not support server-side filters")]
    FiltersNotSupportedOnCacheableTable { table: String },

    #[error("Table store error: {0}")]
    Store(String),

    #[error("Filter parse error: {0}")]
    FilterParse(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, TableMapError>;
