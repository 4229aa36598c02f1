use crate::cache::{MemoryTableCache, SqliteTableCache, TableCache};
use crate::error::{Result, TableMapError};
use crate::value::Conversion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Mapper settings, usually loaded from a YAML file.
///
/// ```yaml
/// strict_conversion: false
/// default_datetime: 1970-01-01T00:00:00Z
/// cache:
///   kind: sqlite
///   path: cache.db
/// tables:
///   settings: { cacheable: true }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapperConfig {
    #[serde(default)]
    pub strict_conversion: bool,
    #[serde(default)]
    pub default_datetime: DateTime<Utc>,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub tables: HashMap<String, TableOptions>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub kind: CacheKind,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    #[serde(rename = "none")]
    Disabled,
    #[default]
    Memory,
    Sqlite,
}

/// Per-table overrides of what the entity descriptor declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableOptions {
    #[serde(default)]
    pub cacheable: Option<bool>,
}

impl MapperConfig {
    pub fn conversion(&self) -> Conversion {
        Conversion {
            strict: self.strict_conversion,
            default_datetime: self.default_datetime,
        }
    }

    /// Build the configured cache, if any.
    pub fn build_cache(&self) -> Result<Option<Arc<dyn TableCache>>> {
        match self.cache.kind {
            CacheKind::Disabled => Ok(None),
            CacheKind::Memory => Ok(Some(Arc::new(MemoryTableCache::new()))),
            CacheKind::Sqlite => {
                let path = self.cache.path.as_deref().ok_or_else(|| {
                    TableMapError::Config("sqlite cache requires a path".into())
                })?;
                let cache = if path == ":memory:" {
                    SqliteTableCache::open_in_memory()?
                } else {
                    SqliteTableCache::open(Path::new(path))?
                };
                Ok(Some(Arc::new(cache)))
            }
        }
    }
}

/// Parse a config YAML file into a MapperConfig
pub fn parse_config(path: &Path) -> Result<MapperConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse a config YAML string into a MapperConfig
pub fn parse_config_str(content: &str) -> Result<MapperConfig> {
    let config: MapperConfig = serde_yaml::from_str(content)?;
    Ok(config)
}
