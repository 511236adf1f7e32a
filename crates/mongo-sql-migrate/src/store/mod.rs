//! Source and target store adapters.

pub mod convert;
pub mod dump;
pub mod memory;
pub mod mongo;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod postgres;
pub mod tls;

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::config::Config;
use crate::core::{Document, SourceStore, TargetStore};
use crate::error::{MigrateError, Result};

pub use dump::DumpSource;
pub use memory::{MemorySource, MemoryTarget};
pub use mongo::MongoSource;
#[cfg(feature = "mysql")]
pub use mysql::MysqlTarget;
pub use postgres::PgTarget;

/// Open the configured source store.
pub async fn connect_source(config: &Config) -> Result<Arc<dyn SourceStore>> {
    match config.source.r#type.to_lowercase().as_str() {
        "dump" => Ok(Arc::new(DumpSource::new(&config.source).await?)),
        "mongodb" => Ok(Arc::new(MongoSource::connect(&config.source).await?)),
        other => Err(MigrateError::Config(format!(
            "unsupported source type '{}'",
            other
        ))),
    }
}

/// The model definition held by a registry entry.
///
/// The `value` field is serialized JSON text, or an already-parsed object.
/// Entries without one are skipped.
pub(crate) fn registry_definition(entry: &Document) -> Result<Option<Value>> {
    match entry.get("value") {
        Some(Value::String(text)) => serde_json::from_str(text).map(Some).map_err(|e| {
            MigrateError::Source(format!(
                "registry entry {} holds invalid JSON: {}",
                entry.key, e
            ))
        }),
        Some(value @ Value::Object(_)) => Ok(Some(value.clone())),
        _ => {
            warn!("Registry entry {} has no definition value, skipping", entry.key);
            Ok(None)
        }
    }
}

/// Open the configured target store.
pub async fn connect_target(config: &Config) -> Result<Arc<dyn TargetStore>> {
    let preserved = &config.migration.preserved_tables;
    match config.target.r#type.to_lowercase().as_str() {
        "postgres" => Ok(Arc::new(PgTarget::connect(&config.target, preserved).await?)),
        #[cfg(feature = "mysql")]
        "mysql" => Ok(Arc::new(MysqlTarget::connect(&config.target, preserved).await?)),
        #[cfg(not(feature = "mysql"))]
        "mysql" => Err(MigrateError::Config(
            "MySQL target support requires the 'mysql' feature".into(),
        )),
        other => Err(MigrateError::Config(format!(
            "unsupported target type '{}'",
            other
        ))),
    }
}
