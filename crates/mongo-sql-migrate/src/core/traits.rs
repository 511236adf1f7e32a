//! Store traits the migration engine runs against.
//!
//! - [`SourceStore`]: the document store, with its schema registry container
//! - [`TargetStore`]: the relational store
//!
//! Connection handling and SQL dialect details live behind these traits; the
//! registry, translator and materializers only see documents and rows.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::mpsc;

use crate::error::{MigrateError, Result};

use super::value::Row;

/// Field holding a document's source key.
pub const KEY_FIELD: &str = "_id";

/// A source document: its unique key and every other field.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub fields: Map<String, Value>,
}

impl Document {
    /// Build a document from a JSON object carrying `_id`.
    pub fn from_value(value: Value) -> Result<Self> {
        let Value::Object(mut fields) = value else {
            return Err(MigrateError::Source(format!(
                "document is not a JSON object: {}",
                value
            )));
        };

        let key = match fields.remove(KEY_FIELD) {
            Some(Value::String(s)) => s,
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                return Err(MigrateError::Source(format!(
                    "unsupported document key {}",
                    other
                )))
            }
            None => {
                return Err(MigrateError::Source(format!(
                    "document without {}: {}",
                    KEY_FIELD,
                    Value::Object(fields)
                )))
            }
        };

        Ok(Self { key, fields })
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// A field that is present and not null.
    pub fn present(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// The document as pretty JSON, key included, for diagnostics.
    pub fn to_json_pretty(&self) -> String {
        let mut obj = Map::new();
        obj.insert(KEY_FIELD.to_string(), Value::String(self.key.clone()));
        obj.extend(self.fields.clone());
        serde_json::to_string_pretty(&Value::Object(obj)).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Read model definitions and documents from the source store.
///
/// # Streaming
///
/// [`scan`](SourceStore::scan) returns a channel receiver; implementations
/// spawn a task that feeds it, so a container is never held in memory whole.
/// Every container is scanned twice per run, once per pass.
#[async_trait]
pub trait SourceStore: Send + Sync {
    /// Serialized model definitions from the schema registry container,
    /// newest first.
    async fn load_model_definitions(&self) -> Result<Vec<Value>>;

    /// Number of documents in a container.
    async fn count_documents(&self, container: &str) -> Result<u64>;

    /// Start a full scan of a container.
    fn scan(&self, container: &str) -> mpsc::Receiver<Result<Document>>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// Store type identifier (e.g. "dump", "mongodb", "memory").
    fn store_type(&self) -> &str;

    /// Release the store.
    async fn close(&self);
}

/// Write rows to the target store.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// Empty every table of the target schema (except preserved tables).
    async fn drop_all_tables(&self) -> Result<()>;

    /// Session setup before the first write (e.g. disable FK checks).
    async fn before_migration(&self) -> Result<()>;

    /// Session teardown after the last write (e.g. restore FK checks, reset sequences).
    async fn after_migration(&self) -> Result<()>;

    /// Insert one row.
    async fn insert_row(&self, table: &str, row: &Row) -> Result<()>;

    /// Insert several rows into one table.
    ///
    /// The default inserts them one by one.
    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<()> {
        for row in rows {
            self.insert_row(table, row).await?;
        }
        Ok(())
    }

    /// Update the columns in `row` on the row whose `id` is `id`.
    async fn update_by_id(&self, table: &str, id: i64, row: &Row) -> Result<()>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<()>;

    /// SQL dialect name (e.g. "postgres", "mysql", "memory").
    fn dialect(&self) -> &str;

    /// Release the store.
    async fn close(&self);
}
