//! In-memory stores for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};

use crate::core::{Document, Row, SourceStore, SqlValue, TargetStore};
use crate::error::{MigrateError, Result};

/// Source store holding definitions and documents in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    definitions: Vec<Value>,
    containers: HashMap<String, Vec<Value>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a model definition. Definitions are returned in the order added.
    #[must_use]
    pub fn with_definition(mut self, definition: Value) -> Self {
        self.definitions.push(definition);
        self
    }

    /// Append raw documents (each carrying `_id`) to a container.
    #[must_use]
    pub fn with_documents(mut self, container: &str, documents: Vec<Value>) -> Self {
        self.containers
            .entry(container.to_string())
            .or_default()
            .extend(documents);
        self
    }
}

#[async_trait]
impl SourceStore for MemorySource {
    async fn load_model_definitions(&self) -> Result<Vec<Value>> {
        Ok(self.definitions.clone())
    }

    async fn count_documents(&self, container: &str) -> Result<u64> {
        Ok(self.containers.get(container).map_or(0, |docs| docs.len() as u64))
    }

    fn scan(&self, container: &str) -> mpsc::Receiver<Result<Document>> {
        let documents = self.containers.get(container).cloned().unwrap_or_default();
        let (tx, rx) = mpsc::channel(documents.len().max(1));

        tokio::spawn(async move {
            for value in documents {
                if tx.send(Document::from_value(value)).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn store_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

#[derive(Debug, Default)]
struct MemoryTables {
    tables: BTreeMap<String, Vec<Row>>,
    events: Vec<String>,
}

/// Target store recording every write in memory.
///
/// Updates address rows by their `id` column, like the SQL targets.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    state: Mutex<MemoryTables>,
    rejected_tables: BTreeSet<String>,
}

impl MemoryTarget {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every write to `table` fail, to exercise error paths.
    #[must_use]
    pub fn with_rejected_table(mut self, table: &str) -> Self {
        self.rejected_tables.insert(table.to_string());
        self
    }

    /// Rows written to a table, in write order.
    pub async fn rows(&self, table: &str) -> Vec<Row> {
        self.state
            .lock()
            .await
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Row of a table by its `id` column.
    pub async fn row_by_id(&self, table: &str, id: i64) -> Option<Row> {
        self.rows(table)
            .await
            .into_iter()
            .find(|row| row.get("id").and_then(SqlValue::as_i64) == Some(id))
    }

    /// Row counts of every table written to.
    pub async fn table_counts(&self) -> BTreeMap<String, usize> {
        self.state
            .lock()
            .await
            .tables
            .iter()
            .map(|(name, rows)| (name.clone(), rows.len()))
            .collect()
    }

    /// Lifecycle calls received, in order.
    pub async fn events(&self) -> Vec<String> {
        self.state.lock().await.events.clone()
    }

    fn check_accepts(&self, table: &str) -> Result<()> {
        if self.rejected_tables.contains(table) {
            return Err(MigrateError::write(table, "table rejected writes"));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetStore for MemoryTarget {
    async fn drop_all_tables(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.tables.clear();
        state.events.push("drop_all_tables".into());
        Ok(())
    }

    async fn before_migration(&self) -> Result<()> {
        self.state.lock().await.events.push("before_migration".into());
        Ok(())
    }

    async fn after_migration(&self) -> Result<()> {
        self.state.lock().await.events.push("after_migration".into());
        Ok(())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        self.check_accepts(table)?;
        self.state
            .lock()
            .await
            .tables
            .entry(table.to_string())
            .or_default()
            .push(row.clone());
        Ok(())
    }

    async fn update_by_id(&self, table: &str, id: i64, row: &Row) -> Result<()> {
        self.check_accepts(table)?;
        let mut state = self.state.lock().await;
        let target = state
            .tables
            .get_mut(table)
            .and_then(|rows| {
                rows.iter_mut()
                    .find(|r| r.get("id").and_then(SqlValue::as_i64) == Some(id))
            })
            .ok_or_else(|| MigrateError::write(table, format!("no row with id {}", id)))?;

        for (column, value) in row.iter() {
            target.set(column, value.clone());
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    fn dialect(&self) -> &str {
        "memory"
    }

    async fn close(&self) {
        self.state.lock().await.events.push("close".into());
    }
}
