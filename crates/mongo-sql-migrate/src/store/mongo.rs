//! Source store over a live MongoDB database.
//!
//! Model definitions come from a key-prefix query on the registry collection
//! in reverse natural order. Each container scan is a cursor drained by a
//! spawned task into the scan channel.

use std::time::Duration;

use async_trait::async_trait;
use bson::{doc, Document as BsonDocument};
use mongodb::options::{ClientOptions, FindOptions};
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::{Document, SourceStore};
use crate::error::Result;
use crate::store::convert::document_from_bson;
use crate::store::registry_definition;

/// Server selection and connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Documents buffered between the cursor task and the consumer.
const SCAN_CHANNEL_CAPACITY: usize = 256;

/// MongoDB source.
pub struct MongoSource {
    client: Client,
    db: Database,
    registry_collection: String,
    registry_key_prefix: String,
}

impl MongoSource {
    /// Connect to the source database.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let mut options = ClientOptions::parse(&config.uri).await?;
        options.app_name = Some(env!("CARGO_PKG_NAME").to_string());
        options.connect_timeout = Some(CONNECT_TIMEOUT);
        options.server_selection_timeout = Some(CONNECT_TIMEOUT);

        let client = Client::with_options(options)?;
        let db = client.database(&config.database);
        db.run_command(doc! {"ping": 1}, None).await?;

        info!("Connected to MongoDB source: {}", config.database);
        Ok(Self {
            client,
            db,
            registry_collection: config.registry_collection.clone(),
            registry_key_prefix: config.registry_key_prefix.clone(),
        })
    }

    fn collection(&self, name: &str) -> Collection<BsonDocument> {
        self.db.collection(name)
    }
}

/// Registry entries whose key starts with `prefix`.
fn registry_filter(prefix: &str) -> BsonDocument {
    doc! {"key": {"$regex": format!("^\\Q{}\\E", prefix)}}
}

/// Newest entries first.
fn newest_first() -> FindOptions {
    FindOptions::builder()
        .sort(doc! {"$natural": -1})
        .build()
}

#[async_trait]
impl SourceStore for MongoSource {
    async fn load_model_definitions(&self) -> Result<Vec<Value>> {
        let mut cursor = self
            .collection(&self.registry_collection)
            .find(registry_filter(&self.registry_key_prefix), newest_first())
            .await?;

        let mut definitions = Vec::new();
        while cursor.advance().await? {
            let entry = document_from_bson(cursor.deserialize_current()?)?;
            definitions.extend(registry_definition(&entry)?);
        }

        debug!(
            "Loaded {} model definitions from {}",
            definitions.len(),
            self.registry_collection
        );
        Ok(definitions)
    }

    async fn count_documents(&self, container: &str) -> Result<u64> {
        Ok(self.collection(container).count_documents(doc! {}, None).await?)
    }

    fn scan(&self, container: &str) -> mpsc::Receiver<Result<Document>> {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let collection = self.collection(container);

        tokio::spawn(async move {
            if let Err(e) = stream_cursor(collection, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn ping(&self) -> Result<()> {
        self.db.run_command(doc! {"ping": 1}, None).await?;
        Ok(())
    }

    fn store_type(&self) -> &str {
        "mongodb"
    }

    async fn close(&self) {
        self.client.clone().shutdown().await;
    }
}

/// Send every document of a collection. A missing collection is empty.
async fn stream_cursor(
    collection: Collection<BsonDocument>,
    tx: &mpsc::Sender<Result<Document>>,
) -> Result<()> {
    let mut cursor = collection.find(doc! {}, None).await?;
    while cursor.advance().await? {
        let doc = document_from_bson(cursor.deserialize_current()?);
        // Receiver dropped: the consumer stopped early
        if tx.send(doc).await.is_err() {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_filter_anchors_literal_prefix() {
        let filter = registry_filter("model_def");
        let regex = filter
            .get_document("key")
            .unwrap()
            .get_str("$regex")
            .unwrap();
        assert_eq!(regex, "^\\Qmodel_def\\E");
    }

    #[test]
    fn test_registry_sorted_newest_first() {
        let sort = newest_first().sort.unwrap();
        assert_eq!(sort.get_i32("$natural").unwrap(), -1);
    }

    #[tokio::test]
    async fn test_malformed_uri_is_source_error() {
        let config = SourceConfig {
            r#type: "mongodb".into(),
            path: Default::default(),
            uri: "not-a-mongodb-uri".into(),
            database: "strapi".into(),
            registry_collection: "core_store".into(),
            registry_key_prefix: "model_def".into(),
        };
        let err = MongoSource::connect(&config).await.err().unwrap();
        assert_eq!(err.exit_code(), 4);
    }
}
