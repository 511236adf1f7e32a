//! Source store over a `mongoexport` dump directory.
//!
//! Every container is a `<name>.json` file holding one document per line, or
//! a single JSON array when exported with `--jsonArray`. Documents are read
//! as extended JSON through `bson` and handed on as plain JSON.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::IgnoredAny;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::core::{Document, SourceStore};
use crate::error::{MigrateError, Result};
use crate::store::convert::extended_json_to_plain;
use crate::store::registry_definition;

/// Documents buffered between the file reader task and the consumer.
const SCAN_CHANNEL_CAPACITY: usize = 256;

/// Dump directory source.
pub struct DumpSource {
    dir: PathBuf,
    registry_collection: String,
    registry_key_prefix: String,
}

impl DumpSource {
    /// Open a dump directory.
    pub async fn new(config: &SourceConfig) -> Result<Self> {
        let metadata = tokio::fs::metadata(&config.path).await.map_err(|e| {
            MigrateError::Source(format!(
                "cannot open dump directory {}: {}",
                config.path.display(),
                e
            ))
        })?;
        if !metadata.is_dir() {
            return Err(MigrateError::Source(format!(
                "{} is not a directory",
                config.path.display()
            )));
        }

        info!("Using dump source: {}", config.path.display());
        Ok(Self {
            dir: config.path.clone(),
            registry_collection: config.registry_collection.clone(),
            registry_key_prefix: config.registry_key_prefix.clone(),
        })
    }

    fn container_path(&self, container: &str) -> PathBuf {
        self.dir.join(format!("{}.json", container))
    }
}

#[async_trait]
impl SourceStore for DumpSource {
    async fn load_model_definitions(&self) -> Result<Vec<Value>> {
        let mut rx = self.scan(&self.registry_collection);
        let mut definitions = Vec::new();

        while let Some(doc) = rx.recv().await {
            let doc = doc?;
            let matches = doc
                .get("key")
                .and_then(Value::as_str)
                .is_some_and(|k| k.starts_with(&self.registry_key_prefix));
            if matches {
                definitions.extend(registry_definition(&doc)?);
            }
        }

        // Newest first
        definitions.reverse();
        debug!(
            "Loaded {} model definitions from {}",
            definitions.len(),
            self.registry_collection
        );
        Ok(definitions)
    }

    async fn count_documents(&self, container: &str) -> Result<u64> {
        count_file(&self.container_path(container)).await
    }

    fn scan(&self, container: &str) -> mpsc::Receiver<Result<Document>> {
        let (tx, rx) = mpsc::channel(SCAN_CHANNEL_CAPACITY);
        let path = self.container_path(container);

        tokio::spawn(async move {
            if let Err(e) = stream_file(&path, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }

    async fn ping(&self) -> Result<()> {
        tokio::fs::metadata(&self.dir).await?;
        Ok(())
    }

    fn store_type(&self) -> &str {
        "dump"
    }

    async fn close(&self) {}
}

/// Send every document of a container file. A missing file is an empty container.
async fn stream_file(path: &Path, tx: &mpsc::Sender<Result<Document>>) -> Result<()> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("{} not found, treating as empty", path.display());
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(file).lines();
    let mut line_no = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed.starts_with('[') {
            let mut text = line.clone();
            while let Some(rest) = lines.next_line().await? {
                text.push('\n');
                text.push_str(&rest);
            }
            let values: Vec<Value> = serde_json::from_str(&text).map_err(|e| {
                MigrateError::Source(format!("{}: invalid JSON array: {}", path.display(), e))
            })?;
            for value in values {
                if tx.send(to_document(value)).await.is_err() {
                    return Ok(());
                }
            }
            return Ok(());
        }

        let value: Value = serde_json::from_str(trimmed).map_err(|e| {
            MigrateError::Source(format!("{}:{}: {}", path.display(), line_no, e))
        })?;
        // Receiver dropped: the consumer stopped early
        if tx.send(to_document(value)).await.is_err() {
            return Ok(());
        }
    }

    Ok(())
}

fn to_document(value: Value) -> Result<Document> {
    Document::from_value(extended_json_to_plain(value)?)
}

/// Count the documents of a container file without decoding them.
async fn count_file(path: &Path) -> Result<u64> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    if text.trim_start().starts_with('[') {
        let items: Vec<IgnoredAny> = serde_json::from_str(&text).map_err(|e| {
            MigrateError::Source(format!("{}: invalid JSON array: {}", path.display(), e))
        })?;
        return Ok(items.len() as u64);
    }

    Ok(text.lines().filter(|line| !line.trim().is_empty()).count() as u64)
}
