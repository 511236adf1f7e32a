//! # mongo-sql-migrate
//!
//! One-shot migration of a MongoDB-backed content store into a relational
//! schema.
//!
//! The library reconciles the store's serialized model definitions into an
//! ordered registry, classifies every relation attribute, then writes the
//! target in two passes:
//!
//! - **Row pass**: one row per document with a freshly assigned sequential id
//! - **Link pass**: inline foreign keys, join tables, component links,
//!   attachments and polymorphic links, with every source key translated
//!
//! ## Example
//!
//! ```rust,no_run
//! use mongo_sql_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> mongo_sql_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} rows", result.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod materialize;
pub mod model;
pub mod naming;
pub mod orchestrator;
pub mod relation;
pub mod store;
pub mod translate;

// Re-exports for convenient access
pub use config::{Config, MigrationConfig, SourceConfig, TargetConfig};
pub use core::{Document, Row, SourceStore, SqlValue, TargetStore};
pub use error::{MigrateError, Result};
pub use materialize::ModelStats;
pub use model::{ModelDefinition, ModelRegistry};
pub use orchestrator::{HealthCheckResult, MigrationResult, ModelPlan, Orchestrator};
pub use relation::{classify, LinkAction, Relation, RelationPlan};
pub use store::{DumpSource, MemorySource, MemoryTarget, MongoSource, PgTarget};
pub use translate::{AdminUserIds, IdentifierTranslator};
