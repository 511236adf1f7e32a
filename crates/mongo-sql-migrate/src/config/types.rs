//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source document store (mongoexport dump).
    pub source: SourceConfig,

    /// Target relational database.
    pub target: TargetConfig,

    /// Migration behavior and declarative data corrections.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Source document store configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Source type: "dump" or "mongodb" (default: "dump").
    #[serde(default = "default_dump")]
    pub r#type: String,

    /// Directory holding one `<collection>.json` export per container (dump).
    #[serde(default)]
    pub path: PathBuf,

    /// Connection string (mongodb). May carry credentials; never written back out.
    #[serde(default, skip_serializing)]
    pub uri: String,

    /// Database name (mongodb).
    #[serde(default)]
    pub database: String,

    /// Container holding serialized model definitions (default: "core_store").
    #[serde(default = "default_registry_collection")]
    pub registry_collection: String,

    /// Key prefix selecting model definitions in the registry (default: "model_def").
    #[serde(default = "default_registry_key_prefix")]
    pub registry_key_prefix: String,
}

/// Target database configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type: "postgres" or "mysql".
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never written back out.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("path", &self.path)
            .field("uri", &"[REDACTED]")
            .field("database", &self.database)
            .field("registry_collection", &self.registry_collection)
            .field("registry_key_prefix", &self.registry_key_prefix)
            .finish()
    }
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
///
/// The model lists here are the declarative replacement for per-deployment
/// special cases: they are applied uniformly by the registry and the row
/// materializer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Uid of the administrative user model, materialized first.
    #[serde(default = "default_admin_model")]
    pub admin_model: String,

    /// Plugin owning the file-attachment model.
    #[serde(default = "default_upload_plugin")]
    pub upload_plugin: String,

    /// Name of the file-attachment model inside `upload_plugin`.
    #[serde(default = "default_upload_model")]
    pub upload_model: String,

    /// Polymorphic link table receiving attachment rows.
    #[serde(default = "default_attachment_table")]
    pub attachment_table: String,

    /// Models that gain a stable external id (`uuid`) and a `deleted` flag.
    #[serde(default)]
    pub soft_delete_models: BTreeSet<String>,

    /// Models that gain `created_by` / `updated_by` audit-user columns.
    #[serde(default)]
    pub audit_user_models: BTreeSet<String>,

    /// Models discarded entirely.
    #[serde(default)]
    pub drop_models: BTreeSet<String>,

    /// Attribute names stripped from every model.
    #[serde(default)]
    pub deprecated_attributes: BTreeSet<String>,

    /// Attribute names stripped from specific models, keyed by uid.
    #[serde(default)]
    pub attribute_removals: BTreeMap<String, Vec<String>>,

    /// Fields whose empty-string values are written as NULL, keyed by uid.
    #[serde(default)]
    pub empty_string_as_null: BTreeMap<String, Vec<String>>,

    /// Tables left untouched when the target is cleared.
    #[serde(default = "default_preserved_tables")]
    pub preserved_tables: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            admin_model: default_admin_model(),
            upload_plugin: default_upload_plugin(),
            upload_model: default_upload_model(),
            attachment_table: default_attachment_table(),
            soft_delete_models: BTreeSet::new(),
            audit_user_models: BTreeSet::new(),
            drop_models: BTreeSet::new(),
            deprecated_attributes: BTreeSet::new(),
            attribute_removals: BTreeMap::new(),
            empty_string_as_null: BTreeMap::new(),
            preserved_tables: default_preserved_tables(),
        }
    }
}

impl MigrationConfig {
    /// Whether a model uid is on the drop-list.
    pub fn is_dropped(&self, uid: &str) -> bool {
        self.drop_models.contains(uid)
    }

    /// Fields of a model that turn empty strings into NULL.
    pub fn empty_string_fields(&self, uid: &str) -> &[String] {
        self.empty_string_as_null
            .get(uid)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

// Default value functions for serde
fn default_dump() -> String {
    "dump".to_string()
}

fn default_registry_collection() -> String {
    "core_store".to_string()
}

fn default_registry_key_prefix() -> String {
    "model_def".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_admin_model() -> String {
    "strapi::user".to_string()
}

fn default_upload_plugin() -> String {
    "upload".to_string()
}

fn default_upload_model() -> String {
    "file".to_string()
}

fn default_attachment_table() -> String {
    "upload_file_morph".to_string()
}

fn default_preserved_tables() -> Vec<String> {
    vec!["strapi_migrations".to_string()]
}
