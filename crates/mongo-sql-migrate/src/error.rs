//! Error types for the migration library.

use thiserror::Error;

/// Main error type for migration operations.
///
/// Every variant is fatal: the run has no recovery tier, so callers propagate
/// these with `?` until the orchestrator closes the stores and returns.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, bad model options, unknown types, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// A source key was assigned a target id more than once.
    #[error("Duplicate identifier: source key {key} already assigned (container {container})")]
    DuplicateIdentifier { container: String, key: String },

    /// A reference points at a source key that never received a target id.
    #[error("Dangling reference to {key} ({context})")]
    DanglingReference { key: String, context: String },

    /// A required attribute is absent and declares no default.
    #[error("Model {model}: required attribute '{attribute}' missing in document {document}")]
    MissingRequired {
        model: String,
        attribute: String,
        document: String,
    },

    /// The target store rejected an insert or update.
    #[error("Write to {table} failed: {message}")]
    Write { table: String, message: String },

    /// Source store could not be read or parsed.
    #[error("Source error: {0}")]
    Source(String),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Write error
    pub fn write(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Write {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a DanglingReference error
    pub fn dangling(key: impl Into<String>, context: impl Into<String>) -> Self {
        MigrateError::DanglingReference {
            key: key.into(),
            context: context.into(),
        }
    }

    /// Whether this error is a data integrity failure in the source documents.
    pub fn is_data_integrity(&self) -> bool {
        matches!(
            self,
            MigrateError::DuplicateIdentifier { .. }
                | MigrateError::DanglingReference { .. }
                | MigrateError::MissingRequired { .. }
        )
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) => 1,
            MigrateError::DuplicateIdentifier { .. }
            | MigrateError::DanglingReference { .. }
            | MigrateError::MissingRequired { .. } => 2,
            MigrateError::Write { .. } => 3,
            MigrateError::Source(_) => 4,
            MigrateError::Target(_) | MigrateError::Pool { .. } => 5,
            MigrateError::Json(_) => 6,
            // Malformed YAML is a configuration problem from the user's point of view
            MigrateError::Yaml(_) => 1,
            MigrateError::Io(_) => 7,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

impl From<mongodb::error::Error> for MigrateError {
    fn from(err: mongodb::error::Error) -> Self {
        MigrateError::Source(err.to_string())
    }
}

impl From<bson::de::Error> for MigrateError {
    fn from(err: bson::de::Error) -> Self {
        MigrateError::Source(format!("undecodable document: {}", err))
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
