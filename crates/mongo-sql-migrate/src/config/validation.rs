//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::store::tls::SslMode;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    match config.source.r#type.as_str() {
        "dump" => {
            if config.source.path.as_os_str().is_empty() {
                return Err(MigrateError::Config("source.path is required".into()));
            }
        }
        "mongodb" => {
            if config.source.uri.is_empty() {
                return Err(MigrateError::Config("source.uri is required".into()));
            }
            if config.source.database.is_empty() {
                return Err(MigrateError::Config("source.database is required".into()));
            }
        }
        other => {
            return Err(MigrateError::Config(format!(
                "source.type must be 'dump' or 'mongodb', got '{}'",
                other
            )));
        }
    }
    if config.source.registry_collection.is_empty() {
        return Err(MigrateError::Config(
            "source.registry_collection cannot be empty".into(),
        ));
    }

    // Target validation
    if !matches!(config.target.r#type.as_str(), "postgres" | "mysql") {
        return Err(MigrateError::Config(format!(
            "target.type must be 'postgres' or 'mysql', got '{}'",
            config.target.r#type
        )));
    }
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }
    SslMode::parse(&config.target.ssl_mode)?;

    // Migration validation
    let migration = &config.migration;
    if migration.admin_model.is_empty() {
        return Err(MigrateError::Config(
            "migration.admin_model is required".into(),
        ));
    }
    if migration.is_dropped(&migration.admin_model) {
        return Err(MigrateError::Config(format!(
            "migration.admin_model '{}' cannot be in drop_models",
            migration.admin_model
        )));
    }
    for uid in migration
        .soft_delete_models
        .iter()
        .chain(migration.audit_user_models.iter())
    {
        if migration.is_dropped(uid) {
            return Err(MigrateError::Config(format!(
                "model '{}' is both dropped and given synthetic fields",
                uid
            )));
        }
    }
    if migration.attachment_table.is_empty() {
        return Err(MigrateError::Config(
            "migration.attachment_table cannot be empty".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                r#type: "dump".to_string(),
                path: "./dump".into(),
                uri: String::new(),
                database: String::new(),
                registry_collection: "core_store".to_string(),
                registry_key_prefix: "model_def".to_string(),
            },
            target: TargetConfig {
                r#type: "postgres".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                database: "strapi".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "public".to_string(),
                ssl_mode: "disable".to_string(),
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_wrong_source_type() {
        let mut config = valid_config();
        config.source.r#type = "couchdb".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_mongodb_source_needs_uri_and_database() {
        let mut config = valid_config();
        config.source.r#type = "mongodb".to_string();
        config.source.path = "".into();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.uri"));

        config.source.uri = "mongodb://localhost:27017".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("source.database"));

        config.source.database = "strapi".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_source_config_debug_redacts_uri() {
        let mut config = valid_config();
        config.source.uri = "mongodb://admin:hunter2@db:27017".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("hunter2"));
    }

    #[test]
    fn test_wrong_target_type() {
        let mut config = valid_config();
        config.target.r#type = "mssql".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_mysql_target_accepted() {
        let mut config = valid_config();
        config.target.r#type = "mysql".to_string();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_invalid_ssl_mode() {
        let mut config = valid_config();
        config.target.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_admin_model_cannot_be_dropped() {
        let mut config = valid_config();
        config
            .migration
            .drop_models
            .insert("strapi::user".to_string());
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("admin_model"));
    }

    #[test]
    fn test_dropped_model_cannot_gain_fields() {
        let mut config = valid_config();
        let uid = "application::plan.plan".to_string();
        config.migration.drop_models.insert(uid.clone());
        config.migration.audit_user_models.insert(uid);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }
}
