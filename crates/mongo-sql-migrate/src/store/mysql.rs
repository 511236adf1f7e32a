//! MySQL/MariaDB target store (cargo feature `mysql`).
//!
//! Holds one connection for the run so `FOREIGN_KEY_CHECKS` stays disabled
//! between `before_migration` and `after_migration`.

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Params, Pool, SslOpts};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::TargetConfig;
use crate::core::{Row, SqlValue, TargetStore};
use crate::error::{MigrateError, Result};

/// MySQL target.
pub struct MysqlTarget {
    pool: Pool,
    conn: Mutex<Conn>,
    preserved_tables: Vec<String>,
}

impl MysqlTarget {
    /// Connect to the target database.
    pub async fn connect(config: &TargetConfig, preserved_tables: &[String]) -> Result<Self> {
        let ssl_opts = match config.ssl_mode.to_lowercase().as_str() {
            "disable" => {
                warn!("MySQL TLS is disabled. Credentials will be transmitted in plaintext.");
                None
            }
            "require" => Some(SslOpts::default().with_danger_accept_invalid_certs(true)),
            "verify-ca" | "verify-full" => Some(SslOpts::default()),
            other => {
                return Err(MigrateError::Config(format!(
                    "Invalid ssl_mode '{}'. Valid values: disable, require, verify-ca, verify-full",
                    other
                )))
            }
        };

        let mut builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            .init(vec!["SET NAMES utf8mb4"]);
        if let Some(ssl) = ssl_opts {
            builder = builder.ssl_opts(ssl);
        }

        let pool = Pool::new(Opts::from(builder));
        let mut conn = pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::pool(e, "connecting to MySQL target"))?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL target connection"))?;

        info!(
            "Connected to MySQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            conn: Mutex::new(conn),
            preserved_tables: preserved_tables.to_vec(),
        })
    }

    async fn run(&self, context: &str, sql: &str) -> Result<()> {
        self.conn
            .lock()
            .await
            .query_drop(sql)
            .await
            .map_err(|e| MigrateError::write(context, e))
    }
}

#[async_trait]
impl TargetStore for MysqlTarget {
    async fn drop_all_tables(&self) -> Result<()> {
        let tables: Vec<String> = self
            .conn
            .lock()
            .await
            .query(
                "SELECT table_name FROM information_schema.tables \
                 WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'",
            )
            .await
            .map_err(|e| MigrateError::write("information_schema.tables", e))?;

        self.run("FOREIGN_KEY_CHECKS", "SET FOREIGN_KEY_CHECKS = 0").await?;
        let mut cleared = 0;
        for table in tables.iter().filter(|t| !self.preserved_tables.contains(t)) {
            self.run(table, &format!("TRUNCATE TABLE {}", quote_ident(table)))
                .await?;
            cleared += 1;
        }
        self.run("FOREIGN_KEY_CHECKS", "SET FOREIGN_KEY_CHECKS = 1").await?;
        info!("Cleared {} tables", cleared);
        Ok(())
    }

    async fn before_migration(&self) -> Result<()> {
        self.run("FOREIGN_KEY_CHECKS", "SET FOREIGN_KEY_CHECKS = 0").await?;
        debug!("Foreign key checks disabled for the session");
        Ok(())
    }

    async fn after_migration(&self) -> Result<()> {
        // AUTO_INCREMENT follows MAX(id) on its own
        self.run("FOREIGN_KEY_CHECKS", "SET FOREIGN_KEY_CHECKS = 1").await
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(table),
            row.columns().iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            vec!["?"; row.len()].join(", ")
        );
        let params = Params::Positional(row.values().iter().map(to_mysql_value).collect());
        self.conn
            .lock()
            .await
            .exec_drop(sql, params)
            .await
            .map_err(|e| MigrateError::write(table, e))
    }

    async fn update_by_id(&self, table: &str, id: i64, row: &Row) -> Result<()> {
        if row.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "UPDATE {} SET {} WHERE `id` = ?",
            quote_ident(table),
            row.columns()
                .iter()
                .map(|c| format!("{} = ?", quote_ident(c)))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut values: Vec<mysql_async::Value> = row.values().iter().map(to_mysql_value).collect();
        values.push(mysql_async::Value::from(id));

        let mut conn = self.conn.lock().await;
        conn.exec_drop(sql, Params::Positional(values))
            .await
            .map_err(|e| MigrateError::write(table, e))?;
        if conn.affected_rows() == 0 {
            // MySQL reports 0 when the values were already equal, so confirm the row exists
            let exists: Option<i64> = conn
                .exec_first(
                    format!("SELECT 1 FROM {} WHERE `id` = ?", quote_ident(table)),
                    (id,),
                )
                .await
                .map_err(|e| MigrateError::write(table, e))?;
            if exists.is_none() {
                return Err(MigrateError::write(table, format!("no row with id {}", id)));
            }
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.conn
            .lock()
            .await
            .ping()
            .await
            .map_err(|e| MigrateError::pool(e, "pinging MySQL target"))
    }

    fn dialect(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        if let Err(e) = self.pool.clone().disconnect().await {
            warn!("Error closing MySQL pool: {}", e);
        }
    }
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn to_mysql_value(value: &SqlValue) -> mysql_async::Value {
    match value {
        SqlValue::Null => mysql_async::Value::NULL,
        SqlValue::Bool(b) => mysql_async::Value::from(*b),
        SqlValue::I64(i) => mysql_async::Value::from(*i),
        SqlValue::F64(f) => mysql_async::Value::from(*f),
        SqlValue::Text(s) | SqlValue::Json(s) => mysql_async::Value::from(s.as_str()),
        SqlValue::Timestamp(ts) => {
            mysql_async::Value::from(ts.format("%Y-%m-%d %H:%M:%S%.6f").to_string())
        }
    }
}
