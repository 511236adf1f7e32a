//! PostgreSQL target store.
//!
//! Uses deadpool-postgres for the connection and holds a single session for
//! the whole run, so `session_replication_role` set before the migration stays
//! in force for every write.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use tokio::sync::Mutex;
use tokio_postgres::types::ToSql;
use tokio_postgres::Config as PgConfig;
use tracing::{debug, info, warn};

use super::tls::SslMode;
use crate::config::TargetConfig;
use crate::core::{Row, TargetStore};
use crate::error::{MigrateError, Result};

/// Connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// PostgreSQL bind-parameter limit per statement.
const MAX_PARAMS: usize = 65_535;

/// PostgreSQL target.
pub struct PgTarget {
    pool: Pool,
    session: Object,
    schema: String,
    preserved_tables: Vec<String>,
    /// Column name to declared type, per table.
    column_types: Mutex<HashMap<String, HashMap<String, String>>>,
}

impl PgTarget {
    /// Connect to the target database.
    pub async fn connect(config: &TargetConfig, preserved_tables: &[String]) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.port);
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let mgr = match SslMode::parse(&config.ssl_mode)?.connector()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
        };
        let pool = Pool::builder(mgr)
            .max_size(1)
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL target pool"))?;

        let session = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "connecting to PostgreSQL target"))?;
        session.simple_query("SELECT 1").await?;

        info!(
            "Connected to PostgreSQL target: {}:{}/{}",
            config.host, config.port, config.database
        );

        Ok(Self {
            pool,
            session,
            schema: config.schema.clone(),
            preserved_tables: preserved_tables.to_vec(),
            column_types: Mutex::new(HashMap::new()),
        })
    }

    fn qualify(&self, table: &str) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(table))
    }

    /// Declared column types of a table, introspected once and cached.
    async fn column_types(&self, table: &str) -> Result<HashMap<String, String>> {
        let mut cache = self.column_types.lock().await;
        if let Some(types) = cache.get(table) {
            return Ok(types.clone());
        }

        let rows = self
            .session
            .query(
                "SELECT a.attname, format_type(a.atttypid, a.atttypmod)
                 FROM pg_attribute a
                 JOIN pg_class c ON a.attrelid = c.oid
                 JOIN pg_namespace n ON c.relnamespace = n.oid
                 WHERE n.nspname = $1 AND c.relname = $2
                   AND a.attnum > 0 AND NOT a.attisdropped",
                &[&self.schema, &table],
            )
            .await?;

        if rows.is_empty() {
            return Err(MigrateError::write(
                table,
                format!("table does not exist in schema {}", self.schema),
            ));
        }

        let types: HashMap<String, String> = rows
            .iter()
            .map(|r| (r.get::<_, String>(0), r.get::<_, String>(1)))
            .collect();
        debug!("Introspected {} columns of {}", types.len(), table);
        cache.insert(table.to_string(), types.clone());
        Ok(types)
    }

    /// `$n::text::<type>` placeholder for a column.
    fn placeholder(
        table: &str,
        types: &HashMap<String, String>,
        column: &str,
        n: usize,
    ) -> Result<String> {
        let ty = types.get(column).ok_or_else(|| {
            MigrateError::write(table, format!("column \"{}\" does not exist", column))
        })?;
        Ok(format!("${}::text::{}", n, ty))
    }

    async fn execute(&self, table: &str, sql: &str, params: &[Option<String>]) -> Result<u64> {
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();
        self.session
            .execute(sql, &refs)
            .await
            .map_err(|e| MigrateError::write(table, describe(&e)))
    }

    async fn insert_chunk(&self, table: &str, rows: &[Row]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };
        let types = self.column_types(table).await?;
        let columns = first.columns();

        let mut params = Vec::with_capacity(rows.len() * columns.len());
        let mut tuples = Vec::with_capacity(rows.len());
        for row in rows {
            let mut placeholders = Vec::with_capacity(columns.len());
            for (column, value) in row.iter() {
                params.push(value.to_sql_text());
                placeholders.push(Self::placeholder(table, &types, column, params.len())?);
            }
            tuples.push(format!("({})", placeholders.join(", ")));
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES {}",
            self.qualify(table),
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            tuples.join(", ")
        );
        self.execute(table, &sql, &params).await?;
        Ok(())
    }

    async fn reset_id_sequence(&self, table: &str) -> Result<()> {
        let qualified = self.qualify(table);
        let row = self
            .session
            .query_one("SELECT pg_get_serial_sequence($1, 'id')", &[&qualified])
            .await?;
        let Some(sequence) = row.get::<_, Option<String>>(0) else {
            return Ok(());
        };

        let sql = format!(
            "SELECT setval('{}', COALESCE((SELECT MAX(\"id\") FROM {}), 1), \
             (SELECT MAX(\"id\") FROM {}) IS NOT NULL)",
            sequence.replace('\'', "''"),
            qualified,
            qualified
        );
        self.session.execute(&sql, &[]).await?;
        debug!("Reset sequence {} for {}", sequence, table);
        Ok(())
    }

    async fn tables_with_id(&self) -> Result<Vec<String>> {
        let rows = self
            .session
            .query(
                "SELECT table_name FROM information_schema.columns
                 WHERE table_schema = $1 AND column_name = 'id'",
                &[&self.schema],
            )
            .await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }
}

#[async_trait]
impl TargetStore for PgTarget {
    async fn drop_all_tables(&self) -> Result<()> {
        let rows = self
            .session
            .query(
                "SELECT tablename FROM pg_tables WHERE schemaname = $1 ORDER BY tablename",
                &[&self.schema],
            )
            .await?;
        let tables: Vec<String> = rows
            .iter()
            .map(|r| r.get::<_, String>(0))
            .filter(|t| !self.preserved_tables.contains(t))
            .collect();

        self.column_types.lock().await.clear();
        if tables.is_empty() {
            info!("No tables to clear in schema {}", self.schema);
            return Ok(());
        }

        let sql = format!(
            "TRUNCATE TABLE {} RESTART IDENTITY CASCADE",
            tables.iter().map(|t| self.qualify(t)).collect::<Vec<_>>().join(", ")
        );
        self.session.batch_execute(&sql).await?;
        info!("Cleared {} tables in schema {}", tables.len(), self.schema);
        Ok(())
    }

    async fn before_migration(&self) -> Result<()> {
        self.session
            .batch_execute("SET session_replication_role = replica")
            .await?;
        debug!("Foreign key checks disabled for the session");
        Ok(())
    }

    async fn after_migration(&self) -> Result<()> {
        self.session
            .batch_execute("SET session_replication_role = DEFAULT")
            .await?;
        for table in self.tables_with_id().await? {
            self.reset_id_sequence(&table).await?;
        }
        Ok(())
    }

    async fn insert_row(&self, table: &str, row: &Row) -> Result<()> {
        self.insert_chunk(table, std::slice::from_ref(row)).await
    }

    async fn insert_rows(&self, table: &str, rows: &[Row]) -> Result<()> {
        let Some(first) = rows.first() else {
            return Ok(());
        };

        let uniform = rows.iter().all(|r| r.columns() == first.columns());
        if !uniform {
            for row in rows {
                self.insert_row(table, row).await?;
            }
            return Ok(());
        }

        let per_chunk = (MAX_PARAMS / first.len().max(1)).max(1);
        for chunk in rows.chunks(per_chunk) {
            self.insert_chunk(table, chunk).await?;
        }
        Ok(())
    }

    async fn update_by_id(&self, table: &str, id: i64, row: &Row) -> Result<()> {
        if row.is_empty() {
            return Ok(());
        }
        let types = self.column_types(table).await?;

        let mut params: Vec<Option<String>> = Vec::with_capacity(row.len() + 1);
        let mut assignments = Vec::with_capacity(row.len());
        for (column, value) in row.iter() {
            params.push(value.to_sql_text());
            assignments.push(format!(
                "{} = {}",
                quote_ident(column),
                Self::placeholder(table, &types, column, params.len())?
            ));
        }
        params.push(Some(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE \"id\" = {}",
            self.qualify(table),
            assignments.join(", "),
            Self::placeholder(table, &types, "id", params.len())?
        );
        let updated = self.execute(table, &sql, &params).await?;
        if updated == 0 {
            return Err(MigrateError::write(table, format!("no row with id {}", id)));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.session.simple_query("SELECT 1").await?;
        Ok(())
    }

    fn dialect(&self) -> &str {
        "postgres"
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// Quote a PostgreSQL identifier.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Server message and detail of a database error, when there is one.
fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => match db.detail() {
            Some(detail) => format!("{} ({})", db.message(), detail),
            None => db.message().to_string(),
        },
        None => e.to_string(),
    }
}
