//! Relational sink
//!
//! [`TableSink`] is the load seam; [`MySqlSink`] writes through a `sqlx`
//! connection pool, one pooled connection per load.

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlConnectOptions, MySqlPool, MySqlPoolOptions};
use sqlx::{Connection, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::table::{ColumnType, TableBatch, Value};
use crate::config::SinkConfig;
use crate::error::LoadError;

/// MySQL caps a statement at 65535 placeholders.
const MAX_PLACEHOLDERS: usize = 65_535;

/// Rows per multi-row INSERT.
const MAX_ROWS_PER_INSERT: usize = 1_000;

/// Full-table-replace write of a named table
#[async_trait]
pub trait TableSink: Send + Sync {
    /// Drop `batch.name` if present, recreate it from the batch schema and
    /// insert every row. Returns the number of rows written.
    async fn replace_table(&self, batch: &TableBatch) -> Result<u64, LoadError>;

    /// Connections available for concurrent loads, if bounded
    fn max_connections(&self) -> Option<u32> {
        None
    }
}

#[derive(Clone)]
pub struct MySqlSink {
    pool: MySqlPool,
}

impl MySqlSink {
    /// Build a pool that connects on first use
    ///
    /// An unreachable server then surfaces as a per-file [`LoadError`].
    pub fn connect_lazy(config: &SinkConfig) -> Self {
        let pool = pool_options(config).connect_lazy_with(connect_options(config));
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            max_connections = config.max_connections,
            "MySQL sink configured"
        );
        Self { pool }
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn connect_options(config: &SinkConfig) -> MySqlConnectOptions {
    MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.username)
        .password(&config.password)
        .database(&config.database)
}

fn pool_options(config: &SinkConfig) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
}

#[async_trait]
impl TableSink for MySqlSink {
    #[instrument(skip_all, fields(table = %batch.name))]
    async fn replace_table(&self, batch: &TableBatch) -> Result<u64, LoadError> {
        if batch.columns.is_empty() {
            return Err(LoadError::Rejected {
                table: batch.name.clone(),
                reason: "batch has no columns".to_string(),
            });
        }

        let write_err = |source| LoadError::Write {
            table: batch.name.clone(),
            source,
        };

        let mut conn = self.pool.acquire().await.map_err(LoadError::Connect)?;

        // DDL commits implicitly in MySQL, so only the inserts share a transaction.
        sqlx::query(&drop_table_sql(&batch.name))
            .execute(&mut *conn)
            .await
            .map_err(write_err)?;
        sqlx::query(&create_table_sql(batch))
            .execute(&mut *conn)
            .await
            .map_err(write_err)?;

        let mut tx = conn.begin().await.map_err(write_err)?;
        let mut written = 0u64;
        let column_list = batch
            .columns
            .iter()
            .map(|c| quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");

        for chunk in batch.rows.chunks(rows_per_statement(batch.columns.len())) {
            let mut builder: QueryBuilder<MySql> = QueryBuilder::new(format!(
                "INSERT INTO {} ({}) ",
                quote_identifier(&batch.name),
                column_list
            ));
            builder.push_values(chunk, |mut row_builder, row| {
                for value in row {
                    match value {
                        Value::Null => row_builder.push_bind(None::<String>),
                        Value::Integer(v) => row_builder.push_bind(*v),
                        Value::Float(v) => row_builder.push_bind(*v),
                        Value::Boolean(v) => row_builder.push_bind(*v),
                        Value::Text(v) => row_builder.push_bind(v.clone()),
                    };
                }
            });

            let result = builder.build().execute(&mut *tx).await.map_err(write_err)?;
            written += result.rows_affected();
        }

        tx.commit().await.map_err(write_err)?;

        debug!(written, "Inserted rows");
        Ok(written)
    }

    fn max_connections(&self) -> Option<u32> {
        Some(self.pool.options().get_max_connections())
    }
}

/// Backtick-quote a MySQL identifier
pub fn quote_identifier(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Integer => "BIGINT",
        ColumnType::Float => "DOUBLE",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Text => "TEXT",
    }
}

fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", quote_identifier(table))
}

fn create_table_sql(batch: &TableBatch) -> String {
    let columns = batch
        .columns
        .iter()
        .map(|c| format!("{} {} NULL", quote_identifier(&c.name), sql_type(c.column_type)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({})", quote_identifier(&batch.name), columns)
}

fn rows_per_statement(column_count: usize) -> usize {
    (MAX_PLACEHOLDERS / column_count.max(1)).clamp(1, MAX_ROWS_PER_INSERT)
}
