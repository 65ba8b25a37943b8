//! The single long-lived warehouse connection shared by every phase of a run.

use std::fmt;
use std::str::FromStr;

use anyhow::Context;
use pvdw_core::{Action, Table};
use sqlx::postgres::{PgConnectOptions, PgConnection, PgRow};
use sqlx::query_builder::Separated;
use sqlx::{Connection, Postgres, QueryBuilder, Row};
use thiserror::Error;
use tracing::debug;

use crate::registry::StatementRegistry;

/// Rows per multi-row `INSERT`; keeps the bind count well under the protocol limit.
pub const INSERT_CHUNK_ROWS: usize = 1_000;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot reach warehouse {endpoint}")]
    Connect {
        endpoint: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("bulk load into {table} failed")]
    BulkLoad {
        table: Table,
        #[source]
        source: sqlx::Error,
    },
    #[error("`{action}` on {table} failed")]
    Statement {
        table: Table,
        action: Action,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Clone)]
pub struct WarehouseConfig {
    pub database_url: Option<String>,
    pub endpoint: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("database_url", &self.database_url.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl WarehouseConfig {
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL").ok().filter(|v| !v.is_empty()),
            endpoint: std::env::var("PVDW_DWH_ENDPOINT").unwrap_or_else(|_| "localhost".to_string()),
            port: std::env::var("PVDW_DWH_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5439),
            database: std::env::var("PVDW_DWH_DB").unwrap_or_else(|_| "pvdw".to_string()),
            user: std::env::var("PVDW_DWH_USER").unwrap_or_else(|_| "pvdw".to_string()),
            password: std::env::var("PVDW_DWH_PASSWORD").unwrap_or_default(),
        }
    }

    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            database_url: Some(url.into()),
            endpoint: String::new(),
            port: 0,
            database: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }

    /// `host:port/db`, never including credentials.
    pub fn describe(&self) -> String {
        match &self.database_url {
            Some(url) => match PgConnectOptions::from_str(url) {
                Ok(opts) => format!(
                    "{}:{}/{}",
                    opts.get_host(),
                    opts.get_port(),
                    opts.get_database().unwrap_or_default()
                ),
                Err(_) => "<DATABASE_URL>".to_string(),
            },
            None => format!("{}:{}/{}", self.endpoint, self.port, self.database),
        }
    }

    pub fn connect_options(&self) -> anyhow::Result<PgConnectOptions> {
        match &self.database_url {
            Some(url) => PgConnectOptions::from_str(url).context("parsing DATABASE_URL"),
            None => Ok(PgConnectOptions::new()
                .host(&self.endpoint)
                .port(self.port)
                .database(&self.database)
                .username(&self.user)
                .password(&self.password)),
        }
    }
}

pub struct Warehouse {
    conn: PgConnection,
    endpoint: String,
}

impl Warehouse {
    pub async fn connect(config: &WarehouseConfig) -> anyhow::Result<Self> {
        let endpoint = config.describe();
        let options = config.connect_options()?;
        let conn = PgConnection::connect_with(&options)
            .await
            .map_err(|source| LoadError::Connect {
                endpoint: endpoint.clone(),
                source,
            })?;
        Ok(Self { conn, endpoint })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn connection(&mut self) -> &mut PgConnection {
        &mut self.conn
    }

    /// Resolves and executes one registered statement; each call commits on its own.
    pub async fn dispatch(
        &mut self,
        registry: &StatementRegistry,
        table: Table,
        action: Action,
    ) -> anyhow::Result<u64> {
        let statement = registry.resolve(table, action)?;
        debug!(%table, %action, "executing statement");
        let result = sqlx::query(statement)
            .execute(&mut self.conn)
            .await
            .map_err(|source| LoadError::Statement {
                table,
                action,
                source,
            })?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&mut self, sql: &str) -> anyhow::Result<Vec<PgRow>> {
        sqlx::query(sql)
            .fetch_all(&mut self.conn)
            .await
            .with_context(|| format!("running query: {}", first_line(sql)))
    }

    pub async fn count_rows(&mut self, table: Table) -> anyhow::Result<i64> {
        let row = sqlx::query(&format!("SELECT COUNT(1) AS n FROM {table}"))
            .fetch_one(&mut self.conn)
            .await
            .with_context(|| format!("counting rows in {table}"))?;
        Ok(row.try_get("n")?)
    }

    pub async fn close(self) -> anyhow::Result<()> {
        self.conn.close().await.context("closing warehouse connection")
    }
}

/// Multi-row `INSERT` of `rows` into `table`, chunked; returns rows written.
pub async fn bulk_insert<'r, T, F>(
    conn: &mut PgConnection,
    table: Table,
    columns: &[&str],
    rows: &'r [T],
    mut bind: F,
) -> anyhow::Result<u64>
where
    F: FnMut(Separated<'_, 'r, Postgres, &'static str>, &'r T),
{
    let mut written = 0u64;
    for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
        let mut builder: QueryBuilder<'r, Postgres> =
            QueryBuilder::new(format!("INSERT INTO {table} ({}) ", columns.join(", ")));
        builder.push_values(chunk, |sep, row| bind(sep, row));
        let result = builder
            .build()
            .execute(&mut *conn)
            .await
            .with_context(|| format!("inserting {} rows into {table}", chunk.len()))?;
        written += result.rows_affected();
    }
    Ok(written)
}

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or_default()
}
