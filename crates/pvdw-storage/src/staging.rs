//! Staging loader: truncate a staging relation, then bulk-load it from its extract files.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use pvdw_core::{Action, Table};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use sha2::{Digest, Sha256};
use sqlx::postgres::PgConnection;
use sqlx::Row;
use tokio::fs;
use tracing::{info, info_span, Instrument};

use crate::registry::StatementRegistry;
use crate::warehouse::{LoadError, Warehouse};

const COPY_SEND_CHUNK: usize = 1 << 20;

/// Bulk-load format directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum CopyFormat {
    Csv { header_rows: usize },
    /// Keys are matched to staging columns by name.
    Json,
}

impl fmt::Display for CopyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopyFormat::Csv { header_rows } => write!(f, "CSV IGNOREHEADER {header_rows}"),
            CopyFormat::Json => f.write_str("JSON 'auto'"),
        }
    }
}

#[derive(Clone, Default)]
pub struct ObjectStoreCredentials {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

impl fmt::Debug for ObjectStoreCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreCredentials")
            .field("access_key", &"<redacted>")
            .field("secret_key", &"<redacted>")
            .field("region", &self.region)
            .finish()
    }
}

impl ObjectStoreCredentials {
    pub fn from_env() -> Self {
        Self {
            access_key: std::env::var("PVDW_AWS_KEY").unwrap_or_default(),
            secret_key: std::env::var("PVDW_AWS_SECRET").unwrap_or_default(),
            region: std::env::var("PVDW_AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadedFile {
    pub path: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub table: Table,
    pub source: String,
    pub rows: u64,
    pub files: Vec<LoadedFile>,
}

/// Moves one staging relation's extract into the warehouse.
#[async_trait]
pub trait StagingTransport: Send + Sync {
    fn describe(&self) -> String;

    /// `copy_head` is the registered `COPY <table>` statement prefix.
    async fn load(
        &self,
        conn: &mut PgConnection,
        copy_head: &str,
        table: Table,
        format: CopyFormat,
    ) -> anyhow::Result<LoadReport>;
}

/// Object-store `COPY` executed by the warehouse itself.
///
/// Emits Redshift `COPY` options (`ACCESS_KEY_ID`, `FORMAT AS`); PostgreSQL rejects them.
#[derive(Debug, Clone)]
pub struct S3CopyTransport {
    bucket: String,
    credentials: ObjectStoreCredentials,
}

impl S3CopyTransport {
    pub fn new(bucket: impl Into<String>, credentials: ObjectStoreCredentials) -> Self {
        let bucket = bucket.into();
        let bucket = bucket
            .trim_start_matches("s3://")
            .trim_end_matches('/')
            .to_string();
        Self {
            bucket,
            credentials,
        }
    }

    pub fn source_for(&self, table: Table) -> anyhow::Result<String> {
        let Some(prefix) = table.object_prefix() else {
            bail!("{table} is not a staging relation");
        };
        Ok(format!("s3://{}/{}/", self.bucket, prefix))
    }

    pub fn copy_statement(&self, copy_head: &str, table: Table, format: CopyFormat) -> anyhow::Result<String> {
        let source = self.source_for(table)?;
        Ok(format!(
            "{copy_head}\nFROM '{}'\nACCESS_KEY_ID '{}'\nSECRET_ACCESS_KEY '{}'\nREGION '{}'\nFORMAT AS {format}\nCOMPUPDATE OFF\nSTATUPDATE OFF",
            quote_literal(&source),
            quote_literal(&self.credentials.access_key),
            quote_literal(&self.credentials.secret_key),
            quote_literal(&self.credentials.region),
        ))
    }
}

#[async_trait]
impl StagingTransport for S3CopyTransport {
    fn describe(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn load(
        &self,
        conn: &mut PgConnection,
        copy_head: &str,
        table: Table,
        format: CopyFormat,
    ) -> anyhow::Result<LoadReport> {
        let statement = self.copy_statement(copy_head, table, format)?;
        let result = sqlx::query(&statement)
            .execute(&mut *conn)
            .await
            .map_err(|source| LoadError::BulkLoad { table, source })?;
        Ok(LoadReport {
            table,
            source: self.source_for(table)?,
            rows: result.rows_affected(),
            files: Vec::new(),
        })
    }
}

/// Streams local extract files through `COPY ... FROM STDIN`.
///
/// Files for `stage_<name>` live under `<root>/<name>/`, nested partition folders
/// included. Names starting with `_` or `.` (job markers, checksums) are skipped.
#[derive(Debug, Clone)]
pub struct LocalCopyTransport {
    root: PathBuf,
}

impl LocalCopyTransport {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source_dir(&self, table: Table) -> anyhow::Result<PathBuf> {
        let Some(prefix) = table.object_prefix() else {
            bail!("{table} is not a staging relation");
        };
        Ok(self.root.join(prefix))
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    async fn staging_columns(conn: &mut PgConnection, table: Table) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT column_name::text AS column_name
              FROM information_schema.columns
             WHERE table_schema = current_schema()
               AND table_name = $1
             ORDER BY ordinal_position
            "#,
        )
        .bind(table.name())
        .fetch_all(&mut *conn)
        .await
        .with_context(|| format!("reading column list of {table}"))?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(row.try_get::<String, _>("column_name")?);
        }
        if out.is_empty() {
            bail!("{table} has no columns; run `create` first");
        }
        Ok(out)
    }
}

#[async_trait]
impl StagingTransport for LocalCopyTransport {
    fn describe(&self) -> String {
        self.root.display().to_string()
    }

    async fn load(
        &self,
        conn: &mut PgConnection,
        copy_head: &str,
        table: Table,
        format: CopyFormat,
    ) -> anyhow::Result<LoadReport> {
        let dir = self.source_dir(table)?;
        let paths = list_extract_files(&dir).await?;
        let columns = match format {
            CopyFormat::Json => Self::staging_columns(conn, table).await?,
            CopyFormat::Csv { .. } => Vec::new(),
        };

        let mut files = Vec::with_capacity(paths.len());
        let mut rows = 0u64;
        for path in paths {
            let bytes = fs::read(&path)
                .await
                .with_context(|| format!("reading extract file {}", path.display()))?;
            let payload = match format {
                CopyFormat::Csv { header_rows } => skip_header_records(&bytes, header_rows)
                    .with_context(|| format!("reading CSV header of {}", path.display()))?
                    .to_vec(),
                CopyFormat::Json => json_to_csv(&bytes, &columns)
                    .with_context(|| format!("decoding JSON extract {}", path.display()))?,
            };

            let statement = format!("{copy_head} FROM STDIN WITH (FORMAT csv)");
            let mut copy = conn
                .copy_in_raw(&statement)
                .await
                .map_err(|source| LoadError::BulkLoad { table, source })?;
            for chunk in payload.chunks(COPY_SEND_CHUNK) {
                let sent = copy.send(chunk).await.map(|_| ());
                if let Err(source) = sent {
                    let _ = copy.abort(source.to_string()).await;
                    return Err(LoadError::BulkLoad { table, source }.into());
                }
            }
            let loaded = copy
                .finish()
                .await
                .map_err(|source| LoadError::BulkLoad { table, source })?;
            rows += loaded;

            files.push(LoadedFile {
                path: path.display().to_string(),
                sha256: Self::sha256_hex(&bytes),
                bytes: bytes.len() as u64,
            });
        }

        Ok(LoadReport {
            table,
            source: dir.display().to_string(),
            rows,
            files,
        })
    }
}

/// Truncate-then-load for one staging relation at a time.
pub struct StagingLoader {
    transport: Box<dyn StagingTransport>,
}

impl StagingLoader {
    pub fn new(transport: Box<dyn StagingTransport>) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &dyn StagingTransport {
        self.transport.as_ref()
    }

    pub async fn load_table(
        &self,
        warehouse: &mut Warehouse,
        registry: &StatementRegistry,
        table: Table,
        format: CopyFormat,
    ) -> anyhow::Result<LoadReport> {
        let copy_head = registry.resolve(table, Action::Copy)?.to_string();
        let span = info_span!("stage_table", %table, %format);
        async {
            warehouse.dispatch(registry, table, Action::Truncate).await?;
            let report = self
                .transport
                .load(warehouse.connection(), &copy_head, table, format)
                .await?;
            info!(rows = report.rows, files = report.files.len(), source = %report.source, "staged");
            Ok::<_, anyhow::Error>(report)
        }
        .instrument(span)
        .await
    }
}

fn quote_literal(value: &str) -> String {
    value.replace('\'', "''")
}

async fn list_extract_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = fs::read_dir(&current)
            .await
            .with_context(|| format!("reading extract directory {}", current.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('_') || name.starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                out.push(entry.path());
            }
        }
    }
    out.sort();
    Ok(out)
}

/// The bytes after the first `records` CSV records; quoted fields may span lines.
fn skip_header_records(bytes: &[u8], records: usize) -> anyhow::Result<&[u8]> {
    if records == 0 {
        return Ok(bytes);
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);
    let mut record = csv::ByteRecord::new();
    for _ in 0..records {
        if !reader.read_byte_record(&mut record)? {
            return Ok(&[]);
        }
    }
    let offset = usize::try_from(reader.position().byte())?.min(bytes.len());
    let rest = &bytes[offset..];
    // A CRLF terminator can leave its `\n` behind the reported position.
    let blank = rest.iter().take_while(|b| matches!(b, b'\r' | b'\n')).count();
    Ok(&rest[blank..])
}

/// Newline-delimited objects, or one top-level array, re-encoded as CSV in column order.
///
/// Missing and `null` keys become unquoted empty fields, which `COPY ... (FORMAT csv)` loads as NULL.
fn json_to_csv(bytes: &[u8], columns: &[String]) -> anyhow::Result<Vec<u8>> {
    let text = std::str::from_utf8(bytes).context("extract is not UTF-8")?;
    let trimmed = text.trim_start();

    let records: Vec<Map<String, JsonValue>> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed).context("parsing JSON array")?
    } else {
        let mut records = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record = serde_json::from_str(line)
                .with_context(|| format!("parsing JSON object on line {}", idx + 1))?;
            records.push(record);
        }
        records
    };

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::with_capacity(bytes.len()));
    for record in records {
        let lowered: Map<String, JsonValue> = record
            .into_iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v))
            .collect();
        writer
            .write_record(columns.iter().map(|column| field_text(lowered.get(column.as_str()))))
            .context("encoding CSV record")?;
    }
    writer
        .into_inner()
        .map_err(|err| anyhow::anyhow!("flushing CSV buffer: {}", err.error()))
}

fn field_text(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
