//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult, map_insert_error};
use crate::models::{SqliteDocumentRow, datetime_to_micros};
use crate::repos::DocumentRepo;
use archivo_core::{BlobId, ClientId, DocumentFilter, DocumentRecord, NewDocument};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, QueryBuilder, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::{Duration, Instant};

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore: DocumentRepo + Send + Sync {
    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;

    /// Name of the backend, for logs.
    fn backend_name(&self) -> &'static str;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `path`.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> MetadataResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(30);

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // A single connection avoids persistent "database is locked"
            // failures under concurrent request handling.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout: Duration::from_secs(query_timeout_secs),
        };
        store.migrate().await?;

        tracing::warn!(
            query_timeout_secs,
            "SQLite query timeout is advisory only; slow queries are logged, not cancelled. \
             Use PostgreSQL for multi-instance deployments."
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    fn note_slow(&self, op: &'static str, started: Instant) {
        let elapsed = started.elapsed();
        if elapsed > self.query_timeout {
            tracing::warn!(
                op,
                elapsed_ms = elapsed.as_millis() as u64,
                timeout_ms = self.query_timeout.as_millis() as u64,
                "SQLite query exceeded advisory timeout"
            );
        }
    }
}

const DOCUMENT_COLUMNS: &str = "id, blob_id, filename, size, owner_id, case_id, created_at_us";

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[async_trait]
impl DocumentRepo for SqliteStore {
    async fn insert_document(&self, doc: &NewDocument) -> MetadataResult<DocumentRecord> {
        let started = Instant::now();
        let size = i64::try_from(doc.size)
            .map_err(|_| MetadataError::Internal(format!("size {} out of range", doc.size)))?;
        let row = sqlx::query_as::<_, SqliteDocumentRow>(&format!(
            r#"
            INSERT INTO documents (blob_id, filename, size, owner_id, case_id, created_at_us)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(*doc.blob_id.as_uuid())
        .bind(&doc.filename)
        .bind(size)
        .bind(doc.owner_id.get())
        .bind(doc.case_id.get())
        .bind(datetime_to_micros(doc.created_at))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, || format!("blob_id {}", doc.blob_id)))?;
        self.note_slow("insert_document", started);
        row.into_record()
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
    ) -> MetadataResult<Vec<DocumentRecord>> {
        let started = Instant::now();
        let mut query = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE 1 = 1"
        ));
        if let Some(owner_id) = filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id.get());
        }
        if let Some(case_id) = filter.case_id {
            query.push(" AND case_id = ").push_bind(case_id.get());
        }
        query.push(" ORDER BY created_at_us DESC, id DESC");
        // SQLite needs a LIMIT clause for OFFSET; -1 means unbounded.
        let limit = filter.page.limit.map(i64::from).unwrap_or(-1);
        query.push(" LIMIT ").push_bind(limit);
        if let Some(offset) = filter.page.offset {
            query
                .push(" OFFSET ")
                .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = query
            .build_query_as::<SqliteDocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        self.note_slow("list_documents", started);
        rows.into_iter().map(SqliteDocumentRow::into_record).collect()
    }

    async fn get_document(&self, blob_id: BlobId) -> MetadataResult<Option<DocumentRecord>> {
        let row = sqlx::query_as::<_, SqliteDocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE blob_id = ?"
        ))
        .bind(*blob_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(SqliteDocumentRow::into_record).transpose()
    }

    async fn document_owned_by(
        &self,
        blob_id: BlobId,
        owner_id: ClientId,
    ) -> MetadataResult<bool> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM documents WHERE blob_id = ? AND owner_id = ?")
                .bind(*blob_id.as_uuid())
                .bind(owner_id.get())
                .fetch_one(&self.pool)
                .await?;
        Ok(count > 0)
    }

    async fn delete_document(&self, blob_id: BlobId) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE blob_id = ?")
            .bind(*blob_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    blob_id BLOB NOT NULL,
    filename TEXT NOT NULL,
    size INTEGER NOT NULL CHECK (size >= 0),
    owner_id INTEGER NOT NULL CHECK (owner_id > 0),
    case_id INTEGER NOT NULL CHECK (case_id > 0),
    created_at_us INTEGER NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_documents_blob ON documents(blob_id);
CREATE INDEX IF NOT EXISTS idx_documents_owner_created ON documents(owner_id, created_at_us DESC);
CREATE INDEX IF NOT EXISTS idx_documents_case_created ON documents(case_id, created_at_us DESC);
"#;
