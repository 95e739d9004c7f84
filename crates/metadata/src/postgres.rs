//! PostgreSQL-based metadata store implementation.

use crate::error::{MetadataError, MetadataResult, map_insert_error};
use crate::models::DocumentRow;
use crate::repos::DocumentRepo;
use crate::store::MetadataStore;
use archivo_core::{BlobId, ClientId, DocumentFilter, DocumentRecord, NewDocument};
use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Pool, Postgres, QueryBuilder};
use std::str::FromStr;

/// PostgreSQL schema (embedded).
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

fn postgres_schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            if trimmed.is_empty() {
                return None;
            }
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

const DOCUMENT_COLUMNS: &str = "id, blob_id, filename, size, owner_id, case_id, created_at";

/// PostgreSQL-based metadata store.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    /// Create a new PostgreSQL store from a connection URL.
    pub async fn from_url(
        url: &str,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        let opts = PgConnectOptions::from_str(url)?;
        Self::connect(opts, max_connections, statement_timeout_ms).await
    }

    async fn connect(
        mut opts: PgConnectOptions,
        max_connections: u32,
        statement_timeout_ms: Option<u64>,
    ) -> MetadataResult<Self> {
        if let Some(timeout_ms) = statement_timeout_ms {
            opts = opts.options([("statement_timeout", format!("{}ms", timeout_ms))]);
            tracing::info!("PostgreSQL statement_timeout set to {}ms", timeout_ms);
        }

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for PostgresStore {
    async fn migrate(&self) -> MetadataResult<()> {
        // PostgreSQL doesn't allow multiple statements in a single prepared statement.
        for statement in postgres_schema_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

#[async_trait]
impl DocumentRepo for PostgresStore {
    async fn insert_document(&self, doc: &NewDocument) -> MetadataResult<DocumentRecord> {
        let size = i64::try_from(doc.size)
            .map_err(|_| MetadataError::Internal(format!("size {} out of range", doc.size)))?;
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            r#"
            INSERT INTO documents (blob_id, filename, size, owner_id, case_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(*doc.blob_id.as_uuid())
        .bind(&doc.filename)
        .bind(size)
        .bind(doc.owner_id.get())
        .bind(doc.case_id.get())
        .bind(doc.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, || format!("blob_id {}", doc.blob_id)))?;
        row.into_record()
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
    ) -> MetadataResult<Vec<DocumentRecord>> {
        let mut query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE TRUE"
        ));
        if let Some(owner_id) = filter.owner_id {
            query.push(" AND owner_id = ").push_bind(owner_id.get());
        }
        if let Some(case_id) = filter.case_id {
            query.push(" AND case_id = ").push_bind(case_id.get());
        }
        query.push(" ORDER BY created_at DESC, id DESC");
        if let Some(limit) = filter.page.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }
        if let Some(offset) = filter.page.offset {
            query
                .push(" OFFSET ")
                .push_bind(i64::try_from(offset).unwrap_or(i64::MAX));
        }

        let rows = query
            .build_query_as::<DocumentRow>()
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(DocumentRow::into_record).collect()
    }

    async fn get_document(&self, blob_id: BlobId) -> MetadataResult<Option<DocumentRecord>> {
        let row = sqlx::query_as::<_, DocumentRow>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE blob_id = $1"
        ))
        .bind(*blob_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(DocumentRow::into_record).transpose()
    }

    async fn document_owned_by(
        &self,
        blob_id: BlobId,
        owner_id: ClientId,
    ) -> MetadataResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM documents WHERE blob_id = $1 AND owner_id = $2)",
        )
        .bind(*blob_id.as_uuid())
        .bind(owner_id.get())
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn delete_document(&self, blob_id: BlobId) -> MetadataResult<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE blob_id = $1")
            .bind(*blob_id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
