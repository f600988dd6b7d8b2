//! SQLite-backed vector store.
//!
//! All embedding vectors share one fixed dimension per database, pinned in
//! `index_meta` by the first write; later writes with a different length are
//! rejected before anything lands. Similarity search is brute force over the
//! candidate set, which is the intended design at book-collection scale.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use folio_segment::Chunk;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use tracing::{debug, info};

use super::{BookRow, ChunkId, IndexState, IndexStatus, SearchFilters, SimilarChunk, StoreStats,
            StoredChunk};
use crate::error::StoreError;

/// Highest schema version this build understands.
const SCHEMA_VERSION: i64 = 2;

const META_DIMENSION: &str = "embedding_dimension";
const META_MODEL_ID: &str = "model_id";

/// SQLite store for books, chunks, embeddings, and indexing status.
#[derive(Clone, Debug)]
pub struct VectorStore {
    pool: SqlitePool,
}

impl VectorStore {
    /// Open (or create) a store at the given database path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(std::time::Duration::from_secs(5))
                .foreign_keys(true)
                .create_if_missing(true)
                .auto_vacuum(sqlx::sqlite::SqliteAutoVacuum::Full)
                .page_size(1 << 16)
                .optimize_on_close(true, 1 << 10),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// In-memory store for tests.
    pub async fn open_memory() -> Result<Self, StoreError> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Bring the schema up to [`SCHEMA_VERSION`], in place.
    async fn migrate(pool: &SqlitePool) -> Result<(), StoreError> {
        let found: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(pool)
            .await?;
        if found > SCHEMA_VERSION {
            return Err(StoreError::Schema {
                found,
                supported: SCHEMA_VERSION,
            });
        }

        Self::create_tables(pool).await?;

        if found == 1 {
            // v1 chunks lacked the metadata column.
            let altered = sqlx::query("ALTER TABLE chunks ADD COLUMN metadata TEXT")
                .execute(pool)
                .await;
            if let Err(e) = altered {
                if !e.to_string().contains("duplicate column name") {
                    return Err(e.into());
                }
            }
            info!(from = found, to = SCHEMA_VERSION, "migrated store schema");
        }

        sqlx::query(&format!("PRAGMA user_version = {SCHEMA_VERSION}"))
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn create_tables(pool: &SqlitePool) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS books (
                book_id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                authors TEXT NOT NULL DEFAULT '[]',
                placeholder INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                chunk_id INTEGER PRIMARY KEY AUTOINCREMENT,
                book_id INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                start_pos INTEGER NOT NULL,
                end_pos INTEGER NOT NULL,
                text TEXT NOT NULL,
                metadata TEXT,
                embedding BLOB NOT NULL,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (book_id) REFERENCES books(book_id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_book_id ON chunks(book_id)")
            .execute(pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_status (
                book_id INTEGER PRIMARY KEY,
                state TEXT NOT NULL,
                progress REAL NOT NULL DEFAULT 0,
                error TEXT,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    /// Register or update a book with its real catalog data. Promotes a
    /// placeholder row created by an earlier out-of-order embedding write.
    pub async fn upsert_book(
        &self,
        book_id: u64,
        title: &str,
        authors: &[String],
    ) -> Result<(), StoreError> {
        let authors_json = serde_json::to_string(authors)?;
        sqlx::query(
            r#"
            INSERT INTO books (book_id, title, authors, placeholder)
            VALUES (?1, ?2, ?3, 0)
            ON CONFLICT(book_id) DO UPDATE SET
                title = excluded.title,
                authors = excluded.authors,
                placeholder = 0
            "#,
        )
        .bind(book_id as i64)
        .bind(title)
        .bind(authors_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_book(&self, book_id: u64) -> Result<Option<BookRow>, StoreError> {
        let row = sqlx::query("SELECT book_id, title, authors, placeholder FROM books WHERE book_id = ?1")
            .bind(book_id as i64)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| {
            let authors_json: String = row.get("authors");
            let placeholder: i64 = row.get("placeholder");
            BookRow {
                book_id: row.get::<i64, _>("book_id") as u64,
                title: row.get("title"),
                authors: serde_json::from_str(&authors_json).unwrap_or_default(),
                placeholder: placeholder != 0,
            }
        }))
    }

    /// Store one chunk with its embedding; returns the new chunk id.
    pub async fn store_embedding(
        &self,
        book_id: u64,
        chunk: &Chunk,
        embedding: &[f32],
    ) -> Result<ChunkId, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_book(&mut tx, book_id).await?;
        Self::check_dimension(&mut tx, embedding.len()).await?;
        let id = Self::insert_chunk(&mut tx, book_id, chunk, embedding).await?;
        tx.commit().await?;
        Ok(id)
    }

    /// Store a whole book's chunks in one transaction. Either every pair
    /// lands or none do.
    pub async fn store_chunks(
        &self,
        book_id: u64,
        items: &[(Chunk, Vec<f32>)],
    ) -> Result<Vec<ChunkId>, StoreError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        Self::ensure_book(&mut tx, book_id).await?;
        let expected = Self::check_dimension(&mut tx, items[0].1.len()).await?;
        for (_, embedding) in items {
            if embedding.len() != expected {
                return Err(StoreError::Dimension {
                    expected,
                    actual: embedding.len(),
                });
            }
        }

        let mut ids = Vec::with_capacity(items.len());
        for (chunk, embedding) in items {
            ids.push(Self::insert_chunk(&mut tx, book_id, chunk, embedding).await?);
        }
        tx.commit().await?;
        debug!(book_id, chunks = ids.len(), "stored chunk batch");
        Ok(ids)
    }

    /// Auto-create a placeholder book row so chunk writes never depend on
    /// metadata arriving first.
    async fn ensure_book(tx: &mut Transaction<'_, Sqlite>, book_id: u64) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO books (book_id, title, placeholder) VALUES (?1, '(unknown)', 1)
             ON CONFLICT(book_id) DO NOTHING",
        )
        .bind(book_id as i64)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Validate against the store's pinned dimension, pinning it on first
    /// write. Returns the dimension in force.
    async fn check_dimension(
        tx: &mut Transaction<'_, Sqlite>,
        actual: usize,
    ) -> Result<usize, StoreError> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?1")
                .bind(META_DIMENSION)
                .fetch_optional(&mut **tx)
                .await?;
        match stored {
            Some(value) => {
                let expected = value.parse().unwrap_or(0);
                if expected != actual {
                    return Err(StoreError::Dimension { expected, actual });
                }
                Ok(expected)
            }
            None => {
                sqlx::query("INSERT INTO index_meta (key, value) VALUES (?1, ?2)")
                    .bind(META_DIMENSION)
                    .bind(actual.to_string())
                    .execute(&mut **tx)
                    .await?;
                Ok(actual)
            }
        }
    }

    async fn insert_chunk(
        tx: &mut Transaction<'_, Sqlite>,
        book_id: u64,
        chunk: &Chunk,
        embedding: &[f32],
    ) -> Result<ChunkId, StoreError> {
        let metadata_json = if chunk.metadata.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&chunk.metadata)?)
        };
        let result = sqlx::query(
            r#"
            INSERT INTO chunks (book_id, chunk_index, start_pos, end_pos, text, metadata, embedding)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(book_id as i64)
        .bind(chunk.index as i64)
        .bind(chunk.start_pos as i64)
        .bind(chunk.end_pos as i64)
        .bind(&chunk.text)
        .bind(metadata_json)
        .bind(bytemuck::cast_slice::<f32, u8>(embedding))
        .execute(&mut **tx)
        .await?;
        Ok(result.last_insert_rowid())
    }

    /// Record which embedding model filled this store.
    pub async fn record_model_id(&self, model_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(META_MODEL_ID)
        .bind(model_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_chunk(&self, chunk_id: ChunkId) -> Result<Option<StoredChunk>, StoreError> {
        let row = sqlx::query(
            "SELECT chunk_id, book_id, chunk_index, start_pos, end_pos, text, metadata
             FROM chunks WHERE chunk_id = ?1",
        )
        .bind(chunk_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Self::row_to_chunk))
    }

    pub async fn get_embedding(&self, chunk_id: ChunkId) -> Result<Option<Vec<f32>>, StoreError> {
        let bytes: Option<Vec<u8>> =
            sqlx::query_scalar("SELECT embedding FROM chunks WHERE chunk_id = ?1")
                .bind(chunk_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(bytes.map(|bytes| bytemuck::cast_slice::<u8, f32>(&bytes).to_vec()))
    }

    /// Brute-force cosine search over stored embeddings, best first; ties
    /// break toward the lower chunk id.
    pub async fn search_similar(
        &self,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SimilarChunk>, StoreError> {
        let rows = match &filters.book_ids {
            Some(ids) if ids.is_empty() => return Ok(Vec::new()),
            Some(ids) => {
                let placeholders = (1..=ids.len())
                    .map(|i| format!("?{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT chunk_id, embedding FROM chunks WHERE book_id IN ({placeholders})"
                );
                let mut query = sqlx::query(&sql);
                for id in ids {
                    query = query.bind(*id as i64);
                }
                query.fetch_all(&self.pool).await?
            }
            None => {
                sqlx::query("SELECT chunk_id, embedding FROM chunks")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let candidates = rows.into_iter().map(|row| {
            let chunk_id: i64 = row.get("chunk_id");
            let bytes: Vec<u8> = row.get("embedding");
            (chunk_id, bytemuck::cast_slice::<u8, f32>(&bytes).to_vec())
        });
        let ranked = folio_embed::vector::rank_top_k(query, candidates, limit);

        let mut results = Vec::with_capacity(ranked.len());
        for (chunk_id, similarity) in ranked {
            if let Some(chunk) = self.get_chunk(chunk_id).await? {
                results.push(SimilarChunk { chunk, similarity });
            }
        }
        Ok(results)
    }

    /// Case-insensitive substring search over chunk text.
    pub async fn search_text(
        &self,
        term: &str,
        filters: &SearchFilters,
        limit: usize,
    ) -> Result<Vec<StoredChunk>, StoreError> {
        let escaped = term
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{escaped}%");

        let rows = match &filters.book_ids {
            Some(ids) if ids.is_empty() => return Ok(Vec::new()),
            Some(ids) => {
                let placeholders = (2..=ids.len() + 1)
                    .map(|i| format!("?{i}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT chunk_id, book_id, chunk_index, start_pos, end_pos, text, metadata
                     FROM chunks
                     WHERE text LIKE ?1 COLLATE NOCASE ESCAPE '\\' AND book_id IN ({placeholders})
                     ORDER BY book_id, chunk_index LIMIT {limit}"
                );
                let mut query = sqlx::query(&sql).bind(&pattern);
                for id in ids {
                    query = query.bind(*id as i64);
                }
                query.fetch_all(&self.pool).await?
            }
            None => {
                let sql = format!(
                    "SELECT chunk_id, book_id, chunk_index, start_pos, end_pos, text, metadata
                     FROM chunks
                     WHERE text LIKE ?1 COLLATE NOCASE ESCAPE '\\'
                     ORDER BY book_id, chunk_index LIMIT {limit}"
                );
                sqlx::query(&sql).bind(&pattern).fetch_all(&self.pool).await?
            }
        };

        Ok(rows.into_iter().map(Self::row_to_chunk).collect())
    }

    /// Drop a book's chunks and its status row. The book row itself stays.
    pub async fn clear_book_embeddings(&self, book_id: u64) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM chunks WHERE book_id = ?1")
            .bind(book_id as i64)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM index_status WHERE book_id = ?1")
            .bind(book_id as i64)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn set_indexing_status(
        &self,
        book_id: u64,
        state: IndexState,
        progress: f32,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO index_status (book_id, state, progress, error, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(book_id) DO UPDATE SET
                state = excluded.state,
                progress = excluded.progress,
                error = excluded.error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(book_id as i64)
        .bind(state.as_str())
        .bind(progress.clamp(0.0, 1.0) as f64)
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_indexing_status(
        &self,
        book_id: u64,
    ) -> Result<Option<IndexStatus>, StoreError> {
        let row = sqlx::query(
            "SELECT book_id, state, progress, error, updated_at FROM index_status WHERE book_id = ?1",
        )
        .bind(book_id as i64)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Self::row_to_status))
    }

    pub async fn all_indexing_statuses(&self) -> Result<Vec<IndexStatus>, StoreError> {
        let rows = sqlx::query(
            "SELECT book_id, state, progress, error, updated_at FROM index_status ORDER BY book_id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Self::row_to_status).collect())
    }

    pub async fn has_embeddings(&self, book_id: u64) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE book_id = ?1")
            .bind(book_id as i64)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    pub async fn stats(&self) -> Result<StoreStats, StoreError> {
        let books: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        let chunks: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks")
            .fetch_one(&self.pool)
            .await?;
        let dimension: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?1")
                .bind(META_DIMENSION)
                .fetch_optional(&self.pool)
                .await?;
        let model_id: Option<String> =
            sqlx::query_scalar("SELECT value FROM index_meta WHERE key = ?1")
                .bind(META_MODEL_ID)
                .fetch_optional(&self.pool)
                .await?;

        Ok(StoreStats {
            books: books as u64,
            chunks: chunks as u64,
            embedding_dimension: dimension.and_then(|v| v.parse().ok()),
            model_id,
        })
    }

    fn row_to_chunk(row: sqlx::sqlite::SqliteRow) -> StoredChunk {
        let metadata_json: Option<String> = row.get("metadata");
        let metadata: HashMap<String, serde_json::Value> = metadata_json
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        StoredChunk {
            chunk_id: row.get("chunk_id"),
            book_id: row.get::<i64, _>("book_id") as u64,
            chunk_index: row.get::<i64, _>("chunk_index") as u32,
            start_pos: row.get::<i64, _>("start_pos") as usize,
            end_pos: row.get::<i64, _>("end_pos") as usize,
            text: row.get("text"),
            metadata,
        }
    }

    fn row_to_status(row: sqlx::sqlite::SqliteRow) -> IndexStatus {
        let state_str: String = row.get("state");
        let updated_at: String = row.get("updated_at");
        IndexStatus {
            book_id: row.get::<i64, _>("book_id") as u64,
            state: state_str.parse().unwrap_or(IndexState::Pending),
            progress: row.get::<f64, _>("progress") as f32,
            error: row.get("error"),
            updated_at: DateTime::parse_from_rfc3339(&updated_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}
