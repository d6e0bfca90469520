//! SQLite-backed [`Collection`].
//!
//! All collections share the `records` table, partitioned by the
//! `collection` column. Vectors are stored as little-endian `f32` BLOBs
//! together with the model that produced them; queries only rank vectors of
//! the current model. Records stored while embeddings were disabled or
//! failing have a NULL vector until [`SqliteCollection::embed_pending`]
//! fills them in. Record text is mirrored into the `records_fts` FTS5 table,
//! which answers queries when embeddings are disabled.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, blob_to_vec, vec_to_blob, Embedder};
use crate::migrate;
use crate::models::{ChunkRecord, RecordMetadata, SearchHit};

use super::{embed_for_storage, keyword_distance, query_terms, rank_hits, Collection, RecordFilter};

const RECORD_COLUMNS: &str =
    "id, document, title, author, source, hash, file, chunk, chunks";

pub struct SqliteCollection {
    pool: SqlitePool,
    name: String,
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
}

/// Outcome of [`SqliteCollection::embed_pending`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmbedReport {
    pub pending: usize,
    pub embedded: usize,
    pub failed: usize,
}

impl SqliteCollection {
    /// Open the database file, apply migrations and bind to collection `name`.
    pub async fn open(
        path: &std::path::Path,
        name: &str,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        Self::from_pool(pool, name, embedder, batch_size).await
    }

    /// Open the configured database with the configured embedding provider.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let embedder = embedding::create_embedder(&config.embedding)?;
        Self::open(
            &config.db.path,
            &config.db.collection,
            embedder,
            config.embedding.batch_size,
        )
        .await
    }

    pub async fn from_pool(
        pool: SqlitePool,
        name: &str,
        embedder: Arc<dyn Embedder>,
        batch_size: usize,
    ) -> Result<Self> {
        migrate::run_migrations(&pool)
            .await
            .context("Failed to run migrations")?;
        Ok(Self {
            pool,
            name: name.to_string(),
            embedder,
            batch_size: batch_size.max(1),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Records without a vector from the current model, in insertion order.
    pub async fn pending_embeddings(&self, limit: Option<usize>) -> Result<Vec<(String, String)>> {
        let rows = sqlx::query(
            "SELECT id, document FROM records
             WHERE collection = ? AND (embedding IS NULL OR model IS NULL OR model != ?)
             ORDER BY rowid
             LIMIT ?",
        )
        .bind(&self.name)
        .bind(self.embedder.model_name())
        .bind(limit.map(|l| l as i64).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| (row.get("id"), row.get("document")))
            .collect())
    }

    /// Embed every pending record in batches. A failed batch is counted and skipped.
    pub async fn embed_pending(&self, limit: Option<usize>) -> Result<EmbedReport> {
        if !self.embedder.is_enabled() {
            bail!("Embedding provider is disabled. Set [embedding] provider in config.");
        }

        let pending = self.pending_embeddings(limit).await?;
        let mut report = EmbedReport {
            pending: pending.len(),
            ..Default::default()
        };

        for batch in pending.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
            match self.embedder.embed(&texts).await {
                Ok(vectors) if vectors.len() == batch.len() => {
                    for ((id, _), vec) in batch.iter().zip(vectors.iter()) {
                        if vec.len() != self.embedder.dims() {
                            warn!(
                                id = %id,
                                expected = self.embedder.dims(),
                                got = vec.len(),
                                "embedding has the wrong dimension"
                            );
                            report.failed += 1;
                            continue;
                        }
                        self.set_embedding(id, vec).await?;
                        report.embedded += 1;
                    }
                }
                Ok(vectors) => {
                    warn!(expected = batch.len(), got = vectors.len(), "embedding batch size mismatch");
                    report.failed += batch.len();
                }
                Err(e) => {
                    warn!(error = %e, "embedding batch failed");
                    report.failed += batch.len();
                }
            }
        }

        Ok(report)
    }

    /// Rank records by FTS5 `bm25` over the query's terms.
    async fn keyword_query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let terms = query_terms(text);
        if terms.is_empty() {
            return Ok(Vec::new());
        }
        // Quoted terms so user input never reaches the FTS5 query syntax
        let fts_query = terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ");

        let rows = sqlx::query(
            r#"
            SELECT r.id, r.document, r.title, r.author, r.source, r.hash, r.file,
                   r.chunk, r.chunks, records_fts.rank AS rank
            FROM records_fts
            JOIN records r ON r.collection = records_fts.collection AND r.id = records_fts.id
            WHERE records_fts MATCH ? AND records_fts.collection = ?
            ORDER BY records_fts.rank
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(&self.name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        debug!(collection = %self.name, query = %fts_query, hits = rows.len(), "keyword query");

        let hits = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                let record = record_from_row(row);
                SearchHit {
                    // bm25 rank is negative; more negative is better
                    distance: keyword_distance(-rank),
                    id: record.id,
                    document: record.document,
                    metadata: record.metadata,
                }
            })
            .collect();

        Ok(rank_hits(hits, limit))
    }

    async fn set_embedding(&self, id: &str, vector: &[f32]) -> Result<()> {
        sqlx::query("UPDATE records SET embedding = ?, model = ? WHERE collection = ? AND id = ?")
            .bind(vec_to_blob(vector))
            .bind(self.embedder.model_name())
            .bind(&self.name)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn record_from_row(row: &SqliteRow) -> ChunkRecord {
    let chunk: Option<i64> = row.get("chunk");
    let chunks: Option<i64> = row.get("chunks");
    ChunkRecord {
        id: row.get("id"),
        document: row.get("document"),
        metadata: RecordMetadata {
            title: row.get("title"),
            author: row.get("author"),
            source: row.get("source"),
            hash: row.get("hash"),
            file: row.get("file"),
            chunk: chunk.map(|c| c as usize),
            chunks: chunks.map(|c| c as usize),
        },
    }
}

#[async_trait]
impl Collection for SqliteCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let texts: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let vectors = embed_for_storage(self.embedder.as_ref(), &texts).await;
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        for (record, vector) in records.iter().zip(vectors.iter()) {
            let m = &record.metadata;
            sqlx::query(
                r#"
                INSERT INTO records (collection, id, document, title, author, source, hash,
                                     file, chunk, chunks, embedding, model, created_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&self.name)
            .bind(&record.id)
            .bind(&record.document)
            .bind(&m.title)
            .bind(&m.author)
            .bind(&m.source)
            .bind(&m.hash)
            .bind(&m.file)
            .bind(m.chunk.map(|c| c as i64))
            .bind(m.chunks.map(|c| c as i64))
            .bind(vector.as_deref().map(vec_to_blob))
            .bind(vector.as_ref().map(|_| self.embedder.model_name()))
            .bind(now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert record {}", record.id))?;

            sqlx::query("INSERT INTO records_fts (collection, id, document) VALUES (?, ?, ?)")
                .bind(&self.name)
                .bind(&record.id)
                .bind(&record.document)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!(collection = %self.name, records = records.len(), "records inserted");
        Ok(())
    }

    async fn get(&self, filter: &RecordFilter) -> Result<Vec<ChunkRecord>> {
        let rows = match filter {
            RecordFilter::All => {
                sqlx::query(&format!(
                    "SELECT {} FROM records WHERE collection = ? ORDER BY rowid",
                    RECORD_COLUMNS
                ))
                .bind(&self.name)
                .fetch_all(&self.pool)
                .await?
            }
            RecordFilter::Hash(hash) => {
                sqlx::query(&format!(
                    "SELECT {} FROM records WHERE collection = ? AND hash = ? ORDER BY rowid",
                    RECORD_COLUMNS
                ))
                .bind(&self.name)
                .bind(hash)
                .fetch_all(&self.pool)
                .await?
            }
            RecordFilter::Ids(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders = vec!["?"; ids.len()].join(", ");
                let sql = format!(
                    "SELECT {} FROM records WHERE collection = ? AND id IN ({}) ORDER BY rowid",
                    RECORD_COLUMNS, placeholders
                );
                let mut query = sqlx::query(&sql).bind(&self.name);
                for id in ids {
                    query = query.bind(id);
                }
                query.fetch_all(&self.pool).await?
            }
        };

        Ok(rows.iter().map(record_from_row).collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for id in ids {
            sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
                .bind(&self.name)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM records_fts WHERE collection = ? AND id = ?")
                .bind(&self.name)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if !self.embedder.is_enabled() {
            return self.keyword_query(text, limit).await;
        }
        let query_vec = embedding::embed_one(self.embedder.as_ref(), text).await?;

        let rows = sqlx::query(&format!(
            "SELECT {}, embedding FROM records
             WHERE collection = ? AND embedding IS NOT NULL AND model = ?
               AND length(embedding) = ?",
            RECORD_COLUMNS
        ))
        .bind(&self.name)
        .bind(self.embedder.model_name())
        .bind((self.embedder.dims() * 4) as i64)
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let record = record_from_row(row);
                SearchHit {
                    distance: embedding::cosine_distance(&query_vec, &blob_to_vec(&blob)),
                    id: record.id,
                    document: record.document,
                    metadata: record.metadata,
                }
            })
            .collect();

        Ok(rank_hits(hits, limit))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE collection = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}
