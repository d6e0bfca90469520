//! Persistent record collections.
//!
//! A [`Collection`] stores flat [`ChunkRecord`]s keyed by id and ranks them
//! against a text query. It knows nothing about logical documents; grouping
//! chunk records back into documents is the job of
//! [`DocumentStore`](crate::store::DocumentStore).
//!
//! Backends:
//! - [`SqliteCollection`]: one SQLite table, vectors as BLOBs, brute-force cosine ranking.
//! - [`InMemoryCollection`]: `RwLock<Vec<_>>`, used by tests.
//!
//! With the `disabled` embedding provider, [`Collection::query`] falls back
//! to keyword ranking (FTS5 `bm25` in SQLite, term counts in memory).

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryCollection;
pub use sqlite::SqliteCollection;

use anyhow::Result;
use async_trait::async_trait;
use tracing::warn;

use crate::embedding::Embedder;
use crate::models::{ChunkRecord, SearchHit};

/// Which records a [`Collection::get`] call returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordFilter {
    All,
    Ids(Vec<String>),
    /// Records whose metadata `hash` equals the value.
    Hash(String),
}

impl RecordFilter {
    pub fn ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RecordFilter::Ids(ids.into_iter().map(Into::into).collect())
    }

    pub fn matches(&self, record: &ChunkRecord) -> bool {
        match self {
            RecordFilter::All => true,
            RecordFilter::Ids(ids) => ids.iter().any(|id| *id == record.id),
            RecordFilter::Hash(hash) => record.metadata.hash == *hash,
        }
    }
}

/// Storage backend for chunk records.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`add`](Collection::add) | Insert records; all or nothing, existing ids are an error |
/// | [`get`](Collection::get) | Fetch records in insertion order |
/// | [`delete`](Collection::delete) | Remove records by id; unknown ids are ignored |
/// | [`query`](Collection::query) | Rank records by similarity to a text, or by keywords without embeddings |
/// | [`count`](Collection::count) | Number of physical records |
#[async_trait]
pub trait Collection: Send + Sync {
    fn name(&self) -> &str;

    async fn add(&self, records: &[ChunkRecord]) -> Result<()>;

    async fn get(&self, filter: &RecordFilter) -> Result<Vec<ChunkRecord>>;

    async fn delete(&self, ids: &[String]) -> Result<()>;

    /// Up to `limit` hits, closest first.
    async fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>>;

    async fn count(&self) -> Result<usize>;
}

/// Sort hits by ascending distance and keep the first `limit`.
pub(crate) fn rank_hits(mut hits: Vec<SearchHit>, limit: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(limit);
    hits
}

/// Lowercased alphanumeric terms of a keyword query.
pub(crate) fn query_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Map a keyword relevance score (higher is better) into `(0, 1]`, smaller is closer.
pub(crate) fn keyword_distance(score: f64) -> f32 {
    (1.0 / (1.0 + score.max(0.0))) as f32
}

/// Embed record texts for storage. Embedding is best-effort: on failure the
/// records are stored without vectors and can be backfilled later.
pub(crate) async fn embed_for_storage(
    embedder: &dyn Embedder,
    texts: &[String],
) -> Vec<Option<Vec<f32>>> {
    if !embedder.is_enabled() || texts.is_empty() {
        return vec![None; texts.len()];
    }

    let dims = embedder.dims();
    match embedder.embed(texts).await {
        Ok(vectors) if vectors.len() == texts.len() => vectors
            .into_iter()
            .map(|v| {
                if v.len() == dims {
                    Some(v)
                } else {
                    warn!(
                        expected = dims,
                        got = v.len(),
                        "embedding has the wrong dimension; storing without vector"
                    );
                    None
                }
            })
            .collect(),
        Ok(vectors) => {
            warn!(
                expected = texts.len(),
                got = vectors.len(),
                "embedding provider returned the wrong number of vectors; storing without vectors"
            );
            vec![None; texts.len()]
        }
        Err(e) => {
            warn!(error = %e, "embedding failed; storing without vectors");
            vec![None; texts.len()]
        }
    }
}
