//! In-memory [`Collection`] for tests.
//!
//! Records live in a `Vec` behind `std::sync::RwLock`, so insertion order is
//! the listing order. Query ranking is brute-force cosine distance over
//! records that have a vector, or query-term counts when embeddings are
//! disabled.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::embedding::{self, Embedder};
use crate::models::{ChunkRecord, SearchHit};

use super::{embed_for_storage, keyword_distance, query_terms, rank_hits, Collection, RecordFilter};

struct StoredRecord {
    record: ChunkRecord,
    vector: Option<Vec<f32>>,
}

pub struct InMemoryCollection {
    name: String,
    embedder: Arc<dyn Embedder>,
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            name: name.into(),
            embedder,
            records: RwLock::new(Vec::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<StoredRecord>>> {
        self.records
            .read()
            .map_err(|_| anyhow::anyhow!("collection lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<StoredRecord>>> {
        self.records
            .write()
            .map_err(|_| anyhow::anyhow!("collection lock poisoned"))
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn add(&self, records: &[ChunkRecord]) -> Result<()> {
        {
            let stored = self.read()?;
            for (i, r) in records.iter().enumerate() {
                let repeated = records[..i].iter().any(|o| o.id == r.id);
                if repeated || stored.iter().any(|s| s.record.id == r.id) {
                    bail!("record id already exists: {}", r.id);
                }
            }
        }

        let texts: Vec<String> = records.iter().map(|r| r.document.clone()).collect();
        let vectors = embed_for_storage(self.embedder.as_ref(), &texts).await;

        let mut stored = self.write()?;
        // Re-check under the write lock; the read lock was released for embedding
        if let Some(r) = records
            .iter()
            .find(|r| stored.iter().any(|s| s.record.id == r.id))
        {
            bail!("record id already exists: {}", r.id);
        }
        for (record, vector) in records.iter().zip(vectors) {
            stored.push(StoredRecord {
                record: record.clone(),
                vector,
            });
        }
        Ok(())
    }

    async fn get(&self, filter: &RecordFilter) -> Result<Vec<ChunkRecord>> {
        let stored = self.read()?;
        Ok(stored
            .iter()
            .filter(|s| filter.matches(&s.record))
            .map(|s| s.record.clone())
            .collect())
    }

    async fn delete(&self, ids: &[String]) -> Result<()> {
        let mut stored = self.write()?;
        stored.retain(|s| !ids.contains(&s.record.id));
        Ok(())
    }

    async fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if !self.embedder.is_enabled() {
            let terms = query_terms(text);
            let stored = self.read()?;
            let hits = stored
                .iter()
                .filter_map(|s| {
                    let score = query_terms(&s.record.document)
                        .iter()
                        .filter(|w| terms.contains(w))
                        .count();
                    (score > 0).then(|| SearchHit {
                        id: s.record.id.clone(),
                        document: s.record.document.clone(),
                        metadata: s.record.metadata.clone(),
                        distance: keyword_distance(score as f64),
                    })
                })
                .collect();
            return Ok(rank_hits(hits, limit));
        }
        let query_vec = embedding::embed_one(self.embedder.as_ref(), text).await?;

        let stored = self.read()?;
        let hits = stored
            .iter()
            .filter_map(|s| {
                s.vector.as_ref().map(|v| SearchHit {
                    id: s.record.id.clone(),
                    document: s.record.document.clone(),
                    metadata: s.record.metadata.clone(),
                    distance: embedding::cosine_distance(&query_vec, v),
                })
            })
            .collect();

        Ok(rank_hits(hits, limit))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::testing::WordEmbedder;
    use crate::embedding::DisabledEmbedder;
    use crate::models::RecordMetadata;

    fn record(id: &str, text: &str, hash: &str) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            document: text.to_string(),
            metadata: RecordMetadata {
                title: id.to_string(),
                author: String::new(),
                source: "manual_upload".to_string(),
                hash: hash.to_string(),
                file: format!("{}.pdf", id),
                chunk: None,
                chunks: None,
            },
        }
    }

    #[tokio::test]
    async fn add_get_delete() {
        let c = InMemoryCollection::new("t", Arc::new(DisabledEmbedder));
        c.add(&[record("a", "alpha", "h1"), record("b", "beta", "h2")])
            .await
            .unwrap();

        assert_eq!(c.count().await.unwrap(), 2);
        let by_hash = c.get(&RecordFilter::Hash("h2".into())).await.unwrap();
        assert_eq!(by_hash.len(), 1);
        assert_eq!(by_hash[0].id, "b");

        c.delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        let all = c.get(&RecordFilter::All).await.unwrap();
        assert_eq!(all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[tokio::test]
    async fn duplicate_id_rejects_whole_batch() {
        let c = InMemoryCollection::new("t", Arc::new(DisabledEmbedder));
        c.add(&[record("a", "alpha", "h1")]).await.unwrap();

        let err = c
            .add(&[record("z", "zeta", "h3"), record("a", "again", "h4")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(c.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn query_ranks_by_distance() {
        let c = InMemoryCollection::new("t", Arc::new(WordEmbedder));
        c.add(&[
            record("cats", "cats purr and cats nap", "h1"),
            record("rust", "rust borrow checker lifetimes", "h2"),
        ])
        .await
        .unwrap();

        let hits = c.query("borrow checker", 5).await.unwrap();
        assert_eq!(hits[0].id, "rust");
        assert!(hits[0].distance < hits[1].distance);

        let hits = c.query("borrow checker", 1).await.unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn query_without_embedder_counts_terms() {
        let c = InMemoryCollection::new("t", Arc::new(DisabledEmbedder));
        c.add(&[
            record("once", "a graph of cities", "h1"),
            record("twice", "graph search on a Graph", "h2"),
            record("none", "sorting networks", "h3"),
        ])
        .await
        .unwrap();

        let hits = c.query("GRAPH", 5).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["twice", "once"]);
        assert!(c.query("", 5).await.unwrap().is_empty());
    }
}
