//! Document store: logical documents on top of a flat [`Collection`].
//!
//! One logical document is written either as a single record at its
//! `doc_id`, or, when its text is longer than the chunk threshold, as `N`
//! records `doc_id_chunk_0 .. doc_id_chunk_{N-1}` each carrying `chunk` and
//! `chunks` metadata. Every read path (listing, stats, retrieval,
//! deletion) groups physical ids back by their logical id.
//!
//! Ingestion rejects short text and exact duplicates (MD5 of the full
//! extracted text, checked against the `hash` of every stored record).
//! Read operations never fail: collection errors are logged and an empty
//! value is returned.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::chunk::chunk_text;
use crate::collection::{Collection, RecordFilter, SqliteCollection};
use crate::config::{ChunkingConfig, Config};
use crate::extract;
use crate::models::{
    chunk_id, logical_id, parse_chunk_id, AddedDocument, ChunkRecord, DocumentPage,
    DocumentSummary, LogicalDocument, MetadataOverrides, PaperMetadata, RecordMetadata,
    SearchHit, StoreStats,
};

/// Why a document was not added.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IngestError {
    #[error("not enough text could be extracted from the PDF ({chars} characters)")]
    InsufficientText { chars: usize },
    #[error("this document (or one with identical content) already exists as {existing_id}")]
    Duplicate { existing_id: String },
    #[error("store error: {0}")]
    Store(String),
}

pub struct DocumentStore {
    collection: Arc<dyn Collection>,
    max_chunk_chars: usize,
    min_text_chars: usize,
}

impl DocumentStore {
    pub fn new(collection: Arc<dyn Collection>, chunking: &ChunkingConfig) -> Self {
        Self::with_limits(collection, chunking.max_chars, chunking.min_text_chars)
    }

    pub fn with_limits(
        collection: Arc<dyn Collection>,
        max_chunk_chars: usize,
        min_text_chars: usize,
    ) -> Self {
        Self {
            collection,
            max_chunk_chars,
            min_text_chars,
        }
    }

    /// Store over the configured SQLite collection.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let collection = SqliteCollection::from_config(config).await?;
        Ok(Self::new(Arc::new(collection), &config.chunking))
    }

    pub fn collection(&self) -> &Arc<dyn Collection> {
        &self.collection
    }

    /// Extract, deduplicate, chunk and store one PDF.
    ///
    /// `overrides` win over extracted metadata.
    pub async fn add(
        &self,
        path: &Path,
        overrides: &MetadataOverrides,
    ) -> Result<AddedDocument, IngestError> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract::extract_text(&owned))
            .await
            .map_err(|e| IngestError::Store(format!("extraction task failed: {}", e)))?;

        let chars = text.chars().count();
        if chars < self.min_text_chars {
            return Err(IngestError::InsufficientText { chars });
        }

        let owned = path.to_path_buf();
        let metadata = tokio::task::spawn_blocking(move || extract::extract_metadata(&owned))
            .await
            .map_err(|e| IngestError::Store(format!("extraction task failed: {}", e)))?;

        let file_name = extract::file_name_of(path);
        self.ingest_text(&file_name, &text, metadata.merge(overrides))
            .await
    }

    /// Store already-extracted text under the given metadata.
    pub async fn ingest_text(
        &self,
        file_name: &str,
        text: &str,
        metadata: PaperMetadata,
    ) -> Result<AddedDocument, IngestError> {
        let chars = text.chars().count();
        if chars < self.min_text_chars || text.trim().is_empty() {
            return Err(IngestError::InsufficientText { chars });
        }

        let hash = format!("{:x}", md5::compute(text.as_bytes()));
        let record_meta = RecordMetadata::new(&metadata, &hash, file_name);

        let doc_id = match metadata.arxiv_id.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => format!("{}_{}", extract::file_stem(file_name), &hash[..8]),
        };

        match self.collection.get(&RecordFilter::Hash(hash.clone())).await {
            Ok(existing) => {
                if let Some(first) = existing.first() {
                    return Err(IngestError::Duplicate {
                        existing_id: first.id.clone(),
                    });
                }
            }
            Err(e) => warn!(error = %e, "duplicate check failed, continuing with insert"),
        }

        let records = if chars > self.max_chunk_chars {
            let chunks = chunk_text(text, self.max_chunk_chars);
            if chunks.is_empty() {
                return Err(IngestError::InsufficientText { chars });
            }
            let total = chunks.len();
            chunks
                .into_iter()
                .enumerate()
                .map(|(i, chunk)| ChunkRecord {
                    id: chunk_id(&doc_id, i),
                    document: chunk,
                    metadata: record_meta.for_chunk(i, total),
                })
                .collect::<Vec<_>>()
        } else {
            vec![ChunkRecord {
                id: doc_id.clone(),
                document: text.to_string(),
                metadata: record_meta.clone(),
            }]
        };

        self.collection.add(&records).await.map_err(|e| {
            warn!(doc_id = %doc_id, error = %e, "failed to store document");
            IngestError::Store(format!("{:#}", e))
        })?;

        info!(doc_id = %doc_id, records = records.len(), "document added");
        Ok(AddedDocument {
            id: doc_id,
            metadata: record_meta,
            record_ids: records.into_iter().map(|r| r.id).collect(),
        })
    }

    /// Ranked physical hits; empty when the collection cannot answer.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        match self.collection.query(query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "search failed");
                Vec::new()
            }
        }
    }

    /// One page of logical documents in insertion order.
    pub async fn list_documents(&self, limit: usize, offset: usize) -> DocumentPage {
        let records = match self.collection.get(&RecordFilter::All).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "listing documents failed");
                return DocumentPage::empty();
            }
        };

        let documents = group_records(records);
        let total = documents.len();
        DocumentPage {
            documents: documents.into_iter().skip(offset).take(limit).collect(),
            total,
        }
    }

    /// Reassemble one logical document from its records.
    pub async fn get_document(&self, doc_id: &str) -> Option<LogicalDocument> {
        let records = match self.collection.get(&RecordFilter::All).await {
            Ok(r) => r,
            Err(e) => {
                warn!(doc_id, error = %e, "fetching document failed");
                return None;
            }
        };

        let mut parts: Vec<ChunkRecord> = records
            .into_iter()
            .filter(|r| logical_id(&r.id) == doc_id)
            .collect();
        if parts.is_empty() {
            return None;
        }

        if let Some(whole) = parts.iter().position(|r| r.id == doc_id) {
            let record = parts.swap_remove(whole);
            return Some(LogicalDocument {
                id: record.id,
                metadata: record.metadata,
                chunks: vec![record.document],
            });
        }

        parts.sort_by_key(|r| parse_chunk_id(&r.id).map(|(_, i)| i).unwrap_or(usize::MAX));
        let mut metadata = parts[0].metadata.clone();
        metadata.chunk = None;
        Some(LogicalDocument {
            id: doc_id.to_string(),
            metadata,
            chunks: parts.into_iter().map(|r| r.document).collect(),
        })
    }

    /// Remove every record of a logical document. `true` only when nothing remains.
    pub async fn delete(&self, doc_id: &str) -> bool {
        let records = match self.collection.get(&RecordFilter::All).await {
            Ok(r) => r,
            Err(e) => {
                warn!(doc_id, error = %e, "delete lookup failed");
                return false;
            }
        };

        let mut ids: Vec<String> = records
            .iter()
            .filter(|r| parse_chunk_id(&r.id).is_some_and(|(base, _)| base == doc_id))
            .map(|r| r.id.clone())
            .collect();
        debug!(doc_id, chunks = ids.len(), "deleting document");
        // The bare id goes last; deleting an absent id is not an error
        ids.push(doc_id.to_string());

        if let Err(e) = self.collection.delete(&ids).await {
            warn!(doc_id, error = %e, "delete failed");
            return false;
        }

        match self.collection.get(&RecordFilter::All).await {
            Ok(remaining) => {
                let gone = !remaining.iter().any(|r| logical_id(&r.id) == doc_id);
                if !gone {
                    warn!(doc_id, "records still present after delete");
                }
                gone
            }
            Err(e) => {
                warn!(doc_id, error = %e, "delete verification failed");
                false
            }
        }
    }

    /// Logical-document counts for the bound collection.
    pub async fn stats(&self) -> StoreStats {
        let name = self.collection.name().to_string();
        let mut stats = StoreStats {
            total_docs: 0,
            collections: vec![name.clone()],
            collection_counts: Default::default(),
        };

        match self.collection.get(&RecordFilter::All).await {
            Ok(records) => {
                stats.total_docs = group_records(records).len();
                stats.collection_counts.insert(name, stats.total_docs);
            }
            Err(e) => warn!(error = %e, "collecting stats failed"),
        }

        stats
    }
}

/// Group physical records into logical documents in first-appearance order.
pub fn group_records(records: Vec<ChunkRecord>) -> Vec<DocumentSummary> {
    let mut documents: Vec<DocumentSummary> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        let (base, chunk) = match parse_chunk_id(&record.id) {
            Some((base, i)) => (base.to_string(), Some(i)),
            None => (record.id.clone(), None),
        };

        let slot = *index.entry(base.clone()).or_insert_with(|| {
            let mut metadata = record.metadata.clone();
            metadata.chunk = None;
            documents.push(DocumentSummary {
                id: base,
                metadata,
                chunk_ids: Vec::new(),
            });
            documents.len() - 1
        });

        if chunk.is_some() {
            documents[slot].chunk_ids.push(record.id);
        }
    }

    for doc in &mut documents {
        doc.chunk_ids
            .sort_by_key(|id| parse_chunk_id(id).map(|(_, i)| i).unwrap_or(usize::MAX));
    }

    documents
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::InMemoryCollection;
    use crate::embedding::testing::WordEmbedder;
    use crate::embedding::DisabledEmbedder;
    use crate::models::Source;

    fn store() -> DocumentStore {
        let collection = Arc::new(InMemoryCollection::new("knowledge", Arc::new(WordEmbedder)));
        DocumentStore::with_limits(collection, 8000, 100)
    }

    fn meta(title: &str, arxiv_id: Option<&str>) -> PaperMetadata {
        PaperMetadata {
            title: title.to_string(),
            authors: "Grace Hopper".to_string(),
            created: "2024-05-01".to_string(),
            source: if arxiv_id.is_some() {
                Source::Arxiv
            } else {
                Source::ManualUpload
            },
            arxiv_id: arxiv_id.map(str::to_string),
        }
    }

    fn body(topic: &str, sentences: usize) -> String {
        (0..sentences)
            .map(|i| format!("Sentence {} of the paper discusses {} in depth.", i, topic))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn record(id: &str) -> ChunkRecord {
        let chunk = parse_chunk_id(id).map(|(_, i)| i);
        ChunkRecord {
            id: id.to_string(),
            document: format!("text of {}", id),
            metadata: RecordMetadata {
                title: id.to_string(),
                author: String::new(),
                source: "arxiv".to_string(),
                hash: format!("hash-{}", logical_id(id)),
                file: "x.pdf".to_string(),
                chunk,
                chunks: chunk.map(|_| 2),
            },
        }
    }

    #[tokio::test]
    async fn short_document_is_one_record() {
        let s = store();
        let added = s
            .ingest_text("notes.pdf", &body("graphs", 5), meta("Notes", None))
            .await
            .unwrap();

        assert!(added.id.starts_with("notes_"));
        assert_eq!(added.id.len(), "notes_".len() + 8);
        assert_eq!(added.record_ids, vec![added.id.clone()]);
        assert_eq!(added.metadata.hash.len(), 32);
        assert_eq!(added.metadata.file, "notes.pdf");
        assert_eq!(added.metadata.chunk, None);
    }

    #[tokio::test]
    async fn arxiv_id_becomes_doc_id() {
        let s = store();
        let added = s
            .ingest_text("x.pdf", &body("graphs", 5), meta("T", Some("2301.07041")))
            .await
            .unwrap();
        assert_eq!(added.id, "2301.07041");
        assert_eq!(added.metadata.source, "arxiv");
    }

    #[tokio::test]
    async fn insufficient_text_rejected_without_records() {
        let s = store();
        let err = s
            .ingest_text("tiny.pdf", &"x".repeat(50), meta("Tiny", None))
            .await
            .unwrap_err();
        assert_eq!(err, IngestError::InsufficientText { chars: 50 });
        assert_eq!(s.collection().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn whitespace_only_text_is_insufficient() {
        let s = store();
        let blank = "\n".repeat(9000);

        for _ in 0..2 {
            let err = s
                .ingest_text("blank.pdf", &blank, meta("Blank", None))
                .await
                .unwrap_err();
            assert_eq!(err, IngestError::InsufficientText { chars: 9000 });
        }
        assert_eq!(s.collection().count().await.unwrap(), 0);
        assert_eq!(s.list_documents(10, 0).await.total, 0);
    }

    #[tokio::test]
    async fn second_insert_is_duplicate_of_first() {
        let s = store();
        let text = body("caching", 10);
        let first = s.ingest_text("a.pdf", &text, meta("A", None)).await.unwrap();

        let err = s
            .ingest_text("renamed.pdf", &text, meta("B", None))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::Duplicate {
                existing_id: first.id.clone()
            }
        );
        assert_eq!(s.list_documents(100, 0).await.total, 1);
    }

    #[tokio::test]
    async fn duplicate_of_chunked_document_reports_chunk_id() {
        let s = store();
        let text = body("compilers", 400);
        let first = s
            .ingest_text("big.pdf", &text, meta("Big", Some("2401.00001")))
            .await
            .unwrap();
        let err = s
            .ingest_text("big.pdf", &text, meta("Big", Some("2401.00001")))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            IngestError::Duplicate {
                existing_id: first.record_ids[0].clone()
            }
        );
    }

    #[tokio::test]
    async fn same_arxiv_id_different_content_is_store_error() {
        let s = store();
        s.ingest_text("a.pdf", &body("first", 5), meta("A", Some("2401.00001")))
            .await
            .unwrap();
        let err = s
            .ingest_text("a.pdf", &body("second", 5), meta("A", Some("2401.00001")))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Store(_)));
    }

    #[tokio::test]
    async fn twenty_thousand_chars_make_three_chunks() {
        let s = store();
        let sentence = format!("{}.", "w".repeat(98));
        let text = vec![sentence; 200].join(" ");
        assert!(text.chars().count() > 19_000);

        let added = s
            .ingest_text("long.pdf", &text, meta("Long", Some("2402.12345")))
            .await
            .unwrap();
        assert_eq!(
            added.record_ids,
            vec!["2402.12345_chunk_0", "2402.12345_chunk_1", "2402.12345_chunk_2"]
        );

        let records = s.collection().get(&RecordFilter::All).await.unwrap();
        assert_eq!(records.len(), 3);
        for (i, r) in records.iter().enumerate() {
            assert!(r.document.chars().count() <= 8000);
            assert_eq!(r.metadata.chunk, Some(i));
            assert_eq!(r.metadata.chunks, Some(3));
        }
        assert!(s
            .collection()
            .get(&RecordFilter::ids(["2402.12345"]))
            .await
            .unwrap()
            .is_empty());

        let doc = s.get_document("2402.12345").await.unwrap();
        assert_eq!(doc.chunks.len(), 3);
        assert_eq!(doc.text(), text);
    }

    #[tokio::test]
    async fn long_title_truncated() {
        let s = store();
        let added = s
            .ingest_text("t.pdf", &body("titles", 5), meta(&"T".repeat(200), None))
            .await
            .unwrap();
        assert_eq!(added.metadata.title.chars().count(), 100);
        let stored = s.collection().get(&RecordFilter::All).await.unwrap();
        assert_eq!(stored[0].metadata.title.chars().count(), 100);
    }

    #[tokio::test]
    async fn grouping_counts_logical_documents() {
        let collection = Arc::new(InMemoryCollection::new("knowledge", Arc::new(DisabledEmbedder)));
        collection
            .add(&[
                record("A"),
                record("B_chunk_0"),
                record("B_chunk_1"),
                record("C_chunk_0"),
            ])
            .await
            .unwrap();
        let s = DocumentStore::with_limits(collection, 8000, 100);

        let page = s.list_documents(10, 0).await;
        assert_eq!(page.total, 3);
        assert_eq!(page.ids(), vec!["A", "B", "C"]);
        let counts: Vec<usize> = page.documents.iter().map(|d| d.record_count()).collect();
        assert_eq!(counts, vec![1, 2, 1]);

        let page = s.list_documents(1, 1).await;
        assert_eq!(page.ids(), vec!["B"]);
        assert_eq!(page.total, 3);

        assert!(s.list_documents(10, 5).await.documents.is_empty());

        let stats = s.stats().await;
        assert_eq!(stats.total_docs, 3);
        assert_eq!(stats.collections, vec!["knowledge".to_string()]);
        assert_eq!(stats.collection_counts.get("knowledge"), Some(&3));
    }

    #[tokio::test]
    async fn delete_removes_every_chunk() {
        let collection = Arc::new(InMemoryCollection::new("knowledge", Arc::new(DisabledEmbedder)));
        collection
            .add(&[
                record("A"),
                record("B_chunk_0"),
                record("B_chunk_1"),
                record("BB_chunk_0"),
            ])
            .await
            .unwrap();
        let s = DocumentStore::with_limits(collection, 8000, 100);

        assert!(s.delete("B").await);
        let remaining: Vec<String> = s
            .collection()
            .get(&RecordFilter::All)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(remaining, vec!["A", "BB_chunk_0"]);

        assert!(s.delete("A").await);
        assert!(s.delete("never-existed").await);
        assert!(s.get_document("A").await.is_none());
    }

    #[tokio::test]
    async fn search_returns_ranked_hits() {
        let s = store();
        s.ingest_text("bio.pdf", &body("protein folding", 6), meta("Bio", None))
            .await
            .unwrap();
        s.ingest_text("db.pdf", &body("query planners", 6), meta("DB", None))
            .await
            .unwrap();

        let hits = s.search("query planners", 5).await;
        assert_eq!(hits.len(), 2);
        assert!(hits[0].id.starts_with("db_"));
    }

    #[tokio::test]
    async fn search_without_embeddings_ranks_by_keywords() {
        let collection = Arc::new(InMemoryCollection::new("k", Arc::new(DisabledEmbedder)));
        let s = DocumentStore::with_limits(collection, 8000, 100);
        s.ingest_text("a.pdf", &body("type inference", 5), meta("A", None))
            .await
            .unwrap();
        s.ingest_text("b.pdf", &body("garbage collection", 5), meta("B", None))
            .await
            .unwrap();

        let hits = s.search("garbage collectors", 5).await;
        assert_eq!(hits.len(), 1);
        assert!(hits[0].id.starts_with("b_"));
        assert!(s.search("unrelated words", 5).await.is_empty());
    }
}
