//! Core data models used throughout papershelf.
//!
//! These types describe what flows through the ingestion pipeline: metadata
//! extracted from a PDF, the physical chunk records stored in a collection,
//! and the logical documents reassembled from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between a logical document id and a chunk index in a physical id.
pub const CHUNK_ID_MARKER: &str = "_chunk_";

pub const TITLE_MAX_CHARS: usize = 100;
pub const AUTHOR_MAX_CHARS: usize = 100;
pub const SOURCE_MAX_CHARS: usize = 20;

/// Where a document entered the shelf from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Arxiv,
    DownloadFolder,
    ManualUpload,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Arxiv => "arxiv",
            Source::DownloadFolder => "download_folder",
            Source::ManualUpload => "manual_upload",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "arxiv" => Ok(Source::Arxiv),
            "download_folder" => Ok(Source::DownloadFolder),
            "manual_upload" => Ok(Source::ManualUpload),
            other => anyhow::bail!(
                "Unknown source: '{}'. Must be arxiv, download_folder, or manual_upload.",
                other
            ),
        }
    }
}

/// Best-effort metadata extracted from a PDF file.
#[derive(Debug, Clone, PartialEq)]
pub struct PaperMetadata {
    pub title: String,
    /// Free-form author string; empty when nothing could be found.
    pub authors: String,
    /// Display date (`YYYY-MM-DD` when known), not necessarily the true creation time.
    pub created: String,
    pub source: Source,
    pub arxiv_id: Option<String>,
}

/// Caller-supplied values that win over whatever extraction produced.
#[derive(Debug, Clone, Default)]
pub struct MetadataOverrides {
    pub title: Option<String>,
    pub authors: Option<String>,
    pub source: Option<Source>,
    pub arxiv_id: Option<String>,
}

impl PaperMetadata {
    /// Apply overrides on top of extracted values.
    pub fn merge(mut self, overrides: &MetadataOverrides) -> Self {
        if let Some(title) = &overrides.title {
            self.title = title.clone();
        }
        if let Some(authors) = &overrides.authors {
            self.authors = authors.clone();
        }
        if let Some(source) = overrides.source {
            self.source = source;
        }
        if let Some(id) = &overrides.arxiv_id {
            self.arxiv_id = Some(id.clone());
        }
        self
    }
}

/// Metadata persisted alongside every physical record.
///
/// `chunk` and `chunks` are present only on records of a chunked document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    pub title: String,
    pub author: String,
    pub source: String,
    pub hash: String,
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
}

impl RecordMetadata {
    /// Build the length-capped record metadata for a document.
    pub fn new(meta: &PaperMetadata, hash: &str, file: &str) -> Self {
        Self {
            title: truncate_chars(&meta.title, TITLE_MAX_CHARS),
            author: truncate_chars(&meta.authors, AUTHOR_MAX_CHARS),
            source: truncate_chars(meta.source.as_str(), SOURCE_MAX_CHARS),
            hash: hash.to_string(),
            file: file.to_string(),
            chunk: None,
            chunks: None,
        }
    }

    pub fn for_chunk(&self, index: usize, total: usize) -> Self {
        Self {
            chunk: Some(index),
            chunks: Some(total),
            ..self.clone()
        }
    }
}

/// One physical record in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    pub id: String,
    pub document: String,
    pub metadata: RecordMetadata,
}

/// A ranked hit from a collection query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub document: String,
    pub metadata: RecordMetadata,
    /// Cosine distance (`1 - similarity`); smaller is closer.
    pub distance: f32,
}

/// Listing entry for one logical document.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: String,
    pub metadata: RecordMetadata,
    /// Physical ids backing this document; empty when it was stored whole.
    pub chunk_ids: Vec<String>,
}

impl DocumentSummary {
    /// Number of physical records, at least 1.
    pub fn record_count(&self) -> usize {
        self.chunk_ids.len().max(1)
    }
}

/// One page of logical documents.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentPage {
    pub documents: Vec<DocumentSummary>,
    /// Number of logical documents in the whole collection.
    pub total: usize,
}

impl DocumentPage {
    pub fn ids(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.id.as_str()).collect()
    }

    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            total: 0,
        }
    }
}

/// A logical document reassembled from its physical records.
#[derive(Debug, Clone, Serialize)]
pub struct LogicalDocument {
    pub id: String,
    pub metadata: RecordMetadata,
    /// Chunk texts in chunk order; a single element for unchunked documents.
    pub chunks: Vec<String>,
}

impl LogicalDocument {
    pub fn text(&self) -> String {
        self.chunks.join(" ")
    }
}

/// Successful ingestion result.
#[derive(Debug, Clone, Serialize)]
pub struct AddedDocument {
    pub id: String,
    pub metadata: RecordMetadata,
    /// Physical ids written, in chunk order.
    pub record_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_docs: usize,
    pub collections: Vec<String>,
    pub collection_counts: std::collections::BTreeMap<String, usize>,
}

/// Split a physical id into its logical id and chunk index.
///
/// Only ids ending in `_chunk_<digits>` are chunk ids.
pub fn parse_chunk_id(id: &str) -> Option<(&str, usize)> {
    let (base, index) = id.rsplit_once(CHUNK_ID_MARKER)?;
    if base.is_empty() || index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    index.parse().ok().map(|i| (base, i))
}

/// Logical id for any physical id.
pub fn logical_id(id: &str) -> &str {
    parse_chunk_id(id).map(|(base, _)| base).unwrap_or(id)
}

pub fn chunk_id(doc_id: &str, index: usize) -> String {
    format!("{}{}{}", doc_id, CHUNK_ID_MARKER, index)
}

/// Truncate to at most `max` characters (not bytes).
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(title: &str) -> PaperMetadata {
        PaperMetadata {
            title: title.to_string(),
            authors: "Ada Lovelace".to_string(),
            created: "2024-01-01".to_string(),
            source: Source::ManualUpload,
            arxiv_id: None,
        }
    }

    #[test]
    fn title_truncated_to_100_chars() {
        let long = "t".repeat(200);
        let rm = RecordMetadata::new(&meta(&long), "abc", "f.pdf");
        assert_eq!(rm.title.chars().count(), 100);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let s = "ü".repeat(150);
        let t = truncate_chars(&s, 100);
        assert_eq!(t.chars().count(), 100);
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn chunk_id_parsing() {
        assert_eq!(parse_chunk_id("B_chunk_0"), Some(("B", 0)));
        assert_eq!(parse_chunk_id("2301.07041_chunk_12"), Some(("2301.07041", 12)));
        assert_eq!(parse_chunk_id("A"), None);
        assert_eq!(parse_chunk_id("my_chunk_notes"), None);
        assert_eq!(parse_chunk_id("_chunk_3"), None);
        assert_eq!(logical_id("a_chunk_b_chunk_2"), "a_chunk_b");
        assert_eq!(chunk_id("B", 1), "B_chunk_1");
    }

    #[test]
    fn overrides_win() {
        let merged = meta("Extracted").merge(&MetadataOverrides {
            title: Some("Given".to_string()),
            source: Some(Source::Arxiv),
            arxiv_id: Some("2401.00001".to_string()),
            ..Default::default()
        });
        assert_eq!(merged.title, "Given");
        assert_eq!(merged.authors, "Ada Lovelace");
        assert_eq!(merged.source, Source::Arxiv);
        assert_eq!(merged.arxiv_id.as_deref(), Some("2401.00001"));
    }

    #[test]
    fn source_round_trips_through_str() {
        for s in [Source::Arxiv, Source::DownloadFolder, Source::ManualUpload] {
            assert_eq!(s.as_str().parse::<Source>().unwrap(), s);
        }
        assert!("web".parse::<Source>().is_err());
    }
}
