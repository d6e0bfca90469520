//! Text and metadata extraction from PDF files.
//!
//! Both entry points are infallible by contract: [`extract_text`] returns an
//! empty string when the PDF cannot be read, and [`extract_metadata`] falls
//! back to a record derived from the file name. Causes are logged.
//!
//! Metadata resolution order:
//! 1. the PDF document-info dictionary (title, author, creation date)
//! 2. author patterns on the first blocks of extracted text
//! 3. the file name (title) and today's date (created)

use chrono::{Local, NaiveDate};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::models::{PaperMetadata, Source};

/// Number of `\n\n`-separated blocks scanned for author patterns.
const AUTHOR_SCAN_BLOCKS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("PDF parsing failed: {0}")]
    Pdf(String),
    #[error("PDF parser panicked")]
    Panicked,
}

/// Document-info fields as found in the PDF, before any fallback.
#[derive(Debug, Clone, Default)]
pub struct InfoFields {
    pub title: Option<String>,
    pub author: Option<String>,
    pub creation_date: Option<String>,
}

/// Extract the full text of a PDF, one newline after every page.
///
/// Returns an empty string on any failure.
pub fn extract_text(path: &Path) -> String {
    match try_extract_text(path) {
        Ok(text) => text,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "text extraction failed");
            String::new()
        }
    }
}

pub fn try_extract_text(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_text_from_mem(&bytes)
}

/// Extract text from in-memory PDF bytes.
pub fn extract_text_from_mem(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract can panic on malformed input
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Panicked)?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;

    let mut text = String::new();
    for page in pages {
        text.push_str(&page);
        text.push('\n');
    }
    Ok(text)
}

/// Extract best-effort metadata for a PDF. Never fails.
pub fn extract_metadata(path: &Path) -> PaperMetadata {
    match try_extract_metadata(path) {
        Ok(meta) => meta,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "metadata extraction failed, using file name");
            fallback_metadata(&file_name_of(path))
        }
    }
}

/// Like [`extract_metadata`], but reports an unreadable PDF instead of degrading.
pub fn try_extract_metadata(path: &Path) -> Result<PaperMetadata, ExtractError> {
    let info = read_info(path)?;
    Ok(metadata_from_parts(&file_name_of(path), info, || {
        extract_text(path)
    }))
}

fn read_info(path: &Path) -> Result<InfoFields, ExtractError> {
    let meta = lopdf::Document::load_metadata(path).map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(InfoFields {
        title: meta.title,
        author: meta.author,
        creation_date: meta.creation_date,
    })
}

/// Resolve metadata from document-info fields, falling back to text patterns
/// and the file name. `text` is only called when authors are missing.
pub fn metadata_from_parts(
    file_name: &str,
    info: InfoFields,
    text: impl FnOnce() -> String,
) -> PaperMetadata {
    let stem = file_stem(file_name);

    let title = non_empty(info.title).unwrap_or_else(|| stem.to_string());

    let authors = match non_empty(info.author) {
        Some(a) => a,
        None => {
            let text = text();
            let found = guess_authors(&text).unwrap_or_default();
            if !found.is_empty() {
                debug!(file = file_name, authors = %found, "authors taken from first page");
            }
            found
        }
    };

    let created = non_empty(info.creation_date)
        .map(|d| normalize_pdf_date(&d))
        .unwrap_or_else(today);

    let (source, arxiv_id) = if arxiv_id_pattern().is_match(stem) {
        (Source::Arxiv, Some(stem.to_string()))
    } else {
        (Source::ManualUpload, None)
    };

    PaperMetadata {
        title,
        authors,
        created,
        source,
        arxiv_id,
    }
}

/// Minimal record used when the PDF cannot be opened at all.
pub fn fallback_metadata(file_name: &str) -> PaperMetadata {
    PaperMetadata {
        title: file_stem(file_name).to_string(),
        authors: String::new(),
        created: today(),
        source: Source::ManualUpload,
        arxiv_id: None,
    }
}

/// Look for an author line in the first blocks of the text.
///
/// Patterns are tried in order: an explicit `Author(s):`/`By` label, then a
/// line followed by an affiliation line. Empty captures do not count.
pub fn guess_authors(text: &str) -> Option<String> {
    let head = text
        .split("\n\n")
        .take(AUTHOR_SCAN_BLOCKS)
        .collect::<Vec<_>>()
        .join("\n");

    author_patterns()
        .iter()
        .filter_map(|re| re.captures(&head))
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim().to_string()))
        .find(|s| !s.is_empty())
}

fn author_patterns() -> &'static [Regex; 2] {
    static PATTERNS: OnceLock<[Regex; 2]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"(?im)(?:Author|Authors|By)s?:?\s*(.*?)(?:\n|$)").unwrap(),
            Regex::new(
                r"(?im)^(.*?)\n.*?(?:University|Institute|College|Laboratory|Department)",
            )
            .unwrap(),
        ]
    })
}

fn arxiv_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\d{4}\.\d{4,5}").unwrap())
}

/// Turn a PDF date (`D:YYYYMMDDHHmmSS...`) into `YYYY-MM-DD`; other values pass through.
pub fn normalize_pdf_date(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("D:").unwrap_or(trimmed);
    digits
        .get(..8)
        .and_then(|ymd| NaiveDate::parse_from_str(ymd, "%Y%m%d").ok())
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| trimmed.to_string())
}

fn today() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// File name without its `.pdf` extension.
pub(crate) fn file_stem(file_name: &str) -> &str {
    Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name)
}
