//! arXiv search and PDF download.
//!
//! Queries go to the arXiv export API (Atom feed). Every query is restricted
//! to titles matching the keyword, the configured category and a submitted
//! date range from `start_year` to the current year. Consecutive API calls are
//! spaced at least `request_delay_ms` apart.
//!
//! Downloads are idempotent: the target file name is derived from the paper
//! (sanitised title + arXiv id), and an existing file is returned without a
//! network call.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Datelike;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ArxivConfig;
use crate::models::truncate_chars;

/// Longest title prefix used in a download file name.
const FILE_TITLE_MAX_CHARS: usize = 80;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Paper {
    /// Versioned id as it appears in the feed, e.g. `2301.07041v2`.
    pub arxiv_id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    /// RFC 3339 timestamp of the first version.
    pub published: String,
    pub pdf_url: String,
    pub categories: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
}

impl Paper {
    pub fn published_year(&self) -> Option<i32> {
        chrono::DateTime::parse_from_rfc3339(&self.published)
            .map(|d| d.year())
            .ok()
            .or_else(|| self.published.get(..4).and_then(|y| y.parse().ok()))
    }

    pub fn authors_joined(&self) -> String {
        self.authors.join(", ")
    }

    /// `<sanitised title>_<arxiv id>.pdf`
    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.pdf",
            sanitize_file_name(&self.title),
            sanitize_file_name(&self.arxiv_id)
        )
    }

    pub fn download_path(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }

    pub fn is_downloaded(&self, dir: &Path) -> bool {
        self.download_path(dir).is_file()
    }

    /// `id` names this paper exactly, or names it without the version suffix.
    pub fn matches_id(&self, id: &str) -> bool {
        let id = id.trim();
        !id.is_empty() && (self.arxiv_id == id || unversioned(&self.arxiv_id) == id)
    }
}

/// `2301.07041v2` → `2301.07041`; ids without a version are returned as is.
fn unversioned(id: &str) -> &str {
    match id.rsplit_once('v') {
        Some((base, version))
            if !base.is_empty()
                && !version.is_empty()
                && version.chars().all(|c| c.is_ascii_digit()) =>
        {
            base
        }
        _ => id,
    }
}

/// Papers named by `ids`, in result order. An empty `ids` keeps every paper.
pub fn select_papers(papers: Vec<Paper>, ids: &[String]) -> Vec<Paper> {
    if ids.is_empty() {
        return papers;
    }
    for id in ids {
        if !papers.iter().any(|p| p.matches_id(id)) {
            warn!(id = %id, "requested paper is not on this result page");
        }
    }
    papers
        .into_iter()
        .filter(|p| ids.iter().any(|id| p.matches_id(id)))
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortBy {
    Relevance,
    #[default]
    SubmittedDate,
    LastUpdatedDate,
}

impl SortBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::SubmittedDate => "submittedDate",
            SortBy::LastUpdatedDate => "lastUpdatedDate",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "relevance" => Ok(SortBy::Relevance),
            "submitted" | "submittedDate" => Ok(SortBy::SubmittedDate),
            "updated" | "lastUpdatedDate" => Ok(SortBy::LastUpdatedDate),
            other => bail!(
                "Unknown sort field: '{}'. Must be relevance, submitted, or updated.",
                other
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Ascending,
    #[default]
    Descending,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => bail!("Unknown sort order: '{}'. Must be asc or desc.", other),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub keyword: String,
    pub start_year: i32,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
    pub offset: usize,
    pub per_page: usize,
}

impl SearchQuery {
    pub fn new(keyword: impl Into<String>, start_year: i32) -> Self {
        Self {
            keyword: keyword.into(),
            start_year,
            sort_by: SortBy::default(),
            sort_order: SortOrder::default(),
            offset: 0,
            per_page: 20,
        }
    }
}

pub struct ArxivClient {
    http: reqwest::Client,
    api_url: String,
    category: String,
    request_delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("papershelf/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            category: config.category.clone(),
            request_delay: Duration::from_millis(config.request_delay_ms),
            last_request: Mutex::new(None),
        })
    }

    /// The `search_query` expression sent to the API.
    pub fn build_query(&self, keyword: &str, start_year: i32, end_year: i32) -> String {
        format!(
            "ti:{} AND cat:{} AND submittedDate:[{}01010000 TO {}12312359]",
            keyword.trim(),
            self.category,
            start_year,
            end_year
        )
    }

    /// One page of results and the total match count reported by the API.
    ///
    /// Papers published before `start_year` are dropped. When the API reports
    /// no matches for a multi-word keyword, the query is retried once with its
    /// first word only.
    pub async fn search(&self, query: &SearchQuery) -> Result<(usize, Vec<Paper>)> {
        let (total, papers) = self.fetch_page(&query.keyword, query).await?;

        let first_word = query.keyword.split_whitespace().next().unwrap_or_default();
        let relax = total == 0 && !first_word.is_empty() && first_word != query.keyword.trim();
        let (total, papers) = if relax {
            info!(keyword = %query.keyword, retry = first_word, "no results, retrying with first word");
            self.fetch_page(first_word, query).await?
        } else {
            (total, papers)
        };

        let kept: Vec<Paper> = papers
            .into_iter()
            .filter(|p| p.published_year().map_or(true, |y| y >= query.start_year))
            .collect();
        Ok((total, kept))
    }

    async fn fetch_page(&self, keyword: &str, query: &SearchQuery) -> Result<(usize, Vec<Paper>)> {
        let end_year = chrono::Utc::now().year();
        let search_query = self.build_query(keyword, query.start_year, end_year);
        debug!(search_query = %search_query, offset = query.offset, "querying arXiv");

        self.throttle().await;

        let resp = self
            .http
            .get(&self.api_url)
            .query(&[
                ("search_query", search_query.as_str()),
                ("start", &query.offset.to_string()),
                ("max_results", &query.per_page.to_string()),
                ("sortBy", query.sort_by.as_str()),
                ("sortOrder", query.sort_order.as_str()),
            ])
            .send()
            .await
            .context("arXiv request failed")?;

        let status = resp.status();
        if !status.is_success() {
            bail!("arXiv API error {}", status);
        }
        let body = resp.text().await.context("Failed to read arXiv response")?;
        parse_feed(&body)
    }

    /// Sleep until `request_delay` has passed since the previous API call.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Download the paper's PDF into `dir`. `None` on HTTP or I/O failure.
    pub async fn download(&self, paper: &Paper, dir: &Path) -> Option<PathBuf> {
        let path = paper.download_path(dir);
        if path.is_file() {
            debug!(path = %path.display(), "already downloaded");
            return Some(path);
        }

        match self.fetch_to(&paper.pdf_url, &path).await {
            Ok(()) => {
                info!(arxiv_id = %paper.arxiv_id, path = %path.display(), "downloaded");
                Some(path)
            }
            Err(e) => {
                warn!(arxiv_id = %paper.arxiv_id, error = %e, "download failed");
                None
            }
        }
    }

    async fn fetch_to(&self, url: &str, path: &Path) -> Result<()> {
        if url.is_empty() {
            bail!("paper has no PDF link");
        }
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            bail!("HTTP {} for {}", status, url);
        }
        let bytes = resp.bytes().await?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        // A partial file must never look like a finished download
        let partial = path.with_extension("pdf.part");
        tokio::fs::write(&partial, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", partial.display()))?;
        tokio::fs::rename(&partial, path).await?;
        Ok(())
    }
}

/// Replace characters that are unsafe in file names, collapse whitespace and
/// cap the length.
pub fn sanitize_file_name(title: &str) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    let replaced: String = collapsed
        .chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let capped = truncate_chars(&replaced, FILE_TITLE_MAX_CHARS);
    let trimmed = capped.trim();
    if trimmed.is_empty() {
        "paper".to_string()
    } else {
        trimmed.to_string()
    }
}

#[derive(Clone, Copy)]
enum Field {
    Total,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

/// Parse an arXiv Atom feed into the reported total and its entries.
pub fn parse_feed(xml: &str) -> Result<(usize, Vec<Paper>)> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut total = 0usize;
    let mut papers = Vec::new();
    let mut entry: Option<Paper> = None;
    let mut entry_id = String::new();
    let mut in_author = false;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                text.clear();
                field = None;
                match e.local_name().as_ref() {
                    b"entry" => {
                        entry = Some(Paper::default());
                        entry_id.clear();
                    }
                    b"author" => in_author = true,
                    b"totalResults" => field = Some(Field::Total),
                    b"id" if entry.is_some() => field = Some(Field::Id),
                    b"title" if entry.is_some() => field = Some(Field::Title),
                    b"summary" if entry.is_some() => field = Some(Field::Summary),
                    b"published" if entry.is_some() => field = Some(Field::Published),
                    b"name" if in_author => field = Some(Field::AuthorName),
                    b"link" | b"category" => {
                        if let Some(p) = entry.as_mut() {
                            apply_attributes(p, &e);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(p) = entry.as_mut() {
                    apply_attributes(p, &e);
                }
            }
            Ok(Event::Text(t)) => {
                if field.is_some() {
                    let s = t.unescape().context("Invalid text in arXiv feed")?;
                    text.push_str(&s);
                }
            }
            Ok(Event::End(e)) => {
                if let Some(f) = field.take() {
                    let value = collapse_whitespace(&text);
                    match (f, entry.as_mut()) {
                        (Field::Total, _) => total = value.parse().unwrap_or(0),
                        (Field::Id, Some(_)) => entry_id = value,
                        (Field::Title, Some(p)) => p.title = value,
                        (Field::Summary, Some(p)) => p.summary = value,
                        (Field::Published, Some(p)) => p.published = value,
                        (Field::AuthorName, Some(p)) => p.authors.push(value),
                        _ => {}
                    }
                }
                text.clear();
                match e.local_name().as_ref() {
                    b"author" => in_author = false,
                    b"entry" => {
                        if let Some(mut p) = entry.take() {
                            p.arxiv_id = entry_id
                                .rsplit('/')
                                .next()
                                .unwrap_or_default()
                                .to_string();
                            if p.pdf_url.is_empty() && !entry_id.is_empty() {
                                p.pdf_url = entry_id.replacen("/abs/", "/pdf/", 1);
                            }
                            papers.push(p);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!(
                "Invalid arXiv feed at position {}: {}",
                reader.buffer_position(),
                e
            ),
            _ => {}
        }
    }

    Ok((total, papers))
}

/// Pick up `link[title=pdf]@href` and `category@term`.
fn apply_attributes(paper: &mut Paper, e: &BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"link" => {
            if attribute(e, b"title").as_deref() == Some("pdf") {
                if let Some(href) = attribute(e, b"href") {
                    paper.pdf_url = href;
                }
            }
        }
        b"category" => {
            if let Some(term) = attribute(e, b"term") {
                paper.categories.push(term);
            }
        }
        _ => {}
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
