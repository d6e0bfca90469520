//! Bulk ingestion loops.
//!
//! Downloads and additions run strictly one item at a time. Remote fetches
//! are spaced by the configured download delay, and a [`CancelFlag`] is
//! checked before each item so an interrupted run stops cleanly after the
//! item in flight.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{info, warn};

use crate::arxiv::{ArxivClient, Paper};
use crate::config::Config;
use crate::extract;
use crate::library;
use crate::models::{AddedDocument, MetadataOverrides, Source};
use crate::progress::{Phase, ProgressEvent, ProgressReporter};
use crate::store::{DocumentStore, IngestError};

/// Shared cancellation signal for a bulk run.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-command settings threaded through a bulk loop.
pub struct BulkRun<'a> {
    pub progress: &'a dyn ProgressReporter,
    pub cancel: CancelFlag,
    /// Pause after each item that hit the network.
    pub delay: Duration,
}

impl<'a> BulkRun<'a> {
    pub fn new(progress: &'a dyn ProgressReporter, cancel: CancelFlag, delay: Duration) -> Self {
        Self {
            progress,
            cancel,
            delay,
        }
    }

    fn report(&self, phase: Phase, n: usize, total: usize, title: &str) {
        self.progress.report(ProgressEvent {
            phase,
            n: n as u64,
            total: total as u64,
            title: title.to_string(),
        });
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BulkReport {
    pub attempted: usize,
    pub added: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl BulkReport {
    fn record(&mut self, outcome: &Result<AddedDocument, IngestError>) {
        match outcome {
            Ok(_) => self.added += 1,
            Err(IngestError::Duplicate { .. }) => self.duplicates += 1,
            Err(_) => self.failed += 1,
        }
    }
}

/// Download every paper into `dir`. Papers that could not be fetched are
/// returned with `local_path = None`.
pub async fn download_all(
    client: &ArxivClient,
    papers: &[Paper],
    dir: &Path,
    run: &BulkRun<'_>,
) -> Vec<Paper> {
    let total = papers.len();
    let mut out = Vec::with_capacity(total);

    for (i, paper) in papers.iter().enumerate() {
        if run.cancel.is_cancelled() {
            info!(done = i, total, "download cancelled");
            break;
        }
        run.report(Phase::Downloading, i + 1, total, &paper.title);

        let (local_path, fetched) = fetch(client, paper, dir).await;
        let mut paper = paper.clone();
        paper.local_path = local_path;
        out.push(paper);

        if fetched && i + 1 < total {
            tokio::time::sleep(run.delay).await;
        }
    }

    out
}

/// Download each paper and add it to the store with its feed metadata.
pub async fn add_papers(
    store: &DocumentStore,
    client: &ArxivClient,
    papers: &[Paper],
    dir: &Path,
    run: &BulkRun<'_>,
) -> BulkReport {
    let total = papers.len();
    let mut report = BulkReport::default();

    for (i, paper) in papers.iter().enumerate() {
        if run.cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        run.report(Phase::Adding, i + 1, total, &paper.title);
        report.attempted += 1;

        let (local_path, fetched) = fetch(client, paper, dir).await;
        match local_path {
            Some(path) => {
                let outcome = store.add(&path, &paper_overrides(paper)).await;
                if let Err(e) = &outcome {
                    info!(arxiv_id = %paper.arxiv_id, reason = %e, "paper not added");
                }
                report.record(&outcome);
            }
            None => {
                warn!(arxiv_id = %paper.arxiv_id, "download failed, paper skipped");
                report.failed += 1;
            }
        }

        if fetched && i + 1 < total {
            tokio::time::sleep(run.delay).await;
        }
    }

    report
}

/// Add every PDF found under `dir`, tagged as coming from the downloads folder.
pub async fn add_folder(store: &DocumentStore, dir: &Path, run: &BulkRun<'_>) -> Result<BulkReport> {
    let paths = library::find_pdfs(dir)?;
    let total = paths.len();
    let mut report = BulkReport::default();

    let overrides = MetadataOverrides {
        source: Some(Source::DownloadFolder),
        ..Default::default()
    };

    for (i, path) in paths.iter().enumerate() {
        if run.cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }
        let name = extract::file_name_of(path);
        run.report(Phase::Adding, i + 1, total, &name);
        report.attempted += 1;

        let outcome = store.add(path, &overrides).await;
        if let Err(e) = &outcome {
            info!(file = %name, reason = %e, "file not added");
        }
        report.record(&outcome);

        if i + 1 < total && !run.delay.is_zero() {
            tokio::time::sleep(run.delay).await;
        }
    }

    Ok(report)
}

/// Metadata an arXiv feed entry contributes over whatever the PDF says.
pub fn paper_overrides(paper: &Paper) -> MetadataOverrides {
    MetadataOverrides {
        title: Some(paper.title.clone()),
        authors: Some(paper.authors_joined()),
        source: Some(Source::Arxiv),
        arxiv_id: Some(paper.arxiv_id.clone()),
    }
}

/// Returns the local path and whether the network was used to get it.
async fn fetch(client: &ArxivClient, paper: &Paper, dir: &Path) -> (Option<PathBuf>, bool) {
    let cached = paper.is_downloaded(dir);
    (client.download(paper, dir).await, !cached)
}

/// `shelf add <pdf>`: add a single local PDF.
pub async fn run_add(
    config: &Config,
    path: &Path,
    title: Option<String>,
    authors: Option<String>,
) -> Result<()> {
    let store = DocumentStore::open(config).await?;
    // Source and arXiv id come from the file name
    let overrides = MetadataOverrides {
        title,
        authors,
        ..Default::default()
    };

    match store.add(path, &overrides).await {
        Ok(added) => {
            println!("added {}", added.id);
            println!("  title:   {}", added.metadata.title);
            println!("  authors: {}", added.metadata.author);
            println!("  records: {}", added.record_ids.len());
            Ok(())
        }
        Err(e) => anyhow::bail!("{}: {}", path.display(), e),
    }
}

/// `shelf add-folder`: add every PDF in the downloads folder.
pub async fn run_add_folder(
    config: &Config,
    progress: &dyn ProgressReporter,
    cancel: CancelFlag,
) -> Result<()> {
    let store = DocumentStore::open(config).await?;
    let run = BulkRun::new(progress, cancel, Duration::ZERO);
    let report = add_folder(&store, &config.downloads.dir, &run).await?;

    println!("add-folder {}", config.downloads.dir.display());
    print_report(&report);
    Ok(())
}

pub fn print_report(report: &BulkReport) {
    println!("  attempted:  {}", report.attempted);
    println!("  added:      {}", report.added);
    println!("  duplicates: {}", report.duplicates);
    println!("  failed:     {}", report.failed);
    if report.cancelled {
        println!("cancelled");
    } else {
        println!("ok");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::InMemoryCollection;
    use crate::config::ArxivConfig;
    use crate::embedding::testing::WordEmbedder;
    use crate::progress::NoProgress;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    fn store() -> DocumentStore {
        let collection = InMemoryCollection::new("test", Arc::new(WordEmbedder));
        DocumentStore::with_limits(Arc::new(collection), 8000, 100)
    }

    fn offline_client() -> ArxivClient {
        let config = ArxivConfig {
            api_url: "http://127.0.0.1:9/api/query".to_string(),
            request_delay_ms: 0,
            timeout_secs: 1,
            ..Default::default()
        };
        ArxivClient::new(&config).unwrap()
    }

    fn paper(id: &str, title: &str) -> Paper {
        Paper {
            arxiv_id: id.to_string(),
            title: title.to_string(),
            authors: vec!["Ada Lovelace".to_string(), "Alan Turing".to_string()],
            pdf_url: format!("http://127.0.0.1:9/pdf/{}", id),
            ..Default::default()
        }
    }

    #[test]
    fn cancel_flag_is_shared() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_cancelled());
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn overrides_come_from_feed() {
        let o = paper_overrides(&paper("2301.07041v2", "Graph Nets"));
        assert_eq!(o.title.as_deref(), Some("Graph Nets"));
        assert_eq!(o.authors.as_deref(), Some("Ada Lovelace, Alan Turing"));
        assert_eq!(o.arxiv_id.as_deref(), Some("2301.07041v2"));
        assert_eq!(o.source, Some(Source::Arxiv));
    }

    #[tokio::test]
    async fn add_folder_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"not a pdf").unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"still not a pdf").unwrap();

        let recorder = Recorder(Mutex::new(Vec::new()));
        let run = BulkRun::new(&recorder, CancelFlag::new(), Duration::ZERO);
        let report = add_folder(&store(), dir.path(), &run).await.unwrap();

        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 2);
        assert_eq!(report.added, 0);
        assert!(!report.cancelled);

        let events = recorder.0.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].n, 1);
        assert_eq!(events[1].total, 2);
        assert_eq!(events[0].phase, Phase::Adding);
    }

    #[tokio::test]
    async fn cancelled_before_start_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.pdf"), b"x").unwrap();

        let cancel = CancelFlag::new();
        cancel.cancel();
        let run = BulkRun::new(&NoProgress, cancel, Duration::ZERO);
        let report = add_folder(&store(), dir.path(), &run).await.unwrap();

        assert_eq!(report.attempted, 0);
        assert!(report.cancelled);
    }

    #[tokio::test]
    async fn missing_folder_is_empty_report() {
        let run = BulkRun::new(&NoProgress, CancelFlag::new(), Duration::ZERO);
        let report = add_folder(&store(), Path::new("/no/such/dir"), &run)
            .await
            .unwrap();
        assert_eq!(report, BulkReport::default());
    }

    #[tokio::test]
    async fn cached_downloads_skip_network_and_delay() {
        let dir = tempfile::tempdir().unwrap();
        let papers = vec![paper("1111.11111v1", "First"), paper("2222.22222v1", "Second")];
        for p in &papers {
            std::fs::write(p.download_path(dir.path()), b"%PDF-1.4").unwrap();
        }

        let run = BulkRun::new(&NoProgress, CancelFlag::new(), Duration::from_secs(30));
        let started = std::time::Instant::now();
        let out = download_all(&offline_client(), &papers, dir.path(), &run).await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(out.len(), 2);
        assert_eq!(
            out[1].local_path.as_deref(),
            Some(papers[1].download_path(dir.path()).as_path())
        );
    }

    #[tokio::test]
    async fn failed_download_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let papers = vec![paper("3333.33333v1", "Unreachable")];

        let run = BulkRun::new(&NoProgress, CancelFlag::new(), Duration::ZERO);
        let report = add_papers(&store(), &offline_client(), &papers, dir.path(), &run).await;

        assert_eq!(report.attempted, 1);
        assert_eq!(report.failed, 1);
    }
}
