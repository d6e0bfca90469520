//! `shelf arxiv ...` commands.
//!
//! `download` and `add` run the same search as `shelf arxiv search` and then
//! work through the returned page one paper at a time, or only through the
//! papers named by `--id`.

use std::time::Duration;

use anyhow::Result;

use crate::arxiv::{self, ArxivClient, Paper, SearchQuery};
use crate::config::Config;
use crate::ingest::{self, BulkRun, CancelFlag};
use crate::progress::ProgressReporter;
use crate::store::DocumentStore;

pub async fn run_arxiv_search(config: &Config, query: &SearchQuery) -> Result<()> {
    let client = ArxivClient::new(&config.arxiv)?;
    let (total, papers) = client.search(query).await?;

    if papers.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, paper) in papers.iter().enumerate() {
        print_paper(query.offset + i + 1, paper, &config.downloads.dir);
    }
    println!(
        "showing {}-{} of {} matches",
        query.offset + 1,
        query.offset + papers.len(),
        total
    );
    Ok(())
}

fn print_paper(n: usize, paper: &Paper, dir: &std::path::Path) {
    let year = paper
        .published_year()
        .map(|y| y.to_string())
        .unwrap_or_else(|| "----".to_string());
    let marker = if paper.is_downloaded(dir) { " [downloaded]" } else { "" };

    println!("{}. ({}) {}{}", n, year, paper.title, marker);
    println!("    authors: {}", paper.authors_joined());
    println!("    id: {}", paper.arxiv_id);
    if !paper.categories.is_empty() {
        println!("    categories: {}", paper.categories.join(" "));
    }
    println!();
}

/// Search, then keep the papers named by `ids` (all of them when `ids` is empty).
async fn selected_papers(
    client: &ArxivClient,
    query: &SearchQuery,
    ids: &[String],
) -> Result<Vec<Paper>> {
    let (_, papers) = client.search(query).await?;
    if papers.is_empty() {
        println!("No results.");
        return Ok(papers);
    }
    let papers = arxiv::select_papers(papers, ids);
    if papers.is_empty() {
        println!("No matching papers on this page.");
    }
    Ok(papers)
}

pub async fn run_arxiv_download(
    config: &Config,
    query: &SearchQuery,
    ids: &[String],
    progress: &dyn ProgressReporter,
    cancel: CancelFlag,
) -> Result<()> {
    let client = ArxivClient::new(&config.arxiv)?;
    let papers = selected_papers(&client, query, ids).await?;
    if papers.is_empty() {
        return Ok(());
    }

    let run = BulkRun::new(progress, cancel.clone(), download_delay(config));
    let fetched = ingest::download_all(&client, &papers, &config.downloads.dir, &run).await;

    let ok = fetched.iter().filter(|p| p.local_path.is_some()).count();
    println!("arxiv download");
    println!("  papers: {}", papers.len());
    println!("  downloaded: {}", ok);
    println!("  failed: {}", fetched.len() - ok);
    if cancel.is_cancelled() {
        println!("cancelled");
    } else {
        println!("ok");
    }
    Ok(())
}

pub async fn run_arxiv_add(
    config: &Config,
    query: &SearchQuery,
    ids: &[String],
    progress: &dyn ProgressReporter,
    cancel: CancelFlag,
) -> Result<()> {
    let client = ArxivClient::new(&config.arxiv)?;
    let papers = selected_papers(&client, query, ids).await?;
    if papers.is_empty() {
        return Ok(());
    }

    let store = DocumentStore::open(config).await?;
    let run = BulkRun::new(progress, cancel, download_delay(config));
    let report = ingest::add_papers(&store, &client, &papers, &config.downloads.dir, &run).await;

    println!("arxiv add");
    ingest::print_report(&report);
    Ok(())
}

fn download_delay(config: &Config) -> Duration {
    Duration::from_millis(config.arxiv.download_delay_ms)
}
