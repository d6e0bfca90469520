//! The local downloads folder.
//!
//! Lists the PDFs on disk (independent of what is in the collection) and
//! deletes local files.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::Config;
use crate::extract;

/// Author string shown for files whose metadata could not be read.
pub const UNKNOWN_AUTHORS: &str = "Unknown";

#[derive(Debug, Clone, Serialize)]
pub struct LocalPdf {
    pub file_name: String,
    pub path: PathBuf,
    pub title: String,
    pub authors: String,
    /// File creation time (modification time where the platform has none).
    pub created: DateTime<Local>,
}

/// Every `*.pdf` under `dir` (case-insensitive), sorted by path.
///
/// A missing directory yields an empty list.
pub fn find_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let include = build_globset(&["**/*.pdf", "**/*.PDF", "*.pdf", "*.PDF"])?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.with_context(|| format!("Failed to scan {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if include.is_match(relative) {
            paths.push(path.to_path_buf());
        }
    }

    paths.sort();
    Ok(paths)
}

/// Local PDFs with their extracted metadata, newest first.
pub fn scan_downloads(dir: &Path) -> Result<Vec<LocalPdf>> {
    let mut pdfs: Vec<LocalPdf> = find_pdfs(dir)?
        .into_iter()
        .map(|path| describe(&path))
        .collect();
    pdfs.sort_by(|a, b| b.created.cmp(&a.created));
    Ok(pdfs)
}

fn describe(path: &Path) -> LocalPdf {
    let file_name = extract::file_name_of(path);
    let (title, authors) = match extract::try_extract_metadata(path) {
        Ok(meta) => (meta.title, meta.authors),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read PDF metadata");
            (file_name.clone(), UNKNOWN_AUTHORS.to_string())
        }
    };

    LocalPdf {
        created: file_time(path),
        file_name,
        path: path.to_path_buf(),
        title,
        authors,
    }
}

fn file_time(path: &Path) -> DateTime<Local> {
    std::fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .map(DateTime::<Local>::from)
        .unwrap_or_else(|_| Local::now())
}

/// Delete a local PDF. `false` when it does not exist or cannot be removed.
pub fn remove_pdf(path: &Path) -> bool {
    if !path.is_file() {
        return false;
    }
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to delete PDF");
            false
        }
    }
}

/// `shelf files list`
pub fn run_files_list(config: &Config) -> Result<()> {
    let pdfs = scan_downloads(&config.downloads.dir)?;
    if pdfs.is_empty() {
        println!("No PDFs in {}.", config.downloads.dir.display());
        return Ok(());
    }

    for pdf in &pdfs {
        println!("{}", pdf.file_name);
        println!("    title: {}", pdf.title);
        println!("    authors: {}", pdf.authors);
        println!("    created: {}", pdf.created.format("%Y-%m-%d %H:%M"));
    }
    println!("{} PDFs", pdfs.len());
    Ok(())
}

/// `shelf files rm <name>`: `name` is resolved inside the downloads folder.
pub fn run_files_rm(config: &Config, name: &str) -> Result<()> {
    let path = resolve_in(&config.downloads.dir, name)?;
    if !remove_pdf(&path) {
        bail!("Could not delete {}", path.display());
    }
    println!("deleted {}", path.display());
    Ok(())
}

fn resolve_in(dir: &Path, name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if candidate
        .components()
        .any(|c| !matches!(c, std::path::Component::Normal(_)))
    {
        bail!("File name must be relative to the downloads folder: {}", name);
    }
    Ok(dir.join(candidate))
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
