//! Document retrieval commands: `shelf get`, `shelf list` and `shelf delete`.
//!
//! All three address documents by their logical id, so a chunked paper is
//! shown, listed and deleted as one unit.

use anyhow::{bail, Result};

use crate::config::Config;
use crate::models::DocumentSummary;
use crate::store::DocumentStore;

/// Print one document with its metadata and full text.
pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let store = DocumentStore::open(config).await?;
    let Some(doc) = store.get_document(id).await else {
        bail!("Document not found: {}", id);
    };

    println!("--- Document ---");
    println!("id:      {}", doc.id);
    println!("title:   {}", doc.metadata.title);
    println!("authors: {}", doc.metadata.author);
    println!("source:  {}", doc.metadata.source);
    println!("file:    {}", doc.metadata.file);
    println!("hash:    {}", doc.metadata.hash);
    println!();

    if doc.chunks.len() > 1 {
        println!("--- Chunks ({}) ---", doc.chunks.len());
        for (i, chunk) in doc.chunks.iter().enumerate() {
            println!("[chunk {}]", i);
            println!("{}", chunk);
            println!();
        }
    } else {
        println!("--- Text ---");
        println!("{}", doc.text());
        println!();
    }
    Ok(())
}

/// Print one page of logical documents.
pub async fn run_list(config: &Config, limit: usize, offset: usize) -> Result<()> {
    let store = DocumentStore::open(config).await?;
    let page = store.list_documents(limit, offset).await;

    if page.documents.is_empty() {
        println!("No documents.");
        return Ok(());
    }

    for (i, doc) in page.documents.iter().enumerate() {
        print_summary(offset + i + 1, doc);
    }
    println!(
        "showing {}-{} of {}",
        offset + 1,
        offset + page.documents.len(),
        page.total
    );
    Ok(())
}

fn print_summary(n: usize, doc: &DocumentSummary) {
    println!("{}. {}", n, doc.metadata.title);
    if !doc.metadata.author.is_empty() {
        println!("    authors: {}", doc.metadata.author);
    }
    println!("    source: {}  records: {}", doc.metadata.source, doc.record_count());
    println!("    id: {}", doc.id);
}

/// Delete a logical document and all its chunks.
pub async fn run_delete(config: &Config, id: &str) -> Result<()> {
    let store = DocumentStore::open(config).await?;
    if store.get_document(id).await.is_none() {
        bail!("Document not found: {}", id);
    }
    if !store.delete(id).await {
        bail!("Failed to delete {}", id);
    }
    println!("deleted {}", id);
    Ok(())
}
