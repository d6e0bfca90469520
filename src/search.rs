//! `shelf search`: ranked search over stored records.
//!
//! Semantic (cosine distance) when an embedding provider is configured,
//! keyword (FTS5 `bm25`) otherwise.

use anyhow::Result;

use crate::config::Config;
use crate::models::{logical_id, SearchHit};
use crate::store::DocumentStore;

/// Excerpt length shown per hit, in characters.
const EXCERPT_CHARS: usize = 240;

pub async fn run_search(config: &Config, query: &str, limit: usize) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        tracing::info!("embeddings disabled, using keyword search");
    }

    let store = DocumentStore::open(config).await?;
    let hits = store.search(query, limit).await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        print_hit(i + 1, hit);
    }
    Ok(())
}

fn print_hit(rank: usize, hit: &SearchHit) {
    let title = if hit.metadata.title.is_empty() {
        "(untitled)"
    } else {
        hit.metadata.title.as_str()
    };

    println!("{}. [{:.3}] {}", rank, hit.distance, title);
    if !hit.metadata.author.is_empty() {
        println!("    authors: {}", hit.metadata.author);
    }
    println!("    source: {}", hit.metadata.source);
    if let (Some(chunk), Some(chunks)) = (hit.metadata.chunk, hit.metadata.chunks) {
        println!("    chunk: {} / {}", chunk + 1, chunks);
    }
    println!("    excerpt: \"{}\"", excerpt(&hit.document));
    println!("    id: {}", logical_id(&hit.id));
    println!();
}

fn excerpt(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= EXCERPT_CHARS {
        return flat;
    }
    let mut cut = crate::models::truncate_chars(&flat, EXCERPT_CHARS);
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn excerpt_flattens_and_caps() {
        assert_eq!(excerpt("a\n\nb   c"), "a b c");
        let long = "word ".repeat(200);
        let e = excerpt(&long);
        assert!(e.ends_with("..."));
        assert_eq!(e.chars().count(), EXCERPT_CHARS + 3);
    }
}
