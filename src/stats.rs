//! Library overview: what is stored and what is sitting in the downloads folder.

use anyhow::Result;

use crate::config::Config;
use crate::library;
use crate::store::DocumentStore;

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = DocumentStore::open(config).await?;
    let stats = store.stats().await;
    let records = store.collection().count().await?;
    let local = library::find_pdfs(&config.downloads.dir)?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Papershelf Stats");
    println!("================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Downloads:   {} ({} PDFs)", config.downloads.dir.display(), local.len());
    println!();
    println!("  Documents:   {}", stats.total_docs);
    println!("  Records:     {}", records);
    println!(
        "  Embeddings:  {}",
        if config.embedding.is_enabled() {
            format!(
                "{} ({})",
                config.embedding.provider,
                config.embedding.model.as_deref().unwrap_or("default model")
            )
        } else {
            "disabled".to_string()
        }
    );

    if !stats.collection_counts.is_empty() {
        println!();
        println!("  By collection:");
        for (name, count) in &stats.collection_counts {
            println!("    {:<20} {} documents", name, count);
        }
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes >= 1_073_741_824 {
        format!("{:.1} GB", bytes as f64 / 1_073_741_824.0)
    } else if bytes >= 1_048_576 {
        format!("{:.1} MB", bytes as f64 / 1_048_576.0)
    } else if bytes >= 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
