//! `shelf embed pending`: backfill vectors for records stored without one.
//!
//! Records added while the provider was disabled, failing, or configured
//! with another model have no usable vector and are invisible to search
//! until this runs.

use anyhow::{bail, Result};

use crate::collection::SqliteCollection;
use crate::config::Config;

pub async fn run_embed_pending(config: &Config, limit: Option<usize>, dry_run: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let collection = SqliteCollection::from_config(config).await?;

    if dry_run {
        let pending = collection.pending_embeddings(limit).await?;
        println!("embed pending (dry-run)");
        println!("  records needing embeddings: {}", pending.len());
        collection.close().await;
        return Ok(());
    }

    let report = collection.embed_pending(limit).await?;
    collection.close().await;

    println!("embed pending");
    if report.pending == 0 {
        println!("  all records up to date");
        return Ok(());
    }
    println!("  total pending: {}", report.pending);
    println!("  embedded: {}", report.embedded);
    println!("  failed: {}", report.failed);
    Ok(())
}
