use anyhow::Result;
use sqlx::SqlitePool;

/// Create the schema if it does not exist yet. Safe to run on every open.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    // One row per physical record. `chunk`/`chunks` are NULL for whole documents.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            document TEXT NOT NULL,
            title TEXT NOT NULL,
            author TEXT NOT NULL,
            source TEXT NOT NULL,
            hash TEXT NOT NULL,
            file TEXT NOT NULL,
            chunk INTEGER,
            chunks INTEGER,
            embedding BLOB,
            model TEXT,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (collection, id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_hash ON records(collection, hash)")
        .execute(pool)
        .await?;

    // Keyword index over record text. FTS5 has no IF NOT EXISTS.
    let fts_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='records_fts'",
    )
    .fetch_one(pool)
    .await?;

    if !fts_exists {
        sqlx::query(
            r#"
            CREATE VIRTUAL TABLE records_fts USING fts5(
                collection UNINDEXED,
                id UNINDEXED,
                document
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            "INSERT INTO records_fts (collection, id, document)
             SELECT collection, id, document FROM records",
        )
        .execute(pool)
        .await?;
    }

    Ok(())
}
