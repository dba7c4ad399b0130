use anyhow::Result;
use sqlx::SqlitePool;
use std::path::Path;

use crate::db;

/// Create the output schema in the database at `db_path`.
pub async fn run_migrations(db_path: &Path) -> Result<()> {
    let pool = db::connect(db_path).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every output table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // Canonical review rows, one per surviving record
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS reviews (
            source TEXT NOT NULL,
            row_index INTEGER NOT NULL,
            run_id TEXT NOT NULL,
            rating REAL NOT NULL,
            date TEXT NOT NULL,
            content TEXT NOT NULL,
            content_cleaned TEXT NOT NULL,
            content_length INTEGER NOT NULL,
            sentence_count INTEGER NOT NULL,
            PRIMARY KEY (source, row_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Sparse feature table in long format, row-aligned with reviews
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_features (
            source TEXT NOT NULL,
            row_index INTEGER NOT NULL,
            term TEXT NOT NULL,
            weight REAL NOT NULL,
            PRIMARY KEY (source, row_index, term)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Vocabulary per source, in column order
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_vocabulary (
            source TEXT NOT NULL,
            term_index INTEGER NOT NULL,
            term TEXT NOT NULL,
            PRIMARY KEY (source, term_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS review_summaries (
            source TEXT PRIMARY KEY,
            run_id TEXT NOT NULL,
            total_reviews INTEGER NOT NULL,
            mean_rating REAL,
            mean_length REAL,
            mean_sentence_count REAL,
            feature_count INTEGER NOT NULL,
            persisted_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_review_features_term ON review_features(source, term)")
        .execute(pool)
        .await?;

    Ok(())
}
