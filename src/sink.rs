//! Persistence sinks for processed batches.
//!
//! A sink receives one source's complete output (canonical table, feature
//! table, summary) and must land all of it or none of it. Output for
//! different sources is keyed by source name, so sources can be persisted
//! concurrently without coordination.
//!
//! | Sink | Layout | Atomicity |
//! |------|--------|-----------|
//! | [`CsvSink`] | `<dir>/<source>/{reviews,features,summary}.csv` | staged directory swapped in by rename |
//! | [`SqliteSink`] | `reviews`, `review_features`, `review_vocabulary`, `review_summaries` | one transaction |
//! | [`MemorySink`] | in-process map | single write lock |

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::config::{OutputConfig, OutputKind};
use crate::db;
use crate::migrate;
use crate::models::{CanonicalReview, FeatureTable, Summary};

/// Column order of the canonical table.
pub const REVIEW_COLUMNS: [&str; 6] = [
    "rating",
    "date",
    "content",
    "content_cleaned",
    "content_length",
    "sentence_count",
];

/// One source's complete output, borrowed from the featured batch.
#[derive(Debug, Clone, Copy)]
pub struct PersistBatch<'a> {
    pub source: &'a str,
    pub records: &'a [CanonicalReview],
    pub features: &'a FeatureTable,
    pub summary: &'a Summary,
}

/// A persisted summary as read back from a sink.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredSummary {
    pub source: String,
    pub summary: Summary,
    /// Unix timestamp of the last successful persist, when the sink knows it.
    pub persisted_at: Option<i64>,
}

/// Where processed batches are written.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Short label for logs (`csv`, `sqlite`, `memory`).
    fn kind(&self) -> &str;

    /// Replace the stored output for `batch.source` with `batch`, atomically.
    async fn persist(&self, batch: &PersistBatch<'_>) -> Result<()>;

    /// Stored summaries, sorted by source name.
    async fn summaries(&self) -> Result<Vec<StoredSummary>>;
}

/// Build the sink named by the output config.
pub async fn build_sink(output: &OutputConfig) -> Result<Arc<dyn PersistenceSink>> {
    let sink: Arc<dyn PersistenceSink> = match output.kind {
        OutputKind::Csv => Arc::new(CsvSink::new(&output.dir)),
        OutputKind::Sqlite => Arc::new(SqliteSink::open(&output.sqlite_path()).await?),
    };
    Ok(sink)
}

// ─── CSV ────────────────────────────────────────────────────────────

/// Writes one directory of CSV files per source.
pub struct CsvSink {
    dir: PathBuf,
}

impl CsvSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the output of `source`.
    pub fn output_dir(&self, source: &str) -> PathBuf {
        self.dir.join(source)
    }

    fn write_tables(&self, staging: &Path, batch: &PersistBatch<'_>) -> Result<()> {
        let mut reviews = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(staging.join("reviews.csv"))?;
        reviews.write_record(REVIEW_COLUMNS)?;
        for record in batch.records {
            reviews.serialize(record)?;
        }
        reviews.flush()?;

        let features_path = staging.join("features.csv");
        if batch.features.vocabulary.is_empty() {
            fs::File::create(&features_path)?;
        } else {
            let width = batch.features.feature_count();
            let mut features = csv::Writer::from_path(&features_path)?;
            features.write_record(&batch.features.vocabulary)?;
            for row in &batch.features.rows {
                features.write_record(row.to_dense(width).iter().map(|w| w.to_string()))?;
            }
            features.flush()?;
        }

        let mut summary = csv::Writer::from_path(staging.join("summary.csv"))?;
        summary.serialize(batch.summary)?;
        summary.flush()?;
        Ok(())
    }

    /// Move `staged` to `target`, keeping any previous output until the
    /// move has succeeded.
    fn swap_into_place(&self, staged: &Path, target: &Path) -> Result<()> {
        let backup = if target.exists() {
            let backup = self.dir.join(format!(".previous-{}", Uuid::new_v4()));
            fs::rename(target, &backup).with_context(|| {
                format!("Failed to move previous output {} aside", target.display())
            })?;
            Some(backup)
        } else {
            None
        };

        if let Err(err) = fs::rename(staged, target) {
            if let Some(backup) = &backup {
                if let Err(restore) = fs::rename(backup, target) {
                    tracing::error!(
                        backup = %backup.display(),
                        error = %restore,
                        "failed to restore previous output"
                    );
                }
            }
            return Err(err).with_context(|| format!("Failed to write {}", target.display()));
        }

        if let Some(backup) = backup {
            if let Err(err) = fs::remove_dir_all(&backup) {
                tracing::warn!(backup = %backup.display(), error = %err, "failed to remove previous output");
            }
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for CsvSink {
    fn kind(&self) -> &str {
        "csv"
    }

    async fn persist(&self, batch: &PersistBatch<'_>) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create output dir {}", self.dir.display()))?;

        // Dropping `staging` removes whatever is left of it on any early return.
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&self.dir)
            .with_context(|| format!("Failed to create staging dir in {}", self.dir.display()))?;

        self.write_tables(staging.path(), batch)?;
        self.swap_into_place(staging.path(), &self.output_dir(batch.source))?;
        Ok(())
    }

    async fn summaries(&self) -> Result<Vec<StoredSummary>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let path = entry.path().join("summary.csv");
            if name.starts_with('.') || !path.is_file() {
                continue;
            }

            let mut reader = csv::Reader::from_path(&path)?;
            let summary: Summary = match reader.deserialize().next() {
                Some(row) => row.with_context(|| format!("Malformed {}", path.display()))?,
                None => continue,
            };
            let persisted_at = fs::metadata(&path)
                .and_then(|m| m.modified())
                .ok()
                .map(|t| chrono::DateTime::<chrono::Utc>::from(t).timestamp());
            out.push(StoredSummary {
                source: name,
                summary,
                persisted_at,
            });
        }
        out.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(out)
    }
}

// ─── SQLite ─────────────────────────────────────────────────────────

/// Writes every source into one SQLite database.
pub struct SqliteSink {
    pool: SqlitePool,
}

impl SqliteSink {
    /// Connect to `db_path`, creating the file and schema if needed.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect(db_path).await?;
        migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl PersistenceSink for SqliteSink {
    fn kind(&self) -> &str {
        "sqlite"
    }

    async fn persist(&self, batch: &PersistBatch<'_>) -> Result<()> {
        let run_id = Uuid::new_v4().to_string();
        let now = chrono::Utc::now().timestamp();

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM reviews WHERE source = ?")
            .bind(batch.source)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM review_features WHERE source = ?")
            .bind(batch.source)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM review_vocabulary WHERE source = ?")
            .bind(batch.source)
            .execute(&mut *tx)
            .await?;

        for (row_index, record) in batch.records.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO reviews (source, row_index, run_id, rating, date, content,
                                     content_cleaned, content_length, sentence_count)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(batch.source)
            .bind(row_index as i64)
            .bind(&run_id)
            .bind(record.rating)
            .bind(record.date.to_string())
            .bind(&record.content)
            .bind(&record.content_cleaned)
            .bind(record.content_length as i64)
            .bind(record.sentence_count as i64)
            .execute(&mut *tx)
            .await?;
        }

        for (term_index, term) in batch.features.vocabulary.iter().enumerate() {
            sqlx::query("INSERT INTO review_vocabulary (source, term_index, term) VALUES (?, ?, ?)")
                .bind(batch.source)
                .bind(term_index as i64)
                .bind(term)
                .execute(&mut *tx)
                .await?;
        }

        for (row_index, row) in batch.features.rows.iter().enumerate() {
            for (term_index, weight) in &row.entries {
                let term = batch
                    .features
                    .vocabulary
                    .get(*term_index)
                    .ok_or_else(|| anyhow!("feature column {} outside vocabulary", term_index))?;
                sqlx::query(
                    "INSERT INTO review_features (source, row_index, term, weight) VALUES (?, ?, ?, ?)",
                )
                .bind(batch.source)
                .bind(row_index as i64)
                .bind(term)
                .bind(*weight)
                .execute(&mut *tx)
                .await?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO review_summaries (source, run_id, total_reviews, mean_rating, mean_length,
                                          mean_sentence_count, feature_count, persisted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(source) DO UPDATE SET
                run_id = excluded.run_id,
                total_reviews = excluded.total_reviews,
                mean_rating = excluded.mean_rating,
                mean_length = excluded.mean_length,
                mean_sentence_count = excluded.mean_sentence_count,
                feature_count = excluded.feature_count,
                persisted_at = excluded.persisted_at
            "#,
        )
        .bind(batch.source)
        .bind(&run_id)
        .bind(batch.summary.total_reviews as i64)
        .bind(batch.summary.mean_rating)
        .bind(batch.summary.mean_length)
        .bind(batch.summary.mean_sentence_count)
        .bind(batch.summary.feature_count as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::debug!(source = batch.source, run_id = %run_id, rows = batch.records.len(), "sqlite persist committed");
        Ok(())
    }

    async fn summaries(&self) -> Result<Vec<StoredSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT source, total_reviews, mean_rating, mean_length, mean_sentence_count,
                   feature_count, persisted_at
            FROM review_summaries
            ORDER BY source
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| StoredSummary {
                source: row.get("source"),
                summary: Summary {
                    total_reviews: row.get::<i64, _>("total_reviews") as usize,
                    mean_rating: row.get("mean_rating"),
                    mean_length: row.get("mean_length"),
                    mean_sentence_count: row.get("mean_sentence_count"),
                    feature_count: row.get::<i64, _>("feature_count") as usize,
                },
                persisted_at: Some(row.get("persisted_at")),
            })
            .collect())
    }
}

// ─── Memory ─────────────────────────────────────────────────────────

/// A persisted batch held by [`MemorySink`].
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBatch {
    pub records: Vec<CanonicalReview>,
    pub features: FeatureTable,
    pub summary: Summary,
}

/// Keeps persisted batches in memory, keyed by source.
#[derive(Default)]
pub struct MemorySink {
    batches: RwLock<HashMap<String, StoredBatch>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, source: &str) -> Option<StoredBatch> {
        self.batches
            .read()
            .ok()
            .and_then(|batches| batches.get(source).cloned())
    }

    pub fn len(&self) -> usize {
        self.batches.read().map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PersistenceSink for MemorySink {
    fn kind(&self) -> &str {
        "memory"
    }

    async fn persist(&self, batch: &PersistBatch<'_>) -> Result<()> {
        let stored = StoredBatch {
            records: batch.records.to_vec(),
            features: batch.features.clone(),
            summary: batch.summary.clone(),
        };
        self.batches
            .write()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?
            .insert(batch.source.to_string(), stored);
        Ok(())
    }

    async fn summaries(&self) -> Result<Vec<StoredSummary>> {
        let batches = self
            .batches
            .read()
            .map_err(|_| anyhow!("memory sink lock poisoned"))?;
        let mut out: Vec<StoredSummary> = batches
            .iter()
            .map(|(source, stored)| StoredSummary {
                source: source.clone(),
                summary: stored.summary.clone(),
                persisted_at: None,
            })
            .collect();
        out.sort_by(|a, b| a.source.cmp(&b.source));
        Ok(out)
    }
}
