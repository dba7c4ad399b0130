//! Library-level tests for the processing pipeline.
//!
//! These drive [`ProcessorPipeline`] through its public API with in-memory
//! and on-disk sources and sinks, checking the documented behaviour of each
//! stage boundary.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use review_harness::config::SourceConfig;
use review_harness::dates::ListingOrder;
use review_harness::error::Stage;
use review_harness::models::{RawReview, ReviewDate};
use review_harness::pipeline::ProcessorPipeline;
use review_harness::sink::{CsvSink, MemorySink, PersistBatch, PersistenceSink, StoredSummary};
use review_harness::source::{CsvSource, InMemorySource};
use std::fs;
use tempfile::TempDir;

fn processed_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 1, 21)
        .unwrap()
        .and_hms_opt(9, 30, 0)
        .unwrap()
}

fn ymd(y: i32, m: u32, d: u32) -> ReviewDate {
    ReviewDate::Known(NaiveDate::from_ymd_opt(y, m, d).unwrap())
}

/// A sink whose every write fails.
struct BrokenSink;

#[async_trait]
impl PersistenceSink for BrokenSink {
    fn kind(&self) -> &str {
        "broken"
    }

    async fn persist(&self, _batch: &PersistBatch<'_>) -> Result<()> {
        bail!("permission denied")
    }

    async fn summaries(&self) -> Result<Vec<StoredSummary>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn newest_first_listing_repairs_year_rollover() {
    let mut config = SourceConfig::with_rating_bounds(1.0, 10.0);
    config.listing_order = ListingOrder::NewestFirst;
    let pipeline = ProcessorPipeline::new("letterboxd", config)
        .unwrap()
        .with_processing_time(processed_at());

    let source = InMemorySource::new(
        "letterboxd",
        vec![
            RawReview::new("8", "2025.01.02", "New year, new favourite film."),
            RawReview::new("7", "2025.12.20", "A festive watch with family."),
        ],
    );
    let sink = MemorySink::new();
    pipeline.run(&source, &sink).await.unwrap();

    let dates: Vec<String> = sink
        .get("letterboxd")
        .unwrap()
        .records
        .iter()
        .map(|r| r.date.to_string())
        .collect();
    assert_eq!(dates, vec!["2025.01.02", "2024.12.20"]);
}

#[tokio::test]
async fn relative_dates_resolve_against_reference() {
    let mut config = SourceConfig::with_rating_bounds(0.0, 10.0);
    config.reference_timestamp = Some(
        NaiveDate::from_ymd_opt(2025, 1, 21)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    );
    let pipeline = ProcessorPipeline::new("letterboxd", config)
        .unwrap()
        .with_processing_time(processed_at());

    let source = InMemorySource::new(
        "letterboxd",
        vec![
            RawReview::new("6", "5d", "Five days ago and still thinking."),
            RawReview::new("6", "3h", "Just watched it, still processing."),
        ],
    );
    let sink = MemorySink::new();
    let report = pipeline.run(&source, &sink).await.unwrap();

    let records = sink.get("letterboxd").unwrap().records;
    assert_eq!(records[0].date, ymd(2025, 1, 16));
    assert_eq!(records[1].date, ReviewDate::Unknown);
    assert_eq!(report.report.normalize.dates_unknown, 1);
}

#[tokio::test]
async fn persistence_failure_is_structured_and_writes_nothing() {
    let pipeline = ProcessorPipeline::new("imdb", SourceConfig::with_rating_bounds(1.0, 10.0))
        .unwrap()
        .with_processing_time(processed_at());
    let source = InMemorySource::new(
        "imdb",
        vec![RawReview::new("8", "2024-03-15", "A moving story with a superb cast.")],
    );

    let err = pipeline.run(&source, &BrokenSink).await.unwrap_err();
    assert_eq!(err.source_name, "imdb");
    assert_eq!(err.stage, Stage::Persist);
    assert_eq!(err.record(), None);
    assert!(err.to_string().contains("permission denied"));
}

#[tokio::test]
async fn malformed_row_fails_load_with_record_index() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("reviews_imdb.csv");
    fs::write(
        &path,
        "rating,date,content\n8,2024-03-15,fine\n7,2024-03-16,fine\n9\n",
    )
    .unwrap();

    let pipeline = ProcessorPipeline::new("imdb", SourceConfig::with_rating_bounds(1.0, 10.0))
        .unwrap()
        .with_processing_time(processed_at());
    let sink = MemorySink::new();
    let err = pipeline
        .run(&CsvSource::new("imdb", &path), &sink)
        .await
        .unwrap_err();

    assert_eq!(err.stage, Stage::Load);
    assert_eq!(err.record(), Some(2));
    assert!(err.to_string().starts_with("imdb: load stage failed at record 2"));
    assert!(sink.is_empty());
}

#[tokio::test]
async fn failed_rerun_keeps_previous_csv_output() {
    let tmp = TempDir::new().unwrap();
    let sink = CsvSink::new(tmp.path());
    let pipeline = ProcessorPipeline::new("imdb", SourceConfig::with_rating_bounds(1.0, 10.0))
        .unwrap()
        .with_processing_time(processed_at());

    let good = InMemorySource::new(
        "imdb",
        vec![RawReview::new("8", "2024-03-15", "A moving story with a superb cast.")],
    );
    pipeline.run(&good, &sink).await.unwrap();
    let before = fs::read_to_string(sink.output_dir("imdb").join("reviews.csv")).unwrap();

    let bad_path = tmp.path().join("missing.csv");
    assert!(pipeline
        .run(&CsvSource::new("imdb", &bad_path), &sink)
        .await
        .is_err());

    let after = fs::read_to_string(sink.output_dir("imdb").join("reviews.csv")).unwrap();
    assert_eq!(before, after);
}

#[test]
fn typed_stages_compose_by_hand() {
    let mut config = SourceConfig::with_rating_bounds(1.0, 10.0);
    config.max_doc_freq_fraction = 1.0;
    let pipeline = ProcessorPipeline::new("imdb", config)
        .unwrap()
        .with_processing_time(processed_at());
    let source = InMemorySource::new(
        "imdb",
        vec![
            RawReview::new("9", "2024-02-01", "Sharp writing and sharp editing."),
            RawReview::new("5", "2024-02-02", "Sharp writing, dull editing."),
            RawReview::new("n/a", "2024-02-03", "No rating but long enough text."),
        ],
    );

    let loaded = pipeline.load(&source).unwrap();
    assert_eq!(loaded.records().len(), 3);
    let filtered = pipeline.normalize_and_filter(loaded);
    assert_eq!(filtered.records().len(), 2);
    assert_eq!(filtered.report().filter.missing_rating, 1);
    let prepared = pipeline.clean_text(filtered);
    let featured = pipeline.derive_features(prepared);

    assert_eq!(featured.records().len(), 2);
    assert_eq!(featured.features().rows.len(), 2);
    assert_eq!(
        featured.features().vocabulary,
        vec!["editing", "sharp", "sharp writing", "writing"]
    );
    assert_eq!(featured.summary().mean_rating, Some(7.0));
}
