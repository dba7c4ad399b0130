//! Per-source processing pipeline.
//!
//! One [`ProcessorPipeline`] processes one source's batch through a fixed,
//! forward-only sequence of states:
//!
//! ```text
//! Created → Loaded → NormalizedAndFiltered → TextCleaned → Featured → Persisted
//! ```
//!
//! Each transition consumes the previous stage's batch type and returns the
//! next one ([`LoadedBatch`] → [`FilteredBatch`] → [`PreparedBatch`] →
//! [`FeaturedBatch`] → [`PersistReport`]), so stages cannot be skipped,
//! reordered, or re-entered. Sources differ only in their [`SourceConfig`];
//! there is one pipeline implementation for every site.
//!
//! Loading and persisting can fail; those failures surface as a
//! [`PipelineError`] naming the source and stage, and nothing reaches the
//! sink. The stages in between cannot fail: per-record defects are counted
//! on the [`StageReport`] and the record is dropped or marked unknown.

use std::fmt;
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};

use crate::clean::TextNormalizer;
use crate::config::SourceConfig;
use crate::dates::DateContext;
use crate::error::{ConfigError, PipelineError, RecordError, Stage};
use crate::features::{FeatureDeriver, SkipReason, VectorizerSettings, Vectorization};
use crate::filter::{self, FilterBounds, FilterReport};
use crate::models::{CanonicalReview, CleanedReview, FeatureTable, FilteredReview, RawReview, Summary};
use crate::normalize::{FieldNormalizer, NormalizeReport};
use crate::progress::{NoProgress, ProgressEvent, ProgressReporter};
use crate::sink::{PersistBatch, PersistenceSink};
use crate::source::RecordSource;

/// Where a source's run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PipelineState {
    Created,
    Loaded,
    NormalizedAndFiltered,
    TextCleaned,
    Featured,
    Persisted,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Created => "created",
            PipelineState::Loaded => "loaded",
            PipelineState::NormalizedAndFiltered => "normalized_and_filtered",
            PipelineState::TextCleaned => "text_cleaned",
            PipelineState::Featured => "featured",
            PipelineState::Persisted => "persisted",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record outcome counters accumulated across stages.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub loaded: usize,
    pub normalize: NormalizeReport,
    pub filter: FilterReport,
    /// Records that survived normalization and filtering.
    pub filtered: usize,
    /// Records whose content cleaned to nothing.
    pub emptied_by_cleaning: usize,
    /// Records that reached feature derivation.
    pub cleaned: usize,
}

/// Raw rows read from the source.
#[derive(Debug, Clone)]
pub struct LoadedBatch {
    source: String,
    records: Vec<RawReview>,
}

impl LoadedBatch {
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn records(&self) -> &[RawReview] {
        &self.records
    }
}

/// Records with canonical ratings and dates that satisfy the source's bounds.
#[derive(Debug, Clone)]
pub struct FilteredBatch {
    source: String,
    records: Vec<FilteredReview>,
    report: StageReport,
}

impl FilteredBatch {
    pub fn records(&self) -> &[FilteredReview] {
        &self.records
    }

    pub fn report(&self) -> &StageReport {
        &self.report
    }
}

/// Filtered records carrying non-empty cleaned text.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    source: String,
    records: Vec<CleanedReview>,
    report: StageReport,
}

impl PreparedBatch {
    pub fn records(&self) -> &[CleanedReview] {
        &self.records
    }

    pub fn report(&self) -> &StageReport {
        &self.report
    }
}

/// The complete output for one source, ready to persist.
#[derive(Debug, Clone)]
pub struct FeaturedBatch {
    source: String,
    records: Vec<CanonicalReview>,
    features: FeatureTable,
    vectorization: Vectorization,
    summary: Summary,
    report: StageReport,
}

impl FeaturedBatch {
    pub fn records(&self) -> &[CanonicalReview] {
        &self.records
    }

    pub fn features(&self) -> &FeatureTable {
        &self.features
    }

    pub fn vectorization(&self) -> &Vectorization {
        &self.vectorization
    }

    pub fn summary(&self) -> &Summary {
        &self.summary
    }

    pub fn report(&self) -> &StageReport {
        &self.report
    }

    pub fn as_persist(&self) -> PersistBatch<'_> {
        PersistBatch {
            source: &self.source,
            records: &self.records,
            features: &self.features,
            summary: &self.summary,
        }
    }

    /// Finish the run without persisting (dry runs).
    pub fn into_report(self, persisted: bool) -> PersistReport {
        PersistReport {
            source: self.source,
            rows: self.records.len(),
            skipped: match self.vectorization {
                Vectorization::Fitted(_) => None,
                Vectorization::Skipped(reason) => Some(reason),
            },
            summary: self.summary,
            report: self.report,
            persisted,
        }
    }
}

/// Outcome of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistReport {
    pub source: String,
    pub rows: usize,
    pub summary: Summary,
    /// Set when feature derivation had nothing to fit.
    pub skipped: Option<SkipReason>,
    pub report: StageReport,
    /// False for dry runs.
    pub persisted: bool,
}

/// Processes one source's batch.
#[derive(Clone)]
pub struct ProcessorPipeline {
    name: String,
    config: SourceConfig,
    processed_at: NaiveDateTime,
    reporter: Arc<dyn ProgressReporter>,
}

impl fmt::Debug for ProcessorPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorPipeline")
            .field("name", &self.name)
            .field("processed_at", &self.processed_at)
            .finish_non_exhaustive()
    }
}

impl ProcessorPipeline {
    /// Validate `config` and build a pipeline for source `name`.
    ///
    /// The processing time defaults to now (local time); relative dates are
    /// resolved against it unless the config pins a reference timestamp.
    pub fn new(name: impl Into<String>, config: SourceConfig) -> Result<Self, ConfigError> {
        let name = name.into();
        config.validate(&name)?;
        Ok(Self {
            name,
            config,
            processed_at: Local::now().naive_local(),
            reporter: Arc::new(NoProgress),
        })
    }

    pub fn with_processing_time(mut self, processed_at: NaiveDateTime) -> Self {
        self.processed_at = processed_at;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    pub fn date_context(&self) -> DateContext {
        DateContext {
            reference: self.config.reference_timestamp.unwrap_or(self.processed_at),
            processed_on: self.processed_at.date(),
            min_valid_year: self.config.min_valid_year,
        }
    }

    fn advance(&self, state: PipelineState, records: usize) {
        tracing::info!(source = %self.name, state = %state, records, "stage complete");
        self.reporter.report(ProgressEvent::Stage {
            source: self.name.clone(),
            state,
            records,
        });
    }

    /// Wrap `err` as a failure of `stage`, pinned to a record when it came
    /// from one, and report it.
    pub(crate) fn fail(&self, stage: Stage, err: anyhow::Error) -> PipelineError {
        let record = err.downcast_ref::<RecordError>().map(|e| e.index);
        let mut error = PipelineError::new(&self.name, stage, err);
        if let Some(index) = record {
            error = error.at_record(index);
        }
        tracing::error!(source = %self.name, stage = %stage, error = %error, "stage failed");
        self.reporter.report(ProgressEvent::Failed {
            source: self.name.clone(),
            stage,
        });
        error
    }

    /// `Created → Loaded`: read the whole batch into memory.
    pub fn load(&self, source: &dyn RecordSource) -> Result<LoadedBatch, PipelineError> {
        let records = source.load().map_err(|err| self.fail(Stage::Load, err))?;
        self.advance(PipelineState::Loaded, records.len());
        Ok(LoadedBatch {
            source: self.name.clone(),
            records,
        })
    }

    /// `Loaded → NormalizedAndFiltered`: canonical ratings and dates, then
    /// the validity filter. An empty result is a valid outcome.
    pub fn normalize_and_filter(&self, batch: LoadedBatch) -> FilteredBatch {
        let normalizer = FieldNormalizer::new(&self.config, self.date_context());
        let (normalized, normalize) = normalizer.normalize_batch(&batch.source, &batch.records);
        let bounds = FilterBounds::from_config(&self.config);
        let (records, filter) = filter::filter_records(&normalized, &bounds);

        let report = StageReport {
            loaded: batch.records.len(),
            normalize,
            filter,
            filtered: records.len(),
            ..StageReport::default()
        };
        self.advance(PipelineState::NormalizedAndFiltered, records.len());
        FilteredBatch {
            source: batch.source,
            records,
            report,
        }
    }

    /// `NormalizedAndFiltered → TextCleaned`: records whose content cleans
    /// to nothing are dropped here.
    pub fn clean_text(&self, batch: FilteredBatch) -> PreparedBatch {
        let cleaner = TextNormalizer::new(&self.config.extra_stopwords);
        let mut report = batch.report;

        let records: Vec<CleanedReview> = batch
            .records
            .into_iter()
            .filter_map(|r| {
                let content_cleaned = cleaner.clean(&r.content);
                if content_cleaned.is_empty() {
                    tracing::debug!(source = %self.name, record = r.index, "content cleaned to nothing");
                    report.emptied_by_cleaning += 1;
                    return None;
                }
                Some(CleanedReview {
                    index: r.index,
                    rating: r.rating,
                    date: r.date,
                    content: r.content,
                    content_cleaned,
                    content_length: r.content_length,
                })
            })
            .collect();

        report.cleaned = records.len();
        self.advance(PipelineState::TextCleaned, records.len());
        PreparedBatch {
            source: batch.source,
            records,
            report,
        }
    }

    /// Normalize, filter, and clean in one call.
    pub fn prepare(&self, batch: LoadedBatch) -> PreparedBatch {
        let filtered = self.normalize_and_filter(batch);
        self.clean_text(filtered)
    }

    /// `TextCleaned → Featured`: sentence counts and one vectorizer fit over
    /// the whole batch. Nothing to fit yields an empty feature table.
    pub fn derive_features(&self, batch: PreparedBatch) -> FeaturedBatch {
        let deriver = FeatureDeriver::new(VectorizerSettings::from_config(&self.config));
        let derived = deriver.derive(&batch.records);

        if let Vectorization::Skipped(reason) = &derived.vectorization {
            tracing::info!(source = %self.name, %reason, "feature derivation skipped");
        }

        let records: Vec<CanonicalReview> = batch
            .records
            .into_iter()
            .zip(derived.sentence_counts)
            .map(|(r, sentence_count)| CanonicalReview {
                index: r.index,
                rating: r.rating,
                date: r.date,
                content: r.content,
                content_cleaned: r.content_cleaned,
                content_length: r.content_length,
                sentence_count,
            })
            .collect();
        let summary = Summary::from_records(&records, &derived.table);

        self.advance(PipelineState::Featured, records.len());
        FeaturedBatch {
            source: batch.source,
            records,
            features: derived.table,
            vectorization: derived.vectorization,
            summary,
            report: batch.report,
        }
    }

    /// `Featured → Persisted`: hand the whole batch to `sink` in one call.
    pub async fn persist(
        &self,
        batch: FeaturedBatch,
        sink: &dyn PersistenceSink,
    ) -> Result<PersistReport, PipelineError> {
        sink.persist(&batch.as_persist())
            .await
            .map_err(|err| self.fail(Stage::Persist, err))?;
        self.advance(PipelineState::Persisted, batch.records.len());
        Ok(batch.into_report(true))
    }

    /// Run every stage for `source` and persist into `sink`.
    pub async fn run(
        &self,
        source: &dyn RecordSource,
        sink: &dyn PersistenceSink,
    ) -> Result<PersistReport, PipelineError> {
        let loaded = self.load(source)?;
        let prepared = self.prepare(loaded);
        let featured = self.derive_features(prepared);
        self.persist(featured, sink).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewDate;
    use crate::sink::MemorySink;
    use crate::source::InMemorySource;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    fn processed_at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 21)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn pipeline() -> ProcessorPipeline {
        ProcessorPipeline::new("imdb", SourceConfig::with_rating_bounds(1.0, 10.0))
            .unwrap()
            .with_processing_time(processed_at())
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<ProgressEvent>>);

    impl ProgressReporter for Recorder {
        fn report(&self, event: ProgressEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    #[test]
    fn inverted_bounds_fail_at_construction() {
        let err = ProcessorPipeline::new("imdb", SourceConfig::with_rating_bounds(10.0, 1.0))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvertedRatingBounds { .. }));
    }

    #[test]
    fn relative_dates_use_processing_time_by_default() {
        let ctx = pipeline().date_context();
        assert_eq!(ctx.reference, processed_at());
        assert_eq!(ctx.processed_on, processed_at().date());
    }

    #[test]
    fn text_that_cleans_to_nothing_is_dropped_at_cleaning() {
        let p = pipeline();
        let source = InMemorySource::new(
            "imdb",
            vec![
                RawReview::new("7", "2024-01-01", "It is what it is, and so it was."),
                RawReview::new("7", "2024-01-01", "Superb acting throughout the film."),
            ],
        );
        let filtered = p.normalize_and_filter(p.load(&source).unwrap());
        assert_eq!(filtered.records().len(), 2);

        let prepared = p.clean_text(filtered);
        assert_eq!(prepared.records().len(), 1);
        assert_eq!(prepared.report().emptied_by_cleaning, 1);
        assert_eq!(prepared.records()[0].content_cleaned, "superb acting throughout film");
    }

    #[tokio::test]
    async fn end_to_end_keeps_only_the_valid_record() {
        let recorder = Arc::new(Recorder::default());
        let p = pipeline().with_reporter(recorder.clone());
        let source = InMemorySource::new(
            "imdb",
            vec![
                RawReview::new("11", "2024-03-15", "An out of range rating on a long review."),
                RawReview::new("9", "2024-03-15", "ok"),
                RawReview::new("8", "2024-03-15", "A moving story with a superb cast. Loved it!"),
            ],
        );
        let sink = MemorySink::new();
        let report = p.run(&source, &sink).await.unwrap();

        assert_eq!(report.rows, 1);
        assert_eq!(report.report.filter.rating_out_of_range, 1);
        assert_eq!(report.report.filter.too_short, 1);
        assert_eq!(report.skipped, Some(SkipReason::EmptyVocabulary));

        let stored = sink.get("imdb").unwrap();
        let row = &stored.records[0];
        assert_eq!(row.rating, 8.0);
        assert_eq!(row.date, ReviewDate::Known(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()));
        assert_eq!(row.date.to_string(), "2024.03.15");
        assert!(!row.content_cleaned.is_empty());
        assert_eq!(row.sentence_count, 2);
        assert_eq!(stored.features.rows.len(), 1);

        let states: Vec<PipelineState> = recorder
            .0
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                ProgressEvent::Stage { state, .. } => Some(*state),
                ProgressEvent::Failed { .. } => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                PipelineState::Loaded,
                PipelineState::NormalizedAndFiltered,
                PipelineState::TextCleaned,
                PipelineState::Featured,
                PipelineState::Persisted,
            ]
        );
    }

    #[tokio::test]
    async fn empty_batch_persists_empty_tables() {
        let p = pipeline();
        let sink = MemorySink::new();
        let report = p
            .run(&InMemorySource::new("imdb", Vec::new()), &sink)
            .await
            .unwrap();

        assert_eq!(report.rows, 0);
        assert_eq!(report.skipped, Some(SkipReason::EmptyCorpus));
        let stored = sink.get("imdb").unwrap();
        assert!(stored.records.is_empty());
        assert!(stored.features.vocabulary.is_empty());
        assert!(stored.features.rows.is_empty());
        assert_eq!(stored.summary.total_reviews, 0);
    }

    #[test]
    fn features_are_row_aligned_with_records() {
        let p = pipeline();
        let source = InMemorySource::new(
            "imdb",
            vec![
                RawReview::new("8", "2024-03-15", "Great acting and a great plot."),
                RawReview::new("6", "2024-03-16", "Great acting, weak plot overall."),
                RawReview::new("4", "2024-03-17", "Weak plot, weak ending, long."),
            ],
        );
        let featured = p.derive_features(p.prepare(p.load(&source).unwrap()));
        assert_eq!(featured.records().len(), 3);
        assert_eq!(featured.features().rows.len(), 3);
        assert!(featured.vectorization().model().is_some());
        assert!(featured.features().vocabulary.iter().any(|t| t == "great acting"));
        assert_eq!(featured.summary().feature_count, featured.features().vocabulary.len());
    }
}
