//! Error types for configuration and pipeline runs.
//!
//! Configuration problems are reported as [`ConfigError`] before any record
//! is touched. Stage failures are reported as [`PipelineError`], which names
//! the source, the stage, and the record index when the failure is tied to a
//! single record. Per-record defects (a missing rating, an unparseable date,
//! text that cleans to nothing) are not errors at all; they are counted on
//! the stage report.

use std::fmt;

use thiserror::Error;

/// Boxed underlying cause carried by a [`PipelineError`].
pub type Cause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Invalid source configuration, detected at pipeline construction time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("source '{source_name}': rating_bounds must be finite, got ({min}, {max})")]
    NonFiniteRatingBounds {
        source_name: String,
        min: f64,
        max: f64,
    },

    #[error("source '{source_name}': rating_bounds min {min} exceeds max {max}")]
    InvertedRatingBounds {
        source_name: String,
        min: f64,
        max: f64,
    },

    #[error("source '{source_name}': min_content_length {min} exceeds max_content_length {max}")]
    InvertedLengthBounds {
        source_name: String,
        min: usize,
        max: usize,
    },

    #[error("source '{source_name}': max_content_length must be > 0")]
    ZeroMaxLength { source_name: String },

    #[error("source '{source_name}': vocabulary_size must be > 0")]
    ZeroVocabulary { source_name: String },

    #[error("source '{source_name}': min_doc_freq must be >= 1")]
    ZeroMinDocFreq { source_name: String },

    #[error("source '{source_name}': max_doc_freq_fraction must be in (0.0, 1.0], got {value}")]
    InvalidMaxDocFreq { source_name: String, value: f64 },

    #[error("source '{source_name}': ngram_range ({min}, {max}) must satisfy 1 <= min <= max <= 5")]
    InvalidNgramRange {
        source_name: String,
        min: usize,
        max: usize,
    },

    #[error("source '{source_name}': rating multiplier must be a positive number, got {value}")]
    InvalidMultiplier { source_name: String, value: f64 },

    #[error("source '{source_name}': date.accept must name at least one date policy")]
    NoDatePolicy { source_name: String },

    #[error("source '{source_name}': min_valid_year {year} is after the reference year {reference_year}")]
    FloorAfterReference {
        source_name: String,
        year: i32,
        reference_year: i32,
    },
}

/// The pipeline stage a failure happened in. Only loading and persisting
/// touch the outside world, so only they can fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Load,
    Persist,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Persist => "persist",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional record position, rendered as `" at record N"` when present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLocation(pub Option<usize>);

impl fmt::Display for RecordLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(index) => write!(f, " at record {}", index),
            None => Ok(()),
        }
    }
}

/// A stage-level failure that aborted one source's run.
#[derive(Debug, Error)]
#[error("{source_name}: {stage} stage failed{location}: {cause}")]
pub struct PipelineError {
    pub source_name: String,
    pub stage: Stage,
    pub location: RecordLocation,
    #[source]
    pub cause: Cause,
}

impl PipelineError {
    pub fn new(source_name: &str, stage: Stage, cause: impl Into<Cause>) -> Self {
        Self {
            source_name: source_name.to_string(),
            stage,
            location: RecordLocation(None),
            cause: cause.into(),
        }
    }

    pub fn at_record(mut self, index: usize) -> Self {
        self.location = RecordLocation(Some(index));
        self
    }

    pub fn record(&self) -> Option<usize> {
        self.location.0
    }
}

/// A record source failure that can be pinned to one input row.
#[derive(Debug, Error)]
#[error("record {index}: {message}")]
pub struct RecordError {
    pub index: usize,
    pub message: String,
}
