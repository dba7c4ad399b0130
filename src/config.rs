//! TOML configuration parsing and validation.
//!
//! A config file names the output sink, where raw review dumps are
//! discovered, and one `[sources.<name>]` table per review site. Each source
//! table carries everything that differs between sites: rating scale and
//! literal format, accepted date forms, validity bounds, and vectorizer
//! settings. Validation happens here, before any record is read.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer};

use crate::dates::{DatePolicy, ListingOrder};
use crate::error::ConfigError;
use crate::rating::RatingFormat;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, SourceConfig>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Csv,
    Sqlite,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_kind")]
    pub kind: OutputKind,
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            kind: default_output_kind(),
            dir: default_data_dir(),
            db_path: None,
        }
    }
}

impl OutputConfig {
    /// SQLite database path; defaults to `reviews.sqlite` inside `dir`.
    pub fn sqlite_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| self.dir.join("reviews.sqlite"))
    }
}

fn default_output_kind() -> OutputKind {
    OutputKind::Csv
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("./database")
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_data_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_input_pattern")]
    pub pattern: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: default_data_dir(),
            pattern: default_input_pattern(),
        }
    }
}

fn default_input_pattern() -> String {
    "reviews_*.{csv,json}".to_string()
}

/// Everything the pipeline needs to know about one review site.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    /// Explicit input file; when absent the source is found by discovery.
    #[serde(default)]
    pub input: Option<PathBuf>,
    pub rating_bounds: (f64, f64),
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    #[serde(default = "default_max_content_length")]
    pub max_content_length: usize,
    #[serde(default = "default_min_valid_year")]
    pub min_valid_year: i32,
    /// Instant relative dates are resolved against. Defaults to the
    /// processing time of the run.
    #[serde(default, deserialize_with = "deserialize_reference")]
    pub reference_timestamp: Option<NaiveDateTime>,
    #[serde(default = "default_vocabulary_size")]
    pub vocabulary_size: usize,
    #[serde(default = "default_min_doc_freq")]
    pub min_doc_freq: usize,
    #[serde(default = "default_max_doc_freq_fraction")]
    pub max_doc_freq_fraction: f64,
    #[serde(default = "default_ngram_range")]
    pub ngram_range: (usize, usize),
    #[serde(default)]
    pub listing_order: ListingOrder,
    #[serde(default)]
    pub require_date: bool,
    #[serde(default)]
    pub drop_duplicates: bool,
    #[serde(default)]
    pub extra_stopwords: Vec<String>,
    #[serde(default)]
    pub rating: RatingRules,
    #[serde(default)]
    pub date: DateRules,
}

fn default_min_content_length() -> usize {
    10
}
fn default_max_content_length() -> usize {
    10_000
}
fn default_min_valid_year() -> i32 {
    2010
}
fn default_vocabulary_size() -> usize {
    2000
}
fn default_min_doc_freq() -> usize {
    2
}
fn default_max_doc_freq_fraction() -> f64 {
    0.95
}
/// Longest n-gram a vectorizer may be configured for.
pub const MAX_NGRAM: usize = 5;

fn default_ngram_range() -> (usize, usize) {
    (1, 2)
}

#[derive(Debug, Deserialize, Clone)]
pub struct RatingRules {
    #[serde(default)]
    pub format: RatingFormat,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_css_prefix")]
    pub css_prefix: String,
    #[serde(default = "default_rating_markers")]
    pub missing_markers: Vec<String>,
}

impl Default for RatingRules {
    fn default() -> Self {
        Self {
            format: RatingFormat::default(),
            multiplier: default_multiplier(),
            css_prefix: default_css_prefix(),
            missing_markers: default_rating_markers(),
        }
    }
}

fn default_multiplier() -> f64 {
    1.0
}
fn default_css_prefix() -> String {
    "rated-".to_string()
}
fn default_rating_markers() -> Vec<String> {
    vec!["평점 없음".to_string(), "n/a".to_string(), "none".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct DateRules {
    #[serde(default = "default_accept")]
    pub accept: Vec<DatePolicy>,
    #[serde(default = "default_date_markers")]
    pub missing_markers: Vec<String>,
}

impl Default for DateRules {
    fn default() -> Self {
        Self {
            accept: default_accept(),
            missing_markers: default_date_markers(),
        }
    }
}

fn default_accept() -> Vec<DatePolicy> {
    vec![
        DatePolicy::Relative,
        DatePolicy::MonthDay,
        DatePolicy::Absolute,
    ]
}
fn default_date_markers() -> Vec<String> {
    vec!["날짜 정보 없음".to_string(), "unknown".to_string(), "n/a".to_string()]
}

/// Accepts `"2025-01-21T00:00:00"` or a bare `"2025-01-21"` (midnight).
fn deserialize_reference<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(s) => parse_reference(&s)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid reference_timestamp: '{}'", s))),
    }
}

pub fn parse_reference(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

impl SourceConfig {
    /// A config with the given rating bounds and every other field at its
    /// default, for building pipelines in code.
    pub fn with_rating_bounds(min: f64, max: f64) -> Self {
        Self {
            input: None,
            rating_bounds: (min, max),
            min_content_length: default_min_content_length(),
            max_content_length: default_max_content_length(),
            min_valid_year: default_min_valid_year(),
            reference_timestamp: None,
            vocabulary_size: default_vocabulary_size(),
            min_doc_freq: default_min_doc_freq(),
            max_doc_freq_fraction: default_max_doc_freq_fraction(),
            ngram_range: default_ngram_range(),
            listing_order: ListingOrder::default(),
            require_date: false,
            drop_duplicates: false,
            extra_stopwords: Vec::new(),
            rating: RatingRules::default(),
            date: DateRules::default(),
        }
    }

    /// Check every bound and vectorizer setting for `source_name`.
    pub fn validate(&self, source_name: &str) -> Result<(), ConfigError> {
        let name = || source_name.to_string();
        let (min, max) = self.rating_bounds;
        if !min.is_finite() || !max.is_finite() {
            return Err(ConfigError::NonFiniteRatingBounds {
                source_name: name(),
                min,
                max,
            });
        }
        if min > max {
            return Err(ConfigError::InvertedRatingBounds {
                source_name: name(),
                min,
                max,
            });
        }
        if self.max_content_length == 0 {
            return Err(ConfigError::ZeroMaxLength {
                source_name: name(),
            });
        }
        if self.min_content_length > self.max_content_length {
            return Err(ConfigError::InvertedLengthBounds {
                source_name: name(),
                min: self.min_content_length,
                max: self.max_content_length,
            });
        }
        if self.vocabulary_size == 0 {
            return Err(ConfigError::ZeroVocabulary {
                source_name: name(),
            });
        }
        if self.min_doc_freq == 0 {
            return Err(ConfigError::ZeroMinDocFreq {
                source_name: name(),
            });
        }
        let fraction = self.max_doc_freq_fraction;
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(ConfigError::InvalidMaxDocFreq {
                source_name: name(),
                value: fraction,
            });
        }
        let (lo, hi) = self.ngram_range;
        if lo == 0 || lo > hi || hi > MAX_NGRAM {
            return Err(ConfigError::InvalidNgramRange {
                source_name: name(),
                min: lo,
                max: hi,
            });
        }
        let multiplier = self.rating.multiplier;
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(ConfigError::InvalidMultiplier {
                source_name: name(),
                value: multiplier,
            });
        }
        if self.date.accept.is_empty() {
            return Err(ConfigError::NoDatePolicy {
                source_name: name(),
            });
        }
        if let Some(reference) = self.reference_timestamp {
            if self.min_valid_year > reference.year() {
                return Err(ConfigError::FloorAfterReference {
                    source_name: name(),
                    year: self.min_valid_year,
                    reference_year: reference.year(),
                });
            }
        }
        Ok(())
    }
}

impl Config {
    /// Parse and validate a config from TOML text.
    pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(content)?;
        for (name, source) in &config.sources {
            source.validate(name)?;
        }
        Ok(config)
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources.get(name)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config = Config::from_toml(&content).with_context(|| "Failed to load config file")?;
    Ok(config)
}
