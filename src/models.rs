//! Core data models used throughout Review Harness.
//!
//! These types represent the reviews that flow through the processing
//! pipeline, from the raw site-native rows a collector deposits to the
//! canonical, feature-enriched rows that get persisted. Each pipeline stage
//! produces a new record type, so a later stage cannot be handed the output
//! of an earlier one by mistake.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// Canonical rendering of a known review date.
pub const DATE_FORMAT: &str = "%Y.%m.%d";

/// Rendering of [`ReviewDate::Unknown`] in persisted tables.
pub const UNKNOWN_DATE: &str = "unknown";

/// A rating cell as the collector stored it: sometimes a number, usually text.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawRating {
    Number(f64),
    Text(String),
}

impl From<&str> for RawRating {
    fn from(value: &str) -> Self {
        RawRating::Text(value.to_string())
    }
}

impl From<f64> for RawRating {
    fn from(value: f64) -> Self {
        RawRating::Number(value)
    }
}

/// Raw review row produced by a record source before normalization.
///
/// No field is trusted: any of them may be missing, empty, or malformed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawReview {
    #[serde(default)]
    pub rating: Option<RawRating>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl RawReview {
    /// Convenience constructor for text-valued rows.
    pub fn new(rating: &str, date: &str, content: &str) -> Self {
        Self {
            rating: Some(RawRating::from(rating)),
            date: Some(date.to_string()),
            content: Some(content.to_string()),
        }
    }
}

/// A calendar date, or the explicit marker for a date that could not be
/// resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReviewDate {
    Known(NaiveDate),
    Unknown,
}

impl ReviewDate {
    pub fn known(&self) -> Option<NaiveDate> {
        match self {
            ReviewDate::Known(date) => Some(*date),
            ReviewDate::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ReviewDate::Unknown)
    }
}

impl fmt::Display for ReviewDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewDate::Known(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            ReviewDate::Unknown => f.write_str(UNKNOWN_DATE),
        }
    }
}

impl Serialize for ReviewDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Output of the field normalizer: rating and date resolved, content untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedReview {
    /// Position of the record in the loaded batch.
    pub index: usize,
    pub rating: Option<f64>,
    pub date: ReviewDate,
    pub content: Option<String>,
}

/// A record that satisfied the source's validity bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredReview {
    pub index: usize,
    pub rating: f64,
    pub date: ReviewDate,
    pub content: String,
    /// Character count of `content` after trimming and truncation.
    pub content_length: usize,
}

/// A filtered record carrying its cleaned text. `content_cleaned` is never
/// empty.
#[derive(Debug, Clone, PartialEq)]
pub struct CleanedReview {
    pub index: usize,
    pub rating: f64,
    pub date: ReviewDate,
    pub content: String,
    pub content_cleaned: String,
    pub content_length: usize,
}

/// A fully processed review row, in canonical table column order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalReview {
    #[serde(skip)]
    pub index: usize,
    pub rating: f64,
    pub date: ReviewDate,
    pub content: String,
    pub content_cleaned: String,
    pub content_length: usize,
    pub sentence_count: usize,
}

/// A sparse weight vector indexed against a fitted vocabulary.
///
/// Entries are sorted by term index and never contain zero weights.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    pub entries: Vec<(usize, f64)>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, term_index: usize) -> f64 {
        self.entries
            .binary_search_by_key(&term_index, |(idx, _)| *idx)
            .map(|pos| self.entries[pos].1)
            .unwrap_or(0.0)
    }

    /// Expand into a dense row of `width` columns.
    pub fn to_dense(&self, width: usize) -> Vec<f64> {
        let mut row = vec![0.0; width];
        for (idx, weight) in &self.entries {
            if *idx < width {
                row[*idx] = *weight;
            }
        }
        row
    }
}

/// The vocabulary-indexed feature table, row-aligned with the canonical
/// table by position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub vocabulary: Vec<String>,
    pub rows: Vec<SparseVector>,
}

impl FeatureTable {
    pub fn feature_count(&self) -> usize {
        self.vocabulary.len()
    }
}

/// Per-source summary record written alongside the two tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_reviews: usize,
    pub mean_rating: Option<f64>,
    pub mean_length: Option<f64>,
    pub mean_sentence_count: Option<f64>,
    pub feature_count: usize,
}

impl Summary {
    pub fn from_records(records: &[CanonicalReview], features: &FeatureTable) -> Self {
        let n = records.len();
        let mean = |sum: f64| if n == 0 { None } else { Some(sum / n as f64) };
        Summary {
            total_reviews: n,
            mean_rating: mean(records.iter().map(|r| r.rating).sum()),
            mean_length: mean(records.iter().map(|r| r.content_length as f64).sum()),
            mean_sentence_count: mean(records.iter().map(|r| r.sentence_count as f64).sum()),
            feature_count: features.feature_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_renders_with_dots() {
        let date = ReviewDate::Known(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(date.to_string(), "2024.03.15");
        assert_eq!(ReviewDate::Unknown.to_string(), "unknown");
    }

    #[test]
    fn raw_rating_accepts_numbers_and_text() {
        let rows: Vec<RawReview> = serde_json::from_str(
            r#"[{"rating": 8, "date": "2024-03-15", "content": "x"}, {"rating": "rated-6"}]"#,
        )
        .unwrap();
        assert_eq!(rows[0].rating, Some(RawRating::Number(8.0)));
        assert_eq!(rows[1].rating, Some(RawRating::Text("rated-6".into())));
        assert_eq!(rows[1].content, None);
    }

    #[test]
    fn sparse_vector_lookup_and_dense() {
        let v = SparseVector {
            entries: vec![(1, 0.5), (3, 0.25)],
        };
        assert_eq!(v.get(1), 0.5);
        assert_eq!(v.get(2), 0.0);
        assert_eq!(v.to_dense(4), vec![0.0, 0.5, 0.0, 0.25]);
    }

    #[test]
    fn summary_of_empty_batch_has_no_means() {
        let summary = Summary::from_records(&[], &FeatureTable::default());
        assert_eq!(summary.total_reviews, 0);
        assert_eq!(summary.mean_rating, None);
        assert_eq!(summary.feature_count, 0);
    }
}
