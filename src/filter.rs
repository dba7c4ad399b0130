//! Record validity filter.
//!
//! One pure, order-preserving function serves every source; only the
//! [`FilterBounds`] differ. A record is dropped when its content is blank,
//! its rating is missing or outside the source's range, its trimmed content
//! is shorter than the minimum, or (for sources that require one) its date
//! is unknown. Content longer than the maximum is truncated, not dropped.
//!
//! Sources that drop duplicates do so here, among records that already
//! passed every check: a rejected record never shadows a valid copy of the
//! same content.

use std::collections::HashSet;
use std::fmt;

use sha2::{Digest, Sha256};

use crate::config::SourceConfig;
use crate::models::{FilteredReview, NormalizedReview};

/// Validity thresholds for one source.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterBounds {
    pub min_rating: f64,
    pub max_rating: f64,
    pub min_length: usize,
    pub max_length: usize,
    pub require_date: bool,
    pub drop_duplicates: bool,
}

impl FilterBounds {
    pub fn from_config(config: &SourceConfig) -> Self {
        Self {
            min_rating: config.rating_bounds.0,
            max_rating: config.rating_bounds.1,
            min_length: config.min_content_length,
            max_length: config.max_content_length,
            require_date: config.require_date,
            drop_duplicates: config.drop_duplicates,
        }
    }
}

/// Why a record was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingContent,
    MissingRating,
    RatingOutOfRange,
    TooShort,
    MissingDate,
    Duplicate,
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DropReason::MissingContent => "missing content",
            DropReason::MissingRating => "missing rating",
            DropReason::RatingOutOfRange => "rating out of range",
            DropReason::TooShort => "content too short",
            DropReason::MissingDate => "missing date",
            DropReason::Duplicate => "duplicate content",
        };
        f.write_str(s)
    }
}

/// Per-reason drop counts plus the number of truncated records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub missing_content: usize,
    pub missing_rating: usize,
    pub rating_out_of_range: usize,
    pub too_short: usize,
    pub missing_date: usize,
    pub duplicates: usize,
    pub truncated: usize,
}

impl FilterReport {
    fn record(&mut self, reason: DropReason) {
        match reason {
            DropReason::MissingContent => self.missing_content += 1,
            DropReason::MissingRating => self.missing_rating += 1,
            DropReason::RatingOutOfRange => self.rating_out_of_range += 1,
            DropReason::TooShort => self.too_short += 1,
            DropReason::MissingDate => self.missing_date += 1,
            DropReason::Duplicate => self.duplicates += 1,
        }
    }

    pub fn dropped(&self) -> usize {
        self.missing_content
            + self.missing_rating
            + self.rating_out_of_range
            + self.too_short
            + self.missing_date
            + self.duplicates
    }
}

/// Check one record against `bounds`, returning the surviving form.
pub fn check(
    record: &NormalizedReview,
    bounds: &FilterBounds,
) -> Result<FilteredReview, DropReason> {
    let content = record
        .content
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or(DropReason::MissingContent)?;

    let rating = record.rating.ok_or(DropReason::MissingRating)?;
    if !(bounds.min_rating..=bounds.max_rating).contains(&rating) {
        return Err(DropReason::RatingOutOfRange);
    }

    let length = content.chars().count();
    if length < bounds.min_length {
        return Err(DropReason::TooShort);
    }
    if bounds.require_date && record.date.is_unknown() {
        return Err(DropReason::MissingDate);
    }

    let (content, content_length) = if length > bounds.max_length {
        (
            content.chars().take(bounds.max_length).collect::<String>(),
            bounds.max_length,
        )
    } else {
        (content.to_string(), length)
    };

    Ok(FilteredReview {
        index: record.index,
        rating,
        date: record.date,
        content,
        content_length,
    })
}

/// Keep the records that satisfy `bounds`, in their original order.
pub fn filter_records(
    records: &[NormalizedReview],
    bounds: &FilterBounds,
) -> (Vec<FilteredReview>, FilterReport) {
    let mut report = FilterReport::default();
    let mut kept = Vec::with_capacity(records.len());
    let mut seen = HashSet::new();

    for record in records {
        let checked = check(record, bounds).and_then(|filtered| {
            if bounds.drop_duplicates && !seen.insert(content_digest(record)) {
                return Err(DropReason::Duplicate);
            }
            Ok(filtered)
        });
        match checked {
            Ok(filtered) => {
                if filtered.content_length == bounds.max_length
                    && record
                        .content
                        .as_deref()
                        .map(|c| c.trim().chars().count() > bounds.max_length)
                        .unwrap_or(false)
                {
                    report.truncated += 1;
                }
                kept.push(filtered);
            }
            Err(reason) => {
                tracing::debug!(record = record.index, %reason, "dropping record");
                report.record(reason);
            }
        }
    }

    (kept, report)
}

/// SHA-256 of the trimmed, untruncated content.
fn content_digest(record: &NormalizedReview) -> String {
    let trimmed = record.content.as_deref().map(str::trim).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(trimmed.as_bytes());
    format!("{:x}", hasher.finalize())
}
