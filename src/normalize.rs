//! Field normalization: site-native rating and date cells to canonical values.
//!
//! [`FieldNormalizer`] applies one source's rating and date rules to every
//! record of a batch. Ratings that cannot be read become `None` and dates
//! become [`ReviewDate::Unknown`]; the filter stage decides what to do with
//! them. Content passes through untouched.
//!
//! For a batch, dates are resolved and held to the floor year first, then
//! repaired for listing order (newest-first sources only, in input order),
//! then validated against the processing date. Dates below the floor never
//! anchor a repair.

use crate::config::{DateRules, RatingRules, SourceConfig};
use crate::dates::{self, DateContext, ListingOrder};
use crate::models::{NormalizedReview, RawReview, ReviewDate};
use crate::rating;

/// Counters for what normalization could not resolve or changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub ratings_missing: usize,
    pub dates_unknown: usize,
    pub dates_repaired: usize,
    pub multi_year_repairs: usize,
}

#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    rating: RatingRules,
    date: DateRules,
    ctx: DateContext,
    listing_order: ListingOrder,
}

impl FieldNormalizer {
    pub fn new(config: &SourceConfig, ctx: DateContext) -> Self {
        Self {
            rating: config.rating.clone(),
            date: config.date.clone(),
            ctx,
            listing_order: config.listing_order,
        }
    }

    pub fn context(&self) -> &DateContext {
        &self.ctx
    }

    /// Normalize a single record in isolation (no listing-order repair).
    pub fn normalize(&self, index: usize, raw: &RawReview) -> NormalizedReview {
        let date = dates::resolve_date(raw.date.as_deref(), &self.date, &self.ctx);
        NormalizedReview {
            index,
            rating: rating::parse_rating(raw.rating.as_ref(), &self.rating),
            date: dates::validate_date(date, &self.ctx),
            content: raw.content.clone(),
        }
    }

    /// Normalize a whole batch, repairing dates when the source lists
    /// newest-first.
    pub fn normalize_batch(
        &self,
        source_name: &str,
        raws: &[RawReview],
    ) -> (Vec<NormalizedReview>, NormalizeReport) {
        let mut report = NormalizeReport::default();

        let mut resolved: Vec<ReviewDate> = raws
            .iter()
            .map(|raw| dates::resolve_date(raw.date.as_deref(), &self.date, &self.ctx))
            .collect();

        if self.listing_order == ListingOrder::NewestFirst {
            for date in resolved.iter_mut() {
                *date = dates::validate_floor(*date, &self.ctx);
            }
            let outcome = dates::repair_newest_first(&mut resolved);
            report.dates_repaired = outcome.repaired.len();
            report.multi_year_repairs = outcome.multi_year.len();
            for index in &outcome.multi_year {
                tracing::warn!(
                    source = source_name,
                    record = index,
                    "date repair moved a record back more than one year; is the listing really newest-first?"
                );
            }
        }

        let mut records = Vec::with_capacity(raws.len());
        for (index, (raw, date)) in raws.iter().zip(resolved).enumerate() {
            let rating = rating::parse_rating(raw.rating.as_ref(), &self.rating);
            if rating.is_none() {
                report.ratings_missing += 1;
            }
            let date = dates::validate_date(date, &self.ctx);
            if date.is_unknown() {
                report.dates_unknown += 1;
                tracing::debug!(source = source_name, record = index, raw = ?raw.date, "date unknown");
            }
            records.push(NormalizedReview {
                index,
                rating,
                date,
                content: raw.content.clone(),
            });
        }

        (records, report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::RatingFormat;
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ctx() -> DateContext {
        DateContext {
            reference: ymd(2025, 1, 21).and_hms_opt(0, 0, 0).unwrap(),
            processed_on: ymd(2025, 1, 21),
            min_valid_year: 2010,
        }
    }

    #[test]
    fn normalizes_single_record() {
        let mut cfg = SourceConfig::with_rating_bounds(0.0, 10.0);
        cfg.rating.format = RatingFormat::Stars;
        cfg.rating.multiplier = 2.0;
        let normalizer = FieldNormalizer::new(&cfg, ctx());

        let raw = RawReview::new("★★★★", "5d", "Solid film.");
        let out = normalizer.normalize(0, &raw);
        assert_eq!(out.rating, Some(8.0));
        assert_eq!(out.date, ReviewDate::Known(ymd(2025, 1, 16)));
        assert_eq!(out.content.as_deref(), Some("Solid film."));
    }

    #[test]
    fn batch_repairs_newest_first_before_validation() {
        let mut cfg = SourceConfig::with_rating_bounds(0.0, 10.0);
        cfg.listing_order = ListingOrder::NewestFirst;
        let normalizer = FieldNormalizer::new(&cfg, ctx());

        // "2025.12.20" is in the future until the repair pulls it into 2024.
        let raws = vec![
            RawReview::new("8", "2025.01.02", "first"),
            RawReview::new("7", "2025.12.20", "second"),
        ];
        let (records, report) = normalizer.normalize_batch("rotten", &raws);
        assert_eq!(records[1].date, ReviewDate::Known(ymd(2024, 12, 20)));
        assert_eq!(report.dates_repaired, 1);
        assert_eq!(report.dates_unknown, 0);
    }

    #[test]
    fn unordered_batch_keeps_future_dates_unknown() {
        let cfg = SourceConfig::with_rating_bounds(0.0, 10.0);
        let normalizer = FieldNormalizer::new(&cfg, ctx());
        let raws = vec![
            RawReview::new("8", "2025.01.02", "first"),
            RawReview::new("7", "2025.12.20", "second"),
        ];
        let (records, report) = normalizer.normalize_batch("imdb", &raws);
        assert_eq!(records[1].date, ReviewDate::Unknown);
        assert_eq!(report.dates_unknown, 1);
        assert_eq!(report.dates_repaired, 0);
    }

    #[test]
    fn below_floor_date_does_not_anchor_repair() {
        let mut cfg = SourceConfig::with_rating_bounds(0.0, 10.0);
        cfg.listing_order = ListingOrder::NewestFirst;
        let normalizer = FieldNormalizer::new(&cfg, ctx());

        let raws = vec![
            RawReview::new("8", "2005-01-01", "typo year"),
            RawReview::new("7", "2024-12-01", "second"),
            RawReview::new("6", "2024-11-01", "third"),
        ];
        let (records, report) = normalizer.normalize_batch("rotten", &raws);
        let dates: Vec<ReviewDate> = records.iter().map(|r| r.date).collect();
        assert_eq!(
            dates,
            vec![
                ReviewDate::Unknown,
                ReviewDate::Known(ymd(2024, 12, 1)),
                ReviewDate::Known(ymd(2024, 11, 1)),
            ]
        );
        assert_eq!(report.dates_repaired, 0);
        assert_eq!(report.dates_unknown, 1);
    }

    #[test]
    fn missing_fields_are_absorbed() {
        let cfg = SourceConfig::with_rating_bounds(0.0, 10.0);
        let normalizer = FieldNormalizer::new(&cfg, ctx());
        let (records, report) = normalizer.normalize_batch("imdb", &[RawReview::default()]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].rating, None);
        assert_eq!(records[0].date, ReviewDate::Unknown);
        assert_eq!(report.ratings_missing, 1);
        assert_eq!(report.dates_unknown, 1);
    }
}
