//! Date resolution, validation, and listing-order repair.
//!
//! Sites publish review dates three ways, each handled by one
//! [`DatePolicy`]:
//!
//! | Policy | Examples | Resolution |
//! |--------|----------|------------|
//! | `relative` | `5d`, `3h` | days subtracted from the reference date; hours are unknown |
//! | `month_day` | `Jan 5`, `December 20` | reference year, rolled back one year if after the reference date |
//! | `absolute` | `2024-03-15`, `2024.03.15`, `2024-03-15T10:00:00Z`, `Mar 15, 2024` | parsed as is |
//!
//! Month-day dates can land in the wrong year across a year boundary, and a
//! single record cannot tell. When a source lists reviews newest-first,
//! [`repair_newest_first`] walks the batch and pulls any date that sits
//! after its predecessor back by whole years.
//!
//! Nothing here fails: unreadable dates resolve to [`ReviewDate::Unknown`].

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::config::DateRules;
use crate::models::ReviewDate;

static RELATIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+)\s*([a-z]+)$").expect("relative date pattern"));
static MONTH_DAY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z]+)\.?\s+(\d{1,2})$").expect("month-day pattern"));

/// One way a source may publish a review date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatePolicy {
    Relative,
    MonthDay,
    Absolute,
}

/// Order in which a source lists its reviews.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingOrder {
    #[default]
    Unordered,
    NewestFirst,
}

/// Fixed instants a batch's dates are resolved and validated against.
#[derive(Debug, Clone, Copy)]
pub struct DateContext {
    /// Instant relative and year-less dates are resolved against.
    pub reference: NaiveDateTime,
    /// Dates after this day are treated as unknown.
    pub processed_on: NaiveDate,
    /// Dates before January 1st of this year are treated as unknown.
    pub min_valid_year: i32,
}

/// Resolve a raw date cell into a calendar date without validating it.
pub fn resolve_date(raw: Option<&str>, rules: &DateRules, ctx: &DateContext) -> ReviewDate {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return ReviewDate::Unknown;
    };
    if rules
        .missing_markers
        .iter()
        .any(|m| m.trim().eq_ignore_ascii_case(raw))
    {
        return ReviewDate::Unknown;
    }

    for policy in &rules.accept {
        let resolved = match policy {
            DatePolicy::Relative => resolve_relative(raw, ctx.reference),
            DatePolicy::MonthDay => {
                resolve_month_day(raw, ctx.reference.date()).map(ReviewDate::Known)
            }
            DatePolicy::Absolute => resolve_absolute(raw).map(ReviewDate::Known),
        };
        if let Some(date) = resolved {
            return date;
        }
    }
    ReviewDate::Unknown
}

/// `"<n>d"` resolves against the reference date. `"<n>h"` and `"<n>m"` are
/// recognised but resolve to unknown, since the reference is a day-level
/// anchor. Returns `None` when `raw` is not a relative offset at all.
pub fn resolve_relative(raw: &str, reference: NaiveDateTime) -> Option<ReviewDate> {
    let lowered = raw.to_lowercase();
    let caps = RELATIVE_RE.captures(&lowered)?;
    let amount: i64 = caps[1].parse().ok()?;
    match &caps[2] {
        "d" | "day" | "days" => Some(
            Duration::try_days(amount)
                .and_then(|offset| reference.date().checked_sub_signed(offset))
                .map(ReviewDate::Known)
                .unwrap_or(ReviewDate::Unknown),
        ),
        "h" | "m" | "min" => Some(ReviewDate::Unknown),
        _ => None,
    }
}

/// `"Jan 5"` in the reference year, or the year before when that would be
/// after the reference date.
pub fn resolve_month_day(raw: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let caps = MONTH_DAY_RE.captures(raw)?;
    let month = month_number(&caps[1])?;
    let day: u32 = caps[2].parse().ok()?;
    let year = reference.year();
    [year, year - 1].into_iter().find_map(|y| {
        NaiveDate::from_ymd_opt(y, month, day).filter(|date| *date <= reference)
    })
}

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// 1-based month for a full or abbreviated (at least three letters) name.
fn month_number(token: &str) -> Option<u32> {
    let token = token.to_ascii_lowercase();
    if token.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|name| name.starts_with(token.as_str()))
        .map(|i| i as u32 + 1)
}

/// `YYYY-MM-DD`, `YYYY.MM.DD`, an ISO datetime, or `"Mar 15, 2024"`.
pub fn resolve_absolute(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.split_once('T').map(|(d, _)| d).unwrap_or(raw);
    for fmt in ["%Y-%m-%d", "%Y.%m.%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(date_part, fmt) {
            return Some(date);
        }
    }
    NaiveDate::parse_from_str(raw, "%b %d, %Y").ok()
}

/// Apply only the floor-year invariant. Newest-first repair runs between
/// this and [`validate_date`], so a date that is merely in the future can
/// still be pulled back into range.
pub fn validate_floor(date: ReviewDate, ctx: &DateContext) -> ReviewDate {
    match date {
        ReviewDate::Known(d) if d.year() < ctx.min_valid_year => ReviewDate::Unknown,
        other => other,
    }
}

/// Apply the floor-year and no-future invariants.
pub fn validate_date(date: ReviewDate, ctx: &DateContext) -> ReviewDate {
    match date {
        ReviewDate::Known(d) if d.year() < ctx.min_valid_year || d > ctx.processed_on => {
            ReviewDate::Unknown
        }
        other => other,
    }
}

/// What [`repair_newest_first`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
    /// Positions whose year was decremented.
    pub repaired: Vec<usize>,
    /// Positions that needed more than one year of correction. A long
    /// backwards jump usually means the batch is not actually newest-first.
    pub multi_year: Vec<usize>,
}

/// Restore non-increasing order in a newest-first listing by decrementing
/// the year of any date that sits after the previous known date. Unknown
/// dates are skipped and do not reset the comparison.
pub fn repair_newest_first(dates: &mut [ReviewDate]) -> RepairOutcome {
    let mut outcome = RepairOutcome::default();
    let mut previous: Option<NaiveDate> = None;

    for (pos, slot) in dates.iter_mut().enumerate() {
        let ReviewDate::Known(mut date) = *slot else {
            continue;
        };
        if let Some(prev) = previous {
            let mut steps = 0;
            while date > prev {
                match shift_year(date, date.year() - 1) {
                    Some(shifted) => date = shifted,
                    None => break,
                }
                steps += 1;
            }
            if steps > 0 {
                *slot = ReviewDate::Known(date);
                outcome.repaired.push(pos);
                if steps > 1 {
                    outcome.multi_year.push(pos);
                }
            }
        }
        previous = Some(date);
    }
    outcome
}

/// Move `date` into `year`, clamping February 29th to the 28th.
fn shift_year(date: NaiveDate, year: i32) -> Option<NaiveDate> {
    date.with_year(year)
        .or_else(|| NaiveDate::from_ymd_opt(year, date.month(), 28))
}
