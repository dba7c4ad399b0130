//! Rating literal parsing.
//!
//! Review sites encode ratings in incompatible ways: a bare `8`, an
//! `"8/10"` or `"4/5"` fraction, a CSS class such as `rated-8` scraped off a
//! star widget, or a run of `★` glyphs with an optional `½`. [`parse_rating`]
//! turns any of these into a float on the source's declared scale.
//! Anything it cannot read becomes `None`; this module never fails a record.

use serde::Deserialize;

use crate::config::RatingRules;
use crate::models::RawRating;

const FULL_STAR: char = '★';
const HALF_STAR: char = '½';

/// Literal form a source uses for its rating cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingFormat {
    /// A bare number. `"8/10"` keeps the numerator.
    #[default]
    Plain,
    /// `"N/D"`, yielding `N` on the `D` scale.
    Fraction,
    /// A class list containing `<prefix><number>`.
    CssClass,
    /// `★` glyph count plus one half per `½`.
    Stars,
}

/// Parse a raw rating cell into the source's numeric scale.
pub fn parse_rating(raw: Option<&RawRating>, rules: &RatingRules) -> Option<f64> {
    let value = match raw? {
        RawRating::Number(n) => Some(*n),
        RawRating::Text(text) => parse_text(text, rules),
    }?;
    let scaled = value * rules.multiplier;
    scaled.is_finite().then_some(scaled)
}

fn parse_text(text: &str, rules: &RatingRules) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() || is_marker(text, &rules.missing_markers) {
        return None;
    }
    match rules.format {
        RatingFormat::Plain | RatingFormat::Fraction => parse_fraction(text),
        RatingFormat::CssClass => parse_css_class(text, &rules.css_prefix),
        RatingFormat::Stars => parse_stars(text),
    }
}

fn is_marker(text: &str, markers: &[String]) -> bool {
    markers.iter().any(|m| m.trim().eq_ignore_ascii_case(text))
}

fn parse_number(text: &str) -> Option<f64> {
    let value: f64 = text.trim().parse().ok()?;
    value.is_finite().then_some(value)
}

/// `"8"`, `"8.5"`, `"8/10"` and `"4 / 5"` all yield their numerator.
fn parse_fraction(text: &str) -> Option<f64> {
    match text.split_once('/') {
        Some((numerator, denominator)) => {
            let denominator = parse_number(denominator)?;
            if denominator <= 0.0 {
                return None;
            }
            parse_number(numerator)
        }
        None => parse_number(text),
    }
}

fn parse_css_class(text: &str, prefix: &str) -> Option<f64> {
    if let Some(value) = parse_number(text) {
        return Some(value);
    }
    text.split_whitespace()
        .find_map(|class| class.strip_prefix(prefix))
        .and_then(parse_number)
}

fn parse_stars(text: &str) -> Option<f64> {
    if let Some(value) = parse_number(text) {
        return Some(value);
    }
    let mut total = 0.0;
    let mut seen = false;
    for c in text.chars() {
        match c {
            FULL_STAR => {
                total += 1.0;
                seen = true;
            }
            HALF_STAR => {
                total += 0.5;
                seen = true;
            }
            c if c.is_whitespace() => {}
            _ => return None,
        }
    }
    seen.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(format: RatingFormat, multiplier: f64) -> RatingRules {
        RatingRules {
            format,
            multiplier,
            ..RatingRules::default()
        }
    }

    fn text(s: &str) -> RawRating {
        RawRating::Text(s.to_string())
    }

    #[test]
    fn plain_numbers_and_numerators() {
        let r = rules(RatingFormat::Plain, 1.0);
        assert_eq!(parse_rating(Some(&text("8")), &r), Some(8.0));
        assert_eq!(parse_rating(Some(&text(" 7.5 ")), &r), Some(7.5));
        assert_eq!(parse_rating(Some(&text("8/10")), &r), Some(8.0));
        assert_eq!(parse_rating(Some(&RawRating::Number(6.0)), &r), Some(6.0));
    }

    #[test]
    fn fraction_with_doubling() {
        let r = rules(RatingFormat::Fraction, 2.0);
        assert_eq!(parse_rating(Some(&text("4/5")), &r), Some(8.0));
        assert_eq!(parse_rating(Some(&text("3.5 / 5")), &r), Some(7.0));
        assert_eq!(parse_rating(Some(&text("4/0")), &r), None);
    }

    #[test]
    fn css_class_rank() {
        let r = rules(RatingFormat::CssClass, 1.0);
        assert_eq!(parse_rating(Some(&text("rating rated-8")), &r), Some(8.0));
        assert_eq!(parse_rating(Some(&text("rated-10")), &r), Some(10.0));
        assert_eq!(parse_rating(Some(&text("6")), &r), Some(6.0));
        assert_eq!(parse_rating(Some(&text("rating")), &r), None);
    }

    #[test]
    fn star_glyphs_with_half() {
        let r = rules(RatingFormat::Stars, 2.0);
        assert_eq!(parse_rating(Some(&text("★★★½")), &r), Some(7.0));
        assert_eq!(parse_rating(Some(&text("½")), &r), Some(1.0));
        assert_eq!(parse_rating(Some(&text("★★x")), &r), None);
    }

    #[test]
    fn markers_and_garbage_are_none() {
        let r = rules(RatingFormat::Plain, 1.0);
        assert_eq!(parse_rating(None, &r), None);
        assert_eq!(parse_rating(Some(&text("")), &r), None);
        assert_eq!(parse_rating(Some(&text("평점 없음")), &r), None);
        assert_eq!(parse_rating(Some(&text("N/A")), &r), None);
        assert_eq!(parse_rating(Some(&text("great")), &r), None);
        assert_eq!(parse_rating(Some(&text("NaN")), &r), None);
        assert_eq!(parse_rating(Some(&RawRating::Number(f64::INFINITY)), &r), None);
    }
}
