//! Output statistics overview.
//!
//! Provides a quick summary of what the last runs persisted: review counts,
//! mean rating, length and sentence count, and vocabulary size per source.
//! Used by `rh stats` to confirm that processing produced what was expected.

use anyhow::Result;

use crate::config::{Config, OutputKind};
use crate::sink::{self, StoredSummary};

/// Run the stats command: read persisted summaries and print them.
pub async fn run_stats(config: &Config) -> Result<()> {
    let sink = sink::build_sink(&config.output).await?;
    let summaries = sink.summaries().await?;

    let location = match config.output.kind {
        OutputKind::Csv => config.output.dir.clone(),
        OutputKind::Sqlite => config.output.sqlite_path(),
    };
    let size = match config.output.kind {
        OutputKind::Csv => None,
        OutputKind::Sqlite => std::fs::metadata(&location).map(|m| m.len()).ok(),
    };

    println!("Review Harness: Output Stats");
    println!("============================");
    println!();
    println!("  Output:      {} ({})", location.display(), sink.kind());
    if let Some(size) = size {
        println!("  Size:        {}", format_bytes(size));
    }
    println!("  Sources:     {}", summaries.len());
    println!(
        "  Reviews:     {}",
        summaries.iter().map(|s| s.summary.total_reviews).sum::<usize>()
    );

    if !summaries.is_empty() {
        println!();
        println!("  By source:");
        println!(
            "  {:<16} {:>8} {:>8} {:>8} {:>10} {:>9}   {}",
            "SOURCE", "REVIEWS", "RATING", "LENGTH", "SENTENCES", "FEATURES", "LAST RUN"
        );
        println!("  {}", "-".repeat(84));
        for s in &summaries {
            print_row(s);
        }
    }

    println!();
    Ok(())
}

fn print_row(s: &StoredSummary) {
    let run_display = match s.persisted_at {
        Some(ts) => format_run_age(ts, chrono::Utc::now().timestamp()),
        None => "unknown".to_string(),
    };
    println!(
        "  {:<16} {:>8} {:>8} {:>8} {:>10} {:>9}   {}",
        s.source,
        s.summary.total_reviews,
        format_mean(s.summary.mean_rating, 2),
        format_mean(s.summary.mean_length, 1),
        format_mean(s.summary.mean_sentence_count, 2),
        s.summary.feature_count,
        run_display
    );
}

fn format_mean(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{:.*}", precision, v),
        None => "-".to_string(),
    }
}

/// Database file size in the largest unit that keeps the value >= 1.
fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// How long ago a source was last persisted, relative to `now`. Runs older
/// than a month, or stamped in the future, show the absolute time.
fn format_run_age(persisted_at: i64, now: i64) -> String {
    const STEPS: [(i64, &str); 3] = [(86_400, "day"), (3_600, "hour"), (60, "min")];
    let age = now - persisted_at;
    if !(0..86_400 * 30).contains(&age) {
        return format_run_time(persisted_at);
    }
    STEPS
        .iter()
        .find(|(secs, _)| age >= *secs)
        .map(|(secs, unit)| {
            let n = age / secs;
            format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
        })
        .unwrap_or_else(|| "just now".to_string())
}

fn format_run_time(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes_and_means() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024 * 1024), "3.0 GB");
        assert_eq!(format_mean(Some(7.456), 2), "7.46");
        assert_eq!(format_mean(None, 2), "-");
    }

    #[test]
    fn run_age_picks_largest_unit() {
        let now = 1_700_000_000;
        assert_eq!(format_run_age(now, now), "just now");
        assert_eq!(format_run_age(now - 60, now), "1 min ago");
        assert_eq!(format_run_age(now - 7_200, now), "2 hours ago");
        assert_eq!(format_run_age(now - 86_400 * 3, now), "3 days ago");
        assert_eq!(format_run_age(now + 10, now), format_run_time(now + 10));
        assert_eq!(format_run_time(0), "1970-01-01 00:00");
    }
}
