//! Record sources: where a source's raw batch comes from.
//!
//! Acquisition (crawling a site, querying a store) happens elsewhere; by the
//! time a [`RecordSource`] is asked to load, its batch already sits on disk
//! or in memory. Every source yields the same untyped [`RawReview`] rows with
//! `rating`, `date` and `content` fields. Extra columns are ignored.
//!
//! Input files are discovered by name: `reviews_<source>.csv` or
//! `reviews_<source>.json` under the configured input directory.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::Glob;
use walkdir::WalkDir;

use crate::error::RecordError;
use crate::models::{RawRating, RawReview};

/// Columns every tabular input must carry.
pub const REQUIRED_COLUMNS: [&str; 3] = ["rating", "date", "content"];

const INPUT_PREFIX: &str = "reviews_";

/// A batch of raw review rows for one source.
pub trait RecordSource: Send + Sync {
    fn name(&self) -> &str;

    /// Read the whole batch into memory.
    fn load(&self) -> Result<Vec<RawReview>>;
}

/// A CSV file with a header row.
pub struct CsvSource {
    name: String,
    path: PathBuf,
}

impl CsvSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl RecordSource for CsvSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<RawReview>> {
        let mut reader = csv::Reader::from_path(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;

        let headers = reader
            .headers()
            .with_context(|| format!("Failed to read header of {}", self.path.display()))?
            .clone();
        let column = |wanted: &str| -> Result<usize> {
            match headers.iter().position(|h| h.trim() == wanted) {
                Some(i) => Ok(i),
                None => bail!(
                    "{} is missing required column '{}'",
                    self.path.display(),
                    wanted
                ),
            }
        };
        let rating_col = column("rating")?;
        let date_col = column("date")?;
        let content_col = column("content")?;

        let mut rows = Vec::new();
        for (index, record) in reader.records().enumerate() {
            let record = record.map_err(|e| RecordError {
                index,
                message: e.to_string(),
            })?;
            rows.push(RawReview {
                rating: cell(&record, rating_col).map(RawRating::Text),
                date: cell(&record, date_col),
                content: cell(&record, content_col),
            });
        }
        Ok(rows)
    }
}

/// A non-empty cell, untrimmed.
fn cell(record: &csv::StringRecord, col: usize) -> Option<String> {
    record
        .get(col)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// A JSON array of review objects.
pub struct JsonSource {
    name: String,
    path: PathBuf,
}

impl JsonSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl RecordSource for JsonSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<RawReview>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Failed to open {}", self.path.display()))?;
        let rows: Vec<RawReview> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        Ok(rows)
    }
}

/// A batch already held in memory.
pub struct InMemorySource {
    name: String,
    records: Vec<RawReview>,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>, records: Vec<RawReview>) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }
}

impl RecordSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<RawReview>> {
        Ok(self.records.clone())
    }
}

/// Open `path` with the reader its extension calls for.
pub fn open_source(name: &str, path: &Path) -> Result<Box<dyn RecordSource>> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("csv") => Ok(Box::new(CsvSource::new(name, path))),
        Some("json") => Ok(Box::new(JsonSource::new(name, path))),
        _ => bail!(
            "Unsupported input file {}: expected a .csv or .json file",
            path.display()
        ),
    }
}

/// An input file found by [`discover_inputs`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInput {
    pub name: String,
    pub path: PathBuf,
}

/// Find input files in `dir` (not recursive) matching `pattern`, sorted by
/// source name then path. A missing directory yields no inputs.
pub fn discover_inputs(dir: &Path, pattern: &str) -> Result<Vec<DiscoveredInput>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let matcher = Glob::new(pattern)
        .with_context(|| format!("Invalid input pattern '{}'", pattern))?
        .compile_matcher();

    let mut found = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() || !matcher.is_match(entry.file_name()) {
            continue;
        }
        let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let name = stem.strip_prefix(INPUT_PREFIX).unwrap_or(stem).to_string();
        found.push(DiscoveredInput {
            name,
            path: entry.into_path(),
        });
    }

    found.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.path.cmp(&b.path)));
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn csv_source_reads_required_columns() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("reviews_imdb.csv");
        fs::write(
            &path,
            "id,rating,date,content\n1,8,2024-03-15,\"Loved it, truly.\"\n2,,,\n",
        )
        .unwrap();

        let rows = CsvSource::new("imdb", &path).load().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], RawReview::new("8", "2024-03-15", "Loved it, truly."));
        assert_eq!(rows[1], RawReview::default());
    }

    #[test]
    fn csv_source_rejects_missing_column() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("reviews_imdb.csv");
        fs::write(&path, "rating,content\n8,text\n").unwrap();

        let err = CsvSource::new("imdb", &path).load().unwrap_err();
        assert!(err.to_string().contains("'date'"));
    }

    #[test]
    fn csv_source_reports_malformed_row_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("reviews_imdb.csv");
        fs::write(&path, "rating,date,content\n8,2024-03-15,ok\n9,2024-03-16\n").unwrap();

        let err = CsvSource::new("imdb", &path).load().unwrap_err();
        let record = err.downcast_ref::<RecordError>().expect("record error");
        assert_eq!(record.index, 1);
    }

    #[test]
    fn json_source_accepts_numeric_ratings() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("reviews_letterboxd.json");
        fs::write(
            &path,
            r#"[{"rating": 4.5, "date": "Jan 5", "content": "Great", "likes": 3}]"#,
        )
        .unwrap();

        let rows = JsonSource::new("letterboxd", &path).load().unwrap();
        assert_eq!(rows[0].rating, Some(RawRating::Number(4.5)));
        assert_eq!(rows[0].date.as_deref(), Some("Jan 5"));
    }

    #[test]
    fn discovers_inputs_by_pattern() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("reviews_rotten.json"), "[]").unwrap();
        fs::write(tmp.path().join("reviews_imdb.csv"), "rating,date,content\n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(tmp.path().join("reviews_dir.csv")).unwrap();

        let found = discover_inputs(tmp.path(), "reviews_*.{csv,json}").unwrap();
        let names: Vec<&str> = found.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["imdb", "rotten"]);
    }

    #[test]
    fn missing_input_dir_discovers_nothing() {
        let tmp = TempDir::new().unwrap();
        let found = discover_inputs(&tmp.path().join("absent"), "*.csv").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn open_source_dispatches_on_extension() {
        assert!(open_source("x", Path::new("reviews_x.csv")).is_ok());
        assert!(open_source("x", Path::new("reviews_x.json")).is_ok());
        assert!(open_source("x", Path::new("reviews_x.parquet")).is_err());
    }
}
