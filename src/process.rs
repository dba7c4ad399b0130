//! `rh process` orchestration.
//!
//! Resolves which sources to run, finds each one's input file, and runs one
//! [`ProcessorPipeline`] per source. Sources are independent, so their
//! pipelines run concurrently; the CPU-bound stages of each run on the
//! blocking pool. A failing source does not stop the others, but the command
//! fails once every source has finished.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::task::JoinSet;

use crate::config::{Config, SourceConfig};
use crate::error::Stage;
use crate::pipeline::{FeaturedBatch, PersistReport, ProcessorPipeline};
use crate::progress::{ProgressMode, ProgressReporter};
use crate::sink::{self, PersistenceSink};
use crate::source::{self, DiscoveredInput};

/// Names of the configured sources `selector` refers to: `all`, or one name.
pub fn select_sources(config: &Config, selector: &str) -> Result<Vec<String>> {
    if config.sources.is_empty() {
        bail!("No sources configured. Add a [sources.<name>] table to the config file.");
    }
    if selector == "all" {
        return Ok(config.sources.keys().cloned().collect());
    }
    if config.sources.contains_key(selector) {
        return Ok(vec![selector.to_string()]);
    }
    let known: Vec<&str> = config.sources.keys().map(String::as_str).collect();
    bail!(
        "Unknown source: '{}'. Available: all, {}",
        selector,
        known.join(", ")
    )
}

/// The input file for `name`: the configured path, else the discovered one.
pub fn resolve_input(
    name: &str,
    source: &SourceConfig,
    discovered: &[DiscoveredInput],
) -> Option<PathBuf> {
    source.input.clone().or_else(|| {
        discovered
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.path.clone())
    })
}

/// Run the process command for `selector` and print one summary per source.
pub async fn run_process(
    config: &Config,
    selector: &str,
    dry_run: bool,
    progress: ProgressMode,
) -> Result<()> {
    let names = select_sources(config, selector)?;
    let discovered = source::discover_inputs(&config.input.dir, &config.input.pattern)?;
    let reporter: Arc<dyn ProgressReporter> = Arc::from(progress.reporter());
    let sink = if dry_run {
        None
    } else {
        Some(sink::build_sink(&config.output).await?)
    };

    let mut tasks = JoinSet::new();
    for name in &names {
        let source_config = config
            .source(name)
            .ok_or_else(|| anyhow!("Unknown source: '{}'", name))?;
        let pipeline = ProcessorPipeline::new(name.as_str(), source_config.clone())?
            .with_reporter(reporter.clone());
        let input = resolve_input(name, source_config, &discovered);
        let sink = sink.clone();
        let name = name.clone();
        tasks.spawn(async move {
            let outcome = process_source(pipeline, input, sink).await;
            (name, outcome)
        });
    }

    let mut outcomes = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (name, outcome) = joined.context("source task panicked")?;
        outcomes.insert(name, outcome);
    }

    let mut failed = 0usize;
    for (name, outcome) in &outcomes {
        match outcome {
            Ok(report) => print_report(report, dry_run),
            Err(err) => {
                failed += 1;
                println!("process {}", name);
                println!("  error: {:#}", err);
            }
        }
    }

    if failed > 0 {
        bail!("{} of {} sources failed", failed, outcomes.len());
    }
    Ok(())
}

/// Load and prepare on the blocking pool, then persist unless `sink` is
/// `None`.
async fn process_source(
    pipeline: ProcessorPipeline,
    input: Option<PathBuf>,
    sink: Option<Arc<dyn PersistenceSink>>,
) -> Result<PersistReport> {
    let worker = pipeline.clone();
    let featured: FeaturedBatch = tokio::task::spawn_blocking(move || {
        let path = input.ok_or_else(|| {
            worker.fail(
                Stage::Load,
                anyhow!("no input file configured or discovered"),
            )
        })?;
        let source = source::open_source(worker.name(), &path)
            .map_err(|err| worker.fail(Stage::Load, err))?;
        let loaded = worker.load(source.as_ref())?;
        let prepared = worker.prepare(loaded);
        Ok::<_, crate::error::PipelineError>(worker.derive_features(prepared))
    })
    .await
    .context("processing task panicked")??;

    match sink {
        Some(sink) => Ok(pipeline.persist(featured, sink.as_ref()).await?),
        None => Ok(featured.into_report(false)),
    }
}

fn print_report(report: &PersistReport, dry_run: bool) {
    let r = &report.report;
    if dry_run {
        println!("process {} (dry-run)", report.source);
    } else {
        println!("process {}", report.source);
    }
    println!("  loaded: {}", r.loaded);
    println!("  dates unknown: {}", r.normalize.dates_unknown);
    if r.normalize.dates_repaired > 0 {
        println!("  dates repaired: {}", r.normalize.dates_repaired);
    }
    println!(
        "  dropped: {} (missing content {}, missing rating {}, rating out of range {}, too short {}, missing date {}, duplicate {})",
        r.filter.dropped(),
        r.filter.missing_content,
        r.filter.missing_rating,
        r.filter.rating_out_of_range,
        r.filter.too_short,
        r.filter.missing_date,
        r.filter.duplicates
    );
    println!("  truncated: {}", r.filter.truncated);
    println!("  emptied by cleaning: {}", r.emptied_by_cleaning);
    println!("  rows: {}", report.rows);
    match report.skipped {
        Some(reason) => println!("  features: 0 (skipped: {})", reason),
        None => println!("  features: {}", report.summary.feature_count),
    }
    if report.persisted {
        println!("  persisted: {} rows", report.rows);
    }
    println!("ok");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::from_toml(
            r#"
            [sources.imdb]
            rating_bounds = [1.0, 10.0]

            [sources.rotten]
            rating_bounds = [0.0, 10.0]
            input = "/data/rotten.json"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn selects_all_or_one() {
        let cfg = config();
        assert_eq!(select_sources(&cfg, "all").unwrap(), vec!["imdb", "rotten"]);
        assert_eq!(select_sources(&cfg, "rotten").unwrap(), vec!["rotten"]);
        let err = select_sources(&cfg, "letterboxd").unwrap_err();
        assert!(err.to_string().contains("Unknown source"));
    }

    #[test]
    fn explicit_input_wins_over_discovery() {
        let cfg = config();
        let discovered = vec![
            DiscoveredInput {
                name: "imdb".into(),
                path: PathBuf::from("/in/reviews_imdb.csv"),
            },
            DiscoveredInput {
                name: "rotten".into(),
                path: PathBuf::from("/in/reviews_rotten.csv"),
            },
        ];
        assert_eq!(
            resolve_input("imdb", cfg.source("imdb").unwrap(), &discovered),
            Some(PathBuf::from("/in/reviews_imdb.csv"))
        );
        assert_eq!(
            resolve_input("rotten", cfg.source("rotten").unwrap(), &discovered),
            Some(PathBuf::from("/data/rotten.json"))
        );
        assert_eq!(resolve_input("imdb", cfg.source("imdb").unwrap(), &[]), None);
    }
}
