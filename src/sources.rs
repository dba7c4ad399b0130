//! Source listing for `rh sources`.
//!
//! Shows every configured source with the input file it will read, plus any
//! discovered input file that has no `[sources.<name>]` table yet.

use std::path::PathBuf;

use anyhow::Result;

use crate::config::Config;
use crate::process::resolve_input;
use crate::source::discover_inputs;

/// What `rh sources` knows about one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStatus {
    pub name: String,
    pub configured: bool,
    pub input: Option<PathBuf>,
    pub healthy: bool,
}

impl SourceStatus {
    fn status(&self) -> &'static str {
        match (self.configured, &self.input) {
            (false, _) => "NOT CONFIGURED",
            (true, None) => "NO INPUT",
            (true, Some(_)) if !self.healthy => "MISSING INPUT",
            (true, Some(_)) => "OK",
        }
    }
}

/// Configured sources first (in name order), then unconfigured discoveries.
pub fn get_sources(config: &Config) -> Result<Vec<SourceStatus>> {
    let discovered = discover_inputs(&config.input.dir, &config.input.pattern)?;

    let mut out: Vec<SourceStatus> = config
        .sources
        .iter()
        .map(|(name, source)| {
            let input = resolve_input(name, source, &discovered);
            let healthy = input.as_ref().map(|p| p.is_file()).unwrap_or(false);
            SourceStatus {
                name: name.clone(),
                configured: true,
                input,
                healthy,
            }
        })
        .collect();

    for found in discovered {
        if config.sources.contains_key(&found.name) {
            continue;
        }
        out.push(SourceStatus {
            name: found.name,
            configured: false,
            input: Some(found.path),
            healthy: false,
        });
    }

    Ok(out)
}

pub fn list_sources(config: &Config) -> Result<()> {
    let sources = get_sources(config)?;

    println!("{:<16} {:<16} {:<8} INPUT", "SOURCE", "STATUS", "HEALTHY");
    for s in &sources {
        let input = s
            .input
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("{:<16} {:<16} {:<8} {}", s.name, s.status(), s.healthy, input);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn lists_configured_and_discovered_sources() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("reviews_imdb.csv"), "rating,date,content\n").unwrap();
        fs::write(tmp.path().join("reviews_metacritic.json"), "[]").unwrap();

        let toml = format!(
            r#"
            [input]
            dir = "{dir}"

            [sources.imdb]
            rating_bounds = [1.0, 10.0]

            [sources.rotten]
            rating_bounds = [0.0, 10.0]
            "#,
            dir = tmp.path().display()
        );
        let config = Config::from_toml(&toml).unwrap();
        let sources = get_sources(&config).unwrap();

        let summary: Vec<(&str, &str)> = sources.iter().map(|s| (s.name.as_str(), s.status())).collect();
        assert_eq!(
            summary,
            vec![
                ("imdb", "OK"),
                ("rotten", "NO INPUT"),
                ("metacritic", "NOT CONFIGURED"),
            ]
        );
    }
}
