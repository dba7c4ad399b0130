//! Processing progress reporting.
//!
//! Reports each pipeline state transition during `rh process` so users see
//! which source is at which stage and how many records are still alive.
//! Progress is emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

use crate::error::Stage;
use crate::pipeline::PipelineState;

/// A single progress event for one source's run.
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// The source's pipeline reached `state` with `records` records alive.
    Stage {
        source: String,
        state: PipelineState,
        records: usize,
    },
    /// The source's run aborted in `stage`.
    Failed { source: String, stage: Stage },
}

/// Reports processing progress. Implementations write to stderr (human or JSON).
pub trait ProgressReporter: Send + Sync {
    /// Emit a progress event. Called from the pipeline after every transition.
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "process imdb  text_cleaned  1,234 records".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Stage {
                source,
                state,
                records,
            } => format!(
                "process {}  {}  {} records\n",
                source,
                state,
                format_number(*records as u64)
            ),
            ProgressEvent::Failed { source, stage } => {
                format!("process {}  failed in {}\n", source, stage)
            }
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Stage {
                source,
                state,
                records,
            } => serde_json::json!({
                "event": "progress",
                "source": source,
                "state": state.as_str(),
                "records": records
            }),
            ProgressEvent::Failed { source, stage } => serde_json::json!({
                "event": "failed",
                "source": source,
                "stage": stage.as_str()
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

/// Record count with thousands separators, e.g. `12,480`.
pub(crate) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let head = digits.len() % 3;
    let mut groups: Vec<&str> = Vec::new();
    if head > 0 {
        groups.push(&digits[..head]);
    }
    groups.extend(
        digits.as_bytes()[head..]
            .chunks(3)
            .filter_map(|chunk| std::str::from_utf8(chunk).ok()),
    );
    groups.join(",")
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
