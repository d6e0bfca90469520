//! Progress reporting for bulk loops.
//!
//! `shelf arxiv download`, `shelf arxiv add` and `shelf add-folder` process
//! papers one at a time and report each item before it starts. Progress is
//! emitted on **stderr** so stdout remains parseable for scripts.

use std::io::Write;

/// Which bulk step an item is in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Downloading,
    Adding,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Downloading => "downloading",
            Phase::Adding => "adding",
        }
    }
}

/// One progress event: item `n` (1-based) of `total` is starting.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub n: u64,
    pub total: u64,
    pub title: String,
}

/// Receives progress events from the bulk pipeline.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "adding  12 / 1,200  Attention Is All You Need".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = format!(
            "{}  {} / {}  {}\n",
            event.phase.as_str(),
            format_number(event.n),
            format_number(event.total),
            event.title
        );
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = serde_json::json!({
            "event": "progress",
            "phase": event.phase.as_str(),
            "n": event.n,
            "total": event.total,
            "title": event.title,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode: '{}'. Must be off, human, or json.", other),
        }
    }
}
