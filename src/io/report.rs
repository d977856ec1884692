//! Key/value stats reports.
//!
//! Each worker emits a small text report of its pass (cells tracked, cache
//! hit ratios); the parent concatenates them after recombination and writes
//! the result twice, as a machine-oriented `.stats` dump and as the
//! `_README.doc` run summary next to the grids.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::spectrum::CacheStats;
use crate::util::TrackResult;

/// An ordered list of `key: value` lines.
#[derive(Clone, Debug, Default)]
pub struct StatsReport {
    lines: Vec<(String, String)>,
}

impl StatsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, key: &str, value: impl ToString) {
        self.lines.push((key.to_owned(), value.to_string()));
    }

    /// Records a cache's hit/miss counters under `label`.
    pub fn push_cache(&mut self, label: &str, stats: &CacheStats) {
        self.push(&format!("{label}.hits"), stats.hits);
        self.push(&format!("{label}.misses"), stats.misses);
        self.push(
            &format!("{label}.hit_ratio"),
            format!("{:.4}", stats.hit_ratio()),
        );
    }

    /// Appends another report's lines.
    pub fn extend(&mut self, other: &StatsReport) {
        self.lines.extend(other.lines.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.lines {
            let _ = writeln!(out, "{key}: {value}");
        }
        out
    }

    pub fn write(&self, path: &Path) -> TrackResult<()> {
        fs::write(path, self.render())?;
        Ok(())
    }

    /// Renders the run summary, grouping lines under their worker/pass
    /// markers.
    pub fn render_readme(&self, title: &str) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{title}");
        let _ = writeln!(out, "{}", "=".repeat(title.len()));
        for (key, value) in &self.lines {
            if key == "worker" || key == "pass" {
                let _ = writeln!(out);
                let _ = writeln!(out, "{key} {value}:");
            } else {
                let _ = writeln!(out, "  {key} = {value}");
            }
        }
        out
    }

    /// Writes the run summary to `path`.
    pub fn write_readme(&self, path: &Path, title: &str) -> TrackResult<()> {
        fs::write(path, self.render_readme(title))?;
        Ok(())
    }
}

/// `<prefix>_README.doc`, the human-readable run summary.
pub fn readme_file(prefix: &Path) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push("_README.doc");
    PathBuf::from(s)
}

/// `<prefix>.stats`, the raw key/value dump of the same lines.
pub fn stats_file(prefix: &Path) -> PathBuf {
    let mut s = prefix.as_os_str().to_owned();
    s.push(".stats");
    PathBuf::from(s)
}

/// Concatenates worker reports in worker order, each opened by a `worker`
/// marker line.
pub fn concat(reports: &[StatsReport]) -> StatsReport {
    let mut combined = StatsReport::new();
    for (worker, report) in reports.iter().enumerate() {
        combined.push("worker", worker);
        combined.extend(report);
    }
    combined
}
