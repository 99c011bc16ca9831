//! Run reporting: what happened to each path during an apply pass.
//!
//! Every mutating pass records one entry per affected path. The report is
//! both the console summary's data source and an exportable JSON artifact
//! for scripting around the tool.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// What happened to one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// Renamed to its canonical form during this run.
    RenamedOk,
    /// The rename was attempted and failed, with the reason.
    Failed(String),
    /// A mirror counterpart could not be resolved.
    MissingCounterpart,
    /// Flagged but deliberately left alone (no canonical target).
    Skipped,
}

/// One report line: the path as it was before the pass, and its outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEntry {
    pub path: String,
    pub outcome: Outcome,
}

/// Tallies over a report, for the summary table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReportCounts {
    pub renamed: usize,
    pub failed: usize,
    pub missing: usize,
    pub skipped: usize,
}

/// Accumulated outcomes for one run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Local>,
    pub entries: Vec<ReportEntry>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            entries: Vec::new(),
        }
    }

    pub fn record(&mut self, path: &Path, outcome: Outcome) {
        self.entries.push(ReportEntry {
            path: path.display().to_string(),
            outcome,
        });
    }

    pub fn counts(&self) -> ReportCounts {
        let mut counts = ReportCounts::default();
        for entry in &self.entries {
            match entry.outcome {
                Outcome::RenamedOk => counts.renamed += 1,
                Outcome::Failed(_) => counts.failed += 1,
                Outcome::MissingCounterpart => counts.missing += 1,
                Outcome::Skipped => counts.skipped += 1,
            }
        }
        counts
    }

    /// Serializes the report as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Writes the JSON report to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let json = self.to_json().map_err(|e| e.to_string())?;
        fs::write(path, json).map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_tally_by_outcome() {
        let mut report = RunReport::new();
        report.record(Path::new("/a"), Outcome::RenamedOk);
        report.record(Path::new("/b"), Outcome::RenamedOk);
        report.record(Path::new("/c"), Outcome::Failed("exists".to_string()));
        report.record(Path::new("/d"), Outcome::Skipped);

        let counts = report.counts();
        assert_eq!(counts.renamed, 2);
        assert_eq!(counts.failed, 1);
        assert_eq!(counts.missing, 0);
        assert_eq!(counts.skipped, 1);
    }

    #[test]
    fn test_json_round_trip() {
        let mut report = RunReport::new();
        report.record(Path::new("/a"), Outcome::MissingCounterpart);

        let json = report.to_json().unwrap();
        let parsed: RunReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].outcome, Outcome::MissingCounterpart);
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let mut report = RunReport::new();
        report.record(Path::new("/a"), Outcome::RenamedOk);
        report.save(&path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("RenamedOk"));
    }
}
