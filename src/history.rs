//! Tracking-event history and reporting.
//!
//! Stores one record per applied reload as daily JSONL files in
//! ~/.speak-reader-history/.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

use crate::tracking::{Baseline, TrackingEvent};

/// Record of a single reconciled reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    pub timestamp: String,
    pub file: String,
    pub old_line_count: usize,
    pub new_line_count: usize,
    /// 1-based line the reader was on
    pub line: usize,
    pub changed_again: bool,
    /// 1-based
    pub modified_lines: Vec<usize>,
    pub spoken_feedback: Vec<String>,
    /// 1-based
    pub jump_to: Option<usize>,
    pub action: String,
    pub tracking_mode: String,
    pub feedback_mode: String,
}

impl TrackingRecord {
    pub fn new(
        file: &Path,
        baseline: &Baseline,
        new_line_count: usize,
        changed_again: bool,
        event: &TrackingEvent,
    ) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            file: file.display().to_string(),
            old_line_count: baseline.state.lines.len(),
            new_line_count,
            line: baseline.state.pointer + 1,
            changed_again,
            modified_lines: event.modified_lines.iter().map(|i| i + 1).collect(),
            spoken_feedback: event.spoken_feedback.iter().map(ToString::to_string).collect(),
            jump_to: event.jump_to.map(|i| i + 1),
            action: event.action.to_string(),
            tracking_mode: baseline.options.tracking_mode.to_string(),
            feedback_mode: baseline.options.feedback_mode.to_string(),
        }
    }
}

/// A directory of `YYYY-MM-DD.jsonl` files.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    dir: PathBuf,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `~/.speak-reader-history`, if there is a home directory.
    pub fn default_location() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".speak-reader-history")))
    }

    /// Get the history file path for a given date.
    fn file_for(&self, date: &str) -> PathBuf {
        let date_str = if date == "today" {
            Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.to_string()
        };
        self.dir.join(format!("{date_str}.jsonl"))
    }

    /// Append a record to today's history file.
    pub fn save_record(&self, record: &TrackingRecord) {
        if let Err(e) = fs::create_dir_all(&self.dir) {
            error!("Failed to create history dir: {e}");
            return;
        }

        let path = self.file_for("today");
        match fs::OpenOptions::new().create(true).append(true).open(&path) {
            Ok(mut file) => match serde_json::to_string(record) {
                Ok(json) => {
                    if let Err(e) = writeln!(file, "{json}") {
                        error!("Failed to write history record: {e}");
                    } else {
                        debug!("Saved tracking record to {}", path.display());
                    }
                }
                Err(e) => error!("Failed to serialize record: {e}"),
            },
            Err(e) => error!("Failed to open history file: {e}"),
        }
    }

    /// Load all records for a given date.
    pub fn load_records(&self, date: &str) -> Vec<TrackingRecord> {
        let path = self.file_for(date);
        if !path.exists() {
            return Vec::new();
        }

        let mut records = Vec::new();
        match fs::File::open(&path) {
            Ok(file) => {
                for line in std::io::BufReader::new(file).lines().map_while(Result::ok) {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<TrackingRecord>(line) {
                        Ok(record) => records.push(record),
                        Err(e) => debug!("Skipping malformed history line: {e}"),
                    }
                }
            }
            Err(e) => error!("Failed to load history records: {e}"),
        }
        records
    }

    /// List all dates with history records (newest first).
    pub fn list_available_dates(&self) -> Vec<String> {
        let mut dates: Vec<String> = fs::read_dir(&self.dir)
            .into_iter()
            .flatten()
            .filter_map(|entry| {
                let name = entry.ok()?.file_name().to_string_lossy().to_string();
                name.strip_suffix(".jsonl").map(str::to_string)
            })
            .collect();

        dates.sort_by(|a, b| b.cmp(a));
        dates
    }

    /// Markdown report of the tracking events recorded on `date`.
    pub fn generate_report(&self, date: &str) -> String {
        let records = self.load_records(date);
        let display_date = if date == "today" {
            Local::now().format("%Y-%m-%d").to_string()
        } else {
            date.to_string()
        };

        if records.is_empty() {
            let mut report = format!("# speak-reader history - {display_date}\n\nNo tracking events recorded.");
            let dates = self.list_available_dates();
            if !dates.is_empty() {
                report.push_str(&format!("\n\nAvailable dates: {}", dates.join(", ")));
            }
            return report;
        }

        let count_action = |action: &str| records.iter().filter(|r| r.action == action).count();
        let total_modified: usize = records.iter().map(|r| r.modified_lines.len()).sum();
        let feedback_count: usize = records.iter().map(|r| r.spoken_feedback.len()).sum();

        let mut lines = vec![
            format!("# speak-reader history - {display_date}"),
            String::new(),
            "## Summary".to_string(),
            format!("- **Reloads**: {}", records.len()),
            format!("- **Modified lines**: {total_modified}"),
            format!("- **Spoken messages**: {feedback_count}"),
            format!(
                "- **Actions**: {} restart, {} stop, {} none",
                count_action("restart"),
                count_action("stop"),
                count_action("none")
            ),
            String::new(),
            "## Event Log".to_string(),
            String::new(),
            "| Time | File | Line | Changes | Jump | Action | Feedback |".to_string(),
            "|------|------|------|---------|------|--------|----------|".to_string(),
        ];

        for r in &records {
            let time_str = r.timestamp.get(11..19).unwrap_or(&r.timestamp);
            let jump = r.jump_to.map_or_else(|| "-".to_string(), |j| j.to_string());
            let changes = if r.modified_lines.is_empty() {
                "-".to_string()
            } else {
                r.modified_lines
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            lines.push(format!(
                "| {time_str} | {} | {} | {changes} | {jump} | {} | {} |",
                r.file,
                r.line,
                r.action,
                r.spoken_feedback.join(", ")
            ));
        }

        lines.join("\n")
    }
}
