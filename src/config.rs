//! Configuration management for speak-reader.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so an absent or partial file is fine.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::sequence::DEFAULT_RANDOM_HISTORY;
use crate::tracking::TrackingOptions;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// `espeak` or `transcript`
    pub backend: String,
    pub program: String,
    pub voice: Option<String>,
    /// Words per minute
    pub speed: u32,
    pub extra_args: Vec<String>,
    /// Simulated utterance length for the transcript backend
    pub transcript_delay_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: "espeak".into(),
            program: "espeak".into(),
            voice: None,
            speed: 160,
            extra_args: vec![],
            transcript_delay_ms: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReadingConfig {
    pub stop_after_each_line: bool,
    pub show_line_number: bool,
    pub show_total_lines: bool,
    pub random_history_length: usize,
    /// Silence before reading starts, in milliseconds
    pub pause_before_ms: u64,
    /// Silence between two lines, in milliseconds
    pub pause_between_ms: u64,
    /// Quit after the last line of a normal reading
    pub close_at_end: bool,
}

impl Default for ReadingConfig {
    fn default() -> Self {
        Self {
            stop_after_each_line: false,
            show_line_number: true,
            show_total_lines: true,
            random_history_length: DEFAULT_RANDOM_HISTORY,
            pause_before_ms: 0,
            pause_between_ms: 0,
            close_at_end: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Regex splitting the text into lines; newlines when unset
    pub separator: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub interval_secs: u64,
    pub extra_files: Vec<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            extra_files: vec![],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub speech: SpeechConfig,
    pub tracking: TrackingOptions,
    pub reading: ReadingConfig,
    pub loader: LoaderConfig,
    pub monitor: MonitorConfig,
    pub feedback_messages: HashMap<String, String>,
    pub language_file: Option<PathBuf>,
    pub history: HistoryConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/speak-reader/config.yaml
    /// 3. /etc/speak-reader/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/speak-reader/config.yaml")),
                Some(PathBuf::from("/etc/speak-reader/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::parse(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feedback::FeedbackMode;
    use crate::sequence::SequenceMode;
    use crate::tracking::TrackingMode;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.speech.program, "espeak");
        assert_eq!(config.tracking.tracking_mode, TrackingMode::Backward);
        assert!(config.tracking.restart_after_change);
        assert!(!config.tracking.restart_on_touch);
        assert_eq!(config.reading.random_history_length, 100);
        assert_eq!(config.monitor.interval_secs, 1);
        assert!(!config.history.enabled);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "\
tracking:
  tracking_mode: restart
  feedback_mode: full
  restart_on_touch: true
speech:
  voice: en-us
feedback_messages:
  changes-here: Here it is.
";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.tracking.tracking_mode, TrackingMode::RestartFromBeginning);
        assert_eq!(config.tracking.feedback_mode, FeedbackMode::Full);
        assert_eq!(config.tracking.sequence_mode, SequenceMode::Normal);
        assert!(config.tracking.restart_on_touch);
        assert!(config.tracking.restart_after_change);
        assert_eq!(config.speech.voice.as_deref(), Some("en-us"));
        assert_eq!(config.speech.speed, 160);
        assert_eq!(config.feedback_messages["changes-here"], "Here it is.");
    }

    #[test]
    fn test_reading_rhythm_and_sequence_alias() {
        let yaml = "\
tracking:
  sequence_mode: modified-only
reading:
  pause_before_ms: 1500
  pause_between_ms: 250
  close_at_end: true
";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.tracking.sequence_mode, SequenceMode::Modified);
        assert_eq!(config.reading.pause_before_ms, 1500);
        assert_eq!(config.reading.pause_between_ms, 250);
        assert!(config.reading.close_at_end);
        assert!(config.reading.show_total_lines);

        let defaults = Config::default().reading;
        assert_eq!((defaults.pause_before_ms, defaults.pause_between_ms), (0, 0));
        assert!(!defaults.close_at_end);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        assert!(Config::parse("tracking:\n  tracking_mode: sideways\n").is_err());
    }

    #[test]
    fn test_load_falls_back_on_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"reading: [not, a, map]").unwrap();
        let config = Config::load(Some(file.path()));
        assert!(config.reading.show_line_number);
    }
}
