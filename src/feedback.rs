//! Spoken feedback messages and verbosity levels.
//!
//! Each message key has a fixed minimum level; a message is only spoken
//! when the active feedback mode reaches that level.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};

/// Ordered verbosity: `None < Minimum < Full`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackMode {
    None,
    #[default]
    Minimum,
    Full,
}

impl FromStr for FeedbackMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "minimum" => Ok(Self::Minimum),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown feedback mode: {other}")),
        }
    }
}

impl fmt::Display for FeedbackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Minimum => write!(f, "minimum"),
            Self::Full => write!(f, "full"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackKey {
    Restarting,
    StartingAgain,
    JumpingBack,
    JumpingForward,
    Continuing,
    SubstChanged,
    ReloadDelayed,
    NoChanges,
    ChangesReverted,
    ManyChanges,
    ChangesAfter,
    ChangesHere,
    ChangesNext,
    ChangesBefore,
    FileIncreased,
    FileDecreased,
    FileTooShort,
    FileIsEmpty,
    FileChangedAgain,
    BlankAreasChanged,
}

impl FeedbackKey {
    pub const ALL: [FeedbackKey; 20] = [
        Self::Restarting,
        Self::StartingAgain,
        Self::JumpingBack,
        Self::JumpingForward,
        Self::Continuing,
        Self::SubstChanged,
        Self::ReloadDelayed,
        Self::NoChanges,
        Self::ChangesReverted,
        Self::ManyChanges,
        Self::ChangesAfter,
        Self::ChangesHere,
        Self::ChangesNext,
        Self::ChangesBefore,
        Self::FileIncreased,
        Self::FileDecreased,
        Self::FileTooShort,
        Self::FileIsEmpty,
        Self::FileChangedAgain,
        Self::BlankAreasChanged,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Restarting => "restarting",
            Self::StartingAgain => "starting-again",
            Self::JumpingBack => "jumping-back",
            Self::JumpingForward => "jumping-forward",
            Self::Continuing => "continuing",
            Self::SubstChanged => "subst-changed",
            Self::ReloadDelayed => "reload-delayed",
            Self::NoChanges => "no-changes",
            Self::ChangesReverted => "changes-reverted",
            Self::ManyChanges => "many-changes",
            Self::ChangesAfter => "changes-after",
            Self::ChangesHere => "changes-here",
            Self::ChangesNext => "changes-next",
            Self::ChangesBefore => "changes-before",
            Self::FileIncreased => "file-increased",
            Self::FileDecreased => "file-decreased",
            Self::FileTooShort => "file-too-short",
            Self::FileIsEmpty => "file-is-empty",
            Self::FileChangedAgain => "file-changed-again",
            Self::BlankAreasChanged => "blank-areas-changed",
        }
    }

    /// Lowest feedback mode at which this message is spoken.
    pub fn level(self) -> FeedbackMode {
        match self {
            Self::Restarting
            | Self::StartingAgain
            | Self::JumpingBack
            | Self::JumpingForward
            | Self::Continuing
            | Self::SubstChanged => FeedbackMode::Minimum,
            _ => FeedbackMode::Full,
        }
    }

    pub fn default_text(self) -> &'static str {
        match self {
            Self::Restarting => "Restarting.",
            Self::StartingAgain => "Starting again from the beginning.",
            Self::JumpingBack => "Jumping back.",
            Self::JumpingForward => "Jumping forward.",
            Self::Continuing => "Continuing.",
            Self::SubstChanged => "Substitution rules changed.",
            Self::ReloadDelayed => "The file will be reloaded when reading restarts.",
            Self::NoChanges => "No changes.",
            Self::ChangesReverted => "Changes reverted.",
            Self::ManyChanges => "There are many changes.",
            Self::ChangesAfter => "Changes after the current line.",
            Self::ChangesHere => "Changes in the current line.",
            Self::ChangesNext => "Changes in the next line.",
            Self::ChangesBefore => "Changes before the current line.",
            Self::FileIncreased => "The file got longer.",
            Self::FileDecreased => "The file got shorter.",
            Self::FileTooShort => "The file is now too short.",
            Self::FileIsEmpty => "The file is empty.",
            Self::FileChangedAgain => "The file changed again.",
            Self::BlankAreasChanged => "Blank areas changed.",
        }
    }
}

impl FromStr for FeedbackKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown feedback message key: {s}"))
    }
}

impl fmt::Display for FeedbackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message key -> spoken text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackCatalog {
    messages: HashMap<FeedbackKey, String>,
}

impl Default for FeedbackCatalog {
    /// Built-in English messages for every key.
    fn default() -> Self {
        Self {
            messages: FeedbackKey::ALL
                .into_iter()
                .map(|key| (key, key.default_text().to_string()))
                .collect(),
        }
    }
}

impl FeedbackCatalog {
    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            messages: HashMap::new(),
        }
    }

    /// Catalog whose texts are the key names.
    #[cfg(test)]
    pub fn key_names() -> Self {
        Self {
            messages: FeedbackKey::ALL
                .into_iter()
                .map(|key| (key, key.as_str().to_string()))
                .collect(),
        }
    }

    pub fn insert(&mut self, key: FeedbackKey, text: impl Into<String>) {
        self.messages.insert(key, text.into());
    }

    /// Apply overrides keyed by message name.
    pub fn with_overrides(mut self, overrides: &HashMap<String, String>) -> Result<Self> {
        for (name, text) in overrides {
            let key = name.parse::<FeedbackKey>().map_err(Error::Config)?;
            self.insert(key, text.clone());
        }
        Ok(self)
    }

    /// Text for `key` if it exists and `mode` reaches the key's level.
    pub fn message(&self, key: FeedbackKey, mode: FeedbackMode) -> Option<&str> {
        if key.level() <= mode {
            self.messages.get(&key).map(String::as_str)
        } else {
            None
        }
    }

    /// Resolve keys to texts in order, dropping unknown or under-level keys.
    pub fn resolve(&self, keys: &[FeedbackKey], mode: FeedbackMode) -> Vec<String> {
        keys.iter()
            .filter_map(|&key| self.message(key, mode))
            .map(str::to_string)
            .collect()
    }
}

/// Voice and messages read from a language file.
#[derive(Debug, Default)]
pub struct LanguageConfig {
    pub voice: Option<String>,
    pub messages: HashMap<String, String>,
}

/// Parse `key: text` lines. Blank lines and `#` comments are skipped;
/// `voice` and the feedback keys are the only names accepted.
pub fn parse_language_config(contents: &str) -> Result<LanguageConfig> {
    let mut config = LanguageConfig::default();
    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = line.split_once(':') else {
            return Err(Error::Config(format!("wrong line in language file: {line}")));
        };
        let (name, value) = (name.trim(), value.trim());
        let well_formed = !name.is_empty()
            && name.chars().all(|c| c.is_ascii_lowercase() || c == '-')
            && !value.is_empty();
        if !well_formed {
            return Err(Error::Config(format!("wrong line in language file: {line}")));
        }
        if name == "voice" {
            config.voice = Some(value.to_string());
        } else if name.parse::<FeedbackKey>().is_ok() {
            config.messages.insert(name.to_string(), value.to_string());
        } else {
            return Err(Error::Config(format!("wrong option name '{name}' in language file")));
        }
    }
    Ok(config)
}

pub fn load_language_file(path: &Path) -> Result<LanguageConfig> {
    let contents = std::fs::read_to_string(path)?;
    let config = parse_language_config(&contents)?;
    info!(
        "Loaded {} feedback message(s) from {}",
        config.messages.len(),
        path.display()
    );
    Ok(config)
}
