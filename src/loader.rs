//! Text loading and segmentation.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// A loaded version of the input: raw text plus its readable lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadedText {
    pub text: String,
    pub lines: Vec<String>,
}

impl LoadedText {
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// The input file and the rule that splits it into lines.
#[derive(Debug, Clone)]
pub struct TextSource {
    path: PathBuf,
    separator: Option<Regex>,
}

impl TextSource {
    pub fn new(path: impl Into<PathBuf>, separator: Option<&str>) -> Result<Self> {
        let separator = separator
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    Error::Config(format!("Wrong regular expression given for separator: {pattern} ({e})"))
                })
            })
            .transpose()?;
        Ok(Self {
            path: path.into(),
            separator,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and segment the file. An empty result is not an error here;
    /// callers decide whether empty text is acceptable.
    pub async fn load(&self) -> Result<LoadedText> {
        info!("Reading file: {} ...", self.path.display());
        let bytes = tokio::fs::read(&self.path).await.map_err(|source| Error::Load {
            path: self.path.clone(),
            source,
        })?;
        let text = String::from_utf8_lossy(&bytes);
        let text = text.strip_prefix('\u{feff}').unwrap_or(text.as_ref()).to_string();
        let lines = segment(&text, self.separator.as_ref());
        debug!("Loaded {} line(s), {} bytes", lines.len(), text.len());
        Ok(LoadedText { text, lines })
    }

    /// Like [`TextSource::load`], but empty text is an error.
    pub async fn load_initial(&self) -> Result<LoadedText> {
        let loaded = self.load().await?;
        if loaded.is_empty() {
            return Err(Error::EmptyText);
        }
        Ok(loaded)
    }
}

/// Split on `separator` (or newlines), trim each piece and drop blank ones.
pub fn segment(text: &str, separator: Option<&Regex>) -> Vec<String> {
    let pieces: Vec<&str> = match separator {
        Some(regex) => regex.split(text).collect(),
        None => text.split('\n').collect(),
    };
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}
