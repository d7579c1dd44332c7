//! Error types for speak-reader.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration value or language file
    #[error("Configuration error: {0}")]
    Config(String),

    /// The input file could not be read
    #[error("Cannot read input file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The input contains nothing to read
    #[error("The text source is empty or contains no readable text")]
    EmptyText,

    /// The speech program failed to start or exited abnormally
    #[error("Speech error: {0}")]
    Speech(String),

    /// The file watcher could not be set up
    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
