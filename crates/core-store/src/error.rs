//! Error types for log store operations

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for log store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while replaying, appending, or reading the log
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The log directory could not be created or walked
    #[error("Log directory unavailable: {path}: {reason}")]
    LogDir { path: PathBuf, reason: String },

    /// Failed to open the active log file for appending
    #[error("Failed to open log file {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write an entry to the active log file
    #[error("Failed to append to {path}: {source}")]
    AppendFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A log file could not be read during replay
    #[error("Failed to read log file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A persisted line could not be parsed during replay
    #[error("Invalid log entry in {path} at line {line}: {reason}")]
    InvalidEntry {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    /// Stored data could not be decoded into the requested record type
    #[error("Failed to decode record {key}: {reason}")]
    Decode { key: String, reason: String },

    /// A record without a key cannot be indexed
    #[error("Record key must not be empty")]
    EmptyKey,

    /// The store was used before `init` resolved an active log file
    #[error("Log store is not initialized")]
    NotInitialized,
}

impl Error {
    /// Create a log directory error
    pub fn log_dir<P: Into<PathBuf>, S: ToString>(path: P, reason: S) -> Self {
        Error::LogDir {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an invalid entry error
    pub fn invalid_entry<P: Into<PathBuf>>(path: P, line: usize, reason: &str) -> Self {
        Error::InvalidEntry {
            path: path.into(),
            line,
            reason: reason.to_string(),
        }
    }

    /// Create a replay read error
    pub fn read_failed<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Error::ReadFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a decode error
    pub fn decode<K: Into<String>, S: ToString>(key: K, reason: S) -> Self {
        Error::Decode {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// True when the error came from writing, not from reading or decoding
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Error::OpenFailed { .. } | Error::AppendFailed { .. })
    }
}
