//! Typed error hierarchy for the enrollment run.
//!
//! `EnrollError` covers everything that terminates a run. Recoverable
//! outcomes (an exhausted match, an operator who could not pick an entry)
//! are values in `retry` and `operator`, never errors, so they cannot abort
//! a batch by accident.

use std::path::PathBuf;
use thiserror::Error;

/// Fatal errors for a run. Each maps to a process exit code.
#[derive(Debug, Error)]
pub enum EnrollError {
    #[error("Usage error: {0}")]
    Usage(String),

    #[error("Failed to load {path}: {source}")]
    ResourceLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Roster file {path} contains no usable phone numbers")]
    EmptyRoster { path: PathBuf },

    #[error("'{raw}' does not contain any digits")]
    InvalidIdentity { raw: String },

    #[error("Session error: {0}")]
    Session(String),

    #[error("Search field could not be acquired after operator recovery")]
    SearchControlUnavailable,

    #[error("Failed to persist {path}: {source}")]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state file {path}: {message}")]
    CorruptState { path: PathBuf, message: String },

    #[error("State directory {path} is in use by another run")]
    StateLocked { path: PathBuf },

    #[error("Operator prompt failed: {0}")]
    Operator(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EnrollError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            EnrollError::Usage(_) | EnrollError::Config(_) => 2,
            EnrollError::ResourceLoad { .. }
            | EnrollError::EmptyRoster { .. }
            | EnrollError::CorruptState { .. }
            | EnrollError::StateLocked { .. } => 3,
            EnrollError::Session(_) | EnrollError::SearchControlUnavailable => 4,
            EnrollError::Persistence { .. } => 5,
            EnrollError::InvalidIdentity { .. } | EnrollError::Operator(_) => 1,
        }
    }

    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EnrollError::Persistence {
            path: path.into(),
            source,
        }
    }
}

impl From<dialoguer::Error> for EnrollError {
    fn from(err: dialoguer::Error) -> Self {
        EnrollError::Operator(err.to_string())
    }
}

pub type Result<T, E = EnrollError> = std::result::Result<T, E>;
