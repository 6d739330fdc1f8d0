//! OD-000: Error taxonomy shared by the registry, resolver, engine, and augmentation service.

use std::path::Path;

/// Top-level error for every opdeck operation.
///
/// Parse, duplicate, and structural errors are raised before any mutation of
/// the application definition, so callers can retry with corrected input.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no operation labelled '{0}'")]
    NotFound(String),

    #[error("parse error{}: {message}", .line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    Parse {
        line: Option<usize>,
        message: String,
    },

    #[error("operation '{label}' already exists (submitted as '{name}')")]
    DuplicateOperation { name: String, label: String },

    #[error("application definition is malformed: {0}")]
    Structural(String),

    #[error("'{operation}' failed: {cause}")]
    Execution { operation: String, cause: String },

    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Commit failed part-way; earlier resources stay committed.
    #[error("{source} ({committed} committed, {rolled_back} rolled back)")]
    CommitFailed {
        committed: u32,
        rolled_back: u32,
        #[source]
        source: ResourceError,
    },

    #[error("label '{label}' is claimed by both '{first}' and '{second}'")]
    LabelCollision {
        label: String,
        first: String,
        second: String,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("definition {path} is locked by another writer")]
    Locked { path: String },

    #[error("cannot {action} {path}: {source}")]
    Io {
        action: &'static str,
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Parse error without a known line.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            line: None,
            message: message.into(),
        }
    }

    /// Parse error anchored to a 1-based line.
    pub fn parse_at(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line: Some(line),
            message: message.into(),
        }
    }

    pub fn io(action: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            action,
            path: path.display().to_string(),
            source,
        }
    }
}

/// Acquisition, transaction, and release failures of managed resources.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("unsupported database driver '{0}' (only sqlite is available)")]
    UnsupportedDriver(String),

    #[error("cannot open database {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot {action} transaction on {resource}: {source}")]
    Transaction {
        action: &'static str,
        resource: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("cannot release {resource}: {message}")]
    Release { resource: String, message: String },

    #[error("document store {path}: {message}")]
    DocumentStore { path: String, message: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
