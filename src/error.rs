//! Error taxonomy.
//!
//! Errors fall into two tiers. [`RunError`] is fatal: it stops a run before
//! (or in the middle of) processing and propagates to the process exit code.
//! [`ItemError`] is scoped to one file: the orchestrators capture it, journal
//! it as a FAIL event and move on to the next item.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Problems with the effective configuration. Always detected before any
/// filesystem mutation happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("source is not a directory: {0}")]
    SourceNotDirectory(PathBuf),

    #[error("destination must not equal the source: {0}")]
    SameSourceAndDestination(PathBuf),

    #[error("destination must not be inside the source (src={src}, dst={dst})")]
    DestinationInsideSource { src: PathBuf, dst: PathBuf },

    #[error("source must not be inside the destination (src={src}, dst={dst})")]
    SourceInsideDestination { src: PathBuf, dst: PathBuf },

    #[error("journal must not be written inside the source tree: {0}")]
    JournalInsideSource(PathBuf),

    #[error("output journal must differ from the input plan: {0}")]
    JournalOverwritesPlan(PathBuf),

    #[error("failed to create destination {path}: {source}")]
    CreateDestination { path: PathBuf, source: io::Error },

    #[error("configuration file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("failed to read configuration file {path}: {source}")]
    FileRead { path: PathBuf, source: io::Error },

    #[error("invalid configuration file {path}: {source}")]
    FileInvalid {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Raised by the conflict resolver under the `fail` policy.
#[derive(Debug, Error)]
#[error("destination already exists: {0}")]
pub struct ConflictError(pub PathBuf);

/// Failures reading or writing a journal file.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("plan not found: {0}")]
    PlanNotFound(PathBuf),

    #[error("failed to open journal {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("failed to write journal {path}: {source}")]
    Write { path: PathBuf, source: io::Error },

    #[error("failed to encode journal event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to read line {line} of {path}: {source}")]
    Read {
        path: PathBuf,
        line: usize,
        source: io::Error,
    },

    #[error("malformed event on line {line} of {path}: {source}")]
    Malformed {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },
}

/// A failure confined to one file. Captured at the item boundary.
#[derive(Debug, Error)]
pub enum ItemError {
    #[error("failed to walk source tree: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("failed to read metadata of {path}: {source}")]
    Metadata { path: PathBuf, source: io::Error },

    #[error("failed to hash {path}: {source}")]
    Hash { path: PathBuf, source: io::Error },

    #[error("src missing: {0}")]
    SourceMissing(PathBuf),

    #[error("failed to create directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },

    #[error("failed to remove existing {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    #[error("failed to move {from} to {to}: {source}")]
    Move {
        from: PathBuf,
        to: PathBuf,
        source: io::Error,
    },

    /// Escalates to [`RunError::Conflict`] once the item is journaled.
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    /// Escalates to [`RunError::Config`] once the item is journaled.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Fatal, run-level errors.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("conflict policy is 'fail': {0}")]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}

pub type RunResult<T> = Result<T, RunError>;

impl ItemError {
    /// Converts errors that must end the whole run into a [`RunError`].
    /// Returns `None` for ordinary per-item failures.
    pub fn into_fatal(self) -> Option<RunError> {
        match self {
            ItemError::Conflict(e) => Some(RunError::Conflict(e)),
            ItemError::Config(e) => Some(RunError::Config(e)),
            _ => None,
        }
    }

    /// The occupied destination when this is a `fail`-policy conflict.
    pub fn conflict_path(&self) -> Option<&Path> {
        match self {
            ItemError::Conflict(ConflictError(path)) => Some(path.as_path()),
            _ => None,
        }
    }

    /// The destination the failed operation was aimed at, when known.
    pub fn destination(&self) -> Option<&Path> {
        match self {
            ItemError::Copy { to, .. } | ItemError::Move { to, .. } => Some(to.as_path()),
            ItemError::Conflict(ConflictError(path)) => Some(path.as_path()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_escalates() {
        let err = ItemError::from(ConflictError(PathBuf::from("/dst/a.jpg")));
        assert_eq!(err.conflict_path(), Some(Path::new("/dst/a.jpg")));
        assert!(matches!(err.into_fatal(), Some(RunError::Conflict(_))));
    }

    #[test]
    fn test_io_failures_stay_per_item() {
        let err = ItemError::SourceMissing(PathBuf::from("/src/a.jpg"));
        assert_eq!(err.to_string(), "src missing: /src/a.jpg");
        assert!(err.into_fatal().is_none());
    }
}
