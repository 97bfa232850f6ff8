//! Error types for phockup

use crate::config::ConfigError;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for phockup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for phockup
#[derive(Error, Debug)]
pub enum Error {
    #[error("No usable capture time in {path}: {message}")]
    MetadataUnavailable { path: PathBuf, message: String },

    #[error("No free file name for {path} after {attempts} attempts")]
    PathCollisionExhausted { path: PathBuf, attempts: u32 },

    #[error("Cannot read source file {path}: {source}")]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    DestinationWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} holds the same content as {claimant}, which was not placed")]
    ClaimantNotPlaced { path: PathBuf, claimant: PathBuf },

    #[error("Placed {destination} but could not remove source {path}: {source}")]
    SourceNotRemoved {
        path: PathBuf,
        destination: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("Directory traversal error: {0}")]
    WalkDir(#[from] walkdir::Error),
}

/// Coarse classification of an error, reported in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    MetadataUnavailable,
    PathCollisionExhausted,
    SourceUnreadable,
    DestinationWriteFailed,
    ConfigurationInvalid,
    Other,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MetadataUnavailable { .. } => ErrorKind::MetadataUnavailable,
            Error::PathCollisionExhausted { .. } => ErrorKind::PathCollisionExhausted,
            Error::SourceUnreadable { .. } => ErrorKind::SourceUnreadable,
            Error::DestinationWriteFailed { .. } | Error::ClaimantNotPlaced { .. } => {
                ErrorKind::DestinationWriteFailed
            }
            Error::ConfigurationInvalid(_)
            | Error::Config(_)
            | Error::Regex(_)
            | Error::Glob(_) => ErrorKind::ConfigurationInvalid,
            Error::SourceNotRemoved { .. }
            | Error::Io(_)
            | Error::Serialization(_)
            | Error::WalkDir(_) => ErrorKind::Other,
        }
    }

    /// Whether this error must stop the run before any file is touched
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::ConfigurationInvalid
    }

    pub(crate) fn source_unreadable(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::SourceUnreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::DestinationWriteFailed {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_classification() {
        let err = Error::PathCollisionExhausted {
            path: PathBuf::from("2023/04/07/a.jpg"),
            attempts: 3,
        };
        assert_eq!(err.kind(), ErrorKind::PathCollisionExhausted);
        assert!(!err.is_fatal());

        let err = Error::ConfigurationInvalid("bad template".into());
        assert!(err.is_fatal());

        let err = Error::source_unreadable(
            "a.jpg",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.kind(), ErrorKind::SourceUnreadable);
        assert!(err.to_string().contains("a.jpg"));
    }

    #[test]
    fn test_error_kind_serializes_kebab_case() {
        let json = serde_json::to_string(&ErrorKind::DestinationWriteFailed).unwrap();
        assert_eq!(json, "\"destination-write-failed\"");
    }
}
