//! Centralized error types for pec-catalog.
//!
//! Only archive-level failures surface here. Per-message problems (bad XML,
//! unparseable dates, broken charsets) are absorbed by the extractor and never
//! become an error.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the pec-catalog library.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The given archive does not exist.
    #[error("Archive not found: {0}")]
    FileNotFound(PathBuf),

    /// The archive could not be read as an MBOX at all.
    #[error("File does not appear to be a valid MBOX archive: {0}")]
    InvalidArchive(PathBuf),

    /// An uploaded file was rejected before extraction.
    #[error("Rejected upload '{name}': {reason}")]
    InvalidUpload { name: String, reason: String },

    /// Unknown message or source id.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A persisted JSON document could not be read or written.
    #[error("Serialization error in '{path}': {source}")]
    Serialization {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Convenience alias for `Result<T, CatalogError>`.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `Serialization` variant from a path and a `serde_json::Error`.
    pub fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.into(),
            source,
        }
    }

    pub fn message_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Message",
            id: id.into(),
        }
    }

    pub fn source_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Source",
            id: id.into(),
        }
    }
}
