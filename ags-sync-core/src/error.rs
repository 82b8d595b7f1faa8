//! # Error Handling
//!
//! Typed failures for publishing and unpublishing a single document.
//!
//! The orchestrator catches every [`PublishError`] per document, logs it with
//! the document name and moves on to the next document, so none of these
//! variants abort a run. Read-only server checks never produce an error at
//! all: they resolve to a conservative default instead (see
//! [`crate::directory`]).

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for ags-sync-core operations
#[derive(Error, Debug)]
pub enum PublishError {
    /// The document or the run is not configured well enough to act,
    /// e.g. the source file is missing.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// The external GIS toolchain failed (draft creation, analysis,
    /// staging or upload).
    #[error("Toolchain failure during {operation}: {message}")]
    Toolchain {
        operation: &'static str,
        message: String,
    },

    /// A mutating call against the server failed.
    #[error("Network failure for {url}: {message}")]
    Network { url: String, message: String },

    /// Something the operation depends on does not exist.
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// The draft analysis reported errors, so no service definition can be
    /// staged.
    #[error("Document is not ready to publish:\n{errors}")]
    NotPublishable { errors: String },

    /// A local artifact could not be read, written or removed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PublishError {
    pub fn toolchain(operation: &'static str, err: impl std::fmt::Display) -> Self {
        PublishError::Toolchain {
            operation,
            message: err.to_string(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PublishError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for ags-sync-core operations
pub type Result<T> = std::result::Result<T, PublishError>;
