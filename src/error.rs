//! Error types shared by the pipeline stages.

use std::path::PathBuf;
use thiserror::Error;

/// A fatal pipeline failure. Every variant aborts the run; classes rewritten
/// before the failure stay rewritten.
#[derive(Debug, Error)]
pub enum InstrumentError {
    #[error("Invalid build directory: {}", .0.display())]
    InvalidBuildDirectory(PathBuf),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Instrumenting file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to instrument class {class}")]
    Rewrite {
        class: String,
        #[source]
        cause: RewriteFailure,
    },

    #[error("Class {0} is on the work list but was never classified")]
    Unclassified(String),
}

impl InstrumentError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Why the engine could not rewrite a class. Whether this is fatal depends
/// on the class's suspend points, see [`crate::instrument::fallback_policy`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RewriteFailure {
    pub message: String,
}

impl RewriteFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub type Result<T, E = InstrumentError> = std::result::Result<T, E>;
