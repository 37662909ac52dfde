use std::path::PathBuf;

use migops_api::{ApiError, ErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("unknown artifact group: {0}")]
    UnknownGroup(String),
    #[error("unknown app: {0}")]
    UnknownApp(String),
    #[error("failed to read prefix map {path}: {source}")]
    PrefixMapIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse prefix map {path}: {source}")]
    PrefixMapParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{0}")]
    Autofill(String),
}

impl ConsoleError {
    /// Failure class as shown to the operator; local errors count as validation.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConsoleError::Api(err) => err.kind(),
            _ => ErrorKind::ValidationFailure,
        }
    }
}
