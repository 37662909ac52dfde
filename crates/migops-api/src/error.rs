use thiserror::Error;

/// Failure classes the console distinguishes when a remote call goes wrong.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Transport error, non-2xx status, or an unreadable body.
    NetworkFailure,
    /// The backend answered with `{ok: false, error}`.
    ServerRejection,
    /// A client-side precondition failed; nothing was sent.
    ValidationFailure,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{endpoint}: {message}")]
    Network { endpoint: String, message: String },
    #[error("{0}")]
    Rejected(String),
    #[error("{0}")]
    Validation(String),
    #[error("{endpoint}: unexpected response: {message}")]
    Decode { endpoint: String, message: String },
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network { .. } | ApiError::Decode { .. } => ErrorKind::NetworkFailure,
            ApiError::Rejected(_) => ErrorKind::ServerRejection,
            ApiError::Validation(_) => ErrorKind::ValidationFailure,
        }
    }

    pub fn network(endpoint: &str, message: impl Into<String>) -> Self {
        ApiError::Network {
            endpoint: endpoint.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn rejected_or(error: Option<String>, fallback: &str) -> Self {
        let message = error
            .map(|err| err.trim().to_string())
            .filter(|err| !err.is_empty())
            .unwrap_or_else(|| fallback.to_string());
        ApiError::Rejected(message)
    }
}
