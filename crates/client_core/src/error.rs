use thiserror::Error;

/// Failure reported by a [`crate::store::RecordStore`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Non-2xx response. `message` is the store's own message when the body
    /// carried one, `HTTP <status>: <reason>` otherwise.
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Transport(String),
    #[error("Invalid response format: {0}")]
    Decode(String),
}

impl StoreError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The store itself answered with 429 or a 5xx status.
    pub fn is_retryable_response(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == 429 || *status >= 500)
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else if value.is_decode() {
            Self::Decode(value.to_string())
        } else if let Some(status) = value.status() {
            Self::Api {
                status: status.as_u16(),
                message: value.to_string(),
            }
        } else {
            Self::Transport(value.to_string())
        }
    }
}

/// Errors surfaced by [`crate::ScannerController`]. Every variant carries the
/// message shown to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScannerError {
    #[error("{0}")]
    ConfigurationInvalid(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Failed to lookup product: {0}")]
    LookupFailed(String),
    #[error("{0}")]
    ValidationFailed(String),
    #[error("Failed to update inventory: {0}")]
    UpdateFailed(String),
}

impl ScannerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationInvalid(message.into())
    }
}
