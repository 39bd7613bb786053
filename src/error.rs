use thiserror::Error;

/// Failure talking to a billing data source (warehouse, monitoring, cloud billing).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("invalid identifier {0:?}")]
    InvalidIdentifier(String),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

impl SourceError {
    /// Access errors get an operator hint in the logs.
    pub fn is_permission_denied(&self) -> bool {
        match self {
            SourceError::Api { status, message } => {
                *status == 403 || message.contains("Access Denied") || message.contains("Permission")
            }
            other => {
                let text = other.to_string();
                text.contains("Access Denied") || text.contains("Permission")
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SourceError>;
