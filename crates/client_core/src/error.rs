use shared::error::ApiError;
use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether re-issuing the same request could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Validation(_) | Self::Parse(_) | Self::Decode(_) => false,
        }
    }

    /// Backend error detail for display, when the server produced one.
    pub fn api_error(&self) -> Option<ApiError> {
        match self {
            Self::Http { status, body } => Some(ApiError::from_response(*status, body)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::error::ErrorCode;

    use super::*;

    #[test]
    fn http_error_display_carries_body_text() {
        let err = ClientError::Http {
            status: 404,
            body: r#"{"detail":"video not found"}"#.to_string(),
        };
        assert_eq!(err.to_string(), r#"HTTP 404: {"detail":"video not found"}"#);
        assert_eq!(err.status(), Some(404));
        assert!(!err.is_retryable());
        let api = err.api_error().expect("api error");
        assert_eq!(api.code, ErrorCode::NotFound);
        assert_eq!(api.message, "video not found");
    }

    #[test]
    fn server_errors_are_retryable_validation_is_not() {
        let err = ClientError::Http {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_retryable());
        assert!(!ClientError::validation("empty selection").is_retryable());
    }
}
