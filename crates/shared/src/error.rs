use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Internal,
}

impl ErrorCode {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 409 | 422 => Self::Validation,
            429 => Self::RateLimited,
            _ => Self::Internal,
        }
    }
}

/// Backend failure as shown to a user: a coarse code plus a readable message.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
#[error("{code:?}: {message}")]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn from_response(status: u16, body: &str) -> Self {
        Self::new(ErrorCode::from_status(status), detail_message(body))
    }
}

#[derive(Debug, Deserialize)]
struct DetailBody {
    detail: Value,
}

/// Extracts the `detail` field the backend puts in error bodies.
///
/// String details are returned as-is, validation error lists are joined by
/// their `msg` entries. Anything else falls back to the raw body text.
pub fn detail_message(body: &str) -> String {
    let trimmed = body.trim();
    let Ok(parsed) = serde_json::from_str::<DetailBody>(trimmed) else {
        return trimmed.to_string();
    };

    match parsed.detail {
        Value::String(text) => text,
        Value::Array(items) => {
            let messages: Vec<String> = items
                .iter()
                .filter_map(|item| item.get("msg").and_then(Value::as_str))
                .map(str::to_string)
                .collect();
            if messages.is_empty() {
                trimmed.to_string()
            } else {
                messages.join("; ")
            }
        }
        _ => trimmed.to_string(),
    }
}
