//! Structured errors, serializable for JSON output

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    CaptureFailed,
    InjectionFailed,
    InvalidKey,
    InvalidArgument,
    PermissionDenied,
    Storage,
    Config,
    Unknown,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn capture_failed(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::CaptureFailed,
            format!("Input capture failed: {}", reason),
        )
        .with_suggestions(vec![
            "Grant input monitoring / accessibility permission to the terminal".to_string(),
        ])
    }

    pub fn permission_denied(reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::PermissionDenied,
            format!("Permission denied: {}", reason),
        )
        .with_suggestions(vec![
            "Allow the terminal under Privacy & Security > Accessibility and Input Monitoring, then restart it".to_string(),
        ])
    }

    pub fn injection_failed(what: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::InjectionFailed,
            format!("{} failed: {}", what, reason),
        )
    }

    pub fn invalid_key(key: &str) -> Self {
        Self::new(ErrorCode::InvalidKey, format!("Unrecognized key: '{}'", key))
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidArgument, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Storage, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Config, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Self::new(ErrorCode::Unknown, e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::Storage, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorCode::Storage, format!("Malformed JSON: {}", e))
    }
}
