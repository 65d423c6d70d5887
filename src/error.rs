use reqwest::StatusCode;
use thiserror::Error;

/// Reasons a candidate file is refused before it becomes the selection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("'{file_name}' is not an image (content type {content_type})")]
    InvalidFileType {
        file_name: String,
        content_type: String,
    },
    #[error("'{file_name}' is {size} bytes, the limit is {limit} bytes")]
    FileTooLarge {
        file_name: String,
        size: u64,
        limit: u64,
    },
}

/// Broad classes of caption request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkFailure,
    ServiceError,
}

#[derive(Debug, Error)]
pub enum CaptionError {
    #[error("request failed with HTTP status {0}")]
    Status(StatusCode),
    #[error("could not reach the captioning service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{0}")]
    Service(String),
    #[error("malformed response from the captioning service: {0}")]
    Malformed(String),
}

impl CaptionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptionError::Status(_) | CaptionError::Transport(_) => ErrorKind::NetworkFailure,
            CaptionError::Service(_) | CaptionError::Malformed(_) => ErrorKind::ServiceError,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored data is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid bind address '{value}': {source}")]
    BindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("backend URL must not be empty")]
    EmptyBackendUrl,
}
