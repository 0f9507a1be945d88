// src/error/types.rs
use crate::domain::DomainError;
use serde::Serialize;
use thiserror::Error;

/// Crate-wide error type.
///
/// The variants group into the failure classes the UI cares about:
/// - parse failures (`Parse`): malformed import input
/// - storage failures (`Database`, `Pool`, `Io`): local store unavailable
/// - network failures (`Network`, `InstallFailed`): asset fetches
/// - cancellation (`Cancelled`): user-initiated abort, not a failure
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(String),

    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Install of generation {generation} failed at {url}: {reason}")]
    InstallFailed {
        generation: u32,
        url: String,
        reason: String,
    },

    #[error("Operation cancelled after {rows_committed} rows")]
    Cancelled { rows_committed: u64 },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Resource not found")]
    NotFound,

    #[error("Other error: {0}")]
    Other(String),
}

impl AppError {
    /// True for failures of the local store.
    pub fn is_storage(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Pool(_) | AppError::Io(_))
    }

    /// True for failures that happened talking to the network.
    pub fn is_network(&self) -> bool {
        matches!(self, AppError::Network(_) | AppError::InstallFailed { .. })
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<uuid::Error> for AppError {
    fn from(err: uuid::Error) -> Self {
        AppError::Other(format!("UUID error: {}", err))
    }
}

impl From<chrono::ParseError> for AppError {
    fn from(err: chrono::ParseError) -> Self {
        AppError::Other(format!("Date parse error: {}", err))
    }
}

impl From<r2d2::Error> for AppError {
    fn from(err: r2d2::Error) -> Self {
        AppError::Pool(err.to_string())
    }
}

impl From<csv::Error> for AppError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            if let csv::ErrorKind::Io(io_err) = err.into_kind() {
                return AppError::Io(io_err);
            }
            return AppError::Other("CSV I/O error".to_string());
        }
        AppError::Parse(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        AppError::Config(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
