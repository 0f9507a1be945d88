// src/application/error_handling.rs
//
// Error Handling for the user surface
//
// ARCHITECTURE:
// - Maps internal errors → user-facing notifications
// - Provides consistent error format for every front end
// - Never exposes internal implementation details
// - Logs errors for debugging

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Transient notification payload for a failed operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error_type: ErrorType,
    pub message: String,
    pub details: Option<String>,
}

/// Error categories for the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// Resource not found
    NotFound,

    /// Invalid input or request
    Validation,

    /// Malformed import input
    Parse,

    /// Local store unavailable or failing
    Storage,

    /// Asset fetch or install failed
    Network,

    /// Aborted by the user
    Cancelled,

    /// Domain invariant violation
    DomainError,

    /// Invalid configuration
    Config,

    /// Other/unknown error
    Internal,
}

impl ErrorType {
    /// Process exit code for the command-line front end
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorType::Validation | ErrorType::NotFound | ErrorType::Config => 2,
            ErrorType::Parse | ErrorType::DomainError => 3,
            ErrorType::Storage => 4,
            ErrorType::Network => 5,
            ErrorType::Cancelled => 130,
            ErrorType::Internal => 1,
        }
    }
}

impl ErrorResponse {
    fn new(error_type: ErrorType, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            success: false,
            error_type,
            message: message.into(),
            details,
        }
    }

    /// Create error response from AppError
    pub fn from_app_error(error: &AppError) -> Self {
        match error {
            AppError::NotFound => Self::new(ErrorType::NotFound, "Resource not found", None),

            AppError::Validation(message) => Self::new(ErrorType::Validation, message.clone(), None),

            AppError::Parse(message) => Self::new(
                ErrorType::Parse,
                "The import file could not be read",
                Some(message.clone()),
            ),

            AppError::Cancelled { rows_committed } => Self::new(
                ErrorType::Cancelled,
                "Operation cancelled",
                Some(format!("{} rows committed before cancelling", rows_committed)),
            ),

            AppError::Domain(domain_error) => Self::new(
                ErrorType::DomainError,
                "Domain validation failed",
                Some(domain_error.to_string()),
            ),

            AppError::Database(db_error) => {
                log::error!("Database error: {:?}", db_error);
                Self::new(
                    ErrorType::Storage,
                    "Database operation failed",
                    Some("Check logs for details".to_string()),
                )
            }

            AppError::Pool(pool_error) => {
                log::error!("Connection pool error: {}", pool_error);
                Self::new(ErrorType::Storage, "Database connection failed", None)
            }

            AppError::Io(io_error) => {
                log::error!("IO error: {:?}", io_error);
                Self::new(
                    ErrorType::Storage,
                    "File system operation failed",
                    Some(io_error.to_string()),
                )
            }

            AppError::Network(message) => {
                Self::new(ErrorType::Network, "Network request failed", Some(message.clone()))
            }

            AppError::InstallFailed { .. } => Self::new(
                ErrorType::Network,
                "Asset update failed; the current version stays active",
                Some(error.to_string()),
            ),

            AppError::Config(message) => {
                Self::new(ErrorType::Config, "Invalid configuration", Some(message.clone()))
            }

            AppError::Serialization(serde_error) => {
                log::error!("Serialization error: {:?}", serde_error);
                Self::new(ErrorType::Internal, "Data serialization failed", None)
            }

            AppError::Other(message) => {
                log::error!("Other error: {}", message);
                Self::new(ErrorType::Internal, message.clone(), None)
            }
        }
    }

    /// Create validation error
    pub fn validation(message: String) -> Self {
        Self::new(ErrorType::Validation, message, None)
    }

    /// Create not found error
    pub fn not_found(resource: &str) -> Self {
        Self::new(ErrorType::NotFound, format!("{} not found", resource), None)
    }

    /// One-line text for a terminal
    pub fn to_line(&self) -> String {
        match &self.details {
            Some(details) => format!("{}: {}", self.message, details),
            None => self.message.clone(),
        }
    }
}

impl From<&AppError> for ErrorResponse {
    fn from(error: &AppError) -> Self {
        Self::from_app_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainError;

    #[test]
    fn test_not_found_error() {
        let error = ErrorResponse::from_app_error(&AppError::NotFound);
        assert_eq!(error.error_type, ErrorType::NotFound);
        assert_eq!(error.message, "Resource not found");
    }

    #[test]
    fn test_validation_error() {
        let error = ErrorResponse::validation("Invalid input".to_string());
        assert_eq!(error.error_type, ErrorType::Validation);
        assert_eq!(error.message, "Invalid input");
    }

    #[test]
    fn test_error_classes() {
        let parse = ErrorResponse::from_app_error(&AppError::Parse("line 3".to_string()));
        assert_eq!(parse.error_type, ErrorType::Parse);
        assert_eq!(parse.details.as_deref(), Some("line 3"));

        let storage = ErrorResponse::from_app_error(&AppError::Pool("timeout".to_string()));
        assert_eq!(storage.error_type, ErrorType::Storage);

        let network = ErrorResponse::from_app_error(&AppError::InstallFailed {
            generation: 3,
            url: "https://almacen.test/app.js".to_string(),
            reason: "HTTP status 404".to_string(),
        });
        assert_eq!(network.error_type, ErrorType::Network);

        let cancelled = ErrorResponse::from_app_error(&AppError::Cancelled { rows_committed: 5 });
        assert_eq!(cancelled.error_type, ErrorType::Cancelled);
        assert_eq!(cancelled.error_type.exit_code(), 130);

        let domain = ErrorResponse::from_app_error(&AppError::Domain(
            DomainError::InvariantViolation("precio".to_string()),
        ));
        assert_eq!(domain.error_type, ErrorType::DomainError);
    }

    #[test]
    fn test_serialization() {
        let error = ErrorResponse::not_found("Snapshot");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("not_found"));
        assert!(json.contains("Snapshot not found"));
    }

    #[test]
    fn test_to_line_includes_details() {
        let error = ErrorResponse::from_app_error(&AppError::Network("refused".to_string()));
        assert_eq!(error.to_line(), "Network request failed: refused");
    }
}
