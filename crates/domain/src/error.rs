//! Domain error types.

use thiserror::Error;

/// Errors that abort an engine operation.
///
/// Per-recipient delivery failures and lost conditional writes are not
/// errors; they are reported through `NotificationResult` and
/// `TransitionOutcome::Lost` respectively.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Background location permission is not granted")]
    PermissionDenied,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<validator::ValidationErrors> for EngineError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |err| match err.message.as_ref() {
                    Some(message) => format!("{}: {}", field, message),
                    None => format!("{}: {}", field, err.code),
                })
            })
            .collect();
        EngineError::Validation(messages.join(", "))
    }
}
