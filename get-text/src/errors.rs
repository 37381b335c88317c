use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Invalid upload: malformed form, wrong file count or unsupported extension
    #[error("{message}")]
    BadRequest { message: String },

    /// Upload exceeds the configured body limit
    #[error("{message}")]
    PayloadTooLarge { message: String },

    /// A pipeline step failed on our side (save, extract, read)
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Error::BadRequest { message: message.into() }
    }

    pub fn internal(operation: impl Into<String>) -> Self {
        Error::Internal {
            operation: operation.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Error::Internal { .. } | Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::BadRequest { message } | Error::PayloadTooLarge { message } => message.clone(),
            Error::Internal { .. } | Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        match &self {
            Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::BadRequest { .. } | Error::PayloadTooLarge { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        (self.status_code(), self.user_message()).into_response()
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_message_is_returned_verbatim() {
        let err = Error::bad_request("wrong file type: .pdf");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.user_message(), "wrong file type: .pdf");
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let err = Error::internal("extract txt");
        assert_eq!(err.to_string(), "Failed to extract txt");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Internal server error");

        let other = Error::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(other.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(other.user_message(), "Internal server error");
    }

    #[test]
    fn test_payload_too_large_status() {
        let err = Error::PayloadTooLarge {
            message: "too big".to_string(),
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(err.user_message(), "too big");
    }
}
