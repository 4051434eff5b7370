//! Error types for the reference remote.

use cofrasync_protocol::{ErrorCode, ErrorResponse, ProtocolError};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the remote.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Invalid request format.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Protocol version mismatch.
    #[error("unsupported protocol version {got}, expected {expected}")]
    UnsupportedVersion {
        /// Version the client sent.
        got: u16,
        /// Version the server speaks.
        expected: u16,
    },

    /// Push batch over the configured limit.
    #[error("batch of {size} records exceeds limit of {max}")]
    BatchTooLarge {
        /// Records in the request.
        size: usize,
        /// Configured limit.
        max: usize,
    },

    /// Request or response body could not be (de)serialized.
    #[error("codec error: {0}")]
    Codec(#[from] ProtocolError),

    /// The service is refusing requests.
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl ServerError {
    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServerError::InvalidRequest(_)
                | ServerError::UnsupportedVersion { .. }
                | ServerError::BatchTooLarge { .. }
                | ServerError::Codec(_)
        )
    }

    /// Returns true if this is a server error (5xx).
    pub fn is_server_error(&self) -> bool {
        !self.is_client_error()
    }

    /// Wire error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ServerError::InvalidRequest(_) | ServerError::Codec(_) => ErrorCode::BadRequest,
            ServerError::UnsupportedVersion { .. } => ErrorCode::UnsupportedVersion,
            ServerError::BatchTooLarge { .. } => ErrorCode::BatchTooLarge,
            ServerError::Unavailable(_) => ErrorCode::Unavailable,
        }
    }

    /// Wire error reply.
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse::new(self.code(), self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classification() {
        assert!(ServerError::InvalidRequest("bad".into()).is_client_error());
        assert!(ServerError::Unavailable("maintenance".into()).is_server_error());
        assert!(!ServerError::BatchTooLarge { size: 9, max: 5 }.is_server_error());
    }

    #[test]
    fn only_unavailable_is_retryable_on_the_wire() {
        let busy = ServerError::Unavailable("maintenance".into()).to_response();
        assert!(busy.is_retryable());
        let version = ServerError::UnsupportedVersion { got: 9, expected: 1 }.to_response();
        assert_eq!(version.code, ErrorCode::UnsupportedVersion);
        assert!(!version.is_retryable());
        assert!(version.message.contains('9'));
    }
}
