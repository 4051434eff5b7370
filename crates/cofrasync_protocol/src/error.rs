//! Protocol error types.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while validating or encoding protocol values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A table name failed validation.
    #[error("invalid table name '{name}': {reason}")]
    InvalidTableName {
        /// The rejected name.
        name: String,
        /// Why it was rejected.
        reason: &'static str,
    },

    /// A value could not be encoded to CBOR.
    #[error("encode error: {0}")]
    Encode(String),

    /// Bytes could not be decoded from CBOR.
    #[error("decode error: {0}")]
    Decode(String),

    /// A payload was read for a table outside the schema set.
    #[error("no schema registered for table '{0}'")]
    UnknownTable(String),
}
