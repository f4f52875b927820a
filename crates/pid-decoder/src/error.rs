//! Decode Error Types

use thiserror::Error;

/// Errors raised while validating schemas or decoding payloads
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// Payload does not cover the schema
    #[error("{descriptor}: payload has {actual} bytes, schema needs {needed}")]
    PayloadTooShort {
        descriptor: String,
        needed: usize,
        actual: usize,
    },

    /// Schema is inconsistent with itself or with its descriptor
    #[error("{descriptor}: invalid schema: {reason}")]
    Schema { descriptor: String, reason: String },
}
