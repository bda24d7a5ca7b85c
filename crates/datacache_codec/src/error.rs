//! Error types for codec operations.

/// Errors that can occur while decoding or encoding tables.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The source text is malformed.
    #[error("malformed source text at line {line}: {reason}")]
    Text {
        /// One-based line number where the problem was detected.
        line: usize,
        /// Description of the problem.
        reason: String,
    },

    /// Binary cache bytes could not be decoded.
    #[error("corrupt cache artifact: {reason}")]
    Corrupt {
        /// Description of the validation failure.
        reason: String,
    },

    /// A table could not be serialized.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },
}

impl CodecError {
    /// Returns `true` for [`CodecError::Corrupt`].
    pub fn is_corrupt(&self) -> bool {
        matches!(self, CodecError::Corrupt { .. })
    }
}
