//! Serialization error types.

use thiserror::Error;

/// Failure while serializing into a caller-provided buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SerializeError {
    /// The buffer cannot hold the value at the requested position.
    #[error("buffer too small: need {needed} bytes at offset {offset}, buffer holds {capacity}")]
    BufferTooSmall {
        needed: usize,
        offset: usize,
        capacity: usize,
    },
}

/// Failure while reading a value back.
#[derive(Debug, Error)]
pub enum DeserializeError {
    /// The source ran out before the declared length was read.
    #[error("unexpected end of input: needed {needed} more bytes, {available} available")]
    UnexpectedEnd { needed: usize, available: usize },

    /// A fixed constant field held a different value.
    #[error("constant mismatch: expected {expected}, found {found}")]
    ConstantMismatch { expected: String, found: String },

    /// A byte that should encode a bool was neither 0 nor 1.
    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),

    /// String payload was not UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// Serialized bounds were not positive.
    #[error("serialized bounds are invalid: {0}")]
    InvalidBounds(String),

    /// A count or length could not be inferred because the source length is unknown.
    #[error("cannot infer length from an unbounded source")]
    UnknownLength,

    /// Bytes remained after a value that should have consumed the whole input.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),

    #[error("i/o error while reading: {0}")]
    Io(#[from] std::io::Error),
}
