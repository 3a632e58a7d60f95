//! Error types for framed buffer operations.

use thiserror::Error;

/// Result type for framed buffer operations.
pub type BufferResult<T> = Result<T, BufferError>;

/// Errors raised while reading or writing a [`FramedBuffer`](crate::FramedBuffer).
///
/// The buffer is filled straight from the network, so every read is bounded and
/// reports one of these instead of panicking on malformed input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Attempted to read past the write cursor.
    #[error("attempted to read {requested} bytes but only {available} bytes available")]
    TruncatedInput { requested: usize, available: usize },

    /// A length-prefixed string declared more characters than allowed.
    #[error("string of {length} bytes exceeds the maximum of {max}")]
    Overflow { length: usize, max: usize },

    /// A write inside an open frame would need the buffer to grow.
    #[error("frame write of {requested} bytes exceeds the remaining capacity of {remaining} bytes")]
    FrameOverflow { requested: usize, remaining: usize },

    /// `begin_packet` was called while another frame was still open.
    #[error("a packet frame (opcode {opcode}) is already open")]
    FrameAlreadyOpen { opcode: u8 },

    /// `end_packet` was called with no open frame.
    #[error("no packet frame is open")]
    NoOpenFrame,

    /// A string payload was not valid UTF-8.
    #[error("string payload is not valid UTF-8")]
    InvalidString,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_input_mentions_sizes() {
        let err = BufferError::TruncatedInput {
            requested: 4,
            available: 1,
        };
        let msg = err.to_string();
        assert!(msg.contains("4 bytes"));
        assert!(msg.contains("1 bytes"));
    }

    #[test]
    fn test_overflow_mentions_limit() {
        let err = BufferError::Overflow { length: 40, max: 12 };
        let msg = err.to_string();
        assert!(msg.contains("40"));
        assert!(msg.contains("12"));
    }

    #[test]
    fn test_error_is_std_error() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<BufferError>();
    }
}
