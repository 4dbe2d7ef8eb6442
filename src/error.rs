//! Error types for lancom transfers.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransferError {
    /// Peer unreachable, connection refused, or the listen address could not be bound.
    #[error("cannot reach {addr}: {source}")]
    Connectivity {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The first bytes of a header frame were not the magic sign.
    #[error("unknown sign {found:?}, stream is not a lancom header")]
    SignMismatch { found: Vec<u8> },

    #[error("handshake failed: expected {expected:?}, got {found:?}")]
    HandshakeMismatch { expected: Vec<u8>, found: Vec<u8> },

    /// A header field does not fit its fixed wire width.
    #[error("{field} = {value} exceeds the maximum of {max}")]
    FieldOverflow {
        field: &'static str,
        value: u128,
        max: u128,
    },

    /// Written byte count differs from the size declared in the header.
    #[error("file may not be complete: expected {expected} bytes, wrote {actual}")]
    Incomplete { expected: u64, actual: u64 },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("invalid file name: {0}")]
    InvalidFileName(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0} timed out")]
    Timeout(&'static str),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TransferError>;

impl TransferError {
    /// Errors that end the session because the peer is not speaking the protocol.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            TransferError::SignMismatch { .. }
                | TransferError::HandshakeMismatch { .. }
                | TransferError::Protocol(_)
                | TransferError::InvalidFileName(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_overflow_message() {
        let err = TransferError::FieldOverflow {
            field: "block_count",
            value: 1 << 32,
            max: u32::MAX as u128,
        };
        assert_eq!(
            err.to_string(),
            "block_count = 4294967296 exceeds the maximum of 4294967295"
        );
    }

    #[test]
    fn test_protocol_violation_classification() {
        assert!(TransferError::SignMismatch { found: vec![0; 6] }.is_protocol_violation());
        assert!(TransferError::Protocol("x".into()).is_protocol_violation());
        assert!(!TransferError::Timeout("handshake").is_protocol_violation());
        assert!(!TransferError::Io(io::Error::other("x")).is_protocol_violation());
    }
}
