//! Per-session transfer bookkeeping.

use crate::error::TransferError;
use crate::streaming::protocol::{Header, DEFAULT_BLOCK_SIZE};

/// Progress through the body of one transfer. Lives only as long as the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferState {
    pub bytes_transferred: u64,
    /// Full blocks still to go, plus one for the tail
    pub blocks_remaining: u64,
}

impl TransferState {
    pub fn new(header: &Header) -> Self {
        Self {
            bytes_transferred: 0,
            blocks_remaining: header.block_count() as u64 + 1,
        }
    }

    pub(crate) fn advance(&mut self, bytes: usize) {
        self.bytes_transferred += bytes as u64;
    }

    pub(crate) fn finish_block(&mut self) {
        self.blocks_remaining = self.blocks_remaining.saturating_sub(1);
    }
}

/// What the receiver wrote compared with what the header declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyReport {
    pub expected: u64,
    pub written: u64,
}

impl BodyReport {
    pub fn is_complete(&self) -> bool {
        self.expected == self.written
    }

    /// The warning to surface when the body came up short.
    pub fn incomplete(&self) -> Option<TransferError> {
        (!self.is_complete()).then_some(TransferError::Incomplete {
            expected: self.expected,
            actual: self.written,
        })
    }
}

/// Buffer size, and the piece size used to move the tail. Equal to the block
/// size, or the default when blocks are empty. Blocks themselves are always
/// moved at exactly `block_size`.
pub(crate) fn piece_len(header: &Header) -> usize {
    match header.block_size() {
        0 => DEFAULT_BLOCK_SIZE as usize,
        n => n as usize,
    }
}
