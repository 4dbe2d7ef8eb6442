//! Sending side of the block transfer.
//!
//! Reads the source file one block at a time and writes each block to the
//! connection as soon as it is full.

use crate::error::{Result, TransferError};
use crate::streaming::protocol::{read_full, Header};
use crate::streaming::state::{piece_len, TransferState};
use indicatif::ProgressBar;
use std::io;
use std::path::Path;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Sender configuration
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Size of every full block on the wire
    pub block_size: u32,
    /// Wait for the receiver's completion token before closing
    pub ack: bool,
}

/// Sender state
pub struct Sender {
    config: SenderConfig,
}

impl Sender {
    pub fn new(config: SenderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// Describe `path` (of `size` bytes) as a header frame.
    pub fn header_for(&self, path: &Path, size: u64) -> Result<Header> {
        let name = path
            .file_name()
            .ok_or_else(|| TransferError::InvalidFileName(path.display().to_string()))?;
        let name = name.to_str().ok_or_else(|| {
            TransferError::InvalidFileName(format!("{} is not valid UTF-8", path.display()))
        })?;

        Header::for_file(size, self.config.block_size, name)
    }

    /// Stream the body described by `header` from `source` to `conn`.
    ///
    /// Writes `block_count` blocks of `block_size` bytes then the tail. A
    /// source that runs out before the declared size is an error.
    pub async fn send_body<R, W>(
        &self,
        source: &mut R,
        header: &Header,
        conn: &mut W,
        progress: &ProgressBar,
    ) -> Result<TransferState>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut state = TransferState::new(header);
        let piece = piece_len(header);
        let block = header.block_size() as usize;
        let mut buf = vec![0u8; piece];

        for i in 0..header.block_count() {
            if block > 0 {
                fill_from_source(source, &mut buf[..block], &state).await?;
                conn.write_all(&buf[..block]).await?;
            }

            state.advance(block);
            state.finish_block();
            progress.inc(block as u64);
            tracing::trace!("block {}/{} sent", i + 1, header.block_count());
        }

        let mut remaining = header.tail_size();
        while remaining > 0 {
            let len = remaining.min(piece as u64) as usize;
            fill_from_source(source, &mut buf[..len], &state).await?;
            conn.write_all(&buf[..len]).await?;

            state.advance(len);
            progress.inc(len as u64);
            remaining -= len as u64;
        }
        state.finish_block();
        conn.flush().await?;

        tracing::debug!(
            "body sent: {} bytes in {} blocks + {} byte tail",
            state.bytes_transferred,
            header.block_count(),
            header.tail_size()
        );
        Ok(state)
    }
}

async fn fill_from_source<R: AsyncRead + Unpin>(
    source: &mut R,
    buf: &mut [u8],
    state: &TransferState,
) -> Result<()> {
    let n = read_full(source, buf).await?;
    if n < buf.len() {
        return Err(TransferError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!(
                "source ended after {} bytes",
                state.bytes_transferred + n as u64
            ),
        )));
    }
    Ok(())
}
