//! Receiving side of the block transfer.
//!
//! Validates the incoming header, decides where the file lands, and writes
//! each block to disk as soon as it arrives.

use crate::error::{Result, TransferError};
use crate::streaming::protocol::{read_full, Header, MAX_BLOCK_SIZE};
use crate::streaming::state::{piece_len, BodyReport, TransferState};
use indicatif::ProgressBar;
use std::path::{Component, Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Check that a name announced by the peer is a single plain file name.
fn validate_file_name(name: &str) -> Result<&Path> {
    if name.is_empty() {
        return Err(TransferError::InvalidFileName(
            "empty file name not allowed".to_string(),
        ));
    }
    if name.contains('\0') || name.contains('/') || name.contains('\\') {
        return Err(TransferError::InvalidFileName(format!(
            "path separators not allowed: {:?}",
            name
        )));
    }

    let path = Path::new(name);
    let mut components = path.components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(path),
        _ => Err(TransferError::InvalidFileName(format!(
            "not a plain file name: {:?}",
            name
        ))),
    }
}

/// Receiver configuration
#[derive(Debug, Clone, Default)]
pub struct ReceiverConfig {
    /// Write to exactly this file. An existing directory is treated like
    /// `receive_dir`.
    pub output_path: Option<PathBuf>,
    /// Directory for incoming files, named as the sender announced them
    pub receive_dir: Option<PathBuf>,
}

/// Receiver state
pub struct Receiver {
    config: ReceiverConfig,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self { config }
    }

    /// Reject headers this receiver will not act on.
    pub fn check_header(&self, header: &Header) -> Result<()> {
        if header.block_size() > MAX_BLOCK_SIZE {
            return Err(TransferError::Protocol(format!(
                "block size {} exceeds maximum allowed size {}",
                header.block_size(),
                MAX_BLOCK_SIZE
            )));
        }
        validate_file_name(header.filename())?;
        Ok(())
    }

    /// Where the file described by `header` will be written.
    pub fn destination(&self, header: &Header) -> Result<PathBuf> {
        let name = validate_file_name(header.filename())?;

        if let Some(output) = &self.config.output_path {
            if output.is_dir() {
                return Ok(output.join(name));
            }
            return Ok(output.clone());
        }

        let dir = self
            .config
            .receive_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(dir.join(name))
    }

    /// Create (truncating) the output file, making parent directories as needed.
    pub async fn create_output(&self, header: &Header) -> Result<(PathBuf, File)> {
        let path = self.destination(header)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file = File::create(&path).await?;
        Ok((path, file))
    }

    /// Read the body described by `header` from `conn` into `out`.
    ///
    /// An early close is not an error: whatever arrived is written and the
    /// report shows the shortfall.
    pub async fn receive_body<R, W>(
        &self,
        conn: &mut R,
        header: &Header,
        out: &mut W,
        progress: &ProgressBar,
    ) -> Result<BodyReport>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut state = TransferState::new(header);
        let piece = piece_len(header);
        let block = header.block_size() as usize;
        let mut buf = vec![0u8; piece];
        let mut closed_early = false;

        for i in 0..header.block_count() {
            // Zero-size blocks carry no bytes but still count.
            let n = if block == 0 {
                0
            } else {
                read_full(conn, &mut buf[..block]).await?
            };
            out.write_all(&buf[..n]).await?;
            state.advance(n);
            progress.inc(n as u64);

            if n < block {
                tracing::warn!(
                    "connection closed during block {}/{}",
                    i + 1,
                    header.block_count()
                );
                closed_early = true;
                break;
            }
            state.finish_block();
            tracing::trace!("block {}/{} received", i + 1, header.block_count());
        }

        let mut remaining = if closed_early { 0 } else { header.tail_size() };
        while remaining > 0 {
            let len = remaining.min(piece as u64) as usize;
            let n = read_full(conn, &mut buf[..len]).await?;
            out.write_all(&buf[..n]).await?;
            state.advance(n);
            progress.inc(n as u64);

            if n < len {
                tracing::warn!("connection closed during tail block");
                break;
            }
            remaining -= len as u64;
        }
        if !closed_early {
            state.finish_block();
        }
        out.flush().await?;

        Ok(BodyReport {
            expected: header.total_size(),
            written: state.bytes_transferred,
        })
    }
}
