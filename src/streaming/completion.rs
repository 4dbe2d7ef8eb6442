//! Completion token sent by the receiver after the body is on disk.

use crate::error::Result;
use crate::streaming::protocol::{read_full, FINISH_TOKEN};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// How the sender's wait for the completion token ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AckStatus {
    /// Exact token received
    Acknowledged,
    /// Sender did not ask for one
    NotRequested,
    /// Wrong, short or missing token. Holds whatever arrived.
    Failed { found: Vec<u8> },
}

impl AckStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, AckStatus::Failed { .. })
    }
}

/// Receiver: announce that the body has been written.
pub async fn signal_completion<W: AsyncWrite + Unpin>(conn: &mut W) -> Result<()> {
    conn.write_all(FINISH_TOKEN).await?;
    conn.flush().await?;
    Ok(())
}

/// Sender: one read of exactly the token's length, compared for equality.
///
/// Never fails; an I/O error while waiting is reported as a failed ack.
pub async fn await_completion<R: AsyncRead + Unpin>(conn: &mut R) -> AckStatus {
    let mut buf = vec![0u8; FINISH_TOKEN.len()];
    match read_full(conn, &mut buf).await {
        Ok(n) => {
            buf.truncate(n);
            if buf == FINISH_TOKEN {
                AckStatus::Acknowledged
            } else {
                AckStatus::Failed { found: buf }
            }
        }
        Err(e) => {
            tracing::warn!("error while waiting for completion token: {}", e);
            AckStatus::Failed { found: Vec::new() }
        }
    }
}
