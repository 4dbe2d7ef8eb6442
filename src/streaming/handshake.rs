//! Challenge/response exchange run before any header bytes flow.
//!
//! The passive side (the one that accepted the connection) speaks first:
//!
//! ```text
//! passive    --- CHALLENGE_TOKEN --->  initiative
//! passive    <--- RESPONSE_TOKEN ----  initiative
//! ```
//!
//! Any mismatch or early EOF fails the session. There is no retry.

use crate::error::{Result, TransferError};
use crate::streaming::protocol::{read_full, CHALLENGE_TOKEN, RESPONSE_TOKEN};
use crate::transport::{bounded, RoleMode};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Run the side of the handshake that belongs to `mode`.
pub async fn negotiate<S>(stream: &mut S, mode: RoleMode, limit: Option<Duration>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match mode {
        RoleMode::Passive => bounded("handshake", limit, challenge(stream)).await,
        RoleMode::Initiative => bounded("handshake", limit, respond(stream)).await,
    }
}

/// Passive side: send the challenge and wait for the response token.
pub async fn challenge<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.write_all(CHALLENGE_TOKEN).await?;
    stream.flush().await?;
    tracing::debug!("handshake challenge sent, awaiting response");

    expect_token(stream, RESPONSE_TOKEN).await?;
    tracing::debug!("handshake confirmed");
    Ok(())
}

/// Initiative side: verify the challenge, then answer it.
pub async fn respond<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    expect_token(stream, CHALLENGE_TOKEN).await?;

    stream.write_all(RESPONSE_TOKEN).await?;
    stream.flush().await?;
    tracing::debug!("handshake response sent");
    Ok(())
}

async fn expect_token<R: AsyncRead + Unpin>(r: &mut R, token: &[u8]) -> Result<()> {
    let mut buf = vec![0u8; token.len()];
    let n = read_full(r, &mut buf).await?;
    buf.truncate(n);

    if buf != token {
        return Err(TransferError::HandshakeMismatch {
            expected: token.to_vec(),
            found: buf,
        });
    }
    Ok(())
}
