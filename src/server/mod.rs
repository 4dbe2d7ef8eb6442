//! Standby mode - keep accepting peers and serve them one at a time.
//!
//! Each session runs to completion before the next accept. The only way out
//! is the shutdown future; when it fires the active session (if any) is
//! dropped, closing its stream.

use crate::transport::{Acceptor, Connection};
use std::future::Future;
use std::time::Duration;

/// Pause after a failed accept, so a persistent failure does not spin.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Totals for a standby run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServeStats {
    pub completed: u64,
    pub failed: u64,
    pub accept_errors: u64,
    /// A session was in progress when shutdown fired
    pub interrupted: bool,
}

/// Accept and handle sessions sequentially until `shutdown` completes.
///
/// A failed accept or a failed session is logged and the loop continues.
pub async fn serve<A, H, Fut, S>(acceptor: &mut A, shutdown: S, mut handler: H) -> ServeStats
where
    A: Acceptor,
    H: FnMut(Connection<A::Stream>) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut stats = ServeStats::default();

    tracing::info!("standing by at {}", acceptor.local_addr());

    loop {
        let accepted = tokio::select! {
            _ = &mut shutdown => break,
            accepted = acceptor.accept() => accepted,
        };

        let conn = match accepted {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("accept failed: {}", e);
                stats.accept_errors += 1;
                tokio::select! {
                    _ = &mut shutdown => break,
                    _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => continue,
                }
            }
        };

        let peer = conn.peer.clone();
        tracing::debug!("session with {} started", peer);

        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!("interrupted, closing session with {}", peer);
                stats.interrupted = true;
                break;
            }
            result = handler(conn) => match result {
                Ok(()) => {
                    stats.completed += 1;
                    tracing::debug!("session with {} finished", peer);
                }
                Err(e) => {
                    stats.failed += 1;
                    tracing::error!("session with {} failed: {:#}", peer, e);
                }
            },
        }
    }

    tracing::info!(
        "standby stopped: {} completed, {} failed",
        stats.completed,
        stats.failed
    );
    stats
}
