//! Connection establishment.
//!
//! A session runs over any bidirectional byte stream. TCP is the only real
//! transport; tests drive the same code with in-memory pipes through
//! [`Acceptor`].

pub mod tcp;

use crate::error::{Result, TransferError};
use async_trait::async_trait;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

pub use tcp::{connect, listen, TcpAcceptor};

/// Which side opens the connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleMode {
    /// Connect outward to the peer
    #[default]
    Initiative,
    /// Bind, listen and accept the peer
    Passive,
}

impl fmt::Display for RoleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleMode::Initiative => f.write_str("initiative"),
            RoleMode::Passive => f.write_str("passive"),
        }
    }
}

/// An established stream and the address of the peer on the other end.
pub struct Connection<S> {
    pub stream: S,
    pub peer: String,
}

/// Source of incoming connections for the passive role.
#[async_trait]
pub trait Acceptor: Send {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;

    /// Wait for the next peer.
    async fn accept(&mut self) -> Result<Connection<Self::Stream>>;

    /// Address being listened on, for logs.
    fn local_addr(&self) -> String;
}

/// Run `fut` under an optional deadline.
pub(crate) async fn bounded<F, T>(what: &'static str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| TransferError::Timeout(what))?,
        None => fut.await,
    }
}
