//! TCP connect and listen.

use super::{bounded, Acceptor, Connection};
use crate::error::{Result, TransferError};
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};

/// Open one outbound connection (initiative role).
pub async fn connect(addr: &str, limit: Option<Duration>) -> Result<Connection<TcpStream>> {
    tracing::info!("connecting to {}", addr);

    let stream = bounded("connect", limit, async {
        TcpStream::connect(addr)
            .await
            .map_err(|source| TransferError::Connectivity {
                addr: addr.to_string(),
                source,
            })
    })
    .await?;

    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| addr.to_string());
    tracing::info!("connected to {}", peer);

    Ok(Connection { stream, peer })
}

/// Bind and listen on `addr` (passive role).
pub async fn listen(addr: &str) -> Result<TcpAcceptor> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| TransferError::Connectivity {
            addr: addr.to_string(),
            source,
        })?;
    let acceptor = TcpAcceptor { listener };
    tracing::info!("listening at {}", acceptor.local_addr());
    Ok(acceptor)
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

#[async_trait]
impl Acceptor for TcpAcceptor {
    type Stream = TcpStream;

    async fn accept(&mut self) -> Result<Connection<TcpStream>> {
        let (stream, addr) = self.listener.accept().await?;
        tracing::info!("{} connected", addr);
        Ok(Connection {
            stream,
            peer: addr.to_string(),
        })
    }

    fn local_addr(&self) -> String {
        self.listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unbound>".to_string())
    }
}
