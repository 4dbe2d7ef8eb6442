//! One transfer, from handshake to completion token.
//!
//! A [`Session`] owns its stream. Every method consumes the session, so the
//! stream is closed when the method returns, whichever way it returns.

use crate::error::{Result, TransferError};
use crate::streaming::{
    await_completion, negotiate, read_header, signal_completion, write_header, AckStatus,
    BodyReport, Header, HeaderRead, Receiver, Sender, TransferState,
};
use crate::transport::{Connection, RoleMode};
use indicatif::ProgressBar;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Direction of the file data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => f.write_str("sender"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

/// Result of a finished send.
#[derive(Debug)]
pub struct SendReport {
    pub peer: String,
    pub header: Header,
    pub state: TransferState,
    pub ack: AckStatus,
}

/// How a receive session ended.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// Body written to `path`. `body` may still report a shortfall.
    Saved {
        peer: String,
        path: PathBuf,
        header: Header,
        body: BodyReport,
    },
    /// Stream did not start with the magic sign; nothing was written.
    SignMismatch { peer: String, found: Vec<u8> },
    /// Peer closed the stream inside the header; nothing was written.
    Truncated { peer: String, received: usize },
}

pub struct Session<S> {
    role: Role,
    mode: RoleMode,
    conn: Connection<S>,
    handshake_timeout: Option<Duration>,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(role: Role, mode: RoleMode, conn: Connection<S>) -> Self {
        Self {
            role,
            mode,
            conn,
            handshake_timeout: None,
        }
    }

    pub fn with_handshake_timeout(mut self, limit: Option<Duration>) -> Self {
        self.handshake_timeout = limit;
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn mode(&self) -> RoleMode {
        self.mode
    }

    pub fn peer(&self) -> &str {
        &self.conn.peer
    }

    /// Send the file at `path` to the peer.
    pub async fn send_file(
        mut self,
        sender: &Sender,
        path: &Path,
        progress: &ProgressBar,
    ) -> Result<SendReport> {
        self.expect_role(Role::Sender)?;

        let mut file = File::open(path).await?;
        let size = file.metadata().await?.len();
        let header = sender.header_for(path, size)?;

        negotiate(&mut self.conn.stream, self.mode, self.handshake_timeout).await?;

        tracing::info!(
            "sending {} ({} bytes) to {}",
            header.filename(),
            size,
            self.conn.peer
        );
        write_header(&mut self.conn.stream, &header).await?;

        progress.set_length(header.total_size());
        let state = sender
            .send_body(&mut file, &header, &mut self.conn.stream, progress)
            .await?;
        progress.finish();

        let ack = if sender.config().ack {
            await_completion(&mut self.conn.stream).await
        } else {
            AckStatus::NotRequested
        };

        self.close().await;
        Ok(SendReport {
            peer: self.conn.peer,
            header,
            state,
            ack,
        })
    }

    /// Receive one file from the peer and write it where `receiver` says.
    pub async fn receive_file(
        mut self,
        receiver: &Receiver,
        progress: &ProgressBar,
    ) -> Result<ReceiveOutcome> {
        self.expect_role(Role::Receiver)?;

        negotiate(&mut self.conn.stream, self.mode, self.handshake_timeout).await?;

        let header = match read_header(&mut self.conn.stream).await? {
            HeaderRead::Header(header) => header,
            HeaderRead::SignMismatch { found } => {
                tracing::warn!("unknown sign {:?} from {}, aborting", found, self.conn.peer);
                return Ok(ReceiveOutcome::SignMismatch {
                    peer: self.conn.peer,
                    found,
                });
            }
            HeaderRead::Truncated { received } => {
                tracing::warn!(
                    "{} closed the connection after {} header bytes",
                    self.conn.peer,
                    received
                );
                return Ok(ReceiveOutcome::Truncated {
                    peer: self.conn.peer,
                    received,
                });
            }
        };
        receiver.check_header(&header)?;

        tracing::info!(
            "receiving {} ({} bytes, {} blocks of {} + {} byte tail) from {}",
            header.filename(),
            header.total_size(),
            header.block_count(),
            header.block_size(),
            header.tail_size(),
            self.conn.peer
        );

        let (path, mut file) = receiver.create_output(&header).await?;
        progress.set_length(header.total_size());
        let body = receiver
            .receive_body(&mut self.conn.stream, &header, &mut file, progress)
            .await?;
        file.sync_all().await?;
        drop(file);
        progress.finish();

        if let Some(warning) = body.incomplete() {
            tracing::warn!("{}: {}", path.display(), warning);
        }

        // Sent whether or not the body was complete.
        if let Err(e) = signal_completion(&mut self.conn.stream).await {
            tracing::warn!("could not send completion token to {}: {}", self.conn.peer, e);
        }

        self.close().await;
        Ok(ReceiveOutcome::Saved {
            peer: self.conn.peer,
            path,
            header,
            body,
        })
    }

    fn expect_role(&self, role: Role) -> Result<()> {
        if self.role != role {
            return Err(TransferError::Config(format!(
                "a {} session cannot act as {}",
                self.role, role
            )));
        }
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.conn.stream.shutdown().await {
            tracing::debug!("closing stream to {}: {}", self.conn.peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{ReceiverConfig, SenderConfig, FINISH_TOKEN, SIGN};
    use tempfile::TempDir;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn conn(stream: DuplexStream, peer: &str) -> Connection<DuplexStream> {
        Connection {
            stream,
            peer: peer.to_string(),
        }
    }

    fn receiver_into(dir: &Path) -> Receiver {
        Receiver::new(ReceiverConfig {
            output_path: None,
            receive_dir: Some(dir.to_path_buf()),
        })
    }

    #[tokio::test]
    async fn test_send_and_receive_over_pipe() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("scenario.bin");
        let data: Vec<u8> = (0..10_000u32).map(|i| (i * 7 % 256) as u8).collect();
        std::fs::write(&src, &data).unwrap();
        let inbox = tmp.path().join("inbox");

        let (a, b) = duplex(1024);
        let sending = Session::new(Role::Sender, RoleMode::Passive, conn(a, "receiver"));
        let receiving = Session::new(Role::Receiver, RoleMode::Initiative, conn(b, "sender"));

        let sender = Sender::new(SenderConfig {
            block_size: 4096,
            ack: true,
        });
        let receiver = receiver_into(&inbox);
        let bar = ProgressBar::hidden();

        let (sent, received) = tokio::join!(
            sending.send_file(&sender, &src, &bar),
            receiving.receive_file(&receiver, &bar),
        );
        let sent = sent.unwrap();

        assert_eq!(sent.ack, AckStatus::Acknowledged);
        assert_eq!(sent.header.block_count(), 2);
        assert_eq!(sent.header.tail_size(), 1808);
        assert_eq!(sent.state.bytes_transferred, 10_000);

        match received.unwrap() {
            ReceiveOutcome::Saved { path, body, .. } => {
                assert_eq!(path, inbox.join("scenario.bin"));
                assert!(body.is_complete());
                assert_eq!(std::fs::read(path).unwrap(), data);
            }
            other => panic!("Expected Saved, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_receiver_aborts_on_bad_sign() {
        let tmp = TempDir::new().unwrap();
        let (ours, mut theirs) = duplex(1024);
        let session = Session::new(Role::Receiver, RoleMode::Passive, conn(ours, "imposter"));

        let peer = async move {
            let mut challenge = [0u8; 12];
            theirs.read_exact(&mut challenge).await.unwrap();
            theirs.write_all(b"LANCOM!READY").await.unwrap();
            theirs.write_all(b"NOTLAN").await.unwrap();
            theirs.write_all(&[0u8; 32]).await.unwrap();
            let mut rest = Vec::new();
            theirs.read_to_end(&mut rest).await.unwrap();
            rest
        };

        let receiver = receiver_into(tmp.path());
        let bar = ProgressBar::hidden();
        let (outcome, rest) = tokio::join!(
            session.receive_file(&receiver, &bar),
            peer
        );

        match outcome.unwrap() {
            ReceiveOutcome::SignMismatch { found, .. } => assert_eq!(found, b"NOTLAN"),
            other => panic!("Expected SignMismatch, got {:?}", other),
        }
        // No completion token, no file
        assert!(rest.is_empty());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_receiver_keeps_partial_file() {
        let tmp = TempDir::new().unwrap();
        let (ours, mut theirs) = duplex(64 * 1024);
        let session = Session::new(Role::Receiver, RoleMode::Initiative, conn(ours, "flaky"));

        let header = Header::for_file(10_000, 4096, "partial.bin").unwrap();
        let peer = async move {
            let mut buf = [0u8; 12];
            theirs.write_all(b"LANCOM?HELLO").await.unwrap();
            theirs.read_exact(&mut buf).await.unwrap();
            write_header(&mut theirs, &header).await.unwrap();
            theirs.write_all(&[1u8; 6000]).await.unwrap();
            theirs.shutdown().await.unwrap();
            let mut rest = Vec::new();
            theirs.read_to_end(&mut rest).await.unwrap();
            rest
        };

        let receiver = receiver_into(tmp.path());
        let bar = ProgressBar::hidden();
        let (outcome, rest) = tokio::join!(
            session.receive_file(&receiver, &bar),
            peer
        );

        match outcome.unwrap() {
            ReceiveOutcome::Saved { path, body, .. } => {
                assert_eq!(body.written, 6000);
                assert_eq!(body.expected, 10_000);
                assert_eq!(std::fs::metadata(path).unwrap().len(), 6000);
            }
            other => panic!("Expected Saved, got {:?}", other),
        }
        assert_eq!(rest, FINISH_TOKEN);
    }

    #[tokio::test]
    async fn test_receiver_rejects_path_in_file_name() {
        let tmp = TempDir::new().unwrap();
        let (ours, mut theirs) = duplex(1024);
        let session = Session::new(Role::Receiver, RoleMode::Initiative, conn(ours, "evil"));

        let header = Header::for_file(4, 4, "../escape").unwrap();
        let peer = async move {
            let mut buf = [0u8; 12];
            theirs.write_all(b"LANCOM?HELLO").await.unwrap();
            theirs.read_exact(&mut buf).await.unwrap();
            write_header(&mut theirs, &header).await.unwrap();
            theirs.write_all(b"data").await.unwrap();
        };

        let receiver = receiver_into(&tmp.path().join("inbox"));
        let bar = ProgressBar::hidden();
        let (outcome, _) = tokio::join!(
            session.receive_file(&receiver, &bar),
            peer
        );

        assert!(matches!(
            outcome.unwrap_err(),
            TransferError::InvalidFileName(_)
        ));
        assert!(!tmp.path().join("escape").exists());
        assert!(!tmp.path().join("inbox").exists());
    }

    #[tokio::test]
    async fn test_sender_without_ack_closes_after_body() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("small.txt");
        std::fs::write(&src, b"hello lancom").unwrap();

        let (ours, mut theirs) = duplex(1024);
        let session = Session::new(Role::Sender, RoleMode::Initiative, conn(ours, "rx"));
        let sender = Sender::new(SenderConfig {
            block_size: 5,
            ack: false,
        });

        let peer = async move {
            theirs.write_all(b"LANCOM?HELLO").await.unwrap();
            let mut wire = Vec::new();
            theirs.read_to_end(&mut wire).await.unwrap();
            wire
        };

        let bar = ProgressBar::hidden();
        let (report, wire) = tokio::join!(
            session.send_file(&sender, &src, &bar),
            peer
        );
        assert_eq!(report.unwrap().ack, AckStatus::NotRequested);

        let mut expected = b"LANCOM!READY".to_vec();
        expected.extend_from_slice(SIGN);
        expected.extend_from_slice(&[0, 0, 0, 2, 0, 0, 0, 5]);
        expected.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 2]);
        expected.extend_from_slice(&[0, 9]);
        expected.extend_from_slice(b"small.txt");
        expected.extend_from_slice(b"hello lancom");
        assert_eq!(wire, expected);
    }

    #[tokio::test]
    async fn test_sender_reports_bad_ack() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("f");
        std::fs::write(&src, b"abc").unwrap();

        let (ours, mut theirs) = duplex(1024);
        let session = Session::new(Role::Sender, RoleMode::Initiative, conn(ours, "rx"));
        let sender = Sender::new(SenderConfig {
            block_size: 1024,
            ack: true,
        });

        let peer = async move {
            theirs.write_all(b"LANCOM?HELLO").await.unwrap();
            let mut buf = vec![0u8; 12 + 24 + 1 + 3];
            theirs.read_exact(&mut buf).await.unwrap();
            theirs.write_all(b"LANCOM#").await.unwrap();
        };

        let bar = ProgressBar::hidden();
        let (report, _) = tokio::join!(
            session.send_file(&sender, &src, &bar),
            peer
        );
        assert_eq!(
            report.unwrap().ack,
            AckStatus::Failed {
                found: b"LANCOM#".to_vec()
            }
        );
    }

    #[tokio::test]
    async fn test_send_succeeds_when_peer_leaves_before_close() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("f");
        std::fs::write(&src, b"abc").unwrap();

        let (ours, mut theirs) = duplex(1024);
        let session = Session::new(Role::Sender, RoleMode::Initiative, conn(ours, "rx"));
        let sender = Sender::new(SenderConfig {
            block_size: 1024,
            ack: false,
        });

        let peer = async move {
            theirs.write_all(b"LANCOM?HELLO").await.unwrap();
            let mut buf = vec![0u8; 12 + 24 + 1 + 3];
            theirs.read_exact(&mut buf).await.unwrap();
            drop(theirs);
            buf
        };

        let bar = ProgressBar::hidden();
        let (report, wire) = tokio::join!(session.send_file(&sender, &src, &bar), peer);
        let report = report.unwrap();
        assert_eq!(report.state.bytes_transferred, 3);
        assert!(wire.ends_with(b"fabc"));
    }

    #[tokio::test]
    async fn test_sender_handshake_rejected_sends_nothing() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("f");
        std::fs::write(&src, b"secret").unwrap();

        let (ours, mut theirs) = duplex(1024);
        let session = Session::new(Role::Sender, RoleMode::Passive, conn(ours, "rx"));
        let sender = Sender::new(SenderConfig {
            block_size: 1024,
            ack: false,
        });

        let peer = async move {
            let mut buf = [0u8; 12];
            theirs.read_exact(&mut buf).await.unwrap();
            theirs.write_all(b"GET / HTTP/1").await.unwrap();
            let mut rest = Vec::new();
            theirs.read_to_end(&mut rest).await.unwrap();
            rest
        };

        let bar = ProgressBar::hidden();
        let (report, rest) = tokio::join!(
            session.send_file(&sender, &src, &bar),
            peer
        );
        assert!(matches!(
            report.unwrap_err(),
            TransferError::HandshakeMismatch { .. }
        ));
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_wrong_role_rejected() {
        let (ours, _theirs) = duplex(64);
        let session = Session::new(Role::Receiver, RoleMode::Passive, conn(ours, "x"));
        let sender = Sender::new(SenderConfig {
            block_size: 1024,
            ack: false,
        });
        let err = session
            .send_file(&sender, Path::new("unused"), &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::Config(_)));
    }
}
