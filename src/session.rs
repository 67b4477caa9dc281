//! Session state and send handle
//!
//! A `Session` is the per-connection state owned by its worker task.
//! Registries never hold a `Session`; they hold cloneable `SessionHandle`s
//! that carry only what fan-out needs: the id, the committed username, and
//! the outbound channel sender.

use std::net::SocketAddr;

use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::SendError;
use crate::types::SessionId;

/// Per-connection state, owned and mutated only by the session worker
///
/// `username` stays `None` until the Naming state completes; `current_room`
/// is `None` whenever the session is not a room member.
#[derive(Debug)]
pub struct Session {
    /// Unique identifier for this session
    pub id: SessionId,
    /// Peer address (informational)
    pub addr: SocketAddr,
    /// Registered username (None during Naming)
    pub username: Option<String>,
    /// Name of the room this session is a member of
    pub current_room: Option<String>,
    /// Outbound line channel drained by the writer task
    outbound: mpsc::UnboundedSender<String>,
}

impl Session {
    /// Create a new session with the given peer address and outbound sender
    pub fn new(addr: SocketAddr, outbound: mpsc::UnboundedSender<String>) -> Self {
        Self {
            id: SessionId::new(),
            addr,
            username: None,
            current_room: None,
            outbound,
        }
    }

    /// Queue a protocol line for delivery to this session's peer
    ///
    /// Returns an error if the writer task is gone (peer disconnected).
    pub fn send(&self, line: impl Into<String>) -> Result<(), SendError> {
        self.outbound
            .send(line.into())
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Get the display name for this session
    ///
    /// Returns the username if registered, otherwise "Unknown".
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("Unknown")
    }

    /// Build a cloneable handle for registry insertion
    ///
    /// The username is copied into the handle; it is committed exactly once,
    /// before the session can appear in any registry, so the copy never goes
    /// stale.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            id: self.id,
            username: self.username.clone().unwrap_or_default(),
            outbound: self.outbound.clone(),
        }
    }
}

/// Cloneable send-side reference to a session
///
/// Held by the user and room registries. Dropping every handle does not
/// tear the session down; lifetime stays with the worker.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    /// Session this handle refers to
    pub id: SessionId,
    /// Username committed at registration
    pub username: String,
    outbound: mpsc::UnboundedSender<String>,
}

impl SessionHandle {
    /// Queue a protocol line for delivery; best-effort
    pub fn send(&self, line: impl Into<String>) -> Result<(), SendError> {
        self.outbound
            .send(line.into())
            .map_err(|_| SendError::ChannelClosed)
    }
}

/// Drain queued outbound lines to the socket write half
///
/// Runs as a dedicated task per connection. Ends when every sender is
/// dropped (session teardown) or the peer stops accepting writes; dropping
/// the write half closes the stream.
pub async fn write_outbound(write_half: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<String>) {
    let mut writer = BufWriter::new(write_half);
    while let Some(line) = rx.recv().await {
        if writer.write_all(line.as_bytes()).await.is_err() {
            debug!("socket write failed, ending writer task");
            break;
        }
        if writer.flush().await.is_err() {
            break;
        }
    }
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_session_creation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::new(test_addr(), tx);

        assert!(session.username.is_none());
        assert!(session.current_room.is_none());
        assert_eq!(session.display_name(), "Unknown");
    }

    #[tokio::test]
    async fn test_session_send() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::new(test_addr(), tx);

        session.send("hello\n").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let session = Session::new(test_addr(), tx);
        drop(rx);

        assert!(session.send("hello\n").is_err());
    }

    #[tokio::test]
    async fn test_handle_carries_username() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = Session::new(test_addr(), tx);
        session.username = Some("alice".to_string());

        let handle = session.handle();
        assert_eq!(handle.id, session.id);
        assert_eq!(handle.username, "alice");

        handle.send("hi\n").unwrap();
        assert_eq!(rx.recv().await.unwrap(), "hi\n");
    }
}
