//! Handle to a single live WebSocket connection.
//!
//! The socket itself is owned by the connection task in `server`. Everything
//! else (registry, rooms, router) talks to it through this handle, which wraps
//! a bounded outbound queue drained by the connection's writer task.

use std::hash::{Hash, Hasher};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use forum_common::id::{prefix, PrefixedId};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// A serialized text frame. Shared so one payload fans out without copies.
pub type Frame = Arc<str>;

/// Why a frame could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,
    #[error("outbound queue is full")]
    Full,
}

#[derive(Debug)]
pub struct Connection {
    /// Unique connection identifier (`conn_` prefixed ULID).
    pub id: String,
    /// Routing key this connection is registered under.
    identity: String,
    remote_addr: SocketAddr,
    outbound: mpsc::Sender<Frame>,
    open: AtomicBool,
    /// Frames dropped because the outbound queue was full.
    dropped: AtomicU64,
}

impl PrefixedId for Connection {
    const PREFIX: &'static str = prefix::CONNECTION;
}

impl Connection {
    pub fn new(identity: String, remote_addr: SocketAddr, outbound: mpsc::Sender<Frame>) -> Self {
        Self {
            id: Self::generate(),
            identity,
            remote_addr,
            outbound,
            open: AtomicBool::new(true),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Open until `close` is called or the writer task has gone away.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    /// Mark the connection closed. Returns `true` only for the call that
    /// actually performed the transition.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    /// Queue a frame for delivery without waiting on the peer.
    pub fn send(&self, frame: Frame) -> Result<(), SendError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        match self.outbound.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Err(SendError::Full)
            }
            Err(TrySendError::Closed(_)) => Err(SendError::Closed),
        }
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl PartialEq for Connection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Connection {}

impl Hash for Connection {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Build a connection wired to an in-memory receiver. Test helper shared by
/// the gateway and chat unit tests.
#[cfg(test)]
pub(crate) fn test_connection(identity: &str) -> (Arc<Connection>, mpsc::Receiver<Frame>) {
    test_connection_with_capacity(identity, 16)
}

#[cfg(test)]
pub(crate) fn test_connection_with_capacity(
    identity: &str,
    capacity: usize,
) -> (Arc<Connection>, mpsc::Receiver<Frame>) {
    let (tx, rx) = mpsc::channel(capacity);
    let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
    (Arc::new(Connection::new(identity.to_string(), addr, tx)), rx)
}
