//! Session struct definition
//!
//! Represents an admitted peer: its connection identity, its display name,
//! the sending end of its outbound queue and the token that closes its
//! connection.

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::SendError;
use crate::types::{ConnectionId, DisplayName};

/// An admitted chat participant
///
/// The queue is drained by the connection's writer task, so delivering
/// never blocks on the peer's socket.
#[derive(Debug, Clone)]
pub struct Session {
    /// Identity of the underlying connection
    pub id: ConnectionId,
    /// Name chosen at admission, immutable afterwards
    pub name: DisplayName,
    /// Server → peer text channel
    outbound: mpsc::Sender<String>,
    /// Cancelled to tear the connection down (eviction or shutdown)
    closed: CancellationToken,
}

impl Session {
    pub fn new(
        id: ConnectionId,
        name: DisplayName,
        outbound: mpsc::Sender<String>,
        closed: CancellationToken,
    ) -> Self {
        Self {
            id,
            name,
            outbound,
            closed,
        }
    }

    /// Enqueue raw text for this peer without waiting
    ///
    /// Fails if the queue is full (slow reader) or the writer task is gone.
    pub fn deliver(&self, text: String) -> Result<(), SendError> {
        self.outbound.try_send(text).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull,
            TrySendError::Closed(_) => SendError::ChannelClosed,
        })
    }

    /// Enqueue `line` followed by a newline
    pub fn deliver_line(&self, line: &str) -> Result<(), SendError> {
        self.deliver(format!("{}\n", line))
    }

    /// Ask the connection's handler and writer to stop
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }
}
