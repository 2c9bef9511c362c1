//! Error types for the chat server
//!
//! Splits failures by who they affect: admission and line validation are
//! recoverable and reported to the peer, connection failures end one
//! connection, send errors concern a single recipient during fan-out.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;
use tokio_util::codec::AnyDelimiterCodecError;

/// Connection-terminating errors
///
/// Returned from `handle_connection`; never affects other connections.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error on the peer's stream (fatal)
    #[error("connection failure: {0}")]
    ConnectionFailure(#[from] std::io::Error),

    /// Peer sent a line longer than the configured maximum
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// The writer task panicked or was aborted
    #[error("writer task failed")]
    WriterTask,
}

impl AppError {
    /// Map a framing error, reporting `max` as the line limit in effect
    pub fn from_codec(err: AnyDelimiterCodecError, max: usize) -> Self {
        match err {
            AnyDelimiterCodecError::MaxChunkLengthExceeded => AppError::LineTooLong(max),
            AnyDelimiterCodecError::Io(e) => AppError::ConnectionFailure(e),
        }
    }
}

/// Reasons `Registry::admit` refuses a name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The registry already holds `max` sessions (terminal for the connection)
    #[error("server is full ({max} clients)")]
    CapacityExceeded { max: usize },

    /// Another live session uses this name (re-prompt)
    #[error("name already taken: {0}")]
    NameTaken(String),
}

/// Text validation failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    /// A byte outside the printable ASCII range 32..=126
    #[error("line contains non-printable or non-ASCII characters")]
    InvalidCharacters,
}

/// Outbound queue errors
///
/// Occurs when enqueueing a line for one recipient.
#[derive(Debug, Error)]
pub enum SendError {
    /// The recipient's queue is at capacity; the line is dropped
    #[error("outbound queue full")]
    QueueFull,

    /// The receiving end of the channel has been closed
    #[error("Channel closed")]
    ChannelClosed,
}
