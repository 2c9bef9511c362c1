//! Line-protocol connection handler
//!
//! Drives one peer through naming, admission, the chat loop and teardown.
//! Works over any byte stream: a `TcpStream` in production, an in-memory
//! duplex pipe in tests.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{AnyDelimiterCodec, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AdmissionError, AppError};
use crate::message;
use crate::server::ChatServer;
use crate::session::Session;
use crate::types::{validate_line, ConnectionId, DisplayName};

type LineReader<R> = FramedRead<R, AnyDelimiterCodec>;

/// How long teardown waits for queued output before abandoning it
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-connection view of the pieces every phase needs
struct Connection<'a, R> {
    id: ConnectionId,
    server: &'a ChatServer,
    lines: LineReader<R>,
    outbound: mpsc::Sender<String>,
    /// Cancelled on eviction, server shutdown, or a stuck writer
    closed: CancellationToken,
}

/// Handle one accepted stream until it closes
///
/// The stream is released on every exit path: the writer task flushes what
/// is queued, shuts the write side down, and is awaited before returning.
/// A peer that stops reading cannot hold teardown open: the writer gives
/// up once the connection token is cancelled or the drain times out.
pub async fn handle_connection<S>(stream: S, server: Arc<ChatServer>) -> Result<(), AppError>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let id = ConnectionId::new();
    let config = server.config().clone();
    debug!("Connection {} opened", id);

    let (reader, writer) = tokio::io::split(stream);
    let closed = server.shutdown_token().child_token();

    // Channel for server -> peer text; drained by the writer task
    let (outbound, outbound_rx) = mpsc::channel::<String>(config.outbound_buffer);
    let write_task = tokio::spawn(write_loop(id, writer, outbound_rx, closed.clone()));

    let codec = AnyDelimiterCodec::new_with_max_length(
        b"\n".to_vec(),
        b"\n".to_vec(),
        config.max_line_length,
    );
    let mut conn = Connection {
        id,
        server: server.as_ref(),
        lines: FramedRead::new(reader, codec),
        outbound,
        closed: closed.clone(),
    };

    let result = match conn.negotiate_name().await {
        Ok(Some(session)) => {
            let result = conn.chat(&session).await;
            conn.server.leave(id).await;
            result
        }
        Ok(None) => Ok(()),
        Err(e) => Err(e),
    };

    drop(conn);
    finish_writer(id, write_task, &closed).await?;
    debug!("Connection {} closed", id);
    result
}

impl<R> Connection<'_, R>
where
    R: AsyncRead + Unpin,
{
    /// Naming phase
    ///
    /// Returns the admitted session, or `None` if the peer left, the
    /// server is full, or the connection was closed.
    async fn negotiate_name(&mut self) -> Result<Option<Session>, AppError> {
        self.reply(format!("{}{}", message::WELCOME_BANNER, message::NAME_PROMPT))
            .await?;

        loop {
            let Some(raw) = self.next_line().await? else {
                debug!("Connection {} closed before naming", self.id);
                return Ok(None);
            };

            let name = match DisplayName::parse(&raw) {
                Ok(Some(name)) => name,
                Ok(None) => {
                    self.reply(message::NAME_PROMPT.to_string()).await?;
                    continue;
                }
                Err(e) => {
                    debug!("Connection {} sent invalid name: {}", self.id, e);
                    self.reply(message::invalid_line_reply(&e, true)).await?;
                    continue;
                }
            };

            // Room for the join announcement and history, reserved before
            // taking the shared lock
            let greeting = tokio::select! {
                permit = self.outbound.clone().reserve_owned() => {
                    permit.map_err(|_| writer_stopped())?
                }
                _ = self.closed.cancelled() => return Ok(None),
            };

            match self
                .server
                .join(self.id, name, greeting, self.closed.clone())
                .await
            {
                Ok(session) => return Ok(Some(session)),
                Err(e @ AdmissionError::NameTaken(_)) => {
                    debug!("Connection {}: {}", self.id, e);
                    self.reply(message::admission_reply(&e)).await?;
                }
                Err(e @ AdmissionError::CapacityExceeded { .. }) => {
                    info!("Connection {} refused: {}", self.id, e);
                    self.reply(message::admission_reply(&e)).await?;
                    return Ok(None);
                }
            }
        }
    }

    /// Active phase: relay every valid line until the peer goes away
    async fn chat(&mut self, session: &Session) -> Result<(), AppError> {
        self.prompt(session).await?;

        while let Some(raw) = self.next_line().await? {
            match validate_line(&raw) {
                Ok(Some(text)) => self.server.broadcast(&text, Some(&session.name)).await,
                Ok(None) => {}
                Err(e) => {
                    warn!("Rejected line from '{}': {}", session.name, e);
                    self.reply(message::invalid_line_reply(&e, false)).await?;
                }
            }
            self.prompt(session).await?;
        }
        Ok(())
    }

    /// Next raw line, or `None` on EOF, eviction or shutdown
    async fn next_line(&mut self) -> Result<Option<Bytes>, AppError> {
        let max = self.server.config().max_line_length;
        tokio::select! {
            _ = self.closed.cancelled() => Ok(None),
            frame = self.lines.next() => match frame {
                None => Ok(None),
                Some(Ok(line)) => Ok(Some(line)),
                Some(Err(e)) => Err(AppError::from_codec(e, max)),
            },
        }
    }

    async fn prompt(&self, session: &Session) -> Result<(), AppError> {
        if !self.server.config().message_prompt {
            return Ok(());
        }
        let timestamp = self.server.clock().timestamp();
        self.reply(message::input_prompt(&timestamp, &session.name))
            .await
    }

    /// Queue text for this peer only
    ///
    /// Gives up silently once the connection is closed; the next read then
    /// ends the session.
    async fn reply(&self, text: String) -> Result<(), AppError> {
        tokio::select! {
            sent = self.outbound.send(text) => sent.map_err(|_| writer_stopped()),
            _ = self.closed.cancelled() => Ok(()),
        }
    }
}

fn writer_stopped() -> AppError {
    AppError::ConnectionFailure(io::Error::new(
        io::ErrorKind::BrokenPipe,
        "writer task has stopped",
    ))
}

/// Drain the outbound queue into the stream, then close the write side
///
/// Stops early, dropping whatever is still queued, when `closed` fires.
async fn write_loop<W>(
    id: ConnectionId,
    mut writer: W,
    mut outbound: mpsc::Receiver<String>,
    closed: CancellationToken,
) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let drained = tokio::select! {
        result = drain(&mut writer, &mut outbound) => result,
        _ = closed.cancelled() => {
            debug!("Write task for {} cancelled", id);
            Ok(())
        }
    };
    debug!("Write task ended for {}", id);
    let shut = writer.shutdown().await;
    drained.and(shut)
}

async fn drain<W>(writer: &mut W, outbound: &mut mpsc::Receiver<String>) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = outbound.recv().await {
        writer.write_all(chunk.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

/// Wait for the writer, cancelling it if the peer will not take the rest
async fn finish_writer(
    id: ConnectionId,
    mut task: JoinHandle<io::Result<()>>,
    closed: &CancellationToken,
) -> Result<(), AppError> {
    let joined = match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut task).await {
        Ok(joined) => joined,
        Err(_) => {
            debug!("Write side of {} still blocked, abandoning output", id);
            closed.cancel();
            task.await
        }
    };
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            // The peer is already gone; nothing left to report to it
            debug!("Write side of {} failed: {}", id, e);
            Ok(())
        }
        Err(_) => Err(AppError::WriterTask),
    }
}
