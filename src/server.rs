//! ChatServer shared context
//!
//! Owns the registry and history behind one mutex. Every operation takes
//! the lock exactly once and holds it for its whole duration, so
//! admission, removal, history append and fan-out form a single total
//! order observed identically by every connection.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::AdmissionError;
use crate::history::History;
use crate::message;
use crate::registry::Registry;
use crate::session::Session;
use crate::time::{Clock, SystemClock};
use crate::types::{ConnectionId, DisplayName};

/// State guarded by the shared lock
#[derive(Debug)]
pub struct ChatState {
    pub registry: Registry,
    pub history: History,
}

impl ChatState {
    pub fn new(max_clients: usize) -> Self {
        Self {
            registry: Registry::new(max_clients),
            history: History::new(),
        }
    }

    /// Format and fan out one message
    ///
    /// `origin == None` is a system message: sent verbatim to everyone and
    /// not recorded. Otherwise the line is stamped, appended to history and
    /// sent to everyone except the session named `origin`. A recipient that
    /// cannot take the line is evicted rather than left with a gap.
    pub fn broadcast(&mut self, clock: &dyn Clock, text: &str, origin: Option<&DisplayName>) {
        let formatted = match origin {
            None => text.to_string(),
            Some(name) => {
                let formatted = message::format_chat(&clock.timestamp(), name, text);
                self.history.append(formatted.clone());
                formatted
            }
        };

        let failed = self.fan_out(&formatted, origin);
        self.evict(failed);
    }

    /// Queue `line` for every session except `skip`
    ///
    /// Returns the sessions whose queue was full or closed.
    fn fan_out(&self, line: &str, skip: Option<&DisplayName>) -> Vec<ConnectionId> {
        let mut failed = Vec::new();
        for session in self.registry.enumerate() {
            if skip.is_some_and(|name| &session.name == name) {
                continue;
            }
            if let Err(e) = session.deliver_line(line) {
                warn!("Failed to deliver to {} ({}): {}", session.name, session.id, e);
                failed.push(session.id);
            }
        }
        failed
    }

    /// Drop sessions that missed a line and announce their departure
    ///
    /// The evicted connection is closed, so its peer sees the stream end
    /// instead of a hole. Announcing may fail further recipients; those
    /// are evicted in turn.
    pub fn evict(&mut self, mut failed: Vec<ConnectionId>) {
        while let Some(id) = failed.pop() {
            let Some(session) = self.registry.remove(id) else {
                continue;
            };
            session.close();
            warn!("Evicted '{}' ({}): outbound queue unavailable", session.name, id);

            let announcement = message::leave_announcement(&session.name);
            failed.extend(self.fan_out(&announcement, None));
        }
    }
}

/// The shared chat context handed to every connection handler
pub struct ChatServer {
    state: Mutex<ChatState>,
    config: Config,
    clock: Arc<dyn Clock>,
    shutdown: CancellationToken,
}

impl ChatServer {
    /// Create a server context using the system clock
    pub fn new(config: Config) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(ChatState::new(config.max_clients)),
            config,
            clock,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Token cancelled by `shutdown`
    ///
    /// Per-connection tokens are children of it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Admit a connection without announcing it
    pub async fn admit(
        &self,
        id: ConnectionId,
        name: DisplayName,
        outbound: mpsc::Sender<String>,
        closed: CancellationToken,
    ) -> Result<Session, AdmissionError> {
        self.state
            .lock()
            .await
            .registry
            .admit(id, name, outbound, closed)
    }

    /// Remove a connection without announcing it; safe to repeat
    pub async fn remove(&self, id: ConnectionId) -> Option<Session> {
        self.state.lock().await.registry.remove(id)
    }

    /// Send the full history to an admitted connection
    pub async fn replay(&self, id: ConnectionId) {
        let mut state = self.state.lock().await;
        let Some(session) = state.registry.get(id) else {
            return;
        };
        if let Err(e) = state.history.replay(session) {
            warn!("Failed to replay history to {}: {}", id, e);
            state.evict(vec![id]);
        }
    }

    /// Fan a message out; see `ChatState::broadcast`
    pub async fn broadcast(&self, text: &str, origin: Option<&DisplayName>) {
        self.state
            .lock()
            .await
            .broadcast(self.clock.as_ref(), text, origin);
    }

    /// Admit, announce and replay history as one step
    ///
    /// Holding the lock across all three means no chat line can land
    /// between the joiner's replay and its first live delivery, so it sees
    /// neither a gap nor a duplicate. The joiner's own announcement and
    /// history go out through `greeting`, a queue slot reserved before the
    /// lock was taken, so they cannot be refused for lack of room.
    pub async fn join(
        &self,
        id: ConnectionId,
        name: DisplayName,
        greeting: mpsc::OwnedPermit<String>,
        closed: CancellationToken,
    ) -> Result<Session, AdmissionError> {
        let mut state = self.state.lock().await;
        state.registry.check(&name)?;

        let announcement = message::join_announcement(&name);
        state.broadcast(self.clock.as_ref(), &announcement, None);

        let outbound = greeting.send(format!("{}\n{}", announcement, state.history.render()));
        let session = state.registry.admit(id, name, outbound, closed)?;

        info!(
            "{} joined as '{}' ({}/{} clients)",
            id,
            session.name,
            state.registry.len(),
            state.registry.max_clients()
        );
        Ok(session)
    }

    /// Remove and announce the departure
    ///
    /// Only the call that actually removes the session announces it, so a
    /// repeated leave, or one after eviction, is silent. Returns whether
    /// anything was removed.
    pub async fn leave(&self, id: ConnectionId) -> bool {
        let mut state = self.state.lock().await;
        let Some(session) = state.registry.remove(id) else {
            return false;
        };

        let announcement = message::leave_announcement(&session.name);
        state.broadcast(self.clock.as_ref(), &announcement, None);

        info!(
            "'{}' left ({} clients remain)",
            session.name,
            state.registry.len()
        );
        true
    }

    /// Stop all connections
    ///
    /// Cancels every connection token and drops all sessions; writer tasks
    /// stop even if their peer has stopped reading.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let dropped = self.state.lock().await.registry.clear();
        debug!("Shutdown dropped {} sessions", dropped);
    }

    pub async fn client_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }

    pub async fn history_len(&self) -> usize {
        self.state.lock().await.history.len()
    }

    /// Names of all live sessions, sorted
    pub async fn names(&self) -> Vec<String> {
        let state = self.state.lock().await;
        let mut names: Vec<String> = state
            .registry
            .enumerate()
            .map(|s| s.name.to_string())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::FixedClock;
    use chrono::NaiveDate;

    fn clock() -> Arc<dyn Clock> {
        let time = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        Arc::new(FixedClock::new(time))
    }

    fn server(max_clients: usize) -> ChatServer {
        ChatServer::with_clock(Config::default().with_max_clients(max_clients), clock())
    }

    fn name(s: &str) -> DisplayName {
        DisplayName::parse(s.as_bytes()).unwrap().unwrap()
    }

    /// Join through `tx`, consuming it like a handler hands over its queue
    async fn join_as(
        server: &ChatServer,
        id: ConnectionId,
        who: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<Session, AdmissionError> {
        let greeting = tx.reserve_owned().await.unwrap();
        server
            .join(id, name(who), greeting, CancellationToken::new())
            .await
    }

    async fn join(
        server: &ChatServer,
        who: &str,
        tx: mpsc::Sender<String>,
    ) -> Result<Session, AdmissionError> {
        join_as(server, ConnectionId::new(), who, tx).await
    }

    fn drain(rx: &mut mpsc::Receiver<String>) -> String {
        let mut out = String::new();
        while let Ok(chunk) = rx.try_recv() {
            out.push_str(&chunk);
        }
        out
    }

    #[tokio::test]
    async fn test_chat_broadcast_skips_sender_and_records() {
        let server = server(10);
        let (a_tx, mut a_rx) = mpsc::channel(16);
        let (b_tx, mut b_rx) = mpsc::channel(16);
        join(&server, "alice", a_tx).await.unwrap();
        join(&server, "bob", b_tx).await.unwrap();
        drain(&mut a_rx);
        drain(&mut b_rx);

        server.broadcast("hello", Some(&name("alice"))).await;

        assert_eq!(drain(&mut a_rx), "");
        assert_eq!(drain(&mut b_rx), "[2024-01-01 12:00:00][alice]: hello\n");
        assert_eq!(server.history_len().await, 1);
    }

    #[tokio::test]
    async fn test_system_broadcast_reaches_all_and_not_recorded() {
        let server = server(10);
        let (a_tx, mut a_rx) = mpsc::channel(16);
        join(&server, "alice", a_tx).await.unwrap();
        drain(&mut a_rx);

        server.broadcast("maintenance soon", None).await;

        assert_eq!(drain(&mut a_rx), "maintenance soon\n");
        assert_eq!(server.history_len().await, 0);
    }

    #[tokio::test]
    async fn test_join_announces_then_replays() {
        let server = server(10);
        let (a_tx, mut a_rx) = mpsc::channel(16);
        join(&server, "alice", a_tx).await.unwrap();
        server.broadcast("hi", Some(&name("alice"))).await;
        drain(&mut a_rx);

        let (c_tx, mut c_rx) = mpsc::channel(16);
        join(&server, "carol", c_tx).await.unwrap();

        assert_eq!(
            drain(&mut c_rx),
            "carol has joined the chat...\n[2024-01-01 12:00:00][alice]: hi\n"
        );
        assert_eq!(drain(&mut a_rx), "carol has joined the chat...\n");
    }

    #[tokio::test]
    async fn test_join_greeting_fits_single_slot_queue() {
        let server = server(10);
        for i in 0..5 {
            server.broadcast(&format!("m{}", i), Some(&name("zed"))).await;
        }

        let (tx, mut rx) = mpsc::channel(1);
        join(&server, "carol", tx).await.unwrap();

        let greeting = drain(&mut rx);
        assert!(greeting.starts_with("carol has joined the chat...\n"));
        assert_eq!(greeting.lines().count(), 6);
        assert_eq!(server.names().await, vec!["carol".to_string()]);
    }

    #[tokio::test]
    async fn test_join_rejection_leaves_state_untouched() {
        let server = server(1);
        let (a_tx, _a_rx) = mpsc::channel(16);
        join(&server, "alice", a_tx).await.unwrap();

        let (b_tx, mut b_rx) = mpsc::channel(16);
        let err = join(&server, "bob", b_tx).await.unwrap_err();
        assert_eq!(err, AdmissionError::CapacityExceeded { max: 1 });
        assert_eq!(drain(&mut b_rx), "");
        assert_eq!(server.names().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_leave_announces_once() {
        let server = server(10);
        let a_id = ConnectionId::new();
        let (a_tx, _a_rx) = mpsc::channel(16);
        let (b_tx, mut b_rx) = mpsc::channel(16);
        join_as(&server, a_id, "alice", a_tx).await.unwrap();
        join(&server, "bob", b_tx).await.unwrap();
        drain(&mut b_rx);

        assert!(server.leave(a_id).await);
        assert!(!server.leave(a_id).await);

        assert_eq!(drain(&mut b_rx), "alice has left the chat...\n");
        assert_eq!(server.client_count().await, 1);
    }

    #[tokio::test]
    async fn test_remove_twice_matches_once() {
        let server = server(10);
        let id = ConnectionId::new();
        let (tx, _rx) = mpsc::channel(16);
        server
            .admit(id, name("alice"), tx, CancellationToken::new())
            .await
            .unwrap();

        assert!(server.remove(id).await.is_some());
        assert!(server.remove(id).await.is_none());
        assert_eq!(server.client_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_recipient_evicted_others_still_served() {
        let server = server(10);
        let (a_tx, a_rx) = mpsc::channel(16);
        let (b_tx, mut b_rx) = mpsc::channel(16);
        let a_closed = CancellationToken::new();
        server
            .admit(ConnectionId::new(), name("alice"), a_tx, a_closed.clone())
            .await
            .unwrap();
        server
            .admit(ConnectionId::new(), name("bob"), b_tx, CancellationToken::new())
            .await
            .unwrap();
        drop(a_rx);

        server.broadcast("still here", Some(&name("carol"))).await;

        assert_eq!(
            drain(&mut b_rx),
            "[2024-01-01 12:00:00][carol]: still here\nalice has left the chat...\n"
        );
        assert!(a_closed.is_cancelled());
        assert_eq!(server.names().await, vec!["bob".to_string()]);
        assert_eq!(server.history_len().await, 1);
    }

    #[tokio::test]
    async fn test_full_recipient_evicted_instead_of_skipped() {
        let server = server(10);
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (b_tx, mut b_rx) = mpsc::channel(16);
        let slow_closed = CancellationToken::new();
        server
            .admit(ConnectionId::new(), name("slow"), slow_tx, slow_closed.clone())
            .await
            .unwrap();
        server
            .admit(ConnectionId::new(), name("bob"), b_tx, CancellationToken::new())
            .await
            .unwrap();

        server.broadcast("one", Some(&name("bob"))).await;
        server.broadcast("two", Some(&name("bob"))).await;
        server.broadcast("three", Some(&name("bob"))).await;

        // Slow got a prefix and then was cut off, never a hole
        assert_eq!(drain(&mut slow_rx), "[2024-01-01 12:00:00][bob]: one\n");
        assert!(slow_closed.is_cancelled());
        assert_eq!(server.names().await, vec!["bob".to_string()]);
        assert_eq!(drain(&mut b_rx), "slow has left the chat...\n");
        assert_eq!(server.history_len().await, 3);
    }

    #[tokio::test]
    async fn test_replay_after_admit() {
        let server = server(10);
        server.broadcast("earlier", Some(&name("zed"))).await;

        let id = ConnectionId::new();
        let (tx, mut rx) = mpsc::channel(16);
        server
            .admit(id, name("alice"), tx, CancellationToken::new())
            .await
            .unwrap();
        server.replay(id).await;

        assert_eq!(drain(&mut rx), "[2024-01-01 12:00:00][zed]: earlier\n");
    }

    #[tokio::test]
    async fn test_concurrent_joins_same_name() {
        let server = Arc::new(server(10));
        let mut tasks = Vec::new();
        let mut receivers = Vec::new();
        for _ in 0..8 {
            let server = server.clone();
            let (tx, rx) = mpsc::channel(16);
            receivers.push(rx);
            tasks.push(tokio::spawn(async move {
                join(&server, "alice", tx).await.is_ok()
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(server.names().await, vec!["alice".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_closes_queues() {
        let server = server(10);
        let (tx, mut rx) = mpsc::channel(16);
        join(&server, "alice", tx).await.unwrap();
        drain(&mut rx);

        server.shutdown().await;

        assert!(server.is_shutting_down());
        assert_eq!(server.client_count().await, 0);
        assert!(rx.recv().await.is_none());
    }
}
