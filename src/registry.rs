//! Registry of admitted sessions
//!
//! Maps connection identity to `Session`, enforcing the admission ceiling
//! and name uniqueness. Not synchronized itself; `ChatServer` keeps it
//! behind the shared lock.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AdmissionError;
use crate::session::Session;
use crate::types::{ConnectionId, DisplayName};

#[derive(Debug)]
pub struct Registry {
    sessions: HashMap<ConnectionId, Session>,
    max_clients: usize,
}

impl Registry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            max_clients,
        }
    }

    /// Admit a named connection
    ///
    /// Capacity is checked before the name, so a full server refuses even
    /// an unused name.
    pub fn admit(
        &mut self,
        id: ConnectionId,
        name: DisplayName,
        outbound: mpsc::Sender<String>,
        closed: CancellationToken,
    ) -> Result<Session, AdmissionError> {
        self.check(&name)?;

        let session = Session::new(id, name, outbound, closed);
        self.sessions.insert(id, session.clone());
        Ok(session)
    }

    /// Whether `admit` would accept `name` right now
    pub fn check(&self, name: &DisplayName) -> Result<(), AdmissionError> {
        if self.sessions.len() >= self.max_clients {
            return Err(AdmissionError::CapacityExceeded {
                max: self.max_clients,
            });
        }
        if self.contains_name(name) {
            return Err(AdmissionError::NameTaken(name.to_string()));
        }
        Ok(())
    }

    /// Remove a connection's session
    ///
    /// Returns the removed session; `None` if it was never admitted or is
    /// already gone.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Session> {
        self.sessions.remove(&id)
    }

    /// Iterate over live sessions
    pub fn enumerate(&self) -> impl Iterator<Item = &Session> {
        self.sessions.values()
    }

    pub fn contains_name(&self, name: &DisplayName) -> bool {
        self.sessions.values().any(|s| &s.name == name)
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients
    }

    /// Drop every session, releasing all outbound queues
    pub fn clear(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> DisplayName {
        DisplayName::parse(s.as_bytes()).unwrap().unwrap()
    }

    fn admit(
        registry: &mut Registry,
        id: ConnectionId,
        name: DisplayName,
    ) -> Result<Session, AdmissionError> {
        registry.admit(id, name, mpsc::channel(4).0, CancellationToken::new())
    }

    #[test]
    fn test_admit_and_enumerate() {
        let mut registry = Registry::new(10);
        let id = ConnectionId::new();

        let session = admit(&mut registry, id, name("alice")).unwrap();
        assert_eq!(session.id, id);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.enumerate().count(), 1);
        assert!(registry.get(id).is_some());
    }

    #[test]
    fn test_admit_rejects_taken_name() {
        let mut registry = Registry::new(10);
        admit(&mut registry, ConnectionId::new(), name("alice")).unwrap();

        let err = admit(&mut registry, ConnectionId::new(), name("alice")).unwrap_err();
        assert_eq!(err, AdmissionError::NameTaken("alice".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_admit_respects_capacity() {
        let mut registry = Registry::new(2);
        for n in ["a", "b"] {
            admit(&mut registry, ConnectionId::new(), name(n)).unwrap();
        }

        let err = admit(&mut registry, ConnectionId::new(), name("c")).unwrap_err();
        assert_eq!(err, AdmissionError::CapacityExceeded { max: 2 });
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_capacity_checked_before_name() {
        let mut registry = Registry::new(1);
        admit(&mut registry, ConnectionId::new(), name("alice")).unwrap();

        let err = admit(&mut registry, ConnectionId::new(), name("alice")).unwrap_err();
        assert!(matches!(err, AdmissionError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_size_never_exceeds_max() {
        let mut registry = Registry::new(3);
        let mut ids = Vec::new();
        for i in 0..20 {
            let id = ConnectionId::new();
            if admit(&mut registry, id, name(&format!("user{}", i % 5))).is_ok() {
                ids.push(id);
            }
            if i % 4 == 3 {
                if let Some(id) = ids.pop() {
                    registry.remove(id);
                }
            }
            assert!(registry.len() <= registry.max_clients());
        }
    }

    #[test]
    fn test_remove_is_idempotent() {
        let mut registry = Registry::new(10);
        let id = ConnectionId::new();
        admit(&mut registry, id, name("alice")).unwrap();

        assert!(registry.remove(id).is_some());
        assert!(registry.remove(id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_name_reusable_after_remove() {
        let mut registry = Registry::new(10);
        let id = ConnectionId::new();
        admit(&mut registry, id, name("alice")).unwrap();
        registry.remove(id);

        assert!(admit(&mut registry, ConnectionId::new(), name("alice")).is_ok());
    }

    #[test]
    fn test_check_does_not_insert() {
        let mut registry = Registry::new(1);
        assert!(registry.check(&name("alice")).is_ok());
        assert!(registry.is_empty());

        admit(&mut registry, ConnectionId::new(), name("alice")).unwrap();
        assert_eq!(
            registry.check(&name("bob")),
            Err(AdmissionError::CapacityExceeded { max: 1 })
        );
    }

    #[test]
    fn test_clear() {
        let mut registry = Registry::new(10);
        admit(&mut registry, ConnectionId::new(), name("a")).unwrap();
        admit(&mut registry, ConnectionId::new(), name("b")).unwrap();

        assert_eq!(registry.clear(), 2);
        assert!(registry.is_empty());
    }
}
