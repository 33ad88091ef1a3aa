//! Per-client session state.
//!
//! Datagram peers have no connection object, so a session is keyed by the
//! peer's address and port. Stream peers own their session directly in the
//! connection worker and never touch the store.

use std::collections::HashMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::sync::Mutex;
use tracing::debug;

/// Address and port of a remote peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerIdentity {
    address: IpAddr,
    port: u16,
}

impl PeerIdentity {
    pub fn new(address: IpAddr, port: u16) -> Self {
        Self { address, port }
    }

    /// Socket address to reply to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

impl From<SocketAddr> for PeerIdentity {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

impl fmt::Display for PeerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// State the server keeps about one client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSession {
    pub id: PeerIdentity,
    /// Most recent command received from the client
    pub last_message: String,
    /// Last task successfully sent to the client
    pub assigned_task: Option<String>,
}

impl ClientSession {
    pub fn new(id: PeerIdentity, last_message: String) -> Self {
        Self {
            id,
            last_message,
            assigned_task: None,
        }
    }
}

/// Thread-safe map from peer identity to session.
///
/// Lookup and insertion happen under one lock, so two racing first contacts
/// from the same peer still end up sharing a single session.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<PeerIdentity, ClientSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `id`, creating the session on first contact.
    ///
    /// Returns a snapshot of the session after the update.
    pub fn lookup_or_create(&self, id: PeerIdentity, message: &str) -> ClientSession {
        let mut sessions = self.lock();
        if !sessions.contains_key(&id) {
            debug!(peer = %id, known = sessions.len(), "New client session");
        }
        let session = sessions
            .entry(id)
            .or_insert_with(|| ClientSession::new(id, String::new()));
        session.last_message.clear();
        session.last_message.push_str(message);
        session.clone()
    }

    /// Remember that `task` was delivered to `id`.
    ///
    /// Returns false if no session exists for `id`.
    pub fn assign_task(&self, id: PeerIdentity, task: String) -> bool {
        match self.lock().get_mut(&id) {
            Some(session) => {
                session.assigned_task = Some(task);
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn get(&self, id: &PeerIdentity) -> Option<ClientSession> {
        self.lock().get(id).cloned()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PeerIdentity, ClientSession>> {
        // A panic while holding the lock leaves the map itself intact.
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
