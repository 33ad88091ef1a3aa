//! Datagram dispatcher for the task protocol.
//!
//! One loop receives datagrams in arrival order. The sender's address and
//! port identify the client; its session lives in a shared [`SessionStore`].

use crate::protocol::{TaskProtocol, TaskState};
use crate::session::{PeerIdentity, SessionStore};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, trace, warn};

pub struct UdpDispatcher {
    socket: UdpSocket,
    sessions: Arc<SessionStore>,
    protocol: TaskProtocol,
    max_datagram_size: usize,
}

impl UdpDispatcher {
    pub fn new(
        socket: UdpSocket,
        sessions: Arc<SessionStore>,
        protocol: TaskProtocol,
        max_datagram_size: usize,
    ) -> Self {
        Self {
            socket,
            sessions,
            protocol,
            max_datagram_size,
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Receive and answer datagrams until the task is dropped.
    pub async fn run(&self) {
        // Payloads longer than this are cut short by the socket.
        let mut buffer = vec![0u8; self.max_datagram_size];

        loop {
            match self.socket.recv_from(&mut buffer).await {
                Ok((0, from)) => {
                    trace!(peer = %from, "Ignoring empty datagram");
                }
                Ok((len, from)) => {
                    self.handle_datagram(&buffer[..len], from).await;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to receive datagram");
                }
            }
        }
    }

    /// Run one protocol step for a non-empty datagram from `from`.
    pub async fn handle_datagram(&self, payload: &[u8], from: SocketAddr) {
        let command = String::from_utf8_lossy(payload);
        let session = self
            .sessions
            .lookup_or_create(PeerIdentity::from(from), &command);
        let id = session.id;
        trace!(peer = %id, command = %session.last_message, "Processing datagram");

        let step = self
            .protocol
            .step(&TaskState::from(&session), &session.last_message);

        match self
            .socket
            .send_to(step.response.as_bytes(), id.socket_addr())
            .await
        {
            Ok(_) => {
                if let Some(task) = step.assign {
                    debug!(peer = %id, %task, "Task assigned");
                    self.sessions.assign_task(id, task);
                }
            }
            Err(e) => {
                warn!(peer = %id, response = %step.response, error = %e, "Failed to send response");
            }
        }
    }
}
