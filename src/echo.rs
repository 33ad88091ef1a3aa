//! Uppercase echo service.
//!
//! Answers every datagram with its payload uppercased. Useful for checking
//! that a client can reach the server at all before speaking the task
//! protocol.

use std::io;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{trace, warn};

const MAX_ECHO_SIZE: usize = 1024;

pub struct EchoService {
    socket: UdpSocket,
}

impl EchoService {
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub async fn run(&self) {
        let mut buffer = [0u8; MAX_ECHO_SIZE];

        loop {
            let (len, from) = match self.socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    warn!(error = %e, "Echo receive failed");
                    continue;
                }
            };
            trace!(peer = %from, len, "Echo datagram");

            let reply = String::from_utf8_lossy(&buffer[..len]).to_uppercase();
            if let Err(e) = self.socket.send_to(reply.as_bytes(), from).await {
                warn!(peer = %from, error = %e, "Echo send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::bind_udp;
    use std::time::Duration;

    #[tokio::test]
    async fn test_uppercase_echo() {
        let service = EchoService::new(bind_udp("echo", "127.0.0.1:0").await.unwrap());
        let server = service.local_addr().unwrap();
        let handle = tokio::spawn(async move { service.run().await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"hello, world", server).await.unwrap();

        let mut buf = [0u8; 64];
        let (len, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf[..len], b"HELLO, WORLD");

        handle.abort();
    }
}
