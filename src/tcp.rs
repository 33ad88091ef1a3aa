//! Stream dispatcher for the task protocol.
//!
//! Every accepted connection gets its own task and its own session. The
//! connection scopes the session, so workers share nothing but the policy.

use crate::framer::CommandFramer;
use crate::protocol::{TaskProtocol, TaskState};
use crate::session::{ClientSession, PeerIdentity};
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, trace, warn};

pub struct TcpDispatcher {
    listener: TcpListener,
    protocol: TaskProtocol,
    max_command_len: usize,
    connection_limit: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
}

impl TcpDispatcher {
    pub fn new(
        listener: TcpListener,
        protocol: TaskProtocol,
        max_command_len: usize,
        max_connections: usize,
    ) -> Self {
        Self {
            listener,
            protocol,
            max_command_len,
            connection_limit: Arc::new(Semaphore::new(max_connections)),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Number of connection workers currently running.
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Accept connections until the task is dropped.
    pub async fn run(&self) {
        loop {
            // Wait for a connection slot
            let Ok(permit) = Arc::clone(&self.connection_limit).acquire_owned().await else {
                return;
            };

            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    let peer = PeerIdentity::from(addr);
                    let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!(%peer, active, "New connection");

                    let protocol = self.protocol.clone();
                    let max_command_len = self.max_command_len;
                    let workers = Arc::clone(&self.active);
                    tokio::spawn(async move {
                        serve_connection(stream, peer, protocol, max_command_len).await;
                        workers.fetch_sub(1, Ordering::SeqCst);
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }
}

/// Run the task protocol over one connection until the peer goes away.
pub async fn serve_connection<S>(
    stream: S,
    peer: PeerIdentity,
    protocol: TaskProtocol,
    max_command_len: usize,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut framer = CommandFramer::new(reader, max_command_len);
    let mut session = ClientSession::new(peer, String::new());

    loop {
        let command = match framer.next_command().await {
            Ok(Some(command)) => command,
            Ok(None) => {
                debug!(%peer, "Client disconnected");
                break;
            }
            Err(e) => {
                warn!(%peer, error = %e, "Failed to read command");
                break;
            }
        };
        trace!(%peer, %command, "Processing command");

        let step = protocol.step(&TaskState::from(&session), &command);
        session.last_message = command;

        match send_response(&mut writer, &step.response).await {
            Ok(()) => {
                if let Some(task) = step.assign {
                    debug!(%peer, %task, "Task assigned");
                    session.assigned_task = Some(task);
                }
            }
            Err(e) => {
                warn!(%peer, response = %step.response, error = %e, "Failed to send response");
            }
        }
    }
}

async fn send_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &str) -> io::Result<()> {
    writer.write_all(response.as_bytes()).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::bind_tcp;
    use crate::protocol::tests::counting_protocol;
    use crate::protocol::ReplyMode;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;
    use tokio::time::timeout;
    use tokio_test::io::Builder;

    fn peer() -> PeerIdentity {
        "127.0.0.1:5555".parse::<SocketAddr>().unwrap().into()
    }

    #[tokio::test]
    async fn test_conversation() {
        let mock = Builder::new()
            .read(b"task.")
            .write(b"task-1")
            .read(b"answer-1.")
            .write(b"OK")
            .read(b"answer-2.")
            .write(b"ERROR")
            .build();

        serve_connection(mock, peer(), counting_protocol(ReplyMode::Current), 1024).await;
    }

    #[tokio::test]
    async fn test_failed_send_keeps_old_task() {
        let mock = Builder::new()
            .read(b"task.")
            .write(b"task-1")
            .read(b"task.")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .read(b"answer-2.")
            .write(b"ERROR")
            .read(b"answer-1.")
            .write(b"OK")
            .build();

        serve_connection(mock, peer(), counting_protocol(ReplyMode::Current), 1024).await;
    }

    #[tokio::test]
    async fn test_previous_reply_mode() {
        let mock = Builder::new()
            .read(b"task.")
            .read(b"task.")
            .write(b"task-1")
            .read(b"answer-2.")
            .write(b"OK")
            .build();

        serve_connection(mock, peer(), counting_protocol(ReplyMode::Previous), 1024).await;
    }

    #[tokio::test]
    async fn test_partial_command_then_disconnect() {
        // Nothing may be written for the unterminated bytes
        let mock = Builder::new().read(b"task.").write(b"task-1").read(b"answ").build();

        serve_connection(mock, peer(), counting_protocol(ReplyMode::Current), 1024).await;
    }

    #[tokio::test]
    async fn test_read_error_ends_worker() {
        let mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        serve_connection(mock, peer(), counting_protocol(ReplyMode::Current), 1024).await;
    }

    async fn read_response(stream: &mut TcpStream) -> String {
        let mut buf = [0u8; 256];
        let n = timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("no response")
            .unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    #[tokio::test]
    async fn test_disconnect_does_not_affect_others() {
        let listener = bind_tcp("task", "127.0.0.1:0").await.unwrap();
        let dispatcher = Arc::new(TcpDispatcher::new(
            listener,
            counting_protocol(ReplyMode::Current),
            1024,
            16,
        ));
        let addr = dispatcher.local_addr().unwrap();
        let runner = Arc::clone(&dispatcher);
        let handle = tokio::spawn(async move { runner.run().await });

        let mut steady = TcpStream::connect(addr).await.unwrap();
        steady.write_all(b"task.").await.unwrap();
        let task = read_response(&mut steady).await;
        assert_eq!(task, "task-1");

        let mut leaving = TcpStream::connect(addr).await.unwrap();
        leaving.write_all(b"tas").await.unwrap();
        drop(leaving);

        // Wait for the leaving worker to finish
        timeout(Duration::from_secs(5), async {
            while dispatcher.active_connections() != 1 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker did not terminate");

        steady.write_all(b"answer-1.").await.unwrap();
        assert_eq!(read_response(&mut steady).await, "OK");

        handle.abort();
    }

    #[tokio::test]
    async fn test_connection_waits_in_backlog_for_slot() {
        let listener = bind_tcp("task", "127.0.0.1:0").await.unwrap();
        let dispatcher = Arc::new(TcpDispatcher::new(
            listener,
            counting_protocol(ReplyMode::Current),
            1024,
            1,
        ));
        let addr = dispatcher.local_addr().unwrap();
        let runner = Arc::clone(&dispatcher);
        let handle = tokio::spawn(async move { runner.run().await });

        let mut first = TcpStream::connect(addr).await.unwrap();
        first.write_all(b"task.").await.unwrap();
        assert_eq!(read_response(&mut first).await, "task-1");

        // The only slot is taken, so the second peer is not served yet
        let mut second = TcpStream::connect(addr).await.unwrap();
        second.write_all(b"task.").await.unwrap();
        let mut buf = [0u8; 64];
        let early = timeout(Duration::from_millis(200), second.read(&mut buf)).await;
        assert!(early.is_err(), "second connection served without a free slot");
        assert_eq!(dispatcher.active_connections(), 1);

        drop(first);
        assert_eq!(read_response(&mut second).await, "task-2");

        handle.abort();
    }
}
