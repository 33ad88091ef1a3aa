//! Listening socket setup.
//!
//! Both transports bind through socket2 so `SO_REUSEADDR` is set before
//! `bind`, letting a restarted server reclaim its ports immediately.

use crate::error::{ServerError, ServerResult};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpListener, UdpSocket};
use tracing::info;

/// Pending connection queue length
const LISTEN_BACKLOG: i32 = 1024;

/// Bind a UDP socket for `service` on `addr`.
pub async fn bind_udp(service: &'static str, addr: &str) -> ServerResult<UdpSocket> {
    let resolved = resolve(service, addr).await?;
    let socket = udp_socket(resolved)
        .and_then(UdpSocket::from_std)
        .map_err(|source| bind_error(service, addr, source))?;
    info!(service, address = %socket.local_addr()?, "UDP listener bound");
    Ok(socket)
}

/// Bind a TCP listener for `service` on `addr`.
pub async fn bind_tcp(service: &'static str, addr: &str) -> ServerResult<TcpListener> {
    let resolved = resolve(service, addr).await?;
    let listener = tcp_listener(resolved)
        .and_then(TcpListener::from_std)
        .map_err(|source| bind_error(service, addr, source))?;
    info!(service, address = %listener.local_addr()?, "TCP listener bound");
    Ok(listener)
}

async fn resolve(service: &'static str, addr: &str) -> ServerResult<SocketAddr> {
    lookup_host(addr)
        .await
        .map_err(|source| bind_error(service, addr, source))?
        .next()
        .ok_or_else(|| ServerError::Resolve {
            service,
            addr: addr.to_string(),
        })
}

fn bind_error(service: &'static str, addr: &str, source: io::Error) -> ServerError {
    ServerError::Bind {
        service,
        addr: addr.to_string(),
        source,
    }
}

fn domain(addr: SocketAddr) -> Domain {
    match addr {
        SocketAddr::V4(_) => Domain::IPV4,
        SocketAddr::V6(_) => Domain::IPV6,
    }
}

fn udp_socket(addr: SocketAddr) -> io::Result<std::net::UdpSocket> {
    let socket = Socket::new(domain(addr), Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

fn tcp_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = Socket::new(domain(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bind_ephemeral_ports() {
        let udp = bind_udp("test", "127.0.0.1:0").await.unwrap();
        let tcp = bind_tcp("test", "127.0.0.1:0").await.unwrap();
        assert_ne!(udp.local_addr().unwrap().port(), 0);
        assert_ne!(tcp.local_addr().unwrap().port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let first = bind_tcp("test", "127.0.0.1:0").await.unwrap();
        let taken = first.local_addr().unwrap().to_string();

        match bind_tcp("test", &taken).await {
            Err(ServerError::Bind { service, addr, .. }) => {
                assert_eq!(service, "test");
                assert_eq!(addr, taken);
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_bad_address() {
        assert!(bind_udp("test", "not an address").await.is_err());
    }
}
