//! Server wiring.
//!
//! Binds every configured endpoint up front, so a port that cannot be bound
//! aborts startup, then drives all dispatchers until shutdown is requested.

use crate::config::Config;
use crate::echo::EchoService;
use crate::error::ServerResult;
use crate::listener::{bind_tcp, bind_udp};
use crate::policy::{SentencePolicy, TaskPolicy};
use crate::protocol::{ReplyMode, TaskProtocol};
use crate::session::SessionStore;
use crate::tcp::TcpDispatcher;
use crate::udp::UdpDispatcher;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Server instance
pub struct Server {
    udp: UdpDispatcher,
    tcp: TcpDispatcher,
    echo: Option<EchoService>,
}

impl Server {
    /// Bind all endpoints using the built-in sentence policy.
    pub async fn bind(config: &Config) -> ServerResult<Self> {
        Self::bind_with_policy(config, Arc::new(SentencePolicy::new())).await
    }

    pub async fn bind_with_policy(
        config: &Config,
        policy: Arc<dyn TaskPolicy>,
    ) -> ServerResult<Self> {
        // Datagram clients always receive the task they are held to
        let udp = UdpDispatcher::new(
            bind_udp("task", &config.udp_listen).await?,
            Arc::new(SessionStore::new()),
            TaskProtocol::new(Arc::clone(&policy), ReplyMode::Current),
            config.max_datagram_size,
        );
        let tcp = TcpDispatcher::new(
            bind_tcp("task", &config.tcp_listen).await?,
            TaskProtocol::new(policy, config.reply_mode),
            config.max_command_len,
            config.max_connections,
        );
        let echo = match &config.echo_listen {
            Some(addr) => Some(EchoService::new(bind_udp("echo", addr).await?)),
            None => None,
        };

        Ok(Server { udp, tcp, echo })
    }

    pub fn udp_addr(&self) -> io::Result<SocketAddr> {
        self.udp.local_addr()
    }

    pub fn tcp_addr(&self) -> io::Result<SocketAddr> {
        self.tcp.local_addr()
    }

    pub fn echo_addr(&self) -> io::Result<Option<SocketAddr>> {
        self.echo.as_ref().map(EchoService::local_addr).transpose()
    }

    /// Serve until `shutdown` completes.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        let echo = async {
            match &self.echo {
                Some(service) => service.run().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = self.udp.run() => {}
            _ = self.tcp.run() => {}
            _ = echo => {}
            _ = shutdown => {
                info!("Shutdown requested");
            }
        }
    }
}
