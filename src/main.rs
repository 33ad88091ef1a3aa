//! task-server: hands out tasks and checks answers over UDP and TCP
//!
//! Protocol:
//! - A client asks for a task, the server replies with one
//! - The client answers, the server replies `ok` or `error`
//!
//! Transports:
//! - UDP: one datagram is one command, clients are told apart by address and port
//! - TCP: commands end with `.`, each connection is its own client
//!
//! Features:
//! - Optional uppercase echo endpoint on UDP
//! - Configuration via CLI arguments or TOML file

mod config;
mod echo;
mod error;
mod framer;
mod listener;
mod policy;
mod protocol;
mod server;
mod session;
mod tcp;
mod udp;

use config::Config;
use server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        udp = %config.udp_listen,
        tcp = %config.tcp_listen,
        max_datagram_size = config.max_datagram_size,
        max_command_len = config.max_command_len,
        workers = ?config.workers,
        "Starting task server"
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    if let Some(workers) = config.workers {
        builder.worker_threads(workers);
    }
    let runtime = builder.enable_all().build()?;

    runtime.block_on(async {
        let server = Server::bind(&config).await?;
        info!(
            udp = %server.udp_addr()?,
            tcp = %server.tcp_addr()?,
            echo = ?server.echo_addr()?,
            reply_mode = ?config.reply_mode,
            "Task server ready"
        );
        server.run(shutdown_signal()).await;
        Ok::<_, error::ServerError>(())
    })?;

    info!("Task server stopped");
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server runs until killed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
