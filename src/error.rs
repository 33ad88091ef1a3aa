//! Server error types.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {service} listener on {addr}: {source}")]
    Bind {
        service: &'static str,
        addr: String,
        source: io::Error,
    },

    #[error("No usable address for {service} listener: {addr}")]
    Resolve { service: &'static str, addr: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type ServerResult<T> = Result<T, ServerError>;
