//! Command framing for stream connections.
//!
//! A command is every byte up to the next terminator (`.`). The terminator
//! is consumed but not part of the command. Datagrams skip framing: a whole
//! payload is one command.

use bytes::{BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};

/// Byte that ends a command on the stream transport.
pub const TERMINATOR: u8 = b'.';

const READ_BUFFER_SIZE: usize = 4 * 1024;

/// Splits a byte stream into terminator-delimited commands.
pub struct CommandFramer<R> {
    reader: R,
    buffer: BytesMut,
    max_command_len: usize,
}

impl<R: AsyncRead + Unpin> CommandFramer<BufReader<R>> {
    pub fn new(reader: R, max_command_len: usize) -> Self {
        Self::from_buffered(
            BufReader::with_capacity(READ_BUFFER_SIZE, reader),
            max_command_len,
        )
    }
}

impl<R: AsyncBufRead + Unpin> CommandFramer<R> {
    pub fn from_buffered(reader: R, max_command_len: usize) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(64),
            max_command_len,
        }
    }

    /// Wait for the next complete command.
    ///
    /// Returns `Ok(None)` once the stream ends. Bytes left without a
    /// terminator at that point are discarded, never returned as a command.
    pub async fn next_command(&mut self) -> io::Result<Option<String>> {
        self.buffer.clear();

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if !self.buffer.is_empty() {
                    tracing::trace!(
                        discarded = self.buffer.len(),
                        "Stream ended inside a command"
                    );
                }
                return Ok(None);
            }

            let (consumed, complete) = match available.iter().position(|&b| b == TERMINATOR) {
                Some(pos) => {
                    self.buffer.put_slice(&available[..pos]);
                    (pos + 1, true)
                }
                None => {
                    self.buffer.put_slice(available);
                    (available.len(), false)
                }
            };
            self.reader.consume(consumed);

            if self.buffer.len() > self.max_command_len {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("command exceeds {} bytes", self.max_command_len),
                ));
            }

            if complete {
                return Ok(Some(String::from_utf8_lossy(&self.buffer).into_owned()));
            }
        }
    }
}
