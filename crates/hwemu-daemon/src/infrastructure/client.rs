//! Client side of the control protocol.
//!
//! A [`ControlClient`] owns one TCP connection to `hwemud` and exchanges
//! command/reply lines over it.  `hwemu-ctl` opens one per invocation; tests
//! keep one open across several commands.

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::application::control::{ControlError, Reply};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error on control connection: {0}")]
    Io(#[from] std::io::Error),

    /// The server closed the connection before replying.
    #[error("connection closed by server")]
    Closed,

    #[error(transparent)]
    Reply(#[from] ControlError),
}

/// One open control connection.
#[derive(Debug)]
pub struct ControlClient {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    /// Connects to the control server at `addr` (`host:port`).
    ///
    /// # Errors
    ///
    /// [`ClientError::Connect`] if the TCP connection cannot be established.
    pub async fn connect(addr: &str) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|source| ClientError::Connect {
                addr: addr.to_string(),
                source,
            })?;
        let (reader, writer) = stream.into_split();
        Ok(Self {
            lines: BufReader::new(reader).lines(),
            writer,
        })
    }

    /// Sends one command line and waits for its reply.
    ///
    /// An `err` reply is a successful exchange and is returned as
    /// [`Reply::Err`].
    ///
    /// # Errors
    ///
    /// I/O failures, a closed connection or an unparseable reply line.
    pub async fn send(&mut self, command: &str) -> Result<Reply, ClientError> {
        let command = command.trim();
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await?;

        let line = self.lines.next_line().await?.ok_or(ClientError::Closed)?;
        debug!("{command} -> {line}");
        Ok(line.parse()?)
    }
}

/// Connects, sends a single command and returns the reply.
///
/// # Errors
///
/// As [`ControlClient::connect`] and [`ControlClient::send`].
pub async fn send_command(addr: &str, command: &str) -> Result<Reply, ClientError> {
    ControlClient::connect(addr).await?.send(command).await
}
