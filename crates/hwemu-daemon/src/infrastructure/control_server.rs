//! TCP control server: accept loop and per-connection task management.
//!
//! Each connection speaks the line protocol of
//! [`application::control`](crate::application::control): one command per
//! line in, one reply per line out.  Connections run in their own Tokio task
//! so a slow client never blocks others.
//!
//! Shutdown is triggered by a shared `AtomicBool` cleared by the Ctrl+C
//! handler in `main.rs`; the accept loop re-checks it every 200 ms.  Open
//! connections end when their client disconnects or the runtime stops.
//!
//! Lines longer than [`MAX_LINE`] are discarded up to their newline and
//! answered with an `err 22` reply; the connection stays open.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use hwemu_core::Emulator;

use crate::application::control::{handle_line, ControlError, Reply, MAX_LINE};

/// Bound control listener plus the emulator it drives.
#[derive(Debug)]
pub struct ControlServer {
    listener: TcpListener,
    emulator: Arc<Emulator>,
}

impl ControlServer {
    /// Binds the control listener on `addr` (`host:port`).
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound (e.g. the port is in
    /// use or the address does not resolve).
    pub async fn bind(addr: &str, emulator: Arc<Emulator>) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind control listener on {addr}"))?;
        Ok(Self { listener, emulator })
    }

    /// Address actually bound; differs from the requested one for port `0`.
    ///
    /// # Errors
    ///
    /// Propagates the OS error from `getsockname`.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the accept loop until `running` is set to `false`.
    pub async fn serve(self, running: Arc<AtomicBool>) {
        match self.listener.local_addr() {
            Ok(addr) => info!("control server listening on {addr}"),
            Err(e) => warn!("control server listening on unknown address: {e}"),
        }

        loop {
            if !running.load(Ordering::Relaxed) {
                info!("shutdown flag set; stopping accept loop");
                break;
            }

            // A short timeout lets the loop notice the shutdown flag while idle.
            match timeout(Duration::from_millis(200), self.listener.accept()).await {
                Ok(Ok((stream, peer_addr))) => {
                    debug!("control connection from {peer_addr}");
                    let emulator = Arc::clone(&self.emulator);
                    tokio::spawn(async move {
                        handle_connection(stream, peer_addr, emulator).await;
                    });
                }
                Ok(Err(e)) => error!("accept error: {e}"),
                Err(_) => {}
            }
        }
    }
}

// ── Per-connection handler ────────────────────────────────────────────────────

/// Wraps [`run_connection`] and logs the outcome.
async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, emulator: Arc<Emulator>) {
    match run_connection(stream, &emulator).await {
        Ok(commands) => debug!("control connection {peer_addr} closed after {commands} command(s)"),
        Err(e) => warn!("control connection {peer_addr} closed with error: {e:#}"),
    }
}

/// Serves commands until the client closes its side.  Returns how many
/// commands were answered.
async fn run_connection(stream: TcpStream, emulator: &Emulator) -> anyhow::Result<usize> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut commands = 0;

    loop {
        let reply = match read_line(&mut reader, &mut buf).await.context("read failed")? {
            Incoming::Closed => break,
            Incoming::Line(line) if line.trim().is_empty() => continue,
            Incoming::Line(line) => handle_line(emulator, &line),
            Incoming::TooLong => {
                debug!("discarded control line longer than {MAX_LINE} bytes");
                Reply::from(ControlError::LineTooLong { max: MAX_LINE })
            }
        };
        writer
            .write_all(format!("{reply}\n").as_bytes())
            .await
            .context("write failed")?;
        commands += 1;
    }
    Ok(commands)
}

/// One read from a control connection.
#[derive(Debug, PartialEq, Eq)]
enum Incoming {
    Line(String),
    TooLong,
    Closed,
}

/// Reads one line of at most [`MAX_LINE`] bytes, without the `\n` or `\r\n`.
///
/// Bytes past the limit are consumed and dropped.  A final line without a
/// newline is still returned at end of stream.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Incoming>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut too_long = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if too_long {
                Incoming::TooLong
            } else if buf.is_empty() {
                Incoming::Closed
            } else {
                Incoming::Line(decode_line(buf))
            });
        }

        let newline = available.iter().position(|&b| b == b'\n');
        let chunk = &available[..newline.unwrap_or(available.len())];
        if !too_long {
            if buf.len() + chunk.len() > MAX_LINE {
                too_long = true;
                buf.clear();
            } else {
                buf.extend_from_slice(chunk);
            }
        }
        let used = newline.map_or(available.len(), |pos| pos + 1);
        reader.consume(used);

        if newline.is_some() {
            return Ok(if too_long {
                Incoming::TooLong
            } else {
                Incoming::Line(decode_line(buf))
            });
        }
    }
}

fn decode_line(buf: &[u8]) -> String {
    let line = buf.strip_suffix(b"\r").unwrap_or(buf);
    String::from_utf8_lossy(line).into_owned()
}
