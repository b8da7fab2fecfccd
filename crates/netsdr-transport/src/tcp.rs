//! TCP control channel.
//!
//! This module provides [`TcpControlChannel`], which implements the
//! [`ControlChannel`] trait over a tokio [`TcpStream`]. After a successful
//! connect a background task reads from the socket and publishes every
//! completed read as a [`ChannelEvent::Received`] chunk, followed by exactly
//! one [`ChannelEvent::Closed`] when the loop ends.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_core::{ChannelEvent, ControlChannel};
//! use netsdr_transport::TcpControlChannel;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let channel = TcpControlChannel::new("192.168.1.50", 50000);
//! let mut events = channel.subscribe();
//! channel.connect().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         ChannelEvent::Received(chunk) => println!("{} bytes", chunk.len()),
//!         ChannelEvent::Closed => break,
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use netsdr_core::channel::{ChannelEvent, ConnectStatus, ControlChannel};
use netsdr_core::error::{Error, Result};

use crate::{EVENT_CHANNEL_CAPACITY, RECV_BUFFER_SIZE};

/// Default connection timeout (5 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A live connection: the write half plus the task reading the other half.
///
/// The writer has its own lock so a send stalled on a full socket buffer
/// never blocks `disconnect`; cancelling the token aborts the stalled write.
#[derive(Debug)]
struct Connection {
    writer: Arc<Mutex<OwnedWriteHalf>>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Connection {
    /// Cancel the receive loop and any in-flight write, shut the socket
    /// down and wait for the loop to publish its `Closed` event.
    async fn close(self, addr: &str) {
        self.cancel.cancel();

        if let Err(e) = self.writer.lock().await.shutdown().await {
            tracing::warn!(
                addr = %addr,
                error = %e,
                "Failed to shutdown TCP stream (continuing anyway)"
            );
        }

        if let Err(e) = self.task.await {
            tracing::warn!(addr = %addr, error = %e, "TCP receive loop ended abnormally");
        }
    }
}

/// TCP implementation of [`ControlChannel`].
///
/// Host and port are fixed at construction; the connection itself is made
/// lazily by [`connect`](ControlChannel::connect) and may be re-established
/// after a disconnect.
#[derive(Debug)]
pub struct TcpControlChannel {
    /// `host:port` string, used for connecting and logging.
    addr: String,
    connect_timeout: Duration,
    /// The current connection, `None` when disconnected.
    conn: Mutex<Option<Connection>>,
    /// Cleared by the receive loop when it exits.
    connected: Arc<AtomicBool>,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl TcpControlChannel {
    /// Create a channel for `host:port`. No connection is made yet.
    pub fn new(host: &str, port: u16) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            addr: format!("{}:{}", host, port),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            conn: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
            event_tx,
        }
    }

    /// Override the connection timeout (default 5 seconds).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Get the address string this channel connects to.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait]
impl ControlChannel for TcpControlChannel {
    async fn connect(&self) -> Result<ConnectStatus> {
        let mut conn = self.conn.lock().await;

        if self.connected.load(Ordering::SeqCst) {
            tracing::info!(addr = %self.addr, "Already connected");
            return Ok(ConnectStatus::AlreadyConnected);
        }

        // The receiver hung up on the previous connection; reap it first.
        if let Some(stale) = conn.take() {
            stale.close(&self.addr).await;
        }

        tracing::debug!(
            addr = %self.addr,
            timeout_ms = self.connect_timeout.as_millis(),
            "Connecting to TCP endpoint"
        );

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| {
                tracing::error!(addr = %self.addr, "TCP connection timed out");
                Error::Timeout
            })?
            .map_err(|e| {
                tracing::error!(addr = %self.addr, error = %e, "TCP connection failed");
                map_connect_error(e, &self.addr)
            })?;

        // Control frames are small and latency-sensitive.
        if let Err(e) = stream.set_nodelay(true) {
            tracing::warn!(
                addr = %self.addr,
                error = %e,
                "Failed to set TCP_NODELAY (continuing anyway)"
            );
        }

        let (reader, writer) = stream.into_split();
        let cancel = CancellationToken::new();

        self.connected.store(true, Ordering::SeqCst);
        let task = tokio::spawn(read_loop(
            reader,
            self.addr.clone(),
            cancel.clone(),
            Arc::clone(&self.connected),
            self.event_tx.clone(),
        ));

        *conn = Some(Connection {
            writer: Arc::new(Mutex::new(writer)),
            cancel,
            task,
        });

        tracing::info!(addr = %self.addr, "TCP connection established");
        Ok(ConnectStatus::Connected)
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        // Hold the connection slot only long enough to grab the writer.
        let (write_half, cancel) = {
            let conn = self.conn.lock().await;
            if !self.connected.load(Ordering::SeqCst) {
                return Err(Error::NotConnected);
            }
            let connection = conn.as_ref().ok_or(Error::NotConnected)?;
            (Arc::clone(&connection.writer), connection.cancel.clone())
        };

        tracing::trace!(
            addr = %self.addr,
            bytes = data.len(),
            data = ?data,
            "Sending data"
        );

        let mut writer = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::ConnectionLost),
            guard = write_half.lock() => guard,
        };

        let write = async {
            writer.write_all(data).await?;
            writer.flush().await
        };

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(addr = %self.addr, "Send aborted by disconnect");
                Err(Error::ConnectionLost)
            }

            result = write => result.map_err(|e| {
                tracing::error!(addr = %self.addr, error = %e, "Failed to send data");
                map_io_error(e)
            }),
        }
    }

    async fn disconnect(&self) {
        // Take the connection under the lock so concurrent callers cannot
        // both tear it down.
        let taken = self.conn.lock().await.take();

        match taken {
            Some(connection) => {
                tracing::debug!(addr = %self.addr, "Closing TCP connection");
                connection.close(&self.addr).await;
                self.connected.store(false, Ordering::SeqCst);
                tracing::info!(addr = %self.addr, "TCP connection closed");
            }
            None => {
                tracing::debug!(addr = %self.addr, "No active connection to disconnect");
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }
}

impl Drop for TcpControlChannel {
    fn drop(&mut self) {
        if let Some(connection) = self.conn.get_mut().take() {
            tracing::debug!(addr = %self.addr, "TcpControlChannel dropped, closing connection");
            connection.cancel.cancel();
        }
    }
}

/// Background task: publish every read until cancelled or the stream ends.
async fn read_loop(
    mut reader: OwnedReadHalf,
    addr: String,
    cancel: CancellationToken,
    connected: Arc<AtomicBool>,
    event_tx: broadcast::Sender<ChannelEvent>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(addr = %addr, "TCP receive loop cancelled");
                break;
            }

            result = reader.read(&mut buf) => match result {
                Ok(0) => {
                    tracing::warn!(addr = %addr, "Peer closed connection (0 bytes read)");
                    break;
                }
                Ok(n) => {
                    tracing::trace!(addr = %addr, bytes = n, data = ?&buf[..n], "Received data");
                    let _ = event_tx.send(ChannelEvent::Received(Bytes::copy_from_slice(&buf[..n])));
                }
                Err(e) => {
                    tracing::error!(addr = %addr, error = %e, "Failed to receive data");
                    break;
                }
            },
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = event_tx.send(ChannelEvent::Closed);
    tracing::debug!(addr = %addr, "TCP receive loop stopped");
}

/// Map a connection-time I/O error to the appropriate [`Error`] variant.
fn map_connect_error(e: std::io::Error, addr: &str) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionRefused => {
            Error::Transport(format!("connection refused: {}", addr))
        }
        _ => Error::Io(e),
    }
}

/// Map a data-path I/O error to the appropriate [`Error`] variant.
fn map_io_error(e: std::io::Error) -> Error {
    match e.kind() {
        std::io::ErrorKind::ConnectionReset
        | std::io::ErrorKind::BrokenPipe
        | std::io::ErrorKind::NotConnected
        | std::io::ErrorKind::ConnectionAborted => Error::ConnectionLost,
        _ => Error::Io(e),
    }
}
