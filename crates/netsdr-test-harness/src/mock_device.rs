//! Loopback mock NetSDR receiver.
//!
//! [`MockNetSdrDevice`] listens on a random localhost TCP port and
//! acknowledges every request the way a receiver acknowledges a set
//! request: by echoing it. It also owns a UDP socket so a test (or the demo
//! CLI) can push data-item datagrams at the client's data port.
//!
//! # Example
//!
//! ```
//! use netsdr_test_harness::MockNetSdrDevice;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let device = MockNetSdrDevice::start().await?;
//! let port = device.port();
//! // ... point a TcpControlChannel at 127.0.0.1:{port} ...
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::task::JoinHandle;

use netsdr_core::error::{Error, Result};

const READ_BUFFER_SIZE: usize = 8194;

/// A mock receiver serving one control connection at a time.
#[derive(Debug)]
pub struct MockNetSdrDevice {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<u8>>>,
    connections: Arc<AtomicUsize>,
    udp: UdpSocket,
    server_handle: JoinHandle<()>,
}

impl MockNetSdrDevice {
    /// Bind the control listener and data socket and start serving.
    pub async fn start() -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock device: {}", e)))?;
        let addr = listener.local_addr().map_err(Error::Io)?;

        let udp = UdpSocket::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::Transport(format!("failed to bind mock data socket: {}", e)))?;

        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));

        let server_handle = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&received),
            Arc::clone(&connections),
        ));

        tracing::debug!(addr = %addr, "Mock NetSDR device listening");

        Ok(Self {
            addr,
            received,
            connections,
            udp,
            server_handle,
        })
    }

    /// The control listener's address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The control listener's port.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every byte received on control connections so far, in order.
    pub fn received(&self) -> Vec<u8> {
        self.received
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Number of control connections accepted so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Send one datagram from the device's data socket to `target`.
    pub async fn send_datagram(&self, target: SocketAddr, datagram: &[u8]) -> Result<()> {
        self.udp
            .send_to(datagram, target)
            .await
            .map_err(|e| Error::Transport(format!("failed to send datagram to {}: {}", target, e)))?;
        Ok(())
    }

    /// Stop accepting and serving connections.
    pub fn shutdown(&self) {
        self.server_handle.abort();
    }
}

impl Drop for MockNetSdrDevice {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}

async fn accept_loop(
    listener: TcpListener,
    received: Arc<Mutex<Vec<u8>>>,
    connections: Arc<AtomicUsize>,
) {
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                tracing::warn!(error = %e, "Mock device accept failed");
                return;
            }
        };
        connections.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(peer = %peer, "Mock device accepted connection");

        serve(stream, &received).await;
        tracing::debug!(peer = %peer, "Mock device connection closed");
    }
}

/// Echo every chunk back until the client hangs up.
async fn serve(mut stream: TcpStream, received: &Mutex<Vec<u8>>) {
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };

        if let Ok(mut r) = received.lock() {
            r.extend_from_slice(&buf[..n]);
        }

        if stream.write_all(&buf[..n]).await.is_err() {
            return;
        }
    }
}
