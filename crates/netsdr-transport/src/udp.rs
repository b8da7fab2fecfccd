//! UDP data channel.
//!
//! This module provides [`UdpDataChannel`], which implements the
//! [`DataChannel`] trait over a tokio [`UdpSocket`]. The receiver streams
//! IQ data items to a fixed local port; while listening, a background task
//! publishes each datagram as one [`ChannelEvent::Received`].
//!
//! Two channels compare equal (and hash alike) when they are configured for
//! the same port, which makes them convenient to keep in sets and maps for
//! diagnostics.

use std::hash::{Hash, Hasher};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use netsdr_core::channel::{ChannelEvent, DataChannel};
use netsdr_core::error::{Error, Result};

use crate::{EVENT_CHANNEL_CAPACITY, RECV_BUFFER_SIZE};

/// A running receive loop and the socket address it is bound to.
#[derive(Debug)]
struct Listener {
    local_addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// UDP implementation of [`DataChannel`].
#[derive(Debug)]
pub struct UdpDataChannel {
    bind_ip: IpAddr,
    port: u16,
    listener: Mutex<Option<Listener>>,
    listening: Arc<AtomicBool>,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl UdpDataChannel {
    /// Create a channel that will listen on `port` on all interfaces.
    ///
    /// Port 0 lets the OS pick a port when listening starts; see
    /// [`local_addr`](Self::local_addr).
    pub fn new(port: u16) -> Self {
        Self::with_bind_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
    }

    /// Create a channel that will listen on `port` on a specific interface.
    pub fn with_bind_ip(bind_ip: IpAddr, port: u16) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            bind_ip,
            port,
            listener: Mutex::new(None),
            listening: Arc::new(AtomicBool::new(false)),
            event_tx,
        }
    }

    /// The address the socket is bound to while listening.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.lock().await.as_ref().map(|l| l.local_addr)
    }
}

#[async_trait]
impl DataChannel for UdpDataChannel {
    async fn start_listening(&self) -> Result<()> {
        let mut listener = self.listener.lock().await;

        if listener.is_some() {
            tracing::debug!(port = self.port, "UDP listener already running");
            return Ok(());
        }

        let bind_addr = SocketAddr::new(self.bind_ip, self.port);
        tracing::debug!(addr = %bind_addr, "Binding UDP socket");

        let socket = UdpSocket::bind(bind_addr).await.map_err(|e| {
            tracing::error!(addr = %bind_addr, error = %e, "Failed to bind UDP socket");
            Error::Transport(format!("failed to bind UDP socket on {}: {}", bind_addr, e))
        })?;
        let local_addr = socket.local_addr().map_err(|e| {
            tracing::error!(error = %e, "Failed to get local address");
            Error::Io(e)
        })?;

        let cancel = CancellationToken::new();
        self.listening.store(true, Ordering::SeqCst);
        let task = tokio::spawn(recv_loop(
            socket,
            cancel.clone(),
            Arc::clone(&self.listening),
            self.event_tx.clone(),
        ));

        *listener = Some(Listener {
            local_addr,
            cancel,
            task,
        });

        tracing::info!(local_addr = %local_addr, "UDP listener started");
        Ok(())
    }

    async fn stop_listening(&self) {
        let taken = self.listener.lock().await.take();

        match taken {
            Some(listener) => {
                listener.cancel.cancel();
                if let Err(e) = listener.task.await {
                    tracing::warn!(
                        local_addr = %listener.local_addr,
                        error = %e,
                        "UDP receive loop ended abnormally"
                    );
                }
                self.listening.store(false, Ordering::SeqCst);
                tracing::info!(local_addr = %listener.local_addr, "UDP listener stopped");
            }
            None => {
                tracing::debug!(port = self.port, "UDP listener not running");
            }
        }
    }

    fn is_listening(&self) -> bool {
        self.listening.load(Ordering::SeqCst)
    }

    fn port(&self) -> u16 {
        self.port
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }
}

impl PartialEq for UdpDataChannel {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port
    }
}

impl Eq for UdpDataChannel {}

impl Hash for UdpDataChannel {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.port.hash(state);
    }
}

impl Drop for UdpDataChannel {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.cancel.cancel();
        }
    }
}

/// Background task: publish every datagram until cancelled.
async fn recv_loop(
    socket: UdpSocket,
    cancel: CancellationToken,
    listening: Arc<AtomicBool>,
    event_tx: broadcast::Sender<ChannelEvent>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,

            result = socket.recv_from(&mut buf) => match result {
                Ok((n, src)) => {
                    tracing::trace!(remote = %src, bytes = n, "Received datagram");
                    let _ = event_tx.send(ChannelEvent::Received(Bytes::copy_from_slice(&buf[..n])));
                }
                Err(e) => {
                    // Non-fatal for UDP -- just continue.
                    tracing::trace!(error = %e, "UDP recv error");
                }
            },
        }
    }

    listening.store(false, Ordering::SeqCst);
    let _ = event_tx.send(ChannelEvent::Closed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    /// Start a loopback channel on an OS-assigned port and return it with
    /// its bound address.
    async fn loopback_channel() -> (UdpDataChannel, SocketAddr) {
        let channel = UdpDataChannel::with_bind_ip(IpAddr::V4(Ipv4Addr::LOCALHOST), 0);
        channel.start_listening().await.unwrap();
        let addr = channel.local_addr().await.unwrap();
        (channel, addr)
    }

    async fn next_event(rx: &mut broadcast::Receiver<ChannelEvent>) -> ChannelEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for channel event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn receives_datagrams_in_order() {
        let (channel, addr) = loopback_channel().await;
        let mut events = channel.subscribe();
        assert!(channel.is_listening());
        assert_ne!(addr.port(), 0, "OS should assign a nonzero port");

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        for msg in [&b"one"[..], b"two", b"three"] {
            sender.send_to(msg, addr).await.unwrap();
        }

        for expected in [&b"one"[..], b"two", b"three"] {
            assert_eq!(
                next_event(&mut events).await,
                ChannelEvent::Received(Bytes::copy_from_slice(expected))
            );
        }

        channel.stop_listening().await;
    }

    #[tokio::test]
    async fn stop_cancels_loop_promptly() {
        let (channel, _addr) = loopback_channel().await;
        let mut events = channel.subscribe();

        tokio::time::timeout(Duration::from_secs(2), channel.stop_listening())
            .await
            .expect("stop_listening should not hang");

        assert!(!channel.is_listening());
        assert_eq!(next_event(&mut events).await, ChannelEvent::Closed);
        assert!(channel.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn stop_when_not_started_is_noop() {
        let channel = UdpDataChannel::new(0);
        channel.stop_listening().await;
        channel.stop_listening().await;
        channel.stop_listening().await;
        assert!(!channel.is_listening());
    }

    #[tokio::test]
    async fn start_twice_keeps_one_listener() {
        let (channel, addr) = loopback_channel().await;
        channel.start_listening().await.unwrap();
        assert_eq!(channel.local_addr().await, Some(addr));
        channel.stop_listening().await;
    }

    #[tokio::test]
    async fn restart_after_stop() {
        let (channel, _addr) = loopback_channel().await;
        channel.stop_listening().await;
        assert!(!channel.is_listening());

        channel.start_listening().await.unwrap();
        assert!(channel.is_listening());
        channel.stop_listening().await;
    }

    #[tokio::test]
    async fn bind_conflict_reports_transport_error() {
        let (first, addr) = loopback_channel().await;
        let second = UdpDataChannel::with_bind_ip(addr.ip(), addr.port());

        let result = second.start_listening().await;
        assert!(
            matches!(result, Err(Error::Transport(_))),
            "expected Transport error, got: {:?}",
            result
        );
        assert!(!second.is_listening());

        first.stop_listening().await;
    }

    #[test]
    fn equality_and_hash_follow_port() {
        let a = UdpDataChannel::new(60006);
        let b = UdpDataChannel::new(60006);
        let c = UdpDataChannel::new(60007);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.port(), 60006);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        set.insert(c);
        assert_eq!(set.len(), 2);
    }
}
