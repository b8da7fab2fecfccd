//! Capability traits for the two NetSDR channels.
//!
//! A NetSDR receiver is driven over a split transport: a TCP
//! [`ControlChannel`] for commands and acknowledgements, and a UDP
//! [`DataChannel`] on which the receiver streams IQ samples. Both channels
//! run a background receive loop and publish what they read as
//! [`ChannelEvent`]s on a broadcast channel. Framing is not their concern;
//! they hand on raw byte chunks and datagrams.
//!
//! The client in `netsdr-client` only depends on these traits, so the
//! socket implementations in `netsdr-transport` and the in-memory mocks in
//! `netsdr-test-harness` are interchangeable.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::error::Result;

/// Notification published by a channel's receive loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Bytes from one completed read (TCP) or one datagram (UDP).
    ///
    /// A TCP chunk may hold a partial frame or several coalesced frames.
    Received(Bytes),

    /// The receive loop has terminated. Emitted exactly once per loop,
    /// whether it ended through cancellation, a closed stream, or an error.
    Closed,
}

/// Outcome of a successful [`ControlChannel::connect`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// A new connection was established and the receive loop started.
    Connected,
    /// The channel was already connected; nothing was changed.
    AlreadyConnected,
}

/// Connection-oriented command channel to the receiver.
///
/// Lifecycle: disconnected -> connecting -> connected -> disconnected.
/// Implementations must make `disconnect` idempotent and safe to call
/// concurrently.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Connect to the receiver and start the background receive loop.
    ///
    /// Connecting an already-connected channel is a no-op that returns
    /// [`ConnectStatus::AlreadyConnected`]. A failed attempt leaves the
    /// channel disconnected and may be retried.
    async fn connect(&self) -> Result<ConnectStatus>;

    /// Write raw bytes to the receiver.
    ///
    /// Returns [`Error::NotConnected`](crate::error::Error::NotConnected)
    /// when the channel is not connected.
    async fn send(&self, data: &[u8]) -> Result<()>;

    /// Cancel the receive loop and close the connection.
    ///
    /// Safe to call when never connected, already disconnected, or from
    /// several tasks at once.
    async fn disconnect(&self);

    /// Whether the channel currently holds a live connection.
    fn is_connected(&self) -> bool;

    /// Subscribe to receive-loop notifications.
    ///
    /// Only events published after subscribing are delivered.
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}

/// Connectionless sample channel bound to a fixed local port.
#[async_trait]
pub trait DataChannel: Send + Sync {
    /// Bind the local port and start the background receive loop.
    ///
    /// Starting a channel that is already listening is a no-op.
    async fn start_listening(&self) -> Result<()>;

    /// Cancel the receive loop if it is running.
    ///
    /// Safe to call when never started or already stopped, any number of
    /// times.
    async fn stop_listening(&self);

    /// Whether the receive loop is currently running.
    fn is_listening(&self) -> bool;

    /// The local port this channel was configured with.
    fn port(&self) -> u16;

    /// Subscribe to receive-loop notifications.
    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent>;
}
