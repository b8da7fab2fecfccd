//! In-memory channel mocks.
//!
//! [`MockControlChannel`] and [`MockDataChannel`] implement the channel
//! traits without sockets. They record every call so tests can assert on
//! exactly what the client did, and let the test play the receiver by
//! injecting bytes into the receive stream.
//!
//! # Example
//!
//! ```
//! use netsdr_core::ControlChannel;
//! use netsdr_test_harness::MockControlChannel;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let control = MockControlChannel::new();
//! control.connect().await?;
//! control.send(&[0x04, 0x00, 0x20, 0x00]).await?;
//! assert_eq!(control.sent(), vec![vec![0x04, 0x00, 0x20, 0x00]]);
//! # Ok(())
//! # }
//! ```

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use netsdr_core::channel::{ChannelEvent, ConnectStatus, ControlChannel, DataChannel};
use netsdr_core::error::{Error, Result};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A mock [`ControlChannel`].
///
/// By default every successful `send()` is echoed back on the receive
/// stream, which is how a NetSDR receiver acknowledges a set request.
/// Disable that with [`set_auto_ack`](Self::set_auto_ack) to script the
/// replies by hand.
#[derive(Debug)]
pub struct MockControlChannel {
    connected: AtomicBool,
    auto_ack: AtomicBool,
    fail_connect: AtomicBool,
    connect_calls: AtomicUsize,
    disconnect_calls: AtomicUsize,
    send_attempts: AtomicUsize,
    /// Log of every frame accepted by `send()`.
    sent_log: Mutex<Vec<Vec<u8>>>,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl MockControlChannel {
    /// Create a disconnected mock that acknowledges by echo.
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        MockControlChannel {
            connected: AtomicBool::new(false),
            auto_ack: AtomicBool::new(true),
            fail_connect: AtomicBool::new(false),
            connect_calls: AtomicUsize::new(0),
            disconnect_calls: AtomicUsize::new(0),
            send_attempts: AtomicUsize::new(0),
            sent_log: Mutex::new(Vec::new()),
            event_tx,
        }
    }

    /// Enable or disable echoing sent frames back as acknowledgements.
    pub fn set_auto_ack(&self, enable: bool) {
        self.auto_ack.store(enable, Ordering::SeqCst);
    }

    /// Make subsequent `connect()` calls fail with a transport error.
    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Every frame accepted by `send()`, in order.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Number of frames accepted by `send()`.
    pub fn sent_count(&self) -> usize {
        self.sent_log.lock().map(|log| log.len()).unwrap_or(0)
    }

    /// Number of `send()` calls, including ones rejected while disconnected.
    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    /// Number of `connect()` calls.
    pub fn connect_count(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    /// Number of `disconnect()` calls.
    pub fn disconnect_count(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }

    /// Deliver bytes as if the receiver had written them.
    pub fn inject(&self, data: &[u8]) {
        let _ = self
            .event_tx
            .send(ChannelEvent::Received(Bytes::copy_from_slice(data)));
    }

    /// Simulate the receiver closing the connection.
    pub fn close_from_peer(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.event_tx.send(ChannelEvent::Closed);
        }
    }
}

impl Default for MockControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ControlChannel for MockControlChannel {
    async fn connect(&self) -> Result<ConnectStatus> {
        self.connect_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Transport("mock connect failure".into()));
        }
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(ConnectStatus::AlreadyConnected);
        }
        Ok(ConnectStatus::Connected)
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);

        if !self.connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        if let Ok(mut log) = self.sent_log.lock() {
            log.push(data.to_vec());
        }
        if self.auto_ack.load(Ordering::SeqCst) {
            self.inject(data);
        }
        Ok(())
    }

    async fn disconnect(&self) {
        self.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            let _ = self.event_tx.send(ChannelEvent::Closed);
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.event_tx.subscribe()
    }
}

/// A mock [`DataChannel`] that counts start/stop calls.
#[derive(Debug)]
pub struct MockDataChannel {
    port: u16,
    listening: AtomicBool,
    fail_start: AtomicBool,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    event_tx: broadcast::Sender<ChannelEvent>,
}

impl MockDataChannel {
    /// Create a stopped mock reporting `port`.
    pub fn new(port: u16) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        MockDataChannel {
            port,
            listening: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            event_tx,
        }
    }

    /// Make subsequent `start_listening()` calls fail with a transport error.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Number of `start_listening()` calls.
    pub fn start_count(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of `stop_listening()` calls.
    pub fn stop_count(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Deliver a datagram. Dropped unless the mock is listening, as a real
    /// socket would.
    pub fn inject(&self, datagram: &[u8]) {
        if self.listening.load(Ordering::SeqCst) {
            let _ = self
                .event_tx
                .send(ChannelEvent::Received(Bytes::copy_from_slice(datagram)));
        }
    }
}

#[async_trait]
impl DataChannel for MockDataChannel {
    async fn start_listening(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Transport(format!(
                "mock bind failure on port {}",
                self.port
            )));
        }
        self.listening.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_listening(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.listening.swap(false, Ordering::SeqCst) {
            let _ = self.event_tx.send(ChannelEvent::Closed);
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

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn control_send_requires_connection() {
        let control = MockControlChannel::new();
        let result = control.send(&[0x02, 0x00]).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert_eq!(control.send_attempts(), 1);
        assert_eq!(control.sent_count(), 0);
    }

    #[tokio::test]
    async fn control_echoes_sent_frames() {
        let control = MockControlChannel::new();
        let mut events = control.subscribe();
        assert_eq!(control.connect().await.unwrap(), ConnectStatus::Connected);

        control.send(&[0x04, 0x00, 0x20, 0x00]).await.unwrap();
        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Received(Bytes::from_static(&[0x04, 0x00, 0x20, 0x00]))
        );
    }

    #[tokio::test]
    async fn control_connect_twice_reports_already_connected() {
        let control = MockControlChannel::new();
        control.connect().await.unwrap();
        assert_eq!(
            control.connect().await.unwrap(),
            ConnectStatus::AlreadyConnected
        );
        assert_eq!(control.connect_count(), 2);
    }

    #[tokio::test]
    async fn control_failed_connect_stays_disconnected() {
        let control = MockControlChannel::new();
        control.set_fail_connect(true);
        assert!(matches!(control.connect().await, Err(Error::Transport(_))));
        assert!(!control.is_connected());
    }

    #[tokio::test]
    async fn control_disconnect_emits_closed_once() {
        let control = MockControlChannel::new();
        let mut events = control.subscribe();
        control.connect().await.unwrap();

        control.disconnect().await;
        control.disconnect().await;

        assert_eq!(events.recv().await.unwrap(), ChannelEvent::Closed);
        assert!(events.try_recv().is_err());
        assert_eq!(control.disconnect_count(), 2);
    }

    #[tokio::test]
    async fn data_inject_only_while_listening() {
        let data = MockDataChannel::new(60000);
        let mut events = data.subscribe();

        data.inject(&[0x01]);
        data.start_listening().await.unwrap();
        data.inject(&[0x02]);

        assert_eq!(
            events.recv().await.unwrap(),
            ChannelEvent::Received(Bytes::from_static(&[0x02]))
        );
    }

    #[tokio::test]
    async fn data_counts_start_and_stop() {
        let data = MockDataChannel::new(60000);
        data.start_listening().await.unwrap();
        assert!(data.is_listening());
        data.stop_listening().await;
        data.stop_listening().await;

        assert!(!data.is_listening());
        assert_eq!(data.start_count(), 1);
        assert_eq!(data.stop_count(), 2);
        assert_eq!(data.port(), 60000);
    }
}
