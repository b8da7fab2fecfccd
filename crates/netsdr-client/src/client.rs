//! NetSDR client orchestrator.
//!
//! [`NetSdrClient`] owns a [`ControlChannel`] and a [`DataChannel`] and
//! drives the receiver through its connect / configure / stream /
//! disconnect cycle. Two background router tasks turn channel events into
//! something useful:
//!
//! - the control router reassembles frames from the TCP byte stream,
//!   completes the request waiting for an acknowledgement, and publishes
//!   [`ClientEvent::ControlResponse`] / [`ClientEvent::Nak`];
//! - the data router decodes each datagram, extracts its samples at the
//!   configured width, and hands them to the [`SampleSink`].
//!
//! Malformed frames are dropped with a `warn` diagnostic; neither router
//! ever stops because of bad input.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast, oneshot};
use tokio::task::JoinHandle;

use netsdr_core::channel::{ChannelEvent, ConnectStatus, ControlChannel, DataChannel};
use netsdr_core::error::{Error, Result};
use netsdr_core::events::{ClientEvent, ControlResponse};
use netsdr_core::sink::{IqBuffer, SampleSink};
use netsdr_core::state::{ConnectionState, SharedState};

use crate::codec::{FrameAssembler, decode_frame, extract_samples};
use crate::commands;

/// Broadcast channel capacity for ClientEvent subscribers.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Settings fixed when the client is built.
#[derive(Debug, Clone)]
pub(crate) struct ClientConfig {
    pub sample_rate: u32,
    pub sample_width: u16,
    pub response_timeout: Option<Duration>,
}

/// A request waiting for its acknowledgement.
///
/// The receiver acknowledges a request by echoing it, so only a frame with
/// the same control item code (or a NAK) completes it. A late echo of an
/// earlier request for the same item is still indistinguishable.
struct PendingRequest {
    code: Option<i16>,
    tx: oneshot::Sender<ControlResponse>,
}

/// State shared between the client and its router tasks.
struct Shared {
    state: SharedState,
    data: Arc<dyn DataChannel>,
    sink: Option<Arc<dyn SampleSink>>,
    sample_width: u16,
    event_tx: broadcast::Sender<ClientEvent>,

    /// The request waiting for its acknowledgement, if any.
    pending: Mutex<Option<PendingRequest>>,

    /// Set once the control connection's receive loop has ended.
    peer_closed: AtomicBool,

    /// Background data router task handle.
    data_router: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn emit(&self, event: ClientEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Stop the data channel and its router.
    async fn stop_data(&self) {
        self.data.stop_listening().await;
        if let Some(handle) = self.data_router.lock().await.take() {
            handle.abort();
        }
    }

    async fn dispatch_control(&self, frame: &[u8]) {
        let decoded = match decode_frame(frame) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, bytes = frame.len(), "Dropping malformed control frame");
                return;
            }
        };

        let response = ControlResponse {
            msg_type: decoded.msg_type,
            code: decoded.code,
            body: Bytes::copy_from_slice(decoded.body),
        };

        if decoded.is_nak() {
            tracing::debug!("Receiver sent NAK");
            self.emit(ClientEvent::Nak);
        } else {
            tracing::trace!(
                msg_type = %response.msg_type,
                code = ?response.code,
                body_len = response.body.len(),
                "Control frame received"
            );
            self.emit(ClientEvent::ControlResponse(response.clone()));
        }

        let mut pending = self.pending.lock().await;
        let answers = pending
            .as_ref()
            .is_some_and(|p| decoded.is_nak() || p.code.is_none() || p.code == response.code);

        if answers {
            if let Some(request) = pending.take() {
                let _ = request.tx.send(response);
            }
        } else if let Some(request) = pending.as_ref() {
            tracing::trace!(
                expected = ?request.code,
                code = ?response.code,
                "Unsolicited control frame while a request is pending"
            );
        }
    }

    fn dispatch_datagram(&self, datagram: &[u8]) {
        let frame = match decode_frame(datagram) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, bytes = datagram.len(), "Dropping malformed datagram");
                return;
            }
        };

        if !frame.msg_type.is_data_item() {
            tracing::debug!(msg_type = %frame.msg_type, "Ignoring non-data frame on data channel");
            return;
        }

        let samples = match extract_samples(self.sample_width, frame.body) {
            Ok(s) => s.collect::<Vec<i32>>(),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping data item");
                return;
            }
        };

        tracing::trace!(
            msg_type = %frame.msg_type,
            samples = samples.len(),
            "Data item received"
        );

        if let Some(sink) = &self.sink {
            sink.deliver(IqBuffer {
                msg_type: frame.msg_type,
                sample_width: self.sample_width,
                samples,
            });
        }
    }

    /// The control channel's receive loop ended without us asking.
    async fn handle_peer_close(&self) {
        self.peer_closed.store(true, Ordering::SeqCst);
        // Wake a request still waiting, including one sent by `connect`.
        self.pending.lock().await.take();

        let previous = self.state.replace(ConnectionState::Disconnected);
        if !previous.is_connected() {
            return;
        }

        tracing::info!(state = %previous, "Receiver closed the control connection");
        if previous.is_streaming() {
            self.stop_data().await;
        }
        self.emit(ClientEvent::Disconnected);
    }
}

/// Async client for a NetSDR receiver.
///
/// All operations take `&self`; share the client across tasks with an
/// `Arc`. State-changing operations are serialized internally.
///
/// Build one with [`NetSdrClientBuilder`](crate::NetSdrClientBuilder).
pub struct NetSdrClient {
    control: Arc<dyn ControlChannel>,
    shared: Arc<Shared>,

    /// Background control router task handle.
    control_router: Mutex<Option<JoinHandle<()>>>,

    /// Serializes connect/disconnect/start/stop/frequency operations so
    /// only one request waits for a response at a time.
    op_lock: Mutex<()>,

    sample_rate: u32,
    response_timeout: Option<Duration>,
}

impl NetSdrClient {
    pub(crate) fn new(
        config: ClientConfig,
        control: Arc<dyn ControlChannel>,
        data: Arc<dyn DataChannel>,
        sink: Option<Arc<dyn SampleSink>>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        NetSdrClient {
            control,
            shared: Arc::new(Shared {
                state: SharedState::new(),
                data,
                sink,
                sample_width: config.sample_width,
                event_tx,
                pending: Mutex::new(None),
                peer_closed: AtomicBool::new(false),
                data_router: Mutex::new(None),
            }),
            control_router: Mutex::new(None),
            op_lock: Mutex::new(()),
            sample_rate: config.sample_rate,
            response_timeout: config.response_timeout,
        }
    }

    /// Connect to the receiver and send the initialization sequence.
    ///
    /// Does nothing if already connected. On failure the client is left
    /// disconnected and the call may be retried.
    pub async fn connect(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;

        if self.shared.state.get().is_connected() {
            tracing::debug!("Already connected, ignoring connect");
            return Ok(());
        }

        // Subscribe before connecting so no early frame is missed.
        let events = self.control.subscribe();
        if self.control.connect().await? == ConnectStatus::AlreadyConnected {
            tracing::debug!("Control channel was already connected");
        }

        self.shared.peer_closed.store(false, Ordering::SeqCst);
        let router = tokio::spawn(control_router(events, Arc::clone(&self.shared)));
        if let Some(old) = self.control_router.lock().await.replace(router) {
            old.abort();
        }

        if let Err(e) = self.initialize().await {
            tracing::warn!(error = %e, "Initialization failed, disconnecting");
            self.abort_control_router().await;
            self.control.disconnect().await;
            return Err(e);
        }

        self.shared.state.replace(ConnectionState::Connected);
        if self.shared.peer_closed.load(Ordering::SeqCst) {
            // The receiver hung up before the state changed, so the router
            // saw nothing to tear down.
            self.shared.state.replace(ConnectionState::Disconnected);
            tracing::warn!("Receiver closed the connection during initialization");
            self.abort_control_router().await;
            self.control.disconnect().await;
            return Err(Error::ConnectionLost);
        }
        self.shared.emit(ClientEvent::Connected);
        tracing::info!(sample_rate = self.sample_rate, "NetSDR client connected");
        Ok(())
    }

    async fn initialize(&self) -> Result<()> {
        for frame in commands::init_sequence(self.sample_rate)? {
            self.send_request(&frame).await?;
        }
        Ok(())
    }

    /// Disconnect from the receiver, stopping the IQ stream if it runs.
    ///
    /// Safe to call in any state, any number of times.
    pub async fn disconnect(&self) {
        let _op = self.op_lock.lock().await;

        let previous = self.shared.state.replace(ConnectionState::Disconnected);
        tracing::debug!(state = %previous, "Disconnecting");

        self.abort_control_router().await;
        self.control.disconnect().await;

        if previous.is_streaming() {
            self.shared.stop_data().await;
        }
        self.shared.pending.lock().await.take();

        if previous.is_connected() {
            self.shared.emit(ClientEvent::Disconnected);
            tracing::info!("NetSDR client disconnected");
        }
    }

    /// Ask the receiver to start streaming IQ data and start listening for
    /// it.
    ///
    /// Does nothing while disconnected. While already streaming the start
    /// request is sent again, but the data channel is left as it is.
    pub async fn start_iq(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;

        let state = self.shared.state.get();
        if !state.is_connected() {
            tracing::debug!("Not connected, ignoring start_iq");
            return Ok(());
        }

        let frame = commands::cmd_start_iq(self.shared.sample_width)?;
        self.send_request(&frame).await?;

        if state.is_streaming() {
            return Ok(());
        }

        let events = self.shared.data.subscribe();
        let router = tokio::spawn(data_router(events, Arc::clone(&self.shared)));

        if let Err(e) = self.shared.data.start_listening().await {
            router.abort();
            return Err(e);
        }
        if let Some(old) = self.shared.data_router.lock().await.replace(router) {
            old.abort();
        }

        if self
            .shared
            .state
            .transition(ConnectionState::Connected, ConnectionState::Streaming)
        {
            self.shared.emit(ClientEvent::IqStarted);
            tracing::info!(
                port = self.shared.data.port(),
                sample_width = self.shared.sample_width,
                "IQ streaming started"
            );
        } else {
            // The receiver hung up while we were starting.
            self.shared.stop_data().await;
        }
        Ok(())
    }

    /// Ask the receiver to stop streaming and stop listening.
    ///
    /// Does nothing unless streaming. The data channel is stopped even if
    /// the stop request cannot be sent; the send error is then returned.
    pub async fn stop_iq(&self) -> Result<()> {
        let _op = self.op_lock.lock().await;

        if !self.shared.state.get().is_streaming() {
            tracing::debug!("Not streaming, ignoring stop_iq");
            return Ok(());
        }

        let sent = match commands::cmd_stop_iq() {
            Ok(frame) => self.send_request(&frame).await,
            Err(e) => Err(e),
        };

        self.shared.stop_data().await;
        if self
            .shared
            .state
            .transition(ConnectionState::Streaming, ConnectionState::Connected)
        {
            self.shared.emit(ClientEvent::IqStopped);
            tracing::info!("IQ streaming stopped");
        }
        sent
    }

    /// Tune `channel` to `freq_hz`.
    ///
    /// The request is always attempted, connected or not. A failed send is
    /// logged and absorbed; only a frequency that cannot be encoded is an
    /// error.
    pub async fn change_frequency(&self, freq_hz: u64, channel: u8) -> Result<()> {
        let frame = commands::cmd_set_frequency(freq_hz, channel)?;
        let _op = self.op_lock.lock().await;

        match self.send_request(&frame).await {
            Ok(()) => tracing::debug!(freq_hz, channel, "Frequency set"),
            Err(e) => tracing::warn!(freq_hz, channel, error = %e, "Frequency change not sent"),
        }
        Ok(())
    }

    /// Whether the client is connected (streaming or not).
    pub fn is_connected(&self) -> bool {
        self.shared.state.get().is_connected()
    }

    /// Whether IQ streaming is active.
    pub fn iq_started(&self) -> bool {
        self.shared.state.get().is_streaming()
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    /// Configured IQ sample width in bits.
    pub fn sample_width(&self) -> u16 {
        self.shared.sample_width
    }

    /// Configured IQ output sample rate in hertz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the event broadcast receiver.
    ///
    /// Multiple subscribers can be created; each gets an independent copy
    /// of every event.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.event_tx.subscribe()
    }

    /// Send one control request and, if configured, wait for its
    /// acknowledgement. A missing response is logged, not returned; losing
    /// the connection while waiting is.
    async fn send_request(&self, frame: &[u8]) -> Result<()> {
        let Some(timeout) = self.response_timeout else {
            return self.control.send(frame).await;
        };

        let code = decode_frame(frame)?.code;
        let (tx, rx) = oneshot::channel();
        *self.shared.pending.lock().await = Some(PendingRequest { code, tx });

        if let Err(e) = self.control.send(frame).await {
            self.shared.pending.lock().await.take();
            return Err(e);
        }
        tracing::trace!(bytes = frame.len(), "Request sent");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                tracing::trace!(code = ?response.code, "Response received");
            }
            Ok(Err(_)) => {
                tracing::debug!("Connection closed while waiting for a response");
                return Err(Error::ConnectionLost);
            }
            Err(_) => {
                self.shared.pending.lock().await.take();
                tracing::warn!(timeout = ?timeout, "No response from receiver");
            }
        }
        Ok(())
    }

    async fn abort_control_router(&self) {
        if let Some(handle) = self.control_router.lock().await.take() {
            handle.abort();
        }
    }
}

impl Drop for NetSdrClient {
    fn drop(&mut self) {
        if let Some(handle) = self.control_router.get_mut().take() {
            handle.abort();
        }
        if let Ok(mut router) = self.shared.data_router.try_lock() {
            if let Some(handle) = router.take() {
                handle.abort();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Router tasks
// ---------------------------------------------------------------------------

/// Background task: reassemble and dispatch control frames until the
/// channel's receive loop ends.
async fn control_router(mut events: broadcast::Receiver<ChannelEvent>, shared: Arc<Shared>) {
    let mut assembler = FrameAssembler::new();

    loop {
        match events.recv().await {
            Ok(ChannelEvent::Received(chunk)) => {
                assembler.push(&chunk);
                while let Some(frame) = assembler.next_frame() {
                    shared.dispatch_control(&frame).await;
                }
            }
            Ok(ChannelEvent::Closed) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Control router lagged, frames lost");
            }
        }
    }

    shared.handle_peer_close().await;
}

/// Background task: extract samples from every data item until the data
/// channel stops.
async fn data_router(mut events: broadcast::Receiver<ChannelEvent>, shared: Arc<Shared>) {
    loop {
        match events.recv().await {
            Ok(ChannelEvent::Received(datagram)) => shared.dispatch_datagram(&datagram),
            Ok(ChannelEvent::Closed) | Err(RecvError::Closed) => break,
            Err(RecvError::Lagged(n)) => {
                tracing::warn!(skipped = n, "Data router lagged, datagrams lost");
            }
        }
    }
    tracing::debug!("Data router stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NetSdrClientBuilder;
    use crate::codec::encode_data_frame;
    use netsdr_core::{ControlItemCode, Error, MessageType};
    use netsdr_test_harness::{MockControlChannel, MockDataChannel, RecordingSink};

    struct Fixture {
        client: NetSdrClient,
        control: Arc<MockControlChannel>,
        data: Arc<MockDataChannel>,
        sink: Arc<RecordingSink>,
    }

    fn fixture_with(builder: NetSdrClientBuilder) -> Fixture {
        let control = Arc::new(MockControlChannel::new());
        let data = Arc::new(MockDataChannel::new(60000));
        let sink = Arc::new(RecordingSink::new());
        let client = builder
            .sample_sink(Arc::clone(&sink) as Arc<dyn SampleSink>)
            .build_with_channels(
                Arc::clone(&control) as Arc<dyn ControlChannel>,
                Arc::clone(&data) as Arc<dyn DataChannel>,
            )
            .unwrap();
        Fixture {
            client,
            control,
            data,
            sink,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(NetSdrClientBuilder::new())
    }

    async fn next_event(rx: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("event channel closed")
    }

    /// Wait for the next event that is not a control response.
    async fn next_state_event(rx: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
        loop {
            match next_event(rx).await {
                ClientEvent::ControlResponse(_) => continue,
                other => return other,
            }
        }
    }

    fn sent_codes(control: &MockControlChannel) -> Vec<Option<i16>> {
        control
            .sent()
            .iter()
            .map(|f| decode_frame(f).unwrap().code)
            .collect()
    }

    #[tokio::test]
    async fn connect_sends_three_init_frames() {
        let f = fixture();
        f.client.connect().await.unwrap();

        assert!(f.client.is_connected());
        assert!(!f.client.iq_started());
        assert_eq!(
            sent_codes(&f.control),
            vec![
                Some(ControlItemCode::IqOutputDataSampleRate.raw()),
                Some(ControlItemCode::RfFilter.raw()),
                Some(ControlItemCode::AdModes.raw()),
            ]
        );
    }

    #[tokio::test]
    async fn connect_twice_sends_init_once() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.connect().await.unwrap();

        assert_eq!(f.control.sent_count(), 3);
        assert_eq!(f.control.connect_count(), 1);
    }

    #[tokio::test]
    async fn connect_failure_leaves_disconnected() {
        let f = fixture();
        f.control.set_fail_connect(true);

        let result = f.client.connect().await;
        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(!f.client.is_connected());
        assert_eq!(f.control.sent_count(), 0);

        // A later attempt may succeed.
        f.control.set_fail_connect(false);
        f.client.connect().await.unwrap();
        assert!(f.client.is_connected());
    }

    #[tokio::test]
    async fn connect_emits_connected() {
        let f = fixture();
        let mut events = f.client.subscribe();
        f.client.connect().await.unwrap();

        assert_eq!(next_state_event(&mut events).await, ClientEvent::Connected);
    }

    #[tokio::test]
    async fn missing_acks_do_not_fail_connect() {
        let f = fixture_with(NetSdrClientBuilder::new().response_timeout(Duration::from_millis(20)));
        f.control.set_auto_ack(false);

        f.client.connect().await.unwrap();
        assert!(f.client.is_connected());
        assert_eq!(f.control.sent_count(), 3);
    }

    #[tokio::test]
    async fn fire_and_forget_without_timeout() {
        let f = fixture_with(NetSdrClientBuilder::new().no_response_timeout());
        f.control.set_auto_ack(false);

        tokio::time::timeout(Duration::from_secs(1), f.client.connect())
            .await
            .expect("connect should not wait for acknowledgements")
            .unwrap();
        assert_eq!(f.control.sent_count(), 3);
    }

    #[tokio::test]
    async fn start_then_stop_iq() {
        let f = fixture();
        f.client.connect().await.unwrap();

        f.client.start_iq().await.unwrap();
        assert!(f.client.iq_started());
        assert!(f.data.is_listening());
        assert_eq!(f.client.state(), ConnectionState::Streaming);

        f.client.stop_iq().await.unwrap();
        assert!(!f.client.iq_started());
        assert!(f.client.is_connected());
        assert!(!f.data.is_listening());
        assert_eq!(f.data.start_count(), 1);
        assert_eq!(f.data.stop_count(), 1);

        let sent = f.control.sent();
        assert_eq!(sent.len(), 5);
        assert_eq!(sent[3], commands::cmd_start_iq(16).unwrap());
        assert_eq!(sent[4], commands::cmd_stop_iq().unwrap());
    }

    #[tokio::test]
    async fn iq_ops_while_disconnected_are_noops() {
        let f = fixture();

        f.client.start_iq().await.unwrap();
        f.client.stop_iq().await.unwrap();

        assert!(!f.client.iq_started());
        assert_eq!(f.data.start_count(), 0);
        assert_eq!(f.data.stop_count(), 0);
        assert_eq!(f.control.send_attempts(), 0);
    }

    #[tokio::test]
    async fn stop_iq_when_not_streaming_is_noop() {
        let f = fixture();
        f.client.connect().await.unwrap();

        f.client.stop_iq().await.unwrap();
        assert_eq!(f.data.stop_count(), 0);
        assert_eq!(f.control.sent_count(), 3);
    }

    #[tokio::test]
    async fn start_iq_while_streaming_resends_request_only() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();
        f.client.start_iq().await.unwrap();

        assert_eq!(f.control.sent_count(), 5);
        assert_eq!(f.data.start_count(), 1);
        assert!(f.client.iq_started());
    }

    #[tokio::test]
    async fn start_iq_bind_failure_stays_connected() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.data.set_fail_start(true);

        assert!(matches!(f.client.start_iq().await, Err(Error::Transport(_))));
        assert!(f.client.is_connected());
        assert!(!f.client.iq_started());
    }

    #[tokio::test]
    async fn change_frequency_while_disconnected_does_not_fail() {
        let f = fixture();
        f.client.change_frequency(14_000_000, 1).await.unwrap();
        f.client.change_frequency(14_000_000, 1).await.unwrap();

        assert_eq!(f.control.send_attempts(), 2);
        assert_eq!(f.control.sent_count(), 0);
    }

    #[tokio::test]
    async fn change_frequency_sends_one_frame() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.change_frequency(14_000_000, 1).await.unwrap();

        let sent = f.control.sent();
        assert_eq!(sent.len(), 4);
        assert_eq!(sent[3], commands::cmd_set_frequency(14_000_000, 1).unwrap());
    }

    #[tokio::test]
    async fn change_frequency_rejects_out_of_range() {
        let f = fixture();
        let result = f.client.change_frequency(1 << 40, 0).await;
        assert!(matches!(result, Err(Error::InvalidParameter(_))));
        assert_eq!(f.control.send_attempts(), 0);
    }

    #[tokio::test]
    async fn disconnect_while_streaming_stops_data() {
        let f = fixture();
        let mut events = f.client.subscribe();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        f.client.disconnect().await;

        assert!(!f.client.is_connected());
        assert!(!f.client.iq_started());
        assert!(!f.control.is_connected());
        assert!(!f.data.is_listening());
        assert_eq!(f.data.stop_count(), 1);

        assert_eq!(next_state_event(&mut events).await, ClientEvent::Connected);
        assert_eq!(next_state_event(&mut events).await, ClientEvent::IqStarted);
        assert_eq!(next_state_event(&mut events).await, ClientEvent::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_when_never_connected_is_safe() {
        let f = fixture();
        f.client.disconnect().await;
        f.client.disconnect().await;

        assert!(!f.client.is_connected());
        assert_eq!(f.control.disconnect_count(), 2);
        assert_eq!(f.data.stop_count(), 0);
    }

    #[tokio::test]
    async fn reconnect_after_disconnect() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.disconnect().await;
        f.client.connect().await.unwrap();

        assert!(f.client.is_connected());
        assert_eq!(f.control.sent_count(), 6);
    }

    #[tokio::test]
    async fn peer_close_disconnects_client() {
        let f = fixture();
        let mut events = f.client.subscribe();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        f.control.close_from_peer();

        assert_eq!(next_state_event(&mut events).await, ClientEvent::Connected);
        assert_eq!(next_state_event(&mut events).await, ClientEvent::IqStarted);
        assert_eq!(next_state_event(&mut events).await, ClientEvent::Disconnected);
        assert!(!f.client.is_connected());
        assert!(!f.data.is_listening());
    }

    #[tokio::test]
    async fn peer_close_during_initialization_fails_connect() {
        let f = fixture_with(NetSdrClientBuilder::new().response_timeout(Duration::from_secs(2)));
        f.control.set_auto_ack(false);
        let mut events = f.client.subscribe();

        // Hang up while the last init request waits for its acknowledgement.
        let control = Arc::clone(&f.control);
        let closer = tokio::spawn(async move {
            while control.sent_count() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            control.close_from_peer();
        });

        let result = tokio::time::timeout(Duration::from_secs(1), f.client.connect())
            .await
            .expect("connect kept waiting after the peer closed");
        closer.await.unwrap();

        assert!(matches!(result, Err(Error::ConnectionLost)));
        assert!(!f.client.is_connected());
        assert_eq!(f.client.state(), ConnectionState::Disconnected);
        assert!(matches!(
            events.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ));

        // Nothing may be started on a connection that is gone.
        f.client.start_iq().await.unwrap();
        assert_eq!(f.data.start_count(), 0);
        assert!(!f.client.iq_started());
    }

    #[tokio::test]
    async fn stale_response_does_not_complete_other_request() {
        let timeout = Duration::from_millis(300);
        let f = fixture_with(NetSdrClientBuilder::new().response_timeout(timeout));
        f.client.connect().await.unwrap();
        f.control.set_auto_ack(false);

        // A late echo of an init request arrives while tuning waits.
        let stale = commands::cmd_set_sample_rate(commands::DEFAULT_SAMPLE_RATE).unwrap();
        let control = Arc::clone(&f.control);
        let injector = tokio::spawn(async move {
            while control.sent_count() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            control.inject(&stale);
        });

        let started = tokio::time::Instant::now();
        f.client.change_frequency(7_074_000, 0).await.unwrap();
        injector.await.unwrap();
        assert!(started.elapsed() >= timeout);

        // The matching echo still completes the request straight away.
        f.control.set_auto_ack(true);
        let started = tokio::time::Instant::now();
        f.client.change_frequency(7_074_000, 0).await.unwrap();
        assert!(started.elapsed() < timeout);
    }

    #[tokio::test]
    async fn nak_completes_pending_request() {
        let timeout = Duration::from_secs(2);
        let f = fixture_with(NetSdrClientBuilder::new().response_timeout(timeout));
        f.client.connect().await.unwrap();
        f.control.set_auto_ack(false);

        let control = Arc::clone(&f.control);
        let injector = tokio::spawn(async move {
            while control.sent_count() < 4 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            control.inject(&[0x02, 0x00]);
        });

        let started = tokio::time::Instant::now();
        f.client.change_frequency(7_074_000, 0).await.unwrap();
        injector.await.unwrap();
        assert!(started.elapsed() < timeout);
    }

    #[tokio::test]
    async fn nak_is_reported() {
        let f = fixture();
        f.client.connect().await.unwrap();
        let mut events = f.client.subscribe();

        f.control.inject(&[0x02, 0x00]);
        assert_eq!(next_event(&mut events).await, ClientEvent::Nak);
    }

    #[tokio::test]
    async fn coalesced_and_split_control_frames_are_reassembled() {
        let f = fixture();
        f.client.connect().await.unwrap();
        let mut events = f.client.subscribe();

        let freq = commands::cmd_set_frequency(7_000_000, 0).unwrap();
        let mut stream = freq.clone();
        stream.extend_from_slice(&[0x02, 0x00]);

        f.control.inject(&stream[..3]);
        f.control.inject(&stream[3..]);

        match next_event(&mut events).await {
            ClientEvent::ControlResponse(resp) => {
                assert_eq!(resp.msg_type, MessageType::SetControlItem);
                assert_eq!(resp.control_item(), Some(ControlItemCode::ReceiverFrequency));
                assert_eq!(&resp.body[..], &freq[4..]);
            }
            other => panic!("expected ControlResponse, got {:?}", other),
        }
        assert_eq!(next_event(&mut events).await, ClientEvent::Nak);
    }

    #[tokio::test]
    async fn end_to_end_iq_stream() {
        let f = fixture();
        f.client.connect().await.unwrap();
        assert_eq!(f.control.sent_count(), 3);

        f.client.start_iq().await.unwrap();
        assert_eq!(f.control.sent_count(), 4);
        assert!(f.data.is_listening());

        let payload: Vec<u8> = (0..100u8).collect();
        let datagram = encode_data_frame(MessageType::DataItem1, &payload).unwrap();
        f.data.inject(&datagram);

        assert!(f.sink.wait_for(1, Duration::from_secs(2)).await);
        let buffers = f.sink.buffers();
        assert_eq!(buffers[0].msg_type, MessageType::DataItem1);
        assert_eq!(buffers[0].sample_width, 16);
        assert_eq!(buffers[0].samples.len(), 50);
        assert_eq!(buffers[0].samples[0], i32::from(i16::from_le_bytes([0, 1])));
        assert_eq!(buffers[0].samples[49], i32::from(i16::from_le_bytes([98, 99])));

        f.client.stop_iq().await.unwrap();
        assert!(!f.data.is_listening());
        assert!(!f.client.iq_started());
    }

    #[tokio::test]
    async fn malformed_datagrams_are_dropped() {
        let f = fixture();
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();

        // Declared length 10, actual 4.
        f.data.inject(&[0x0A, 0xA0, 0x01, 0x00]);
        // Control frame on the data channel.
        f.data.inject(&commands::cmd_stop_iq().unwrap());
        // Valid frame afterwards still gets through.
        let good = encode_data_frame(MessageType::DataItem0, &[0x01, 0x00, 0xFF, 0xFF]).unwrap();
        f.data.inject(&good);

        assert!(f.sink.wait_for(1, Duration::from_secs(2)).await);
        assert_eq!(f.sink.len(), 1);
        assert_eq!(f.sink.samples(), vec![1, -1]);
    }

    #[tokio::test]
    async fn twenty_four_bit_samples() {
        let f = fixture_with(NetSdrClientBuilder::new().sample_width(24));
        f.client.connect().await.unwrap();
        f.client.start_iq().await.unwrap();
        assert_eq!(f.control.sent()[3], commands::cmd_start_iq(24).unwrap());

        let datagram =
            encode_data_frame(MessageType::DataItem2, &[0x01, 0x00, 0x00, 0xFF, 0xFF, 0xFF])
                .unwrap();
        f.data.inject(&datagram);

        assert!(f.sink.wait_for(1, Duration::from_secs(2)).await);
        assert_eq!(f.sink.samples(), vec![1, -1]);
    }
}
