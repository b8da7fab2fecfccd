//! NetSdrClientBuilder -- fluent builder for constructing [`NetSdrClient`]
//! instances.
//!
//! Separates configuration from construction. All options are fixed once
//! the client is built.
//!
//! # Example
//!
//! ```no_run
//! use netsdr_client::NetSdrClientBuilder;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let client = NetSdrClientBuilder::new()
//!     .host("192.168.1.50")
//!     .sample_width(24)
//!     .build()?;
//! client.connect().await?;
//! client.change_frequency(14_074_000, 0).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use netsdr_core::channel::{ControlChannel, DataChannel};
use netsdr_core::error::Result;
use netsdr_core::sink::SampleSink;
use netsdr_transport::{TcpControlChannel, UdpDataChannel};

use crate::client::{ClientConfig, NetSdrClient};
use crate::commands::{self, DEFAULT_SAMPLE_RATE, DEFAULT_SAMPLE_WIDTH};

/// Default receiver host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default NetSDR TCP control port.
pub const DEFAULT_TCP_PORT: u16 = 50000;

/// Default local UDP port for IQ data.
pub const DEFAULT_UDP_PORT: u16 = 60000;

/// Default time to wait for the receiver to answer a request.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fluent builder for [`NetSdrClient`].
///
/// ```ignore
/// let client = NetSdrClientBuilder::new().host("10.0.0.5").build()?;
/// ```
pub struct NetSdrClientBuilder {
    host: String,
    tcp_port: u16,
    udp_port: u16,
    sample_rate: u32,
    sample_width: u16,
    response_timeout: Option<Duration>,
    connect_timeout: Duration,
    sink: Option<Arc<dyn SampleSink>>,
}

impl NetSdrClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        NetSdrClientBuilder {
            host: DEFAULT_HOST.to_string(),
            tcp_port: DEFAULT_TCP_PORT,
            udp_port: DEFAULT_UDP_PORT,
            sample_rate: DEFAULT_SAMPLE_RATE,
            sample_width: DEFAULT_SAMPLE_WIDTH,
            response_timeout: Some(DEFAULT_RESPONSE_TIMEOUT),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sink: None,
        }
    }

    /// Set the receiver's IP address or hostname (default: 127.0.0.1).
    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    /// Set the TCP control port (default: 50000).
    pub fn tcp_port(mut self, port: u16) -> Self {
        self.tcp_port = port;
        self
    }

    /// Set the local UDP port the receiver streams IQ data to (default: 60000).
    pub fn udp_port(mut self, port: u16) -> Self {
        self.udp_port = port;
        self
    }

    /// Set the IQ output sample rate sent during initialization
    /// (default: 100 000 Hz).
    pub fn sample_rate(mut self, hz: u32) -> Self {
        self.sample_rate = hz;
        self
    }

    /// Set the IQ sample width in bits, 16 or 24 (default: 16).
    ///
    /// Other widths are rejected by `build()`.
    pub fn sample_width(mut self, bits: u16) -> Self {
        self.sample_width = bits;
        self
    }

    /// Set how long to wait for the receiver to answer each request
    /// (default: 1 s).
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = Some(timeout);
        self
    }

    /// Send requests without waiting for the receiver to answer.
    pub fn no_response_timeout(mut self) -> Self {
        self.response_timeout = None;
        self
    }

    /// Set the TCP connect timeout (default: 5 s).
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set where extracted IQ samples are delivered.
    ///
    /// Without a sink, data items are decoded and then discarded.
    pub fn sample_sink(mut self, sink: Arc<dyn SampleSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Build a client using TCP and UDP sockets.
    ///
    /// Nothing is connected or bound until [`NetSdrClient::connect`] and
    /// [`NetSdrClient::start_iq`].
    pub fn build(self) -> Result<NetSdrClient> {
        let control = TcpControlChannel::new(&self.host, self.tcp_port)
            .with_connect_timeout(self.connect_timeout);
        let data = UdpDataChannel::new(self.udp_port);

        tracing::debug!(
            addr = %control.addr(),
            udp_port = self.udp_port,
            "Building NetSDR client"
        );

        self.build_with_channels(Arc::new(control), Arc::new(data))
    }

    /// Build a client over caller-supplied channels.
    ///
    /// `host`, ports and the connect timeout are ignored; they only
    /// configure the socket channels created by [`build`](Self::build).
    /// Pass the mocks from `netsdr-test-harness` here in tests.
    pub fn build_with_channels(
        self,
        control: Arc<dyn ControlChannel>,
        data: Arc<dyn DataChannel>,
    ) -> Result<NetSdrClient> {
        commands::capture_mode(self.sample_width)?;

        let config = ClientConfig {
            sample_rate: self.sample_rate,
            sample_width: self.sample_width,
            response_timeout: self.response_timeout,
        };
        Ok(NetSdrClient::new(config, control, data, self.sink))
    }
}

impl Default for NetSdrClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
