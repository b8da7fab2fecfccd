//! Socket implementations of the netsdr channel traits.
//!
//! This crate provides concrete implementations of the
//! [`ControlChannel`](netsdr_core::ControlChannel) and
//! [`DataChannel`](netsdr_core::DataChannel) traits from `netsdr-core`:
//!
//! - [`TcpControlChannel`]: the TCP command channel (port 50000 on NetSDR
//!   receivers)
//! - [`UdpDataChannel`]: the UDP port the receiver streams IQ data items to
//!
//! # Example
//!
//! ```no_run
//! use netsdr_core::ControlChannel;
//! use netsdr_transport::TcpControlChannel;
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let channel = TcpControlChannel::new("192.168.1.50", 50000);
//! let mut events = channel.subscribe();
//! channel.connect().await?;
//!
//! // Request the receiver name (control item 0x0001)
//! channel.send(&[0x04, 0x20, 0x01, 0x00]).await?;
//! let reply = events.recv().await;
//! # Ok(())
//! # }
//! ```

pub mod tcp;
pub mod udp;

pub use tcp::TcpControlChannel;
pub use udp::UdpDataChannel;

/// Size of the receive buffer used by both channels.
///
/// Large enough for the biggest data item a receiver emits.
pub const RECV_BUFFER_SIZE: usize = 8194;

/// Capacity of each channel's event broadcast.
pub(crate) const EVENT_CHANNEL_CAPACITY: usize = 1024;
