//! netsdr-test-harness: Test utilities and mock channels for netsdr.
//!
//! This crate provides [`MockControlChannel`] and [`MockDataChannel`] for
//! deterministic testing of the client without sockets, [`RecordingSink`]
//! for capturing delivered samples, and [`MockNetSdrDevice`], a loopback
//! receiver for exercising the real TCP/UDP channels.

pub mod mock_channel;
pub mod mock_device;
pub mod recording_sink;

pub use mock_channel::{MockControlChannel, MockDataChannel};
pub use mock_device::MockNetSdrDevice;
pub use recording_sink::RecordingSink;
