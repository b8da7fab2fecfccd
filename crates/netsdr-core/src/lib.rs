//! netsdr-core: Core traits, types, and error definitions for netsdr.
//!
//! This crate defines the transport-agnostic abstractions the NetSDR client
//! is built on. The orchestrator in `netsdr-client` talks to the receiver
//! exclusively through the channel traits defined here, so tests can swap
//! the real sockets for the in-memory mocks in `netsdr-test-harness`.
//!
//! # Key types
//!
//! - [`ControlChannel`] -- connection-oriented command channel (TCP)
//! - [`DataChannel`] -- connectionless sample channel (UDP)
//! - [`ChannelEvent`] -- raw notifications emitted by a channel's receive loop
//! - [`ClientEvent`] -- decoded notifications emitted by the client
//! - [`SampleSink`] / [`IqBuffer`] -- consumer of extracted IQ samples
//! - [`MessageType`] / [`ControlItemCode`] -- protocol identifiers
//! - [`Error`] / [`Result`] -- error handling

pub mod channel;
pub mod error;
pub mod events;
pub mod sink;
pub mod state;
pub mod types;

pub use channel::{ChannelEvent, ConnectStatus, ControlChannel, DataChannel};
pub use error::{DecodeError, EncodeError, Error, Result};
pub use events::{ClientEvent, ControlResponse};
pub use sink::{IqBuffer, SampleSink};
pub use state::{ConnectionState, SharedState};
pub use types::{ControlItemCode, MAX_FRAME_LEN, MessageType};
