//! NetSDR receiver client.
//!
//! This crate implements the binary control protocol spoken by NetSDR-style
//! software-defined receivers. It provides:
//!
//! - **Codec** ([`codec`]) -- pure frame encoding/decoding, sample
//!   extraction, and [`FrameAssembler`](codec::FrameAssembler) for splitting
//!   the TCP byte stream back into frames.
//! - **Commands** ([`commands`]) -- builders for the control items the
//!   client sends (initialization, IQ start/stop, frequency).
//! - **NetSdrClient** ([`client`]) -- the orchestrator that owns the control
//!   and data channels and runs the connect / stream / disconnect cycle.
//! - **NetSdrClientBuilder** ([`builder`]) -- fluent builder with defaults.
//!
//! # Architecture
//!
//! The receiver uses a split transport:
//! - **TCP** for control items: requests go out, the receiver echoes them
//!   back as acknowledgements or answers with a header-only NAK
//! - **UDP** for data items: packed little-endian IQ samples
//!
//! The client reaches both through the
//! [`ControlChannel`](netsdr_core::ControlChannel) and
//! [`DataChannel`](netsdr_core::DataChannel) traits, so tests can run it
//! against the in-memory mocks from `netsdr-test-harness`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use netsdr_client::{IqBuffer, NetSdrClientBuilder, SampleSink};
//!
//! # async fn example() -> netsdr_core::Result<()> {
//! let (tx, mut rx) = tokio::sync::mpsc::channel::<IqBuffer>(64);
//! let client = NetSdrClientBuilder::new()
//!     .host("192.168.1.50")
//!     .sample_sink(Arc::new(tx) as Arc<dyn SampleSink>)
//!     .build()?;
//!
//! client.connect().await?;
//! client.change_frequency(7_074_000, 0).await?;
//! client.start_iq().await?;
//! while let Some(buffer) = rx.recv().await {
//!     println!("{} samples", buffer.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod client;
pub mod codec;
pub mod commands;

pub use builder::NetSdrClientBuilder;
pub use client::NetSdrClient;
pub use netsdr_core::{ClientEvent, ConnectionState, ControlResponse, IqBuffer, SampleSink};
