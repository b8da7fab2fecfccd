//! Connection state of the NetSDR client.
//!
//! The client's state machine has three states; `Streaming` implies
//! `Connected`. The state is written only by the client's own methods (and
//! its control router when the receiver hangs up) but read from any task,
//! so it lives in an atomic rather than behind a lock.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// State of the connect/configure/stream/disconnect state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No control connection.
    #[default]
    Disconnected,
    /// Control connection up and the receiver initialized.
    Connected,
    /// Connected, and the IQ stream has been requested.
    Streaming,
}

impl ConnectionState {
    /// Whether the control connection is established.
    pub fn is_connected(self) -> bool {
        !matches!(self, ConnectionState::Disconnected)
    }

    /// Whether IQ streaming is active.
    pub fn is_streaming(self) -> bool {
        matches!(self, ConnectionState::Streaming)
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Streaming => 2,
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connected,
            2 => ConnectionState::Streaming,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connected => "connected",
            ConnectionState::Streaming => "streaming",
        };
        write!(f, "{s}")
    }
}

/// Lock-free cell holding a [`ConnectionState`].
#[derive(Debug, Default)]
pub struct SharedState(AtomicU8);

impl SharedState {
    /// Create a cell in the `Disconnected` state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the current state.
    pub fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Overwrite the state, returning the previous one.
    pub fn replace(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(state.as_u8(), Ordering::SeqCst))
    }

    /// Move to `new` only if the current state is `current`.
    ///
    /// Returns `true` if the transition happened.
    pub fn transition(&self, current: ConnectionState, new: ConnectionState) -> bool {
        self.0
            .compare_exchange(
                current.as_u8(),
                new.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}
