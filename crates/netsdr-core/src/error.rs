//! Error types for netsdr.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. The codec reports its own narrower
//! [`EncodeError`] and [`DecodeError`], both of which convert into [`Error`].

/// The error type for all netsdr operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (TCP connect, UDP bind).
    #[error("transport error: {0}")]
    Transport(String),

    /// Timed out waiting for the receiver.
    #[error("timeout waiting for response")]
    Timeout,

    /// An invalid parameter was passed to a command or builder.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The control channel is not connected.
    #[error("not connected")]
    NotConnected,

    /// The connection to the receiver was lost unexpectedly.
    #[error("connection lost")]
    ConnectionLost,

    /// A frame could not be built.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// A received frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to build a protocol frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The frame would not fit in the 13-bit length field.
    #[error("frame length {length} exceeds maximum of {max} bytes")]
    FrameTooLong {
        /// Total length the frame would have had.
        length: usize,
        /// Largest representable frame length.
        max: usize,
    },
}

/// Failure to interpret received bytes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Fewer bytes than the frame's fixed fields require.
    #[error("frame truncated: {actual} bytes, need at least {needed}")]
    Truncated {
        /// Bytes available.
        actual: usize,
        /// Bytes required.
        needed: usize,
    },

    /// The header's length field disagrees with the frame size.
    #[error("declared length {declared} does not match frame length {actual}")]
    BadLength {
        /// Length encoded in the header.
        declared: usize,
        /// Length of the buffer being decoded.
        actual: usize,
    },

    /// The message type does not map to a known variant.
    #[error("unknown message type {0}")]
    UnknownType(u8),

    /// The requested sample width is not 8, 16, 24 or 32 bits.
    #[error("unsupported sample width of {0} bits")]
    UnsupportedSampleWidth(u16),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
