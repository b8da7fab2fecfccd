//! Client event types.
//!
//! Events are emitted by the NetSDR client through a
//! [`tokio::sync::broadcast`] channel as the connection state changes and as
//! the receiver answers control requests. Delivery is best effort: slow
//! subscribers may miss events under load.

use bytes::Bytes;

use crate::types::{ControlItemCode, MessageType};

/// A decoded control-channel frame from the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    /// Message type from the frame header.
    pub msg_type: MessageType,
    /// Raw control-item code, `None` for frames without one.
    pub code: Option<i16>,
    /// Frame body after the header and code.
    pub body: Bytes,
}

impl ControlResponse {
    /// Look up the control item this response refers to.
    ///
    /// Returns `None` for frames without a code and for codes this library
    /// does not know.
    pub fn control_item(&self) -> Option<ControlItemCode> {
        self.code.and_then(|c| ControlItemCode::try_from(c).ok())
    }
}

/// An event emitted by the client when its state changes or the receiver
/// reports something.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Connected and initialized.
    Connected,

    /// The connection was closed, locally or by the receiver.
    Disconnected,

    /// IQ streaming started.
    IqStarted,

    /// IQ streaming stopped.
    IqStopped,

    /// The receiver answered on the control channel.
    ControlResponse(ControlResponse),

    /// The receiver rejected a request.
    Nak,
}
