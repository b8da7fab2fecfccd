//! NetSDR binary frame encoder/decoder.
//!
//! Pure functions with no I/O: every function operates on byte slices and
//! returns bytes, borrowed views, or an error.
//!
//! # Frame format
//!
//! ```text
//! | header (u16 LE) | code (i16 LE, control items only) | body ... |
//! ```
//!
//! - Header bits 15-13: [`MessageType`]
//! - Header bits 12-0: total frame length in bytes, header included
//! - Control-item frames (types 0-3) carry a 16-bit [`ControlItemCode`]
//!   after the header; data-item frames (types 4-7) go straight to the body
//!
//! Data-item frames carry no sequence number in this implementation: the
//! body starts immediately after the header on both the encode and decode
//! side, so [`Frame::sequence_number`] is always `None`.

use std::iter::FusedIterator;
use std::slice::ChunksExact;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use netsdr_core::error::{DecodeError, EncodeError};
use netsdr_core::types::{ControlItemCode, MAX_FRAME_LEN, MessageType};

/// Length of the frame header in bytes.
pub const HEADER_LEN: usize = 2;

/// Length of the control-item code field in bytes.
pub const CODE_LEN: usize = 2;

/// Mask selecting the length bits of a header.
const LENGTH_MASK: u16 = 0x1FFF;

/// A decoded frame borrowing its body from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Raw 16-bit header.
    pub header: u16,
    /// Message type from the header.
    pub msg_type: MessageType,
    /// Control-item code; `None` for data items and NAKs.
    pub code: Option<i16>,
    /// Always `None`; data items are not sequence-numbered on this link.
    pub sequence_number: Option<u16>,
    /// Bytes after the header (and code, if present).
    pub body: &'a [u8],
}

impl Frame<'_> {
    /// Total frame length declared by the header.
    pub fn declared_len(&self) -> usize {
        (self.header & LENGTH_MASK) as usize
    }

    /// Look up the control item this frame addresses.
    ///
    /// Frames without a code map to [`ControlItemCode::None`]; unknown codes
    /// are returned as the error value.
    pub fn control_item(&self) -> Result<ControlItemCode, i16> {
        match self.code {
            Some(raw) => ControlItemCode::try_from(raw),
            None => Ok(ControlItemCode::None),
        }
    }

    /// Whether this is a header-only control frame, which the receiver uses
    /// to reject a request.
    pub fn is_nak(&self) -> bool {
        !self.msg_type.is_data_item() && self.declared_len() == HEADER_LEN
    }
}

/// Build a frame header from a message type and total frame length.
///
/// Fails if `total_len` does not fit in the 13-bit length field.
pub fn encode_header(msg_type: MessageType, total_len: usize) -> Result<u16, EncodeError> {
    if total_len > MAX_FRAME_LEN {
        return Err(EncodeError::FrameTooLong {
            length: total_len,
            max: MAX_FRAME_LEN,
        });
    }
    Ok(((msg_type as u16) << 13) | total_len as u16)
}

/// Split a header into its message type and declared total length.
pub fn decode_header(header: u16) -> (MessageType, usize) {
    (
        MessageType::from_header(header),
        (header & LENGTH_MASK) as usize,
    )
}

/// Encode a control-item frame: `header | code | parameters`.
///
/// # Example
///
/// ```
/// use netsdr_client::codec::encode_control_frame;
/// use netsdr_core::{ControlItemCode, MessageType};
///
/// let bytes = encode_control_frame(
///     MessageType::SetControlItem,
///     ControlItemCode::RfFilter,
///     &[0x00, 0x00],
/// ).unwrap();
/// assert_eq!(bytes, vec![0x06, 0x00, 0x44, 0x00, 0x00, 0x00]);
/// ```
pub fn encode_control_frame(
    msg_type: MessageType,
    code: ControlItemCode,
    parameters: &[u8],
) -> Result<Vec<u8>, EncodeError> {
    let total_len = HEADER_LEN + CODE_LEN + parameters.len();
    let header = encode_header(msg_type, total_len)?;

    let mut buf = BytesMut::with_capacity(total_len);
    buf.put_u16_le(header);
    buf.put_i16_le(code.raw());
    buf.put_slice(parameters);
    Ok(buf.to_vec())
}

/// Encode a data-item frame: `header | parameters`.
pub fn encode_data_frame(msg_type: MessageType, parameters: &[u8]) -> Result<Vec<u8>, EncodeError> {
    let total_len = HEADER_LEN + parameters.len();
    let header = encode_header(msg_type, total_len)?;

    let mut buf = BytesMut::with_capacity(total_len);
    buf.put_u16_le(header);
    buf.put_slice(parameters);
    Ok(buf.to_vec())
}

/// Decode one complete frame.
///
/// `data` must hold exactly one frame: the header's declared length has to
/// equal `data.len()`.
pub fn decode_frame(data: &[u8]) -> Result<Frame<'_>, DecodeError> {
    if data.len() < HEADER_LEN {
        return Err(DecodeError::Truncated {
            actual: data.len(),
            needed: HEADER_LEN,
        });
    }

    let mut cursor = data;
    let header = cursor.get_u16_le();
    let (msg_type, declared) = decode_header(header);

    if declared != data.len() {
        return Err(DecodeError::BadLength {
            declared,
            actual: data.len(),
        });
    }

    let code = if msg_type.is_data_item() || cursor.is_empty() {
        None
    } else if cursor.len() < CODE_LEN {
        return Err(DecodeError::Truncated {
            actual: data.len(),
            needed: HEADER_LEN + CODE_LEN,
        });
    } else {
        Some(cursor.get_i16_le())
    };

    Ok(Frame {
        header,
        msg_type,
        code,
        sequence_number: None,
        body: cursor,
    })
}

/// Split a data-item body into signed samples of `sample_width` bits.
///
/// Each sample is a little-endian group of `sample_width / 8` bytes,
/// sign-extended from its top bit. A trailing partial group is ignored.
/// Widths that are zero, not a whole number of bytes, or wider than 32 bits
/// are rejected.
///
/// # Example
///
/// ```
/// use netsdr_client::codec::extract_samples;
///
/// let samples: Vec<i32> = extract_samples(16, &[0x01, 0x00, 0x02, 0x00, 0xFF, 0xFF])
///     .unwrap()
///     .collect();
/// assert_eq!(samples, vec![1, 2, -1]);
/// ```
pub fn extract_samples(sample_width: u16, body: &[u8]) -> Result<Samples<'_>, DecodeError> {
    if sample_width == 0 || sample_width % 8 != 0 || sample_width > 32 {
        return Err(DecodeError::UnsupportedSampleWidth(sample_width));
    }
    let width_bytes = (sample_width / 8) as usize;

    Ok(Samples {
        chunks: body.chunks_exact(width_bytes),
        width_bytes,
    })
}

/// Lazy iterator over the samples of a data-item body.
///
/// Cheap to clone; a clone taken before iterating replays the full
/// sequence.
#[derive(Debug, Clone)]
pub struct Samples<'a> {
    chunks: ChunksExact<'a, u8>,
    width_bytes: usize,
}

impl Iterator for Samples<'_> {
    type Item = i32;

    fn next(&mut self) -> Option<i32> {
        let chunk = self.chunks.next()?;
        let mut bytes = [0u8; 4];
        bytes[..self.width_bytes].copy_from_slice(chunk);
        let shift = 32 - 8 * self.width_bytes as u32;
        Some((i32::from_le_bytes(bytes) << shift) >> shift)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Samples<'_> {}

impl FusedIterator for Samples<'_> {}

/// Reassembles frames from a byte stream.
///
/// The control channel delivers whatever each socket read returned, which
/// may be part of a frame or several frames back to back. Push chunks in
/// arrival order and pull complete frames out with
/// [`next_frame`](Self::next_frame).
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: BytesMut,
}

impl FrameAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append received bytes.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of buffered bytes not yet returned as a frame.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete frame, if one is buffered.
    ///
    /// A header declaring a length shorter than the header itself means the
    /// stream has lost sync; the buffer is discarded.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        if self.buf.len() < HEADER_LEN {
            return None;
        }

        let header = u16::from_le_bytes([self.buf[0], self.buf[1]]);
        let (_, declared) = decode_header(header);

        if declared < HEADER_LEN {
            tracing::warn!(
                header = format!("0x{:04X}", header),
                discarded = self.buf.len(),
                "Invalid frame length in control stream, discarding buffer"
            );
            self.buf.clear();
            return None;
        }

        if self.buf.len() < declared {
            return None;
        }

        Some(self.buf.split_to(declared).freeze())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
