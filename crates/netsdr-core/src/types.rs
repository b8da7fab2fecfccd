//! Protocol identifiers shared by the codec and the client.
//!
//! Every NetSDR frame starts with a 16-bit little-endian header whose top
//! three bits carry the [`MessageType`] and whose low thirteen bits carry the
//! total frame length. Control-item frames follow the header with a 16-bit
//! [`ControlItemCode`] naming the device parameter being addressed.

use std::fmt;

use crate::error::DecodeError;

/// Largest frame length representable in the 13-bit header field.
pub const MAX_FRAME_LEN: usize = (1 << 13) - 1;

/// Message type carried in bits 15-13 of the frame header.
///
/// Types 0-3 form the control-item family (commands, replies and
/// acknowledgements); types 4-7 are data items carrying packed IQ samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Host request to set a control item.
    SetControlItem = 0,
    /// Host request for (or device report of) a control item's value.
    CurrentControlItem = 1,
    /// Host request for a control item's valid range.
    ControlItemRange = 2,
    /// Data-item acknowledgement.
    Ack = 3,
    /// Data item 0.
    DataItem0 = 4,
    /// Data item 1 (the IQ stream on NetSDR receivers).
    DataItem1 = 5,
    /// Data item 2.
    DataItem2 = 6,
    /// Data item 3.
    DataItem3 = 7,
}

impl MessageType {
    /// Whether frames of this type carry IQ sample data rather than a
    /// control-item code.
    pub fn is_data_item(self) -> bool {
        (self as u8) >= MessageType::DataItem0 as u8
    }

    /// Decode the 3-bit type field of a frame header.
    pub fn from_header(header: u16) -> Self {
        // Three bits, eight variants: the conversion cannot fail.
        match header >> 13 {
            0 => MessageType::SetControlItem,
            1 => MessageType::CurrentControlItem,
            2 => MessageType::ControlItemRange,
            3 => MessageType::Ack,
            4 => MessageType::DataItem0,
            5 => MessageType::DataItem1,
            6 => MessageType::DataItem2,
            _ => MessageType::DataItem3,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = DecodeError;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        if value > 7 {
            return Err(DecodeError::UnknownType(value));
        }
        Ok(MessageType::from_header((value as u16) << 13))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MessageType::SetControlItem => "SetControlItem",
            MessageType::CurrentControlItem => "CurrentControlItem",
            MessageType::ControlItemRange => "ControlItemRange",
            MessageType::Ack => "Ack",
            MessageType::DataItem0 => "DataItem0",
            MessageType::DataItem1 => "DataItem1",
            MessageType::DataItem2 => "DataItem2",
            MessageType::DataItem3 => "DataItem3",
        };
        write!(f, "{s}")
    }
}

/// Device parameter addressed by a control-item frame.
///
/// `None` never appears on the wire from the encoder; it is what decoding
/// reports for frames that carry no code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ControlItemCode {
    /// No control item (data-item frames, NAKs).
    None = 0x0000,
    /// Receiver run/stop state and capture mode.
    ReceiverState = 0x0018,
    /// Receiver NCO frequency.
    ReceiverFrequency = 0x0020,
    /// RF filter selection.
    RfFilter = 0x0044,
    /// A/D converter dither and gain modes.
    AdModes = 0x008A,
    /// IQ output data sample rate.
    IqOutputDataSampleRate = 0x00B8,
}

impl ControlItemCode {
    /// Raw wire value of this code.
    pub fn raw(self) -> i16 {
        self as i16
    }
}

impl TryFrom<i16> for ControlItemCode {
    type Error = i16;

    /// Look up a raw code; unknown codes are handed back unchanged.
    fn try_from(value: i16) -> std::result::Result<Self, Self::Error> {
        match value {
            0x0000 => Ok(ControlItemCode::None),
            0x0018 => Ok(ControlItemCode::ReceiverState),
            0x0020 => Ok(ControlItemCode::ReceiverFrequency),
            0x0044 => Ok(ControlItemCode::RfFilter),
            0x008A => Ok(ControlItemCode::AdModes),
            0x00B8 => Ok(ControlItemCode::IqOutputDataSampleRate),
            other => Err(other),
        }
    }
}

impl fmt::Display for ControlItemCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ControlItemCode::None => "None",
            ControlItemCode::ReceiverState => "ReceiverState",
            ControlItemCode::ReceiverFrequency => "ReceiverFrequency",
            ControlItemCode::RfFilter => "RfFilter",
            ControlItemCode::AdModes => "AdModes",
            ControlItemCode::IqOutputDataSampleRate => "IqOutputDataSampleRate",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_frame_len() {
        assert_eq!(MAX_FRAME_LEN, 8191);
    }

    #[test]
    fn message_type_families() {
        assert!(!MessageType::SetControlItem.is_data_item());
        assert!(!MessageType::Ack.is_data_item());
        assert!(MessageType::DataItem0.is_data_item());
        assert!(MessageType::DataItem3.is_data_item());
    }

    #[test]
    fn message_type_from_header_ignores_length_bits() {
        assert_eq!(MessageType::from_header(0xA064), MessageType::DataItem1);
        assert_eq!(MessageType::from_header(0x0004), MessageType::SetControlItem);
        assert_eq!(MessageType::from_header(0xFFFF), MessageType::DataItem3);
    }

    #[test]
    fn message_type_try_from() {
        for raw in 0u8..=7 {
            let t = MessageType::try_from(raw).unwrap();
            assert_eq!(t as u8, raw);
        }
        assert_eq!(MessageType::try_from(8), Err(DecodeError::UnknownType(8)));
    }

    #[test]
    fn control_item_code_lookup() {
        assert_eq!(
            ControlItemCode::try_from(0x0020),
            Ok(ControlItemCode::ReceiverFrequency)
        );
        assert_eq!(ControlItemCode::try_from(0x1234), Err(0x1234));
        assert_eq!(ControlItemCode::IqOutputDataSampleRate.raw(), 0x00B8);
    }

    #[test]
    fn display() {
        assert_eq!(MessageType::DataItem2.to_string(), "DataItem2");
        assert_eq!(ControlItemCode::AdModes.to_string(), "AdModes");
    }
}
