//! NetSDR control-item command builders.
//!
//! Every function returns the complete encoded frame, ready to be written to
//! the control channel. All are pure.
//!
//! Every command here is a `SetControlItem` request; receivers answer with a
//! frame echoing the item and its new value, or with a header-only NAK.

use netsdr_core::{ControlItemCode, Error, MessageType, Result};

use crate::codec::encode_control_frame;

/// Default IQ output sample rate in hertz.
pub const DEFAULT_SAMPLE_RATE: u32 = 100_000;

/// Default IQ sample width in bits.
pub const DEFAULT_SAMPLE_WIDTH: u16 = 16;

/// Largest frequency the 40-bit frequency field can carry.
pub const MAX_FREQUENCY_HZ: u64 = (1 << 40) - 1;

/// Receiver-state parameter: complex (IQ) data mode.
const IQ_DATA_MODE_COMPLEX: u8 = 0x80;
/// Receiver-state parameter: run.
const RECEIVER_RUN: u8 = 0x02;
/// Receiver-state parameter: stop.
const RECEIVER_STOP: u8 = 0x01;
/// Capture mode: 16-bit samples, FIFO.
const CAPTURE_16_BIT_FIFO: u8 = 0x01;
/// Capture mode: 24-bit samples, FIFO.
const CAPTURE_24_BIT_FIFO: u8 = 0x81;
/// Number of FIFO blocks to capture per run request.
const CAPTURE_BLOCKS: u8 = 0x01;

/// A/D mode: dither on, gain on.
const AD_MODE_DITHER_GAIN: u8 = 0x03;
/// RF filter selection: automatic.
const RF_FILTER_AUTO: u8 = 0x00;

/// Receiver channel addressed by the initialization commands.
const DEFAULT_CHANNEL: u8 = 0x00;

fn set_control_item(code: ControlItemCode, parameters: &[u8]) -> Result<Vec<u8>> {
    Ok(encode_control_frame(
        MessageType::SetControlItem,
        code,
        parameters,
    )?)
}

/// Set the IQ output sample rate (`0x00B8`): `[channel, rate u32 LE]`.
pub fn cmd_set_sample_rate(sample_rate: u32) -> Result<Vec<u8>> {
    let mut params = Vec::with_capacity(5);
    params.push(DEFAULT_CHANNEL);
    params.extend_from_slice(&sample_rate.to_le_bytes());
    set_control_item(ControlItemCode::IqOutputDataSampleRate, &params)
}

/// Select the RF filter automatically (`0x0044`).
pub fn cmd_set_rf_filter_auto() -> Result<Vec<u8>> {
    set_control_item(ControlItemCode::RfFilter, &[DEFAULT_CHANNEL, RF_FILTER_AUTO])
}

/// Enable A/D dither and gain (`0x008A`).
pub fn cmd_set_ad_modes() -> Result<Vec<u8>> {
    set_control_item(
        ControlItemCode::AdModes,
        &[DEFAULT_CHANNEL, AD_MODE_DITHER_GAIN],
    )
}

/// The three frames sent after connecting, in order: sample rate, RF
/// filter, A/D modes.
pub fn init_sequence(sample_rate: u32) -> Result<Vec<Vec<u8>>> {
    Ok(vec![
        cmd_set_sample_rate(sample_rate)?,
        cmd_set_rf_filter_auto()?,
        cmd_set_ad_modes()?,
    ])
}

/// Map a sample width to the receiver's capture-mode byte.
///
/// Only 16- and 24-bit captures exist.
pub fn capture_mode(sample_width: u16) -> Result<u8> {
    match sample_width {
        16 => Ok(CAPTURE_16_BIT_FIFO),
        24 => Ok(CAPTURE_24_BIT_FIFO),
        other => Err(Error::InvalidParameter(format!(
            "sample width must be 16 or 24 bits, got {}",
            other
        ))),
    }
}

/// Start the IQ stream (`0x0018`) with samples of `sample_width` bits.
pub fn cmd_start_iq(sample_width: u16) -> Result<Vec<u8>> {
    let mode = capture_mode(sample_width)?;
    set_control_item(
        ControlItemCode::ReceiverState,
        &[IQ_DATA_MODE_COMPLEX, RECEIVER_RUN, mode, CAPTURE_BLOCKS],
    )
}

/// Stop the IQ stream (`0x0018`).
pub fn cmd_stop_iq() -> Result<Vec<u8>> {
    set_control_item(
        ControlItemCode::ReceiverState,
        &[0x00, RECEIVER_STOP, 0x00, 0x00],
    )
}

/// Tune `channel` to `freq_hz` (`0x0020`): `[channel, freq 40-bit LE]`.
pub fn cmd_set_frequency(freq_hz: u64, channel: u8) -> Result<Vec<u8>> {
    if freq_hz > MAX_FREQUENCY_HZ {
        return Err(Error::InvalidParameter(format!(
            "frequency {} Hz does not fit in 40 bits",
            freq_hz
        )));
    }

    let mut params = Vec::with_capacity(6);
    params.push(channel);
    params.extend_from_slice(&freq_hz.to_le_bytes()[..5]);
    set_control_item(ControlItemCode::ReceiverFrequency, &params)
}
