//! ---
//! vlink_section: "02-messaging-ipc-data-model"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Message schema helpers and protocol codecs."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! On-wire frame codec shared by the serial endpoint and the tests.
//!
//! A frame is: two sync bytes (`F6 D9`), a one-byte frame identifier, a
//! 16-bit little-endian payload length, a 16-bit little-endian CRC over the
//! five header bytes, the payload, and a trailing 16-bit little-endian CRC
//! over the payload. Both CRCs are CRC-16/ARC. The decoder is a byte-wise
//! state machine that re-synchronises on the sync pair after any error.

pub mod codec;
pub mod crc;

pub use codec::{encode_frame, Frame, FrameDecoder, MAX_PAYLOAD_LEN, SYNC1, SYNC2};
pub use crc::{crc16_arc, crc16_arc_update};

/// Errors produced while assembling outbound frames.
///
/// Receive-side failures (length, CRC) are not errors in the API sense: the
/// decoder logs a diagnostic and re-enters its sync-hunt state, as required
/// for a byte stream with no rewind.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// Payload longer than the protocol maximum of 1024 bytes.
    #[error("payload length {0} exceeds maximum of {max}", max = MAX_PAYLOAD_LEN)]
    Oversize(usize),
}
