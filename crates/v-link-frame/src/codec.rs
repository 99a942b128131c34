//! ---
//! vlink_section: "02-messaging-ipc-data-model"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Message schema helpers and protocol codecs."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
use tracing::warn;

use crate::crc::{crc16_arc, crc16_arc_update};
use crate::FrameError;

/// First sync byte of every frame.
pub const SYNC1: u8 = 0xF6;
/// Second sync byte of every frame.
pub const SYNC2: u8 = 0xD9;
/// Maximum payload length accepted on either direction.
pub const MAX_PAYLOAD_LEN: usize = 1024;

/// Header bytes covered by the header CRC: sync pair, frame id, length.
const HEADER_LEN: usize = 5;

/// A completed wire frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame identifier (low byte of the envelope message type).
    pub id: u8,
    /// Raw payload bytes, CRC already verified.
    pub payload: Vec<u8>,
}

/// Encode a frame into one contiguous buffer.
///
/// Layout: `F6 D9 <id> <len lo> <len hi> <hdr crc lo> <hdr crc hi>
/// <payload...> <pld crc lo> <pld crc hi>`. The whole buffer is intended to
/// be written to the port in a single call so concurrent senders cannot
/// interleave bytes.
pub fn encode_frame(frame_id: u8, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(FrameError::Oversize(payload.len()));
    }

    let mut buf = Vec::with_capacity(HEADER_LEN + 4 + payload.len());
    buf.push(SYNC1);
    buf.push(SYNC2);
    buf.push(frame_id);
    buf.extend_from_slice(&(payload.len() as u16).to_le_bytes());

    let header_crc = crc16_arc(&buf);
    buf.extend_from_slice(&header_crc.to_le_bytes());

    buf.extend_from_slice(payload);
    let payload_crc = crc16_arc(payload);
    buf.extend_from_slice(&payload_crc.to_le_bytes());

    Ok(buf)
}

/// Decoder state machine positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Hunting for the first sync byte.
    Sync1,
    /// Got `F6`, expecting `D9`.
    Sync2,
    /// Expecting the frame identifier.
    Id,
    /// Expecting the low length byte.
    Len1,
    /// Expecting the high length byte.
    Len2,
    /// Expecting the low header-CRC byte.
    HdrCrc1,
    /// Expecting the high header-CRC byte.
    HdrCrc2,
    /// Accumulating payload bytes.
    Payload,
    /// Expecting the low payload-CRC byte.
    PldCrc1,
    /// Expecting the high payload-CRC byte.
    PldCrc2,
}

/// Byte-wise receive state machine.
///
/// Owned by the serial read loop; errors are local (log + re-sync) and the
/// stream is never rewound. A frame is only ever surfaced complete, with
/// both CRCs verified.
#[derive(Debug)]
pub struct FrameDecoder {
    state: DecoderState,
    header: Vec<u8>,
    frame_id: u8,
    payload_len: usize,
    payload: Vec<u8>,
    payload_crc: u16,
    rx_crc: u16,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Sync1,
            header: Vec::with_capacity(HEADER_LEN),
            frame_id: 0,
            payload_len: 0,
            payload: Vec::new(),
            payload_crc: 0,
            rx_crc: 0,
        }
    }

    /// Discard any partial frame and hunt for the next sync pair.
    pub fn reset(&mut self) {
        self.state = DecoderState::Sync1;
        self.header.clear();
        self.payload.clear();
        self.payload_len = 0;
        self.payload_crc = 0;
        self.rx_crc = 0;
    }

    /// Feed one byte, returning a frame when it completes one.
    pub fn feed(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            DecoderState::Sync1 => {
                if byte == SYNC1 {
                    self.header.clear();
                    self.header.push(byte);
                    self.state = DecoderState::Sync2;
                }
                None
            }
            DecoderState::Sync2 => {
                if byte == SYNC2 {
                    self.header.push(byte);
                    self.state = DecoderState::Id;
                } else {
                    // No credit for a re-sync attempt: the next F6 must come fresh.
                    self.reset();
                }
                None
            }
            DecoderState::Id => {
                self.frame_id = byte;
                self.header.push(byte);
                self.state = DecoderState::Len1;
                None
            }
            DecoderState::Len1 => {
                self.payload_len = byte as usize;
                self.header.push(byte);
                self.state = DecoderState::Len2;
                None
            }
            DecoderState::Len2 => {
                self.payload_len |= (byte as usize) << 8;
                self.header.push(byte);
                if self.payload_len > MAX_PAYLOAD_LEN {
                    warn!(
                        frame_id = %format_args!("0x{:02x}", self.frame_id),
                        payload_len = self.payload_len,
                        max = MAX_PAYLOAD_LEN,
                        "oversize payload length, dropping frame"
                    );
                    self.reset();
                } else {
                    self.state = DecoderState::HdrCrc1;
                }
                None
            }
            DecoderState::HdrCrc1 => {
                self.rx_crc = u16::from(byte);
                self.state = DecoderState::HdrCrc2;
                None
            }
            DecoderState::HdrCrc2 => {
                self.rx_crc |= u16::from(byte) << 8;
                let computed = crc16_arc(&self.header);
                if computed != self.rx_crc {
                    warn!(
                        frame_id = %format_args!("0x{:02x}", self.frame_id),
                        computed = %format_args!("0x{:04x}", computed),
                        received = %format_args!("0x{:04x}", self.rx_crc),
                        "header CRC mismatch, dropping frame"
                    );
                    self.reset();
                    return None;
                }
                self.payload.clear();
                self.payload.reserve(self.payload_len);
                self.payload_crc = 0;
                self.state = if self.payload_len == 0 {
                    DecoderState::PldCrc1
                } else {
                    DecoderState::Payload
                };
                None
            }
            DecoderState::Payload => {
                self.payload.push(byte);
                self.payload_crc = crc16_arc_update(self.payload_crc, &[byte]);
                if self.payload.len() == self.payload_len {
                    self.state = DecoderState::PldCrc1;
                }
                None
            }
            DecoderState::PldCrc1 => {
                self.rx_crc = u16::from(byte);
                self.state = DecoderState::PldCrc2;
                None
            }
            DecoderState::PldCrc2 => {
                self.rx_crc |= u16::from(byte) << 8;
                if self.rx_crc != self.payload_crc {
                    warn!(
                        frame_id = %format_args!("0x{:02x}", self.frame_id),
                        computed = %format_args!("0x{:04x}", self.payload_crc),
                        received = %format_args!("0x{:04x}", self.rx_crc),
                        "payload CRC mismatch, dropping frame"
                    );
                    self.reset();
                    return None;
                }
                let frame = Frame {
                    id: self.frame_id,
                    payload: std::mem::take(&mut self.payload),
                };
                self.reset();
                Some(frame)
            }
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(decoder: &mut FrameDecoder, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&b| decoder.feed(b)).collect()
    }

    #[test]
    fn encode_layout_matches_wire_contract() {
        // The CBOR payload of scenario frames is opaque at this layer.
        let payload = [0xA1, 0x01, 0xC0, 0x01];
        let buf = encode_frame(0xC0, &payload).unwrap();

        assert_eq!(buf.len(), 13);
        assert_eq!(&buf[..5], &[0xF6, 0xD9, 0xC0, 0x04, 0x00]);
        let header_crc = crc16_arc(&buf[..5]);
        assert_eq!(&buf[5..7], &header_crc.to_le_bytes());
        assert_eq!(&buf[7..11], &payload);
        let payload_crc = crc16_arc(&payload);
        assert_eq!(&buf[11..13], &payload_crc.to_le_bytes());
    }

    #[test]
    fn encode_rejects_oversize_payload() {
        let payload = vec![0u8; MAX_PAYLOAD_LEN + 1];
        assert_eq!(
            encode_frame(0x20, &payload),
            Err(FrameError::Oversize(MAX_PAYLOAD_LEN + 1))
        );
    }

    #[test]
    fn roundtrip_basic() {
        let buf = encode_frame(0x20, b"hello").unwrap();
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 0x20);
        assert_eq!(frames[0].payload, b"hello");
    }

    #[test]
    fn roundtrip_empty_payload() {
        let buf = encode_frame(0xAA, &[]).unwrap();
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id, 0xAA);
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn roundtrip_max_payload() {
        let payload: Vec<u8> = (0..MAX_PAYLOAD_LEN).map(|i| i as u8).collect();
        let buf = encode_frame(0x01, &payload).unwrap();
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &buf);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, payload);
    }

    #[test]
    fn single_byte_corruption_is_rejected() {
        let buf = encode_frame(0xC0, &[0xA1, 0x01, 0xC0, 0x01]).unwrap();
        for i in 0..buf.len() {
            let mut corrupted = buf.clone();
            corrupted[i] ^= 0x01;
            let mut decoder = FrameDecoder::new();
            let frames = feed_all(&mut decoder, &corrupted);
            assert!(
                frames.is_empty(),
                "corruption at byte {} was silently accepted",
                i
            );
        }
    }

    #[test]
    fn resynchronises_after_garbage() {
        let buf = encode_frame(0x40, b"aux").unwrap();
        let mut stream = vec![0x00, 0x37, 0xF7, 0xD9, 0xA1];
        stream.extend_from_slice(&buf);

        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"aux");
    }

    #[test]
    fn sync2_mismatch_requires_fresh_sync1() {
        let buf = encode_frame(0x20, b"x").unwrap();
        // F6 followed by a non-D9 byte resets the hunt entirely.
        let mut stream = vec![SYNC1, 0x00];
        stream.extend_from_slice(&buf);

        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &stream);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn oversize_wire_length_resets_decoder() {
        // Header advertising 1025 payload bytes; dropped before the CRC stage.
        let bogus = [SYNC1, SYNC2, 0x01, 0x01, 0x04, 0xFF, 0xFF];
        let buf = encode_frame(0x01, b"ok").unwrap();
        let mut stream = bogus.to_vec();
        stream.extend_from_slice(&buf);

        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, b"ok");
    }

    #[test]
    fn byte_feeding_is_associative() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_frame(0x20, b"first").unwrap());
        stream.extend_from_slice(&[0x13, 0x37]);
        stream.extend_from_slice(&encode_frame(0xE0, b"second").unwrap());

        // Whole stream at once.
        let mut decoder = FrameDecoder::new();
        let all_at_once = feed_all(&mut decoder, &stream);

        // Same stream split at every possible boundary.
        for split in 0..=stream.len() {
            let mut decoder = FrameDecoder::new();
            let mut frames = feed_all(&mut decoder, &stream[..split]);
            frames.extend(feed_all(&mut decoder, &stream[split..]));
            assert_eq!(frames, all_at_once, "split at {} diverged", split);
        }

        assert_eq!(all_at_once.len(), 2);
        assert_eq!(all_at_once[0].payload, b"first");
        assert_eq!(all_at_once[1].payload, b"second");
    }

    #[test]
    fn back_to_back_frames_decode_in_order() {
        let mut stream = Vec::new();
        for i in 0..5u8 {
            stream.extend_from_slice(&encode_frame(i, &[i; 3]).unwrap());
        }
        let mut decoder = FrameDecoder::new();
        let frames = feed_all(&mut decoder, &stream);
        assert_eq!(frames.len(), 5);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(frame.id, i as u8);
            assert_eq!(frame.payload, vec![i as u8; 3]);
        }
    }
}
