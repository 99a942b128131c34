//! ---
//! vlink_section: "02-messaging-ipc-data-model"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Message schema helpers and protocol codecs."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use serde_cbor::Value as Cbor;
use tracing::warn;

use crate::ProtoError;

/// A decoded envelope value.
///
/// Integers of any CBOR width are normalised into a signed 64-bit container;
/// byte strings coerce to text when valid UTF-8 (the co-processor emits both
/// forms for string parameters).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }
}

/// One decoded message: the family plus its absolute-subtype entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// 16-bit message-type family.
    pub message_type: u16,
    /// `(absolute subtype, value)` pairs in wire order.
    pub entries: Vec<(u16, Value)>,
}

/// Result of decoding a frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Empty map or empty inner map: a device acknowledgement.
    Ack {
        /// Family, when the ack carried one (`{type: {}}` shape).
        message_type: Option<u16>,
    },
    /// A routable message.
    Message(Envelope),
}

/// Frame identifier for a family: its low byte.
pub fn frame_id(message_type: u16) -> u8 {
    (message_type & 0x00FF) as u8
}

fn wrap(message_type: u16, relative_subtype: u16, value: Cbor) -> Cbor {
    let absolute = message_type.wrapping_add(relative_subtype);
    let mut inner = BTreeMap::new();
    inner.insert(Cbor::Integer(i128::from(absolute)), value);
    let mut outer = BTreeMap::new();
    outer.insert(Cbor::Integer(i128::from(message_type)), Cbor::Map(inner));
    Cbor::Map(outer)
}

/// Encode `{ message_type: { message_type + relative: value } }` with an
/// integer value. Returns the transport frame id alongside the payload.
pub fn encode_int(
    message_type: u16,
    relative_subtype: u16,
    value: u16,
) -> Result<(u8, Vec<u8>), ProtoError> {
    let body = serde_cbor::to_vec(&wrap(
        message_type,
        relative_subtype,
        Cbor::Integer(i128::from(value)),
    ))?;
    Ok((frame_id(message_type), body))
}

/// Encode `{ message_type: { message_type + relative: value } }` with a
/// text value. Returns the transport frame id alongside the payload.
pub fn encode_str(
    message_type: u16,
    relative_subtype: u16,
    value: &str,
) -> Result<(u8, Vec<u8>), ProtoError> {
    let body = serde_cbor::to_vec(&wrap(
        message_type,
        relative_subtype,
        Cbor::Text(value.to_owned()),
    ))?;
    Ok((frame_id(message_type), body))
}

/// Recognise the fixed 4-byte acknowledgement shape `A1 .. <frame id> A0`,
/// the wire form of `{ msgtype: {} }` for single-byte-keyed families.
pub fn is_raw_ack(payload: &[u8], frame_id: u8) -> bool {
    payload.len() == 4 && payload[0] == 0xA1 && payload[2] == frame_id && payload[3] == 0xA0
}

fn key_u16(value: &Cbor) -> Option<u16> {
    match value {
        Cbor::Integer(i) => u16::try_from(*i).ok(),
        _ => None,
    }
}

fn convert(value: Cbor) -> Result<Value, ProtoError> {
    match value {
        Cbor::Integer(i) => i64::try_from(i)
            .map(Value::Int)
            .map_err(|_| ProtoError::IntRange),
        Cbor::Text(text) => Ok(Value::Text(text)),
        Cbor::Bytes(bytes) => String::from_utf8(bytes)
            .map(Value::Text)
            .map_err(|_| ProtoError::Shape("byte string is not valid utf-8")),
        Cbor::Array(items) => items
            .into_iter()
            .map(convert)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        _ => Err(ProtoError::Shape("unsupported value type")),
    }
}

/// Decode a frame payload into an acknowledgement or a routable message.
///
/// Undecodable inner entries (oversized keys, out-of-range integers) are
/// logged and skipped; they do not poison the rest of the envelope. A bare
/// inner value is accepted as a single entry whose absolute subtype equals
/// the message type, which is the shape event strings arrive in.
pub fn decode(payload: &[u8]) -> Result<Decoded, ProtoError> {
    let top: Cbor = serde_cbor::from_slice(payload)?;
    let Cbor::Map(map) = top else {
        return Err(ProtoError::Shape("payload is not a map"));
    };

    let mut pairs = map.into_iter();
    let Some((key, inner)) = pairs.next() else {
        return Ok(Decoded::Ack { message_type: None });
    };
    if pairs.next().is_some() {
        return Err(ProtoError::Shape("expected exactly one top-level key"));
    }
    let Some(message_type) = key_u16(&key) else {
        return Err(ProtoError::Shape("top-level key is not a 16-bit integer"));
    };

    match inner {
        Cbor::Map(inner) if inner.is_empty() => Ok(Decoded::Ack {
            message_type: Some(message_type),
        }),
        Cbor::Map(inner) => {
            let mut entries = Vec::with_capacity(inner.len());
            for (subtype_key, value) in inner {
                let Some(subtype) = key_u16(&subtype_key) else {
                    warn!(key = ?subtype_key, "subtype key is not a 16-bit integer, skipping");
                    continue;
                };
                match convert(value) {
                    Ok(value) => entries.push((subtype, value)),
                    Err(err) => warn!(
                        subtype = %format_args!("0x{:04x}", subtype),
                        error = %err,
                        "undecodable entry value, skipping"
                    ),
                }
            }
            Ok(Decoded::Message(Envelope {
                message_type,
                entries,
            }))
        }
        other => {
            let value = convert(other)?;
            Ok(Decoded::Message(Envelope {
                message_type,
                entries: vec![(message_type, value)],
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_int_produces_canonical_wire_bytes() {
        // {0x0020: {0x0021: 1}}
        let (frame_id, body) = encode_int(0x0020, 1, 1).unwrap();
        assert_eq!(frame_id, 0x20);
        assert_eq!(body, vec![0xA1, 0x18, 0x20, 0xA1, 0x18, 0x21, 0x01]);

        // {0xAA00: {0xAA05: 0}}
        let (frame_id, body) = encode_int(0xAA00, 5, 0).unwrap();
        assert_eq!(frame_id, 0xAA);
        assert_eq!(body, vec![0xA1, 0x19, 0xAA, 0x00, 0xA1, 0x19, 0xAA, 0x05, 0x00]);
    }

    #[test]
    fn encode_decode_int_roundtrip() {
        let (_, body) = encode_int(0x0800, 1, 2).unwrap();
        let decoded = decode(&body).unwrap();
        assert_eq!(
            decoded,
            Decoded::Message(Envelope {
                message_type: 0x0800,
                entries: vec![(0x0801, Value::Int(2))],
            })
        );
    }

    #[test]
    fn encode_decode_str_roundtrip() {
        let (frame_id, body) = encode_str(0xA040, 1, "1.4.2").unwrap();
        assert_eq!(frame_id, 0x40);
        let decoded = decode(&body).unwrap();
        assert_eq!(
            decoded,
            Decoded::Message(Envelope {
                message_type: 0xA040,
                entries: vec![(0xA041, Value::Text("1.4.2".to_owned()))],
            })
        );
    }

    #[test]
    fn empty_map_is_an_ack() {
        assert_eq!(decode(&[0xA0]).unwrap(), Decoded::Ack { message_type: None });
    }

    #[test]
    fn empty_inner_map_is_an_ack_with_family() {
        // {0x00C0: {}}
        let payload = [0xA1, 0x18, 0xC0, 0xA0];
        assert_eq!(
            decode(&payload).unwrap(),
            Decoded::Ack {
                message_type: Some(0x00C0)
            }
        );
        assert!(is_raw_ack(&payload, 0xC0));
        assert!(!is_raw_ack(&payload, 0x20));
        assert!(!is_raw_ack(&[0xA1, 0x18, 0xC0], 0xC0));
    }

    #[test]
    fn bare_inner_value_becomes_single_entry() {
        // {0x0000: "scooter:blinker right"} — events come in this shape.
        let mut outer = std::collections::BTreeMap::new();
        outer.insert(
            Cbor::Integer(0),
            Cbor::Text("scooter:blinker right".to_owned()),
        );
        let payload = serde_cbor::to_vec(&Cbor::Map(outer)).unwrap();

        let decoded = decode(&payload).unwrap();
        assert_eq!(
            decoded,
            Decoded::Message(Envelope {
                message_type: 0x0000,
                entries: vec![(0x0000, Value::Text("scooter:blinker right".to_owned()))],
            })
        );
    }

    #[test]
    fn arrays_decode_recursively() {
        // {0xA021: {0xA021: [4, 7]}} — the reset info shape.
        let mut inner = std::collections::BTreeMap::new();
        inner.insert(
            Cbor::Integer(0xA021),
            Cbor::Array(vec![Cbor::Integer(4), Cbor::Integer(7)]),
        );
        let mut outer = std::collections::BTreeMap::new();
        outer.insert(Cbor::Integer(0xA021), Cbor::Map(inner));
        let payload = serde_cbor::to_vec(&Cbor::Map(outer)).unwrap();

        let decoded = decode(&payload).unwrap();
        assert_eq!(
            decoded,
            Decoded::Message(Envelope {
                message_type: 0xA021,
                entries: vec![(0xA021, Value::Array(vec![Value::Int(4), Value::Int(7)]))],
            })
        );
    }

    #[test]
    fn out_of_range_integers_are_skipped_not_fatal() {
        let mut inner = std::collections::BTreeMap::new();
        inner.insert(Cbor::Integer(0x0061), Cbor::Integer(i128::from(u64::MAX)));
        inner.insert(Cbor::Integer(0x0062), Cbor::Integer(42));
        let mut outer = std::collections::BTreeMap::new();
        outer.insert(Cbor::Integer(0x0060), Cbor::Map(inner));
        let payload = serde_cbor::to_vec(&Cbor::Map(outer)).unwrap();

        let decoded = decode(&payload).unwrap();
        assert_eq!(
            decoded,
            Decoded::Message(Envelope {
                message_type: 0x0060,
                entries: vec![(0x0062, Value::Int(42))],
            })
        );
    }

    #[test]
    fn multi_key_top_level_is_rejected() {
        let mut outer = std::collections::BTreeMap::new();
        outer.insert(Cbor::Integer(1), Cbor::Map(Default::default()));
        outer.insert(Cbor::Integer(2), Cbor::Map(Default::default()));
        let payload = serde_cbor::to_vec(&Cbor::Map(outer)).unwrap();
        assert!(decode(&payload).is_err());
    }

    #[test]
    fn garbage_payload_is_a_decode_error() {
        assert!(decode(&[0xFF, 0xFF, 0xFF]).is_err());
        assert!(decode(&[0x01]).is_err()); // integer, not a map
    }
}
