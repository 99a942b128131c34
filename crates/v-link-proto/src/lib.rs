//! ---
//! vlink_section: "02-messaging-ipc-data-model"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Message schema helpers and protocol codecs."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Structured message layer carried inside wire frames.
//!
//! Every payload is a CBOR map with a single 16-bit key, the message-type
//! family, whose value is an inner map keyed by *absolute* 16-bit subtypes
//! (family base plus relative offset). An empty inner map is an
//! acknowledgement. The frame identifier used for transport is the low byte
//! of the family.

pub mod envelope;
pub mod types;

pub use envelope::{decode, encode_int, encode_str, is_raw_ack, Decoded, Envelope, Value};
pub use types::BatteryState;

/// Errors from the envelope codec.
#[derive(Debug, thiserror::Error)]
pub enum ProtoError {
    /// The payload is not decodable CBOR.
    #[error("cbor codec failure: {0}")]
    Cbor(#[from] serde_cbor::Error),
    /// The payload decoded but does not have the envelope shape.
    #[error("malformed envelope: {0}")]
    Shape(&'static str),
    /// An integer value does not fit the signed 64-bit container.
    #[error("integer value out of range")]
    IntRange,
}
