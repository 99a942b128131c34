//! ---
//! vlink_section: "05-networking-external-interfaces"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Network connectivity and edge adapters."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! State bus adapter.
//!
//! Subsystem state lives in hash-valued keys (`vehicle`, `battery:0`, ...);
//! a publish on the channel named after a key carries `"<field>:<value>"`
//! and signals external producers' writes. Plain writes do NOT publish —
//! that asymmetry is what keeps inbound handling from echoing straight back
//! out of the outbound translators.
//!
//! Two implementations: [`RedisBus`] for production and [`MemoryBus`],
//! primarily for tests and single-process integration.

mod memory;
mod redis_bus;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use memory::MemoryBus;
pub use redis_bus::RedisBus;

/// Errors from state bus operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The hash exists but the field does not (or neither exists).
    #[error("key {key} field {field} not found")]
    MissingField { key: String, field: String },
    /// A field held a value that does not parse as the requested type.
    #[error("key {key} field {field} holds non-integer value {value:?}")]
    NotAnInteger {
        key: String,
        field: String,
        value: String,
    },
    /// Transport-level failure talking to the bus.
    #[error("state bus error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Map a vehicle-state style string to its wire integer form.
///
/// Unrecognised strings fall through to integer parsing, mirroring fields
/// that are stored numerically in the first place.
pub fn state_to_int(raw: &str) -> Option<i64> {
    match raw {
        "standby" => Some(0),
        "parked" => Some(1),
        "ready-to-drive" => Some(2),
        "shutting-down" => Some(3),
        "updating" => Some(4),
        "off" => Some(5),
        "running" => Some(1),
        "closed" => Some(0),
        "open" => Some(1),
        other => other.parse().ok(),
    }
}

/// Typed access to the vehicle state bus.
///
/// Implementations are internally thread-safe; callers may invoke from any
/// task. Publish payloads have the form `"<field>:<value>"` on a channel
/// named exactly as the key; [`StateBus::subscribe`] delivers the raw
/// payloads and leaves field extraction to the router.
#[async_trait]
pub trait StateBus: Send + Sync {
    /// Set a string field without publishing.
    async fn write_string(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// Set an integer field without publishing.
    async fn write_int(&self, key: &str, field: &str, value: i64) -> Result<(), StoreError>;

    /// Set a string field and publish `"<field>:<value>"` on the key's channel.
    async fn write_and_publish_string(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError>;

    /// Set an integer field and publish `"<field>:<value>"` on the key's channel.
    async fn write_and_publish_int(
        &self,
        key: &str,
        field: &str,
        value: i64,
    ) -> Result<(), StoreError>;

    /// Read a string field.
    async fn get_string(&self, key: &str, field: &str) -> Result<String, StoreError>;

    /// Read an integer field.
    async fn get_int(&self, key: &str, field: &str) -> Result<i64, StoreError>;

    /// Delete a field from a hash.
    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError>;

    /// Left-push onto a list key.
    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Blocking right-pop from a list key. `Ok(None)` on timeout.
    async fn blocking_right_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError>;

    /// Subscribe to a key's channel; the receiver yields raw publish payloads.
    async fn subscribe(&self, key: &str) -> Result<mpsc::UnboundedReceiver<String>, StoreError>;

    /// Read a field holding a state string, mapped to its integer form.
    async fn get_state_int(&self, key: &str, field: &str) -> Result<i64, StoreError> {
        let raw = self.get_string(key, field).await?;
        match state_to_int(&raw) {
            Some(value) => Ok(value),
            None => Err(StoreError::NotAnInteger {
                key: key.to_owned(),
                field: field.to_owned(),
                value: raw,
            }),
        }
    }
}
