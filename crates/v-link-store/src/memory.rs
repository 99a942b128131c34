//! ---
//! vlink_section: "05-networking-external-interfaces"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Network connectivity and edge adapters."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use crate::{StateBus, StoreError};

/// Poll interval for the in-memory blocking pop.
const POP_POLL: Duration = Duration::from_millis(5);

#[derive(Default)]
struct MemoryState {
    hashes: HashMap<String, HashMap<String, String>>,
    lists: HashMap<String, VecDeque<String>>,
    subscribers: HashMap<String, Vec<mpsc::UnboundedSender<String>>>,
}

/// In-memory state bus backed by a mutex-protected map, with the same
/// publish semantics as the Redis implementation. Primarily for tests and
/// single-process integration.
#[derive(Default)]
pub struct MemoryBus {
    inner: Mutex<MemoryState>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self, key: &str, field: &str, value: String) {
        let mut state = self.inner.lock();
        state
            .hashes
            .entry(key.to_owned())
            .or_default()
            .insert(field.to_owned(), value);
    }

    fn publish(&self, key: &str, payload: &str) {
        let mut state = self.inner.lock();
        if let Some(subscribers) = state.subscribers.get_mut(key) {
            subscribers.retain(|tx| tx.send(payload.to_owned()).is_ok());
        }
    }
}

#[async_trait]
impl StateBus for MemoryBus {
    async fn write_string(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        self.set(key, field, value.to_owned());
        Ok(())
    }

    async fn write_int(&self, key: &str, field: &str, value: i64) -> Result<(), StoreError> {
        self.set(key, field, value.to_string());
        Ok(())
    }

    async fn write_and_publish_string(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.set(key, field, value.to_owned());
        self.publish(key, &format!("{field}:{value}"));
        Ok(())
    }

    async fn write_and_publish_int(
        &self,
        key: &str,
        field: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        self.set(key, field, value.to_string());
        self.publish(key, &format!("{field}:{value}"));
        Ok(())
    }

    async fn get_string(&self, key: &str, field: &str) -> Result<String, StoreError> {
        self.inner
            .lock()
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned()
            .ok_or_else(|| StoreError::MissingField {
                key: key.to_owned(),
                field: field.to_owned(),
            })
    }

    async fn get_int(&self, key: &str, field: &str) -> Result<i64, StoreError> {
        let raw = self.get_string(key, field).await?;
        raw.parse().map_err(|_| StoreError::NotAnInteger {
            key: key.to_owned(),
            field: field.to_owned(),
            value: raw,
        })
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<(), StoreError> {
        if let Some(hash) = self.inner.lock().hashes.get_mut(key) {
            hash.remove(field);
        }
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner
            .lock()
            .lists
            .entry(key.to_owned())
            .or_default()
            .push_front(value.to_owned());
        Ok(())
    }

    async fn blocking_right_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self
                .inner
                .lock()
                .lists
                .get_mut(key)
                .and_then(VecDeque::pop_back)
            {
                return Ok(Some(value));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            sleep(POP_POLL).await;
        }
    }

    async fn subscribe(&self, key: &str) -> Result<mpsc::UnboundedReceiver<String>, StoreError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .lock()
            .subscribers
            .entry(key.to_owned())
            .or_default()
            .push(tx);
        Ok(rx)
    }
}
