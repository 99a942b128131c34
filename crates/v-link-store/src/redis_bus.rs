//! ---
//! vlink_section: "05-networking-external-interfaces"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Network connectivity and edge adapters."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use v_link_common::Config;

use crate::{StateBus, StoreError};

/// Redis-backed state bus.
///
/// Ordinary operations share a multiplexed connection; the blocking pop has
/// a connection of its own so a waiting `BRPOP` cannot stall unrelated
/// commands. Each subscription owns a dedicated pub/sub connection.
pub struct RedisBus {
    client: redis::Client,
    conn: MultiplexedConnection,
    pop_conn: tokio::sync::Mutex<MultiplexedConnection>,
}

impl RedisBus {
    /// Connect and verify the server responds to `PING`.
    pub async fn connect(config: &Config) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.redis_url())?;
        let mut conn = client.get_multiplexed_async_connection().await?;
        let pop_conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, ()>(&mut conn).await?;
        debug!(addr = %config.redis_addr, db = config.redis_db, "connected to state bus");
        Ok(Self {
            client,
            conn,
            pop_conn: tokio::sync::Mutex::new(pop_conn),
        })
    }
}

#[async_trait]
impl StateBus for RedisBus {
    async fn write_string(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn write_int(&self, key: &str, field: &str, value: i64) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn write_and_publish_string(
        &self,
        key: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .hset(key, field, value)
            .ignore()
            .publish(key, format!("{field}:{value}"))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn write_and_publish_int(
        &self,
        key: &str,
        field: &str,
        value: i64,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::pipe()
            .hset(key, field, value)
            .ignore()
            .publish(key, format!("{field}:{value}"))
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn get_string(&self, key: &str, field: &str) -> Result<String, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.hget(key, field).await?;
        value.ok_or_else(|| StoreError::MissingField {
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
        let mut conn = self.conn.clone();
        let _: () = conn.hdel(key, field).await?;
        Ok(())
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: () = conn.lpush(key, value).await?;
        Ok(())
    }

    async fn blocking_right_pop(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<Option<String>, StoreError> {
        let mut conn = self.pop_conn.lock().await;
        let reply: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(key)
            .arg(timeout.as_secs().max(1))
            .query_async(&mut *conn)
            .await?;
        Ok(reply.map(|(_, value)| value))
    }

    async fn subscribe(&self, key: &str) -> Result<mpsc::UnboundedReceiver<String>, StoreError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(key).await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let channel = key.to_owned();
        tokio::spawn(async move {
            let mut messages = pubsub.on_message();
            while let Some(message) = messages.next().await {
                let payload: String = match message.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        warn!(channel = %channel, error = %err, "undecodable publish payload");
                        continue;
                    }
                };
                if tx.send(payload).is_err() {
                    break;
                }
            }
            debug!(channel = %channel, "subscription closed");
        });
        Ok(rx)
    }
}
