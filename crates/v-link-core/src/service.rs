//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Primary orchestration and lifecycle management."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use v_link_frame::Frame;
use v_link_proto::envelope;
use v_link_serial::FrameSink;
use v_link_store::StateBus;

use crate::keys;

/// Store keys whose publishes drive outbound updates.
const WATCHED_KEYS: [&str; 7] = [
    keys::VEHICLE,
    "battery:0",
    "battery:1",
    keys::POWER_MANAGER,
    keys::MILEAGE,
    keys::FIRMWARE,
    keys::BLE,
];

/// The bridge service: routes inbound envelopes to state-bus writes and
/// externally published changes back out as framed messages.
pub struct Service {
    pub(crate) store: Arc<dyn StateBus>,
    pub(crate) sink: Arc<dyn FrameSink>,
}

impl Service {
    pub fn new(store: Arc<dyn StateBus>, sink: Arc<dyn FrameSink>) -> Self {
        Self { store, sink }
    }

    /// Encode and emit one integer-valued message.
    pub(crate) fn send_int(&self, message_type: u16, relative: u16, value: u16) -> Result<()> {
        let (frame_id, body) = envelope::encode_int(message_type, relative, value)?;
        self.sink.send_frame(frame_id, &body)?;
        Ok(())
    }

    /// Encode and emit one string-valued message.
    pub(crate) fn send_str(&self, message_type: u16, relative: u16, value: &str) -> Result<()> {
        let (frame_id, body) = envelope::encode_str(message_type, relative, value)?;
        self.sink.send_frame(frame_id, &body)?;
        Ok(())
    }

    /// Spawn the frame-dispatch task, the per-key subscriber tasks and the
    /// command watcher, returning a handle for lifecycle control.
    ///
    /// Frames arriving on `frames` are routed in receipt order: the dispatch
    /// task awaits each handler before decoding the next frame.
    pub async fn start(
        self: Arc<Self>,
        mut frames: mpsc::UnboundedReceiver<Frame>,
    ) -> Result<ServiceHandle> {
        let (shutdown_tx, _) = broadcast::channel(8);
        let mut tasks = Vec::new();

        {
            let service = self.clone();
            let mut shutdown = shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        frame = frames.recv() => match frame {
                            Some(frame) => service.handle_frame(frame).await,
                            None => break,
                        }
                    }
                }
                debug!("frame dispatch stopped");
            }));
        }

        for key in WATCHED_KEYS {
            let mut updates = self
                .store
                .subscribe(key)
                .await
                .with_context(|| format!("failed to subscribe to {key}"))?;
            let service = self.clone();
            let mut shutdown = shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown.recv() => break,
                        payload = updates.recv() => match payload {
                            Some(payload) => {
                                debug!(channel = key, payload = %payload, "store publish");
                                match field_of(&payload, known_fields(key)) {
                                    Some(field) => service.handle_store_event(key, field).await,
                                    None => warn!(
                                        channel = key,
                                        payload = %payload,
                                        "publish for unhandled field"
                                    ),
                                }
                            }
                            None => break,
                        }
                    }
                }
                debug!(channel = key, "subscriber stopped");
            }));
        }

        {
            let service = self.clone();
            let shutdown = shutdown_tx.subscribe();
            tasks.push(tokio::spawn(async move {
                service.watch_commands(shutdown).await;
            }));
        }

        info!("bridge service started");
        Ok(ServiceHandle {
            shutdown: shutdown_tx,
            tasks,
        })
    }
}

/// Handle returned from service startup; joins every task on shutdown.
pub struct ServiceHandle {
    shutdown: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl ServiceHandle {
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "task join error");
            }
        }
        info!("bridge service shutdown complete");
        Ok(())
    }
}

/// Fields the router reacts to, per watched key.
fn known_fields(key: &str) -> &'static [&'static str] {
    match key {
        keys::VEHICLE => &["state", "seatbox:lock", "handlebar:lock-sensor"],
        "battery:0" | "battery:1" => &["state", "present", "charge", "cycle-count"],
        keys::POWER_MANAGER => &["state"],
        keys::MILEAGE => &["odometer"],
        keys::FIRMWARE => &["mdb-version"],
        keys::BLE => &["pin-code"],
        _ => &[],
    }
}

/// Extract the field name from a `"<field>:<value>"` publish payload.
///
/// Field names themselves may contain `:` (`seatbox:lock`,
/// `handlebar:lock-sensor`), so the payload is matched against the key's
/// known field set instead of being split at the first colon.
fn field_of(payload: &str, known: &[&'static str]) -> Option<&'static str> {
    known.iter().copied().find(|field| {
        payload == *field
            || (payload.len() > field.len()
                && payload.starts_with(field)
                && payload.as_bytes()[field.len()] == b':')
    })
}
