//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Primary orchestration and lifecycle management."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Command-list watcher: BLE commands queued by vehicle services are popped
//! from the right of the list and sent to the co-processor.

use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};

use v_link_proto::types::{ble_command, family};

use crate::keys;
use crate::service::Service;

/// Pop timeout; bounds how long a pending shutdown waits for the watcher.
const POP_TIMEOUT: Duration = Duration::from_secs(1);

/// Back-off after a failed pop.
const ERROR_BACKOFF: Duration = Duration::from_secs(1);

impl Service {
    /// Blocking-pop loop over the command list; exits when the shutdown
    /// channel fires.
    pub(crate) async fn watch_commands(&self, mut shutdown: broadcast::Receiver<()>) {
        info!(list = keys::COMMAND_LIST, "command watcher started");
        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                popped = self.store.blocking_right_pop(keys::COMMAND_LIST, POP_TIMEOUT) => {
                    match popped {
                        Ok(Some(command)) => self.dispatch_command(&command),
                        Ok(None) => {}
                        Err(err) => {
                            warn!(error = %err, "command pop failed");
                            tokio::time::sleep(ERROR_BACKOFF).await;
                        }
                    }
                }
            }
        }
        info!("command watcher stopped");
    }

    /// Map one queued command string to its outbound message.
    pub fn dispatch_command(&self, command: &str) {
        let (message_type, relative, value) = match command {
            "advertising-start-with-whitelisting" => (
                family::BLE_COMMAND,
                ble_command::ADV_START_WITH_WHITELIST,
                0,
            ),
            "advertising-restart-no-whitelisting" => (
                family::BLE_COMMAND,
                ble_command::ADV_RESTART_NO_WHITELIST,
                0,
            ),
            "advertising-stop" => (family::BLE_COMMAND, ble_command::ADV_STOP, 0),
            "delete-bond" => (family::BLE_COMMAND, ble_command::DELETE_BOND, 0),
            "delete-all-bonds" => (family::BLE_COMMAND, ble_command::DELETE_ALL_BONDS, 0),
            "remove" => (family::BLE_PAIRING_PIN_REMOVE, 0, 1),
            other => {
                warn!(command = %other, "unknown command, discarding");
                return;
            }
        };

        match self.send_int(message_type, relative, value) {
            Ok(()) => info!(
                command,
                message_type = %format_args!("0x{:04x}", message_type),
                subtype = %format_args!("0x{:04x}", relative),
                "sent command"
            ),
            Err(err) => warn!(command, error = %err, "failed to send command"),
        }
    }
}
