//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Primary orchestration and lifecycle management."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Start-up orchestration: the co-processor handshake and the initial
//! state push. Every step is logged and tolerated on failure so a
//! partially ready device still yields a running service.

use std::time::Duration;

use anyhow::Result;
use tokio::time::sleep;
use tracing::{info, warn};

use v_link_proto::types::{ble_command, family, rel};

use crate::service::Service;

/// Spacing between handshake commands.
const COMMAND_SPACING: Duration = Duration::from_millis(50);

impl Service {
    /// Send the co-processor initialisation sequence.
    pub async fn initialize_device(&self) {
        info!("starting co-processor initialisation");

        let steps: [(&str, u16, u16, u16); 6] = [
            (
                "disable data streaming",
                family::DATA_STREAM,
                rel::DATA_STREAM_ENABLE,
                0,
            ),
            (
                "request firmware version",
                family::BLE_VERSION,
                rel::BLE_VERSION_STRING,
                0,
            ),
            (
                "request MAC address",
                family::BLE_PARAM,
                rel::BLE_PARAM_MAC_ADDRESS,
                0,
            ),
            (
                "enable data streaming",
                family::DATA_STREAM,
                rel::DATA_STREAM_ENABLE,
                1,
            ),
            (
                "sync data stream",
                family::DATA_STREAM,
                rel::DATA_STREAM_SYNC,
                1,
            ),
            (
                "restart advertising without whitelist",
                family::BLE_COMMAND,
                ble_command::ADV_RESTART_NO_WHITELIST,
                0,
            ),
        ];

        for (i, (step, message_type, relative, value)) in steps.iter().enumerate() {
            if i > 0 {
                sleep(COMMAND_SPACING).await;
            }
            match self.send_int(*message_type, *relative, *value) {
                Ok(()) => info!(step, "sent initialisation command"),
                Err(err) => warn!(step, error = %err, "initialisation command failed"),
            }
        }

        info!("co-processor initialisation sequence sent");
    }

    /// Push the current store state so a freshly booted co-processor has a
    /// complete picture.
    pub async fn push_initial_state(&self) {
        info!("sending initial state updates");

        log_initial(self.update_vehicle_state().await);
        log_initial(self.update_seatbox_lock().await);
        log_initial(self.update_handlebar_lock().await);
        log_initial(self.update_mileage().await);
        log_initial(self.update_firmware_version().await);
        for slot in 0..2 {
            log_initial(self.update_battery_present(slot).await);
            log_initial(self.update_battery_state(slot).await);
            log_initial(self.update_battery_cycle_count(slot).await);
            log_initial(self.update_battery_charge(slot).await);
        }
        log_initial(self.update_power_state().await);

        info!("initial state updates sent");
    }
}

fn log_initial(result: Result<()>) {
    if let Err(err) = result {
        warn!(error = %err, "initial state update failed");
    }
}
