//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Primary orchestration and lifecycle management."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Outbound translation: externally published field changes become framed
//! messages. Every translator reads the current store value (not the
//! publish payload), falls back to a default with a warning when it is
//! missing or malformed, and sends exactly the frames the protocol asks
//! for.

use anyhow::Result;
use tracing::{debug, info, warn};

use v_link_proto::types::{battery_slot, family, rel};
use v_link_proto::BatteryState;

use crate::keys;
use crate::service::Service;

impl Service {
    /// React to a field change published on a watched key.
    pub async fn handle_store_event(&self, key: &str, field: &str) {
        let result = match (key, field) {
            (keys::VEHICLE, "state") => self.update_vehicle_state().await,
            (keys::VEHICLE, "seatbox:lock") => self.update_seatbox_lock().await,
            (keys::VEHICLE, "handlebar:lock-sensor") => self.update_handlebar_lock().await,
            ("battery:0", _) | ("battery:1", _) => {
                let slot = usize::from(key == "battery:1");
                match field {
                    "state" => self.update_battery_state(slot).await,
                    "present" => {
                        // Presence changes refresh the cycle count too.
                        let presence = self.update_battery_present(slot).await;
                        let cycles = self.update_battery_cycle_count(slot).await;
                        presence.and(cycles)
                    }
                    "charge" => self.update_battery_charge(slot).await,
                    "cycle-count" => self.update_battery_cycle_count(slot).await,
                    other => {
                        warn!(key, field = other, "unhandled battery field");
                        Ok(())
                    }
                }
            }
            (keys::POWER_MANAGER, "state") => self.update_power_state().await,
            (keys::MILEAGE, "odometer") => self.update_mileage().await,
            (keys::FIRMWARE, "mdb-version") => self.update_firmware_version().await,
            (keys::BLE, "pin-code") => self.handle_pin_code_change().await,
            (key, field) => {
                warn!(key, field, "unhandled store event");
                Ok(())
            }
        };
        if let Err(err) = result {
            warn!(key, field, error = %err, "failed to send update");
        }
    }

    pub async fn update_vehicle_state(&self) -> Result<()> {
        let state = self.state_int_or_default(keys::VEHICLE, "state").await;
        self.send_int(family::VEHICLE_STATE, rel::VEHICLE_STATE_STATE, state)?;
        info!(state, "sent vehicle state");
        Ok(())
    }

    pub async fn update_seatbox_lock(&self) -> Result<()> {
        let state = self
            .state_int_or_default(keys::VEHICLE, "seatbox:lock")
            .await;
        self.send_int(family::VEHICLE_STATE, rel::VEHICLE_STATE_SEATBOX, state)?;
        info!(state, "sent seatbox lock state");
        Ok(())
    }

    pub async fn update_handlebar_lock(&self) -> Result<()> {
        let state = match self.store.get_string(keys::VEHICLE, "handlebar:lock-sensor").await {
            Ok(raw) => match raw.as_str() {
                "locked" => 0,
                "unlocked" => 1,
                other => {
                    warn!(state = %other, "unknown handlebar lock state, sending default 0");
                    0
                }
            },
            Err(err) => {
                warn!(error = %err, "no handlebar lock state, sending default 0");
                0
            }
        };
        self.send_int(family::VEHICLE_STATE, rel::VEHICLE_STATE_HANDLEBAR, state)?;
        info!(state, "sent handlebar lock state");
        Ok(())
    }

    pub async fn update_battery_state(&self, slot: usize) -> Result<()> {
        let key = keys::BATTERY_SLOTS[slot];
        let raw = match self.store.get_string(key, "state").await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(slot, error = %err, "no battery state, sending unknown");
                "unknown".to_owned()
            }
        };
        let state = BatteryState::from_store(&raw);
        self.send_int(
            family::BATTERY,
            battery_slot::relative(slot, battery_slot::STATE),
            state.code() as u16,
        )?;
        info!(slot, state = state.as_str(), "sent battery state");
        Ok(())
    }

    pub async fn update_battery_present(&self, slot: usize) -> Result<()> {
        let key = keys::BATTERY_SLOTS[slot];
        // Older producers wrote the field as a string; accept both forms.
        let present = match self.store.get_int(key, "present").await {
            Ok(present) => u16::from(present != 0),
            Err(_) => match self.store.get_string(key, "present").await {
                Ok(raw) => u16::from(matches!(raw.as_str(), "true" | "1")),
                Err(err) => {
                    warn!(slot, error = %err, "no battery presence, sending default 0");
                    0
                }
            },
        };
        self.send_int(
            family::BATTERY,
            battery_slot::relative(slot, battery_slot::PRESENCE),
            present,
        )?;
        info!(slot, present, "sent battery presence");
        Ok(())
    }

    pub async fn update_battery_cycle_count(&self, slot: usize) -> Result<()> {
        let key = keys::BATTERY_SLOTS[slot];
        let cycles = self.int_or_default(key, "cycle-count").await;
        self.send_int(
            family::BATTERY,
            battery_slot::relative(slot, battery_slot::CYCLE_COUNT),
            cycles,
        )?;
        info!(slot, cycles, "sent battery cycle count");
        Ok(())
    }

    pub async fn update_battery_charge(&self, slot: usize) -> Result<()> {
        let key = keys::BATTERY_SLOTS[slot];
        let charge = self.int_or_default(key, "charge").await;
        self.send_int(
            family::BATTERY,
            battery_slot::relative(slot, battery_slot::CHARGE),
            charge,
        )?;
        info!(slot, charge, "sent battery charge");
        Ok(())
    }

    pub async fn update_power_state(&self) -> Result<()> {
        let raw = match self.store.get_string(keys::POWER_MANAGER, "state").await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(error = %err, "no power state, sending running");
                "running".to_owned()
            }
        };
        let state: u16 = match raw.as_str() {
            "running" => 1,
            "suspending" => 0,
            "hibernating" => 2,
            // The base hibernation state; the level goes out separately below.
            "hibernating-l2" => 2,
            "suspending-imminent" => 3,
            "hibernating-imminent" => 4,
            "reboot" => 5,
            "reboot-imminent" => {
                info!("reboot imminent, reporting running state");
                1
            }
            other => {
                warn!(state = %other, "unknown power state, sending running");
                1
            }
        };
        self.send_int(family::POWER_MANAGEMENT, rel::POWER_MANAGEMENT_STATE, state)?;
        info!(state, from = %raw, "sent power management state");

        if raw == "hibernating-l2" {
            match self.send_int(
                family::POWER_MANAGEMENT,
                rel::POWER_MANAGEMENT_POWER_REQUEST,
                1,
            ) {
                Ok(()) => info!("sent hibernation level request (L2)"),
                Err(err) => warn!(error = %err, "failed to send hibernation level request"),
            }
        }
        Ok(())
    }

    pub async fn update_mileage(&self) -> Result<()> {
        let mileage = self.int_or_default(keys::MILEAGE, "odometer").await;
        self.send_int(family::SCOOTER_INFO, rel::SCOOTER_INFO_MILEAGE, mileage)?;
        info!(mileage, "sent mileage");
        Ok(())
    }

    pub async fn update_firmware_version(&self) -> Result<()> {
        let version = match self.store.get_string(keys::FIRMWARE, "mdb-version").await {
            Ok(version) => version,
            Err(err) => {
                warn!(error = %err, "no firmware version, sending empty string");
                String::new()
            }
        };
        self.send_str(
            family::SCOOTER_INFO,
            rel::SCOOTER_INFO_SOFTWARE_VERSION,
            &version,
        )?;
        info!(version = %version, "sent firmware version");
        Ok(())
    }

    /// A pin-code publish with the field gone or empty means the pin left
    /// the display; tell the co-processor to stop showing it.
    pub async fn handle_pin_code_change(&self) -> Result<()> {
        match self.store.get_string(keys::BLE, "pin-code").await {
            Ok(pin) if !pin.is_empty() => {
                debug!("pairing pin set, no action needed");
                Ok(())
            }
            _ => {
                info!("pairing pin removed, sending removal command");
                self.send_int(family::BLE_PAIRING_PIN_REMOVE, 0, 1)
            }
        }
    }

    async fn state_int_or_default(&self, key: &str, field: &str) -> u16 {
        match self.store.get_state_int(key, field).await {
            Ok(value) => value as u16,
            Err(err) => {
                warn!(key, field, error = %err, "missing state value, sending default 0");
                0
            }
        }
    }

    async fn int_or_default(&self, key: &str, field: &str) -> u16 {
        match self.store.get_int(key, field).await {
            Ok(value) => value as u16,
            Err(err) => {
                warn!(key, field, error = %err, "missing value, sending default 0");
                0
            }
        }
    }
}
