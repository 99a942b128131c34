//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Primary orchestration and lifecycle management."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Inbound dispatch: frame payload → envelope → subsystem handler.

use tracing::{debug, info, warn};

use v_link_frame::Frame;
use v_link_proto::envelope::{self, Decoded, Value};
use v_link_proto::types::{
    battery_slot, family, gauge_batt_status, gauge_protection, gauge_status, rel,
};
use v_link_proto::BatteryState;

use crate::keys;
use crate::service::Service;

/// Fuel-gauge status alert bits in their fixed precedence order: the first
/// set bit wins.
const GAUGE_ALERTS: [(i64, &str); 8] = [
    (
        gauge_status::CURR_MIN_ALERT,
        "Minimum Current Alert Threshold Exceeded",
    ),
    (
        gauge_status::CURR_MAX_ALERT,
        "Maximum Current Alert Threshold Exceeded",
    ),
    (
        gauge_status::VOLT_MIN_ALERT,
        "Minimum Voltage Alert Threshold Exceeded",
    ),
    (
        gauge_status::VOLT_MAX_ALERT,
        "Maximum Voltage Alert Threshold Exceeded",
    ),
    (
        gauge_status::TEMP_MIN_ALERT,
        "Minimum Temperature Alert Threshold Exceeded",
    ),
    (
        gauge_status::TEMP_MAX_ALERT,
        "Maximum Temperature Alert Threshold Exceeded",
    ),
    (
        gauge_status::SOC_MIN_ALERT,
        "Minimum SOC Alert Threshold Exceeded",
    ),
    (
        gauge_status::SOC_MAX_ALERT,
        "Maximum SOC Alert Threshold Exceeded",
    ),
];

impl Service {
    /// Route one received frame.
    ///
    /// Every frame yields zero or one envelope; each inner entry is routed
    /// to at most one handler based on the 16-bit family, never on the 8-bit
    /// frame identifier alone (several families collapse to the same id).
    pub async fn handle_frame(&self, frame: Frame) {
        if envelope::is_raw_ack(&frame.payload, frame.id) {
            self.log_ack(frame.id);
            return;
        }

        let decoded = match envelope::decode(&frame.payload) {
            Ok(decoded) => decoded,
            Err(err) => {
                warn!(
                    frame_id = %format_args!("0x{:02x}", frame.id),
                    error = %err,
                    "failed to decode envelope"
                );
                return;
            }
        };

        match decoded {
            Decoded::Ack { message_type: Some(message_type) } => {
                debug!(
                    message_type = %format_args!("0x{:04x}", message_type),
                    "acknowledgement"
                );
            }
            Decoded::Ack { message_type: None } => self.log_ack(frame.id),
            Decoded::Message(message) => {
                if message.entries.is_empty() {
                    debug!(
                        message_type = %format_args!("0x{:04x}", message.message_type),
                        "message with empty parameter map"
                    );
                }
                let message_type = message.message_type;
                for (absolute, value) in message.entries {
                    self.route_entry(message_type, absolute, value).await;
                }
            }
        }
    }

    /// Acknowledgement with no family inside: classify by frame id as far
    /// as the id overlap allows.
    fn log_ack(&self, frame_id: u8) {
        let source = match frame_id {
            0xC0 => "data-stream",
            0xE0 => "battery",
            0xAA => "ble-command",
            0x80 => "ble-param",
            0x20 => "vehicle-state or ble-debug",
            0x40 => "scooter-info or aux-battery",
            _ => "unknown",
        };
        debug!(
            frame_id = %format_args!("0x{:02x}", frame_id),
            source, "acknowledgement"
        );
    }

    async fn route_entry(&self, message_type: u16, absolute: u16, value: Value) {
        let relative = if absolute >= message_type {
            absolute - message_type
        } else {
            warn!(
                absolute = %format_args!("0x{:04x}", absolute),
                message_type = %format_args!("0x{:04x}", message_type),
                "absolute subtype below message type"
            );
            0
        };

        match message_type {
            family::BATTERY => self.handle_battery(absolute, value).await,
            family::VEHICLE_STATE => self.handle_vehicle_state(relative, value),
            family::SCOOTER_INFO => self.handle_scooter_info(absolute, value).await,
            family::BLE_PARAM
            | family::BLE_PAIRING_PIN_DISPLAY
            | family::BLE_PAIRING_PIN_REMOVE
            | family::BLE_STATUS => self.handle_ble_param(message_type, absolute, value).await,
            family::BLE_VERSION => self.handle_ble_version(absolute, value).await,
            family::BLE_DEBUG | family::BLE_RESET => self.handle_ble_debug(absolute, value).await,
            family::DATA_STREAM => self.handle_data_stream(relative, value).await,
            family::POWER_MANAGEMENT => self.handle_power_management(relative, value),
            family::AUX_BATTERY => self.handle_aux_battery(relative, value).await,
            family::BLE_COMMAND => self.handle_ble_command(absolute, value),
            family::BATTERY_INFO => self.handle_battery_info(relative, value).await,
            family::POWER_MUX => self.handle_power_mux(value).await,
            family::EVENT => self.handle_event(value).await,
            other => warn!(
                message_type = %format_args!("0x{:04x}", other),
                absolute = %format_args!("0x{:04x}", absolute),
                "unhandled message type"
            ),
        }
    }

    async fn handle_battery(&self, absolute: u16, value: Value) {
        let Some(slot) = battery_slot::slot_of(absolute) else {
            warn!(
                absolute = %format_args!("0x{:04x}", absolute),
                "cannot determine battery slot"
            );
            return;
        };
        let key = keys::BATTERY_SLOTS[slot];
        let offset = absolute - battery_slot::BASES[slot];

        match offset {
            battery_slot::STATE => {
                let Some(state) = value.as_int() else {
                    warn!(slot, "undecodable battery state value");
                    return;
                };
                debug!(
                    slot,
                    state,
                    name = BatteryState::from_code(state).as_str(),
                    "battery state"
                );
                if let Err(err) = self.store.write_int(key, "state", state).await {
                    warn!(key, error = %err, "failed to update battery state");
                }
            }
            battery_slot::PRESENCE => {
                let Some(present) = value.as_int() else {
                    warn!(slot, "undecodable battery presence value");
                    return;
                };
                let present = if present != 0 { "true" } else { "false" };
                debug!(slot, present, "battery presence");
                if let Err(err) = self.store.write_string(key, "present", present).await {
                    warn!(key, error = %err, "failed to update battery presence");
                }
            }
            battery_slot::CYCLE_COUNT => {
                let Some(count) = value.as_int() else {
                    warn!(slot, "undecodable battery cycle count value");
                    return;
                };
                debug!(slot, count, "battery cycle count");
                if let Err(err) = self.store.write_int(key, "cycle-count", count).await {
                    warn!(key, error = %err, "failed to update battery cycle count");
                }
            }
            battery_slot::CHARGE => {
                let Some(charge) = value.as_int() else {
                    warn!(slot, "undecodable battery charge value");
                    return;
                };
                debug!(slot, charge, "battery charge");
                if let Err(err) = self.store.write_int(key, "charge", charge).await {
                    warn!(key, error = %err, "failed to update battery charge");
                }
            }
            other => warn!(slot, offset = other, "unknown battery subtype"),
        }
    }

    /// Device echoes of vehicle state writes; logged, never stored.
    fn handle_vehicle_state(&self, relative: u16, value: Value) {
        match (relative, value.as_int()) {
            (rel::VEHICLE_STATE_STATE, Some(state)) => debug!(state, "vehicle state echo"),
            (rel::VEHICLE_STATE_SEATBOX, Some(state)) => debug!(state, "seatbox state echo"),
            (rel::VEHICLE_STATE_HANDLEBAR, Some(state)) => debug!(state, "handlebar state echo"),
            (subtype @ (1..=3), None) => warn!(subtype, "undecodable vehicle state value"),
            (subtype, _) => warn!(subtype, "unknown vehicle state subtype"),
        }
    }

    async fn handle_scooter_info(&self, absolute: u16, value: Value) {
        const MILEAGE_ABS: u16 = family::SCOOTER_INFO + rel::SCOOTER_INFO_MILEAGE;
        const VERSION_ABS: u16 = family::SCOOTER_INFO + rel::SCOOTER_INFO_SOFTWARE_VERSION;

        match absolute {
            MILEAGE_ABS => {
                let Some(mileage) = value.as_int() else {
                    warn!("undecodable mileage value");
                    return;
                };
                debug!(mileage, "mileage");
                if let Err(err) = self.store.write_int(keys::MILEAGE, "odometer", mileage).await {
                    warn!(error = %err, "failed to update mileage");
                }
            }
            VERSION_ABS => {
                let Some(version) = value.as_text() else {
                    warn!("undecodable software version value");
                    return;
                };
                debug!(version, "software version");
                if let Err(err) = self
                    .store
                    .write_string(keys::FIRMWARE, "mdb-version", version)
                    .await
                {
                    warn!(error = %err, "failed to update software version");
                }
            }
            other => warn!(
                absolute = %format_args!("0x{:04x}", other),
                "unknown scooter info subtype"
            ),
        }
    }

    async fn handle_ble_param(&self, message_type: u16, absolute: u16, value: Value) {
        const MAC_ABS: u16 = family::BLE_PARAM + rel::BLE_PARAM_MAC_ADDRESS;
        const DATA_ABS: u16 = family::BLE_PARAM + rel::BLE_PARAM_DATA;

        match absolute {
            MAC_ABS => {
                let Some(mac) = value.as_text() else {
                    warn!("undecodable MAC address value");
                    return;
                };
                info!(mac, "BLE MAC address");
                if let Err(err) = self.store.write_string(keys::BLE, "mac-address", mac).await {
                    warn!(error = %err, "failed to update MAC address");
                }
            }
            family::BLE_PAIRING_PIN_DISPLAY => {
                let Some(pin) = value.as_text() else {
                    warn!("undecodable pairing pin value");
                    return;
                };
                info!("pairing pin received for display");
                if let Err(err) = self
                    .store
                    .write_and_publish_string(keys::BLE, "pin-code", pin)
                    .await
                {
                    warn!(error = %err, "failed to publish pairing pin");
                }
            }
            family::BLE_PAIRING_PIN_REMOVE => {
                info!("pairing pin removal requested");
                if let Err(err) = self.store.hdel(keys::BLE, "pin-code").await {
                    warn!(error = %err, "failed to delete pairing pin");
                }
                // Empty publish signals the removal to display consumers.
                if let Err(err) = self
                    .store
                    .write_and_publish_string(keys::BLE, "pin-code", "")
                    .await
                {
                    warn!(error = %err, "failed to publish pairing pin removal");
                }
            }
            family::BLE_STATUS => {
                if message_type != family::BLE_PARAM {
                    warn!(
                        message_type = %format_args!("0x{:04x}", message_type),
                        "BLE status subtype under unexpected message type"
                    );
                    return;
                }
                let Some(status) = value.as_text() else {
                    warn!("undecodable BLE status value");
                    return;
                };
                info!(status, "BLE connection status");
                if let Err(err) = self
                    .store
                    .write_string(keys::BLE, "connection-status", status)
                    .await
                {
                    warn!(error = %err, "failed to update BLE status");
                }
            }
            DATA_ABS => debug!(value = ?value, "BLE parameter data blob"),
            other => warn!(
                absolute = %format_args!("0x{:04x}", other),
                message_type = %format_args!("0x{:04x}", message_type),
                "unhandled BLE parameter subtype"
            ),
        }
    }

    async fn handle_ble_version(&self, absolute: u16, value: Value) {
        const VERSION_ABS: u16 = family::BLE_VERSION + rel::BLE_VERSION_STRING;
        if absolute != VERSION_ABS {
            warn!(
                absolute = %format_args!("0x{:04x}", absolute),
                "unknown BLE version subtype"
            );
            return;
        }
        let Some(version) = value.as_text() else {
            warn!("undecodable BLE version value");
            return;
        };
        info!(version, "BLE firmware version");
        if let Err(err) = self
            .store
            .write_string(keys::BLE, "nrf-fw-version", version)
            .await
        {
            warn!(error = %err, "failed to update BLE firmware version");
        }
    }

    async fn handle_ble_debug(&self, absolute: u16, value: Value) {
        const RESET_ACK_ABS: u16 = family::BLE_DEBUG + rel::BLE_DEBUG_RESET_ACK;

        match absolute {
            RESET_ACK_ABS => debug!("reset acknowledgement from co-processor"),
            family::BLE_RESET => {
                let reset_info = value.as_array().and_then(|items| match items {
                    [reason, count] => Some((reason.as_int()?, count.as_int()?)),
                    _ => None,
                });
                let Some((reason, count)) = reset_info else {
                    warn!(value = ?value, "undecodable reset info");
                    return;
                };
                info!(
                    reason = %format_args!("0x{:X}", reason),
                    count, "co-processor reset info"
                );
                if let Err(err) = self
                    .store
                    .write_int(keys::POWER_MANAGER, "nrf-reset-count", count)
                    .await
                {
                    warn!(error = %err, "failed to write reset count");
                }
                if let Err(err) = self
                    .store
                    .write_and_publish_int(keys::POWER_MANAGER, "nrf-reset-reason", reason)
                    .await
                {
                    warn!(error = %err, "failed to publish reset reason");
                }
                match self.send_int(family::BLE_DEBUG, rel::BLE_DEBUG_RESET_ACK, 0) {
                    Ok(()) => debug!("sent reset acknowledgement"),
                    Err(err) => warn!(error = %err, "failed to send reset acknowledgement"),
                }
            }
            other => warn!(
                absolute = %format_args!("0x{:04x}", other),
                "unknown BLE debug subtype"
            ),
        }
    }

    async fn handle_data_stream(&self, relative: u16, value: Value) {
        match relative {
            rel::DATA_STREAM_ENABLE => {
                let Some(enabled) = value.as_int() else {
                    warn!("undecodable data stream enable value");
                    return;
                };
                let active = enabled != 0;
                debug!(enabled = active, "data stream enable status");
                if let Err(err) = self
                    .store
                    .write_int(keys::AUX_BATTERY, "data-stream-enable", enabled)
                    .await
                {
                    warn!(error = %err, "failed to update data stream enable");
                }
            }
            rel::DATA_STREAM_SYNC => match value.as_int() {
                Some(sync) => debug!(sync, "data stream sync confirmation"),
                None => warn!("undecodable data stream sync value"),
            },
            other => warn!(subtype = other, "unknown data stream subtype"),
        }
    }

    /// The device acknowledges power management writes; nothing is stored.
    fn handle_power_management(&self, relative: u16, value: Value) {
        match (relative, value.as_int()) {
            (rel::POWER_MANAGEMENT_STATE, Some(ack)) => debug!(ack, "power state acknowledged"),
            (rel::POWER_MANAGEMENT_POWER_REQUEST, Some(ack)) => {
                debug!(ack, "power request acknowledged")
            }
            (subtype @ (1..=2), None) => warn!(subtype, "undecodable power management value"),
            (subtype, _) => warn!(subtype, "unknown power management subtype"),
        }
    }

    async fn handle_aux_battery(&self, relative: u16, value: Value) {
        match relative {
            rel::AUX_BATTERY_VOLTAGE => {
                let Some(voltage) = value.as_int() else {
                    warn!("undecodable aux battery voltage value");
                    return;
                };
                debug!(voltage, "aux battery voltage");
                if let Err(err) = self
                    .store
                    .write_int(keys::AUX_BATTERY, "voltage", voltage)
                    .await
                {
                    warn!(error = %err, "failed to update aux battery voltage");
                }
            }
            rel::AUX_BATTERY_CHARGE => {
                let Some(charge) = value.as_int() else {
                    warn!("undecodable aux battery charge value");
                    return;
                };
                debug!(charge, "aux battery charge");
                if let Err(err) = self
                    .store
                    .write_int(keys::AUX_BATTERY, "charge", charge)
                    .await
                {
                    warn!(error = %err, "failed to update aux battery charge");
                }
            }
            rel::AUX_BATTERY_CHARGER_STATUS => {
                let Some(status) = value.as_text() else {
                    warn!("undecodable aux battery charger status value");
                    return;
                };
                debug!(status, "aux battery charger status");
                if let Err(err) = self
                    .store
                    .write_string(keys::AUX_BATTERY, "charge-status", status)
                    .await
                {
                    warn!(error = %err, "failed to update aux battery charger status");
                }
            }
            other => warn!(subtype = other, "unknown aux battery subtype"),
        }
    }

    /// Command acknowledgements from the BLE stack.
    fn handle_ble_command(&self, absolute: u16, value: Value) {
        use v_link_proto::types::ble_command;

        let relative = absolute.wrapping_sub(family::BLE_COMMAND);
        let command = match relative {
            ble_command::ADV_START_WITH_WHITELIST => "start advertising (whitelist)",
            ble_command::ADV_RESTART_NO_WHITELIST => "restart advertising (no whitelist)",
            ble_command::ADV_STOP => "stop advertising",
            ble_command::DELETE_BOND => "delete bond",
            ble_command::DELETE_ALL_BONDS => "delete all bonds",
            other => {
                warn!(
                    subtype = other,
                    absolute = %format_args!("0x{:04x}", absolute),
                    "unknown BLE command subtype"
                );
                return;
            }
        };
        debug!(command, value = ?value, "BLE command acknowledged");
    }

    async fn handle_battery_info(&self, relative: u16, value: Value) {
        match relative {
            rel::BATTERY_INFO_STATUS => {
                let Some(status) = value.as_int() else {
                    warn!("undecodable gauge status value");
                    return;
                };
                debug!(status = %format_args!("0x{:04X}", status), "gauge status");
                let alert = GAUGE_ALERTS
                    .iter()
                    .find(|(mask, _)| status & mask != 0)
                    .map(|(_, message)| *message);
                if let Some(message) = alert {
                    self.set_gauge_flag(keys::CB_BATTERY_ALERT, "alert", Some(message))
                        .await;
                } else if status & gauge_status::FILTER == 0 {
                    self.set_gauge_flag(keys::CB_BATTERY_ALERT, "alert", None)
                        .await;
                } else {
                    warn!(
                        status = %format_args!("0x{:04X}", status),
                        "unhandled gauge status bits"
                    );
                }
            }
            rel::BATTERY_INFO_PROTECTION_STATUS => {
                let Some(status) = value.as_int() else {
                    warn!("undecodable gauge protection status value");
                    return;
                };
                debug!(
                    status = %format_args!("0x{:04X}", status),
                    "gauge protection status"
                );
                if status & gauge_protection::DISCHARGE_FAULT != 0 {
                    self.set_gauge_flag(keys::CB_BATTERY_FAULT, "fault", Some("Discharging fault"))
                        .await;
                } else if status & gauge_protection::CHARGE_FAULT != 0 {
                    self.set_gauge_flag(keys::CB_BATTERY_FAULT, "fault", Some("Charging fault"))
                        .await;
                } else if status & gauge_protection::FILTER == 0 {
                    self.set_gauge_flag(keys::CB_BATTERY_FAULT, "fault", None)
                        .await;
                } else {
                    warn!(
                        status = %format_args!("0x{:04X}", status),
                        "unhandled gauge protection bits"
                    );
                }
            }
            rel::BATTERY_INFO_BATT_STATUS => {
                let Some(status) = value.as_int() else {
                    warn!("undecodable gauge battery status value");
                    return;
                };
                debug!(
                    status = %format_args!("0x{:04X}", status),
                    "gauge battery status"
                );
                if status & gauge_batt_status::CHG_FET_FAIL != 0 {
                    self.set_gauge_flag(
                        keys::CB_BATTERY_FAULT,
                        "fault",
                        Some("ChargeFET Failure-Short Detected"),
                    )
                    .await;
                } else if status & gauge_batt_status::DISCHG_FET_FAIL != 0 {
                    self.set_gauge_flag(
                        keys::CB_BATTERY_FAULT,
                        "fault",
                        Some("DischargeFET Failure-Short Detected"),
                    )
                    .await;
                } else if status & gauge_batt_status::FET_FAIL_OPEN != 0 {
                    self.set_gauge_flag(keys::CB_BATTERY_FAULT, "fault", Some("FET Failure open"))
                        .await;
                } else if status & gauge_batt_status::FILTER == 0 {
                    self.set_gauge_flag(keys::CB_BATTERY_FAULT, "fault", None)
                        .await;
                } else {
                    warn!(
                        status = %format_args!("0x{:04X}", status),
                        "unhandled gauge battery status bits"
                    );
                }
            }
            rel::BATTERY_INFO_CHARGE => self.write_gauge_int(&value, "charge").await,
            rel::BATTERY_INFO_CURRENT => self.write_gauge_int(&value, "current").await,
            rel::BATTERY_INFO_REM_CAPACITY => {
                self.write_gauge_int(&value, "remaining-capacity").await
            }
            rel::BATTERY_INFO_FULL_CAPACITY => self.write_gauge_int(&value, "full-capacity").await,
            rel::BATTERY_INFO_CELL_VOLTAGE => self.write_gauge_int(&value, "cell-voltage").await,
            rel::BATTERY_INFO_TEMPERATURE => self.write_gauge_int(&value, "temperature").await,
            rel::BATTERY_INFO_CYCLE_COUNT => self.write_gauge_int(&value, "cycle-count").await,
            rel::BATTERY_INFO_TIME_TO_EMPTY => self.write_gauge_int(&value, "time-to-empty").await,
            rel::BATTERY_INFO_TIME_TO_FULL => self.write_gauge_int(&value, "time-to-full").await,
            rel::BATTERY_INFO_SOH => self.write_gauge_int(&value, "state-of-health").await,
            rel::BATTERY_INFO_UNIQUE_ID => self.write_gauge_text(&value, "unique-id").await,
            rel::BATTERY_INFO_SERIAL_NUMBER => self.write_gauge_text(&value, "serial-number").await,
            rel::BATTERY_INFO_PART_NO => {
                let Some(part) = value.as_int() else {
                    warn!("undecodable gauge part number value");
                    return;
                };
                let name = part_number_name(part);
                debug!(part, name = %name, "gauge part number");
                if let Err(err) = self
                    .store
                    .write_string(keys::CB_BATTERY, "part-number", &name)
                    .await
                {
                    warn!(error = %err, "failed to update gauge part number");
                }
            }
            rel::BATTERY_INFO_PRESENT => {
                let Some(present) = value.as_int() else {
                    warn!("undecodable gauge presence value");
                    return;
                };
                let present = if present != 0 { "true" } else { "false" };
                debug!(present, "gauge battery presence");
                if let Err(err) = self
                    .store
                    .write_string(keys::CB_BATTERY, "present", present)
                    .await
                {
                    warn!(error = %err, "failed to update gauge presence");
                }
            }
            rel::BATTERY_INFO_CHARGE_STATUS => {
                let Some(status) = value.as_int() else {
                    warn!("undecodable gauge charge status value");
                    return;
                };
                let status = match status {
                    0 => "not-charging",
                    1 => "charging",
                    _ => "unknown",
                };
                debug!(status, "gauge charge status");
                if let Err(err) = self
                    .store
                    .write_string(keys::CB_BATTERY, "charge-status", status)
                    .await
                {
                    warn!(error = %err, "failed to update gauge charge status");
                }
            }
            other => warn!(subtype = other, "unknown battery info subtype"),
        }
    }

    async fn write_gauge_int(&self, value: &Value, field: &str) {
        let Some(value) = value.as_int() else {
            warn!(field, "non-integer gauge value");
            return;
        };
        debug!(field, value, "gauge telemetry");
        if let Err(err) = self.store.write_int(keys::CB_BATTERY, field, value).await {
            warn!(field, error = %err, "failed to update gauge field");
        }
    }

    async fn write_gauge_text(&self, value: &Value, field: &str) {
        let Some(value) = value.as_text() else {
            warn!(field, "non-text gauge value");
            return;
        };
        debug!(field, value, "gauge telemetry");
        if let Err(err) = self.store.write_string(keys::CB_BATTERY, field, value).await {
            warn!(field, error = %err, "failed to update gauge field");
        }
    }

    /// Write or clear the gauge alert/fault flag field.
    async fn set_gauge_flag(&self, key: &str, field: &str, message: Option<&str>) {
        match message {
            Some(message) => {
                info!(key, field, message, "gauge flag raised");
                if let Err(err) = self.store.write_string(key, field, message).await {
                    warn!(key, field, error = %err, "failed to write gauge flag");
                }
            }
            None => {
                debug!(key, field, "gauge flag cleared");
                if let Err(err) = self.store.hdel(key, field).await {
                    warn!(key, field, error = %err, "failed to clear gauge flag");
                }
            }
        }
    }

    async fn handle_power_mux(&self, value: Value) {
        let Some(state) = value.as_int() else {
            warn!("undecodable power mux value");
            return;
        };
        let selected = if state == 0 { "aux" } else { "cb" };
        info!(selected, raw = state, "power mux input");
        if let Err(err) = self
            .store
            .write_and_publish_string(keys::POWER_MUX, "selected-input", selected)
            .await
        {
            warn!(error = %err, "failed to publish power mux state");
        }
    }

    /// Event strings from the co-processor become list pushes consumed by
    /// the vehicle services. Unknown strings are dropped.
    async fn handle_event(&self, value: Value) {
        let Some(event) = value.as_text() else {
            warn!(value = ?value, "event value is not a string");
            return;
        };
        let (list, item) = match event {
            "scooter:state unlock" => ("scooter:state", "unlock"),
            "scooter:state lock" => ("scooter:state", "lock"),
            "scooter:seatbox open" => ("scooter:seatbox", "open"),
            "scooter:blinker right" => ("scooter:blinker", "right"),
            "scooter:blinker left" => ("scooter:blinker", "left"),
            "scooter:blinker both" => ("scooter:blinker", "both"),
            "scooter:blinker off" => ("scooter:blinker", "off"),
            other => {
                warn!(event = %other, "unknown event string, dropping");
                return;
            }
        };
        info!(list, item, "event");
        if let Err(err) = self.store.lpush(list, item).await {
            warn!(list, item, error = %err, "failed to push event");
        }
    }
}

fn part_number_name(part: i64) -> String {
    match part {
        5 => "MAX17301".to_owned(),
        6 => "MAX17302".to_owned(),
        7 => "MAX17303".to_owned(),
        other => format!("MAX1730X ({other})"),
    }
}
