//! ---
//! vlink_section: "02-messaging-ipc-data-model"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Message schema helpers and protocol codecs."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};

/// Message-type families (absolute 16-bit bases).
///
/// Several families collapse to the same 8-bit frame identifier (`0x00`,
/// `0x20`, `0x40`), so routing always disambiguates on the 16-bit family
/// carried inside the envelope.
pub mod family {
    /// Generic event strings pushed by the co-processor.
    pub const EVENT: u16 = 0x0000;
    /// Vehicle state echoes (state, seatbox, handlebar).
    pub const VEHICLE_STATE: u16 = 0x0020;
    /// Auxiliary 12V battery telemetry.
    pub const AUX_BATTERY: u16 = 0x0040;
    /// Connectivity-board battery (fuel gauge) telemetry.
    pub const BATTERY_INFO: u16 = 0x0060;
    /// Data stream control.
    pub const DATA_STREAM: u16 = 0x00C0;
    /// Traction battery slots.
    pub const BATTERY: u16 = 0x00E0;
    /// Power mux input selection.
    pub const POWER_MUX: u16 = 0x0100;
    /// Power management state/power requests.
    pub const POWER_MANAGEMENT: u16 = 0x0800;
    /// BLE firmware version.
    pub const BLE_VERSION: u16 = 0xA000;
    /// BLE debug channel.
    pub const BLE_DEBUG: u16 = 0xA020;
    /// BLE reset info (reason, count) arrives under its own family.
    pub const BLE_RESET: u16 = 0xA021;
    /// Scooter info (software version, mileage).
    pub const SCOOTER_INFO: u16 = 0xA040;
    /// BLE parameters (MAC, pairing pin, status).
    pub const BLE_PARAM: u16 = 0xA080;
    /// Pairing-pin display, historically used as a family of its own.
    pub const BLE_PAIRING_PIN_DISPLAY: u16 = 0xA082;
    /// Pairing-pin removal, historically used as a family of its own.
    pub const BLE_PAIRING_PIN_REMOVE: u16 = 0xA083;
    /// BLE connection status, historically used as a family of its own.
    pub const BLE_STATUS: u16 = 0xA084;
    /// BLE control commands.
    pub const BLE_COMMAND: u16 = 0xAA00;
}

/// Relative subtypes, offsets from their family base.
pub mod rel {
    pub const DATA_STREAM_ENABLE: u16 = 1;
    pub const DATA_STREAM_SYNC: u16 = 2;

    pub const VEHICLE_STATE_STATE: u16 = 1;
    pub const VEHICLE_STATE_SEATBOX: u16 = 2;
    pub const VEHICLE_STATE_HANDLEBAR: u16 = 3;

    pub const SCOOTER_INFO_SOFTWARE_VERSION: u16 = 1;
    pub const SCOOTER_INFO_MILEAGE: u16 = 2;

    pub const BLE_VERSION_STRING: u16 = 1;
    pub const BLE_VERSION_REQUEST: u16 = 2;

    pub const BLE_DEBUG_RESET_ACK: u16 = 3;

    pub const BLE_PARAM_MAC_ADDRESS: u16 = 1;
    pub const BLE_PARAM_DELETE_BONDS: u16 = 2;
    pub const BLE_PARAM_ADVERTISING: u16 = 3;
    pub const BLE_PARAM_DATA: u16 = 24;

    pub const POWER_MANAGEMENT_STATE: u16 = 1;
    pub const POWER_MANAGEMENT_POWER_REQUEST: u16 = 2;

    pub const AUX_BATTERY_VOLTAGE: u16 = 1;
    pub const AUX_BATTERY_CHARGER_STATUS: u16 = 3;
    pub const AUX_BATTERY_CHARGE: u16 = 4;

    pub const BATTERY_INFO_CHARGE: u16 = 1;
    pub const BATTERY_INFO_CURRENT: u16 = 2;
    pub const BATTERY_INFO_REM_CAPACITY: u16 = 3;
    pub const BATTERY_INFO_FULL_CAPACITY: u16 = 4;
    pub const BATTERY_INFO_CELL_VOLTAGE: u16 = 5;
    pub const BATTERY_INFO_TEMPERATURE: u16 = 6;
    pub const BATTERY_INFO_CYCLE_COUNT: u16 = 7;
    pub const BATTERY_INFO_STATUS: u16 = 8;
    pub const BATTERY_INFO_TIME_TO_EMPTY: u16 = 9;
    pub const BATTERY_INFO_TIME_TO_FULL: u16 = 10;
    pub const BATTERY_INFO_PROTECTION_STATUS: u16 = 11;
    pub const BATTERY_INFO_SOH: u16 = 12;
    pub const BATTERY_INFO_UNIQUE_ID: u16 = 13;
    pub const BATTERY_INFO_SERIAL_NUMBER: u16 = 14;
    pub const BATTERY_INFO_BATT_STATUS: u16 = 15;
    pub const BATTERY_INFO_PART_NO: u16 = 16;
    pub const BATTERY_INFO_PRESENT: u16 = 17;
    pub const BATTERY_INFO_CHARGE_STATUS: u16 = 18;
}

/// Traction battery slot layout.
///
/// The wire carries absolute subtype keys; slot membership is decided by the
/// absolute range, the metric by the offset within the slot base.
pub mod battery_slot {
    use super::family;

    /// Absolute base per slot index (0 = `battery:0`, 1 = `battery:1`).
    pub const BASES: [u16; 2] = [0x00E0, 0x00EC];
    /// Highest absolute subtype belonging to each slot.
    pub const LASTS: [u16; 2] = [0x00E9, 0x00F5];

    pub const STATE: u16 = 2;
    pub const PRESENCE: u16 = 3;
    pub const CYCLE_COUNT: u16 = 6;
    pub const CHARGE: u16 = 9;

    /// Slot index for an absolute battery subtype, if it falls in a slot range.
    pub fn slot_of(absolute: u16) -> Option<usize> {
        (0..2).find(|&i| (BASES[i]..=LASTS[i]).contains(&absolute))
    }

    /// Relative subtype (family-local) addressing `offset` within `slot`.
    pub fn relative(slot: usize, offset: u16) -> u16 {
        BASES[slot] - family::BATTERY + offset
    }
}

/// BLE control commands (relative subtypes of [`family::BLE_COMMAND`]).
pub mod ble_command {
    pub const ADV_START_WITH_WHITELIST: u16 = 1;
    pub const ADV_RESTART_NO_WHITELIST: u16 = 2;
    pub const ADV_STOP: u16 = 3;
    pub const DELETE_BOND: u16 = 4;
    pub const DELETE_ALL_BONDS: u16 = 5;
}

/// Fuel-gauge status bits (battery-info subtype 8).
pub mod gauge_status {
    pub const CURR_MIN_ALERT: i64 = 1 << 2; // 0x0004
    pub const CURR_MAX_ALERT: i64 = 1 << 6; // 0x0040
    pub const VOLT_MIN_ALERT: i64 = 1 << 8; // 0x0100
    pub const VOLT_MAX_ALERT: i64 = 1 << 12; // 0x1000
    pub const TEMP_MIN_ALERT: i64 = 1 << 9; // 0x0200
    pub const TEMP_MAX_ALERT: i64 = 1 << 13; // 0x2000
    pub const SOC_MIN_ALERT: i64 = 1 << 10; // 0x0400
    pub const SOC_MAX_ALERT: i64 = 1 << 14; // 0x4000

    pub const FILTER: i64 = CURR_MIN_ALERT
        | CURR_MAX_ALERT
        | VOLT_MIN_ALERT
        | VOLT_MAX_ALERT
        | TEMP_MIN_ALERT
        | TEMP_MAX_ALERT
        | SOC_MIN_ALERT
        | SOC_MAX_ALERT;
}

/// Fuel-gauge protection status bits (battery-info subtype 11).
pub mod gauge_protection {
    pub const ODCP: i64 = 1 << 2; // 0x0004
    pub const UVP: i64 = 1 << 3; // 0x0008
    pub const TOO_HOT_D: i64 = 1 << 4; // 0x0010
    pub const DIE_HOT: i64 = 1 << 5; // 0x0020
    pub const QOVFLW: i64 = 1 << 9; // 0x0200
    pub const OCCP: i64 = 1 << 10; // 0x0400
    pub const OVP: i64 = 1 << 11; // 0x0800
    pub const TOO_COLD_C: i64 = 1 << 12; // 0x1000
    pub const FULL: i64 = 1 << 13; // 0x2000
    pub const TOO_HOT_C: i64 = 1 << 14; // 0x4000

    pub const DISCHARGE_FAULT: i64 = ODCP | UVP | TOO_HOT_D | DIE_HOT;
    pub const CHARGE_FAULT: i64 = TOO_COLD_C | OVP | OCCP | QOVFLW | TOO_HOT_C | FULL | DIE_HOT;
    pub const FILTER: i64 = DISCHARGE_FAULT | CHARGE_FAULT;
}

/// Fuel-gauge battery status bits (battery-info subtype 15).
pub mod gauge_batt_status {
    pub const CHG_FET_FAIL: i64 = 1 << 12; // 0x1000
    pub const DISCHG_FET_FAIL: i64 = 1 << 11; // 0x0800
    pub const FET_FAIL_OPEN: i64 = 1 << 10; // 0x0400

    pub const FILTER: i64 = CHG_FET_FAIL | DISCHG_FET_FAIL | FET_FAIL_OPEN;
}

/// Traction battery slot state, with the wire integer form and the store
/// string form. Any unrecognised string maps to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BatteryState {
    #[default]
    Unknown,
    Asleep,
    Idle,
    Active,
}

impl BatteryState {
    /// Integer form sent on the wire.
    pub fn code(self) -> i64 {
        match self {
            BatteryState::Unknown => 0,
            BatteryState::Asleep => 1,
            BatteryState::Idle => 2,
            BatteryState::Active => 3,
        }
    }

    /// Store string form.
    pub fn as_str(self) -> &'static str {
        match self {
            BatteryState::Unknown => "unknown",
            BatteryState::Asleep => "asleep",
            BatteryState::Idle => "idle",
            BatteryState::Active => "active",
        }
    }

    /// Parse the store string form; the mapping is total.
    pub fn from_store(value: &str) -> Self {
        match value {
            "asleep" => BatteryState::Asleep,
            "idle" => BatteryState::Idle,
            "active" => BatteryState::Active,
            _ => BatteryState::Unknown,
        }
    }

    /// Map the wire integer form back to a state.
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => BatteryState::Asleep,
            2 => BatteryState::Idle,
            3 => BatteryState::Active,
            _ => BatteryState::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn battery_state_mapping_is_total() {
        assert_eq!(BatteryState::from_store("active"), BatteryState::Active);
        assert_eq!(BatteryState::from_store("idle"), BatteryState::Idle);
        assert_eq!(BatteryState::from_store("asleep"), BatteryState::Asleep);
        assert_eq!(BatteryState::from_store("unknown"), BatteryState::Unknown);
        assert_eq!(BatteryState::from_store("garbage"), BatteryState::Unknown);
        assert_eq!(BatteryState::from_store(""), BatteryState::Unknown);
    }

    #[test]
    fn battery_state_codes_roundtrip() {
        for state in [
            BatteryState::Unknown,
            BatteryState::Asleep,
            BatteryState::Idle,
            BatteryState::Active,
        ] {
            assert_eq!(BatteryState::from_code(state.code()), state);
            assert_eq!(BatteryState::from_store(state.as_str()), state);
        }
    }

    #[test]
    fn slot_ranges_cover_documented_subtypes() {
        assert_eq!(battery_slot::slot_of(0x00E2), Some(0));
        assert_eq!(battery_slot::slot_of(0x00E9), Some(0));
        assert_eq!(battery_slot::slot_of(0x00EC), Some(1));
        assert_eq!(battery_slot::slot_of(0x00F5), Some(1));
        assert_eq!(battery_slot::slot_of(0x00EA), None);
        assert_eq!(battery_slot::slot_of(0x00F6), None);
    }

    #[test]
    fn slot_relative_addressing_yields_documented_absolutes() {
        // Absolute = family base + relative must land on 0x00E2/0x00EE etc.
        assert_eq!(
            family::BATTERY + battery_slot::relative(0, battery_slot::STATE),
            0x00E2
        );
        assert_eq!(
            family::BATTERY + battery_slot::relative(0, battery_slot::CHARGE),
            0x00E9
        );
        assert_eq!(
            family::BATTERY + battery_slot::relative(1, battery_slot::STATE),
            0x00EE
        );
        assert_eq!(
            family::BATTERY + battery_slot::relative(1, battery_slot::CYCLE_COUNT),
            0x00F2
        );
        assert_eq!(
            family::BATTERY + battery_slot::relative(1, battery_slot::CHARGE),
            0x00F5
        );
    }
}
