//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Primary orchestration and lifecycle management."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Message router and service lifecycle for the UART / state-bus bridge.
//!
//! Inbound: decoded envelopes are classified by their 16-bit family and
//! translated into state-bus writes (publishing only where the protocol
//! demands it). Outbound: externally published field changes and
//! list-delivered commands become framed messages to the co-processor.
//! Writes performed by inbound handling never publish, so they cannot
//! re-trigger the outbound translators for the same field.

mod commands;
mod inbound;
mod init;
mod outbound;
mod service;

pub use service::{Service, ServiceHandle};

/// State bus key layout.
pub mod keys {
    /// Vehicle state, seatbox and handlebar fields.
    pub const VEHICLE: &str = "vehicle";
    /// Traction battery slots, indexed 0 and 1.
    pub const BATTERY_SLOTS: [&str; 2] = ["battery:0", "battery:1"];
    /// Power manager state fields.
    pub const POWER_MANAGER: &str = "power-manager";
    /// Odometer lives with the engine ECU.
    pub const MILEAGE: &str = "engine-ecu";
    /// Firmware version lives with the system key.
    pub const FIRMWARE: &str = "system";
    /// BLE status, MAC and pairing pin.
    pub const BLE: &str = "ble";
    /// Connectivity-board battery telemetry.
    pub const CB_BATTERY: &str = "cb-battery";
    /// Connectivity-board battery alert flag.
    pub const CB_BATTERY_ALERT: &str = "cb-battery:alert";
    /// Connectivity-board battery fault flag.
    pub const CB_BATTERY_FAULT: &str = "cb-battery:fault";
    /// Auxiliary 12V battery telemetry.
    pub const AUX_BATTERY: &str = "aux-battery";
    /// Power mux input selection.
    pub const POWER_MUX: &str = "power-mux";
    /// Command list consumed by the watcher.
    pub const COMMAND_LIST: &str = "scooter:bluetooth";
}
