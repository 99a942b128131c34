//! ---
//! vlink_section: "01-core-functionality"
//! vlink_subsection: "module"
//! vlink_type: "source"
//! vlink_scope: "code"
//! vlink_description: "Primary orchestration and lifecycle management."
//! vlink_version: "v0.0.0-prealpha"
//! vlink_owner: "tbd"
//! ---
//! Router behaviour against the in-memory state bus and a recording frame
//! sink: inbound store writes, gauge alert/fault decoding, event pushes,
//! outbound translation, command mapping and echo suppression.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_cbor::Value as Cbor;
use tokio::sync::mpsc;

use v_link_core::{keys, Service};
use v_link_frame::Frame;
use v_link_proto::envelope::{self, decode, Decoded, Value};
use v_link_serial::{FrameSink, SerialError};
use v_link_store::{MemoryBus, StateBus, StoreError};

/// Records outbound frames instead of touching a UART.
#[derive(Default)]
struct RecordingSink {
    frames: Mutex<Vec<(u8, Vec<u8>)>>,
}

impl RecordingSink {
    fn frames(&self) -> Vec<(u8, Vec<u8>)> {
        self.frames.lock().clone()
    }

    fn clear(&self) {
        self.frames.lock().clear();
    }
}

impl FrameSink for RecordingSink {
    fn send_frame(&self, frame_id: u8, payload: &[u8]) -> Result<(), SerialError> {
        self.frames.lock().push((frame_id, payload.to_vec()));
        Ok(())
    }
}

struct Fixture {
    store: Arc<MemoryBus>,
    sink: Arc<RecordingSink>,
    service: Arc<Service>,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryBus::new());
    let sink = Arc::new(RecordingSink::default());
    let service = Arc::new(Service::new(store.clone(), sink.clone()));
    Fixture {
        store,
        sink,
        service,
    }
}

async fn inbound_int(service: &Service, message_type: u16, relative: u16, value: u16) {
    let (id, payload) = envelope::encode_int(message_type, relative, value).unwrap();
    service.handle_frame(Frame { id, payload }).await;
}

async fn inbound_str(service: &Service, message_type: u16, relative: u16, value: &str) {
    let (id, payload) = envelope::encode_str(message_type, relative, value).unwrap();
    service.handle_frame(Frame { id, payload }).await;
}

/// Wait until the sink holds at least `count` frames.
async fn wait_for_frames(sink: &RecordingSink, count: usize) -> Vec<(u8, Vec<u8>)> {
    for _ in 0..100 {
        let frames = sink.frames();
        if frames.len() >= count {
            return frames;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sink never reached {count} frames: {:?}", sink.frames());
}

#[tokio::test]
async fn power_mux_input_is_written_and_published() {
    let fx = fixture();
    let mut updates = fx.store.subscribe(keys::POWER_MUX).await.unwrap();

    // {0x0100: {0x0100: 0}} selects the auxiliary input.
    inbound_int(&fx.service, 0x0100, 0, 0).await;
    assert_eq!(
        fx.store
            .get_string(keys::POWER_MUX, "selected-input")
            .await
            .unwrap(),
        "aux"
    );
    assert_eq!(updates.recv().await.unwrap(), "selected-input:aux");

    inbound_int(&fx.service, 0x0100, 0, 1).await;
    assert_eq!(
        fx.store
            .get_string(keys::POWER_MUX, "selected-input")
            .await
            .unwrap(),
        "cb"
    );
    assert_eq!(updates.recv().await.unwrap(), "selected-input:cb");
}

#[tokio::test]
async fn gauge_status_bits_raise_and_clear_alerts() {
    let fx = fixture();

    // Bit 0x0040: maximum current alert.
    inbound_int(&fx.service, 0x0060, 8, 0x0040).await;
    assert_eq!(
        fx.store
            .get_string(keys::CB_BATTERY_ALERT, "alert")
            .await
            .unwrap(),
        "Maximum Current Alert Threshold Exceeded"
    );

    // Min-current outranks max-voltage when both are set.
    inbound_int(&fx.service, 0x0060, 8, 0x1004).await;
    assert_eq!(
        fx.store
            .get_string(keys::CB_BATTERY_ALERT, "alert")
            .await
            .unwrap(),
        "Minimum Current Alert Threshold Exceeded"
    );

    // All-clear deletes the field.
    inbound_int(&fx.service, 0x0060, 8, 0).await;
    assert!(matches!(
        fx.store.get_string(keys::CB_BATTERY_ALERT, "alert").await,
        Err(StoreError::MissingField { .. })
    ));
}

#[tokio::test]
async fn gauge_protection_and_batt_status_set_faults() {
    let fx = fixture();

    inbound_int(&fx.service, 0x0060, 11, 0x0008).await;
    assert_eq!(
        fx.store
            .get_string(keys::CB_BATTERY_FAULT, "fault")
            .await
            .unwrap(),
        "Discharging fault"
    );

    inbound_int(&fx.service, 0x0060, 11, 0x0800).await;
    assert_eq!(
        fx.store
            .get_string(keys::CB_BATTERY_FAULT, "fault")
            .await
            .unwrap(),
        "Charging fault"
    );

    inbound_int(&fx.service, 0x0060, 11, 0).await;
    assert!(fx
        .store
        .get_string(keys::CB_BATTERY_FAULT, "fault")
        .await
        .is_err());

    inbound_int(&fx.service, 0x0060, 15, 0x1000).await;
    assert_eq!(
        fx.store
            .get_string(keys::CB_BATTERY_FAULT, "fault")
            .await
            .unwrap(),
        "ChargeFET Failure-Short Detected"
    );

    inbound_int(&fx.service, 0x0060, 15, 0).await;
    assert!(fx
        .store
        .get_string(keys::CB_BATTERY_FAULT, "fault")
        .await
        .is_err());
}

#[tokio::test]
async fn gauge_telemetry_lands_in_cb_battery_fields() {
    let fx = fixture();

    inbound_int(&fx.service, 0x0060, 1, 87).await;
    inbound_int(&fx.service, 0x0060, 7, 42).await;
    inbound_int(&fx.service, 0x0060, 16, 6).await;
    inbound_int(&fx.service, 0x0060, 17, 1).await;
    inbound_int(&fx.service, 0x0060, 18, 1).await;

    assert_eq!(fx.store.get_int(keys::CB_BATTERY, "charge").await.unwrap(), 87);
    assert_eq!(
        fx.store
            .get_int(keys::CB_BATTERY, "cycle-count")
            .await
            .unwrap(),
        42
    );
    assert_eq!(
        fx.store
            .get_string(keys::CB_BATTERY, "part-number")
            .await
            .unwrap(),
        "MAX17302"
    );
    assert_eq!(
        fx.store
            .get_string(keys::CB_BATTERY, "present")
            .await
            .unwrap(),
        "true"
    );
    assert_eq!(
        fx.store
            .get_string(keys::CB_BATTERY, "charge-status")
            .await
            .unwrap(),
        "charging"
    );
}

#[tokio::test]
async fn battery_slot_messages_route_by_absolute_subtype() {
    let fx = fixture();

    // Slot 1 state (absolute 0x00E2) and slot 2 charge (absolute 0x00F5).
    inbound_int(&fx.service, 0x00E0, 0x02, 3).await;
    inbound_int(&fx.service, 0x00E0, 0x15, 91).await;
    inbound_int(&fx.service, 0x00E0, 0x03, 1).await;

    assert_eq!(fx.store.get_int("battery:0", "state").await.unwrap(), 3);
    assert_eq!(
        fx.store.get_string("battery:0", "present").await.unwrap(),
        "true"
    );
    assert_eq!(fx.store.get_int("battery:1", "charge").await.unwrap(), 91);
}

#[tokio::test]
async fn scooter_info_updates_mileage_and_version() {
    let fx = fixture();

    inbound_int(&fx.service, 0xA040, 2, 1500).await;
    inbound_str(&fx.service, 0xA040, 1, "2.1.0").await;

    assert_eq!(
        fx.store.get_int(keys::MILEAGE, "odometer").await.unwrap(),
        1500
    );
    assert_eq!(
        fx.store
            .get_string(keys::FIRMWARE, "mdb-version")
            .await
            .unwrap(),
        "2.1.0"
    );
}

#[tokio::test]
async fn events_are_pushed_onto_their_lists() {
    let fx = fixture();

    inbound_str(&fx.service, 0x0000, 0, "scooter:blinker right").await;
    let popped = fx
        .store
        .blocking_right_pop("scooter:blinker", Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(popped.as_deref(), Some("right"));

    // Unknown event strings are dropped.
    inbound_str(&fx.service, 0x0000, 0, "scooter:horn honk").await;
    let popped = fx
        .store
        .blocking_right_pop("scooter:horn", Duration::from_millis(20))
        .await
        .unwrap();
    assert_eq!(popped, None);
}

#[tokio::test]
async fn pairing_pin_display_and_removal() {
    let fx = fixture();
    let mut updates = fx.store.subscribe(keys::BLE).await.unwrap();

    // 0xA082 carries the pin for display, published for the dashboard.
    inbound_str(&fx.service, 0xA080, 2, "482915").await;
    assert_eq!(
        fx.store.get_string(keys::BLE, "pin-code").await.unwrap(),
        "482915"
    );
    assert_eq!(updates.recv().await.unwrap(), "pin-code:482915");

    // 0xA083 removes it and publishes the empty string.
    inbound_int(&fx.service, 0xA080, 3, 1).await;
    assert_eq!(fx.store.get_string(keys::BLE, "pin-code").await.unwrap(), "");
    assert_eq!(updates.recv().await.unwrap(), "pin-code:");
}

#[tokio::test]
async fn reset_info_stores_counters_and_acks() {
    let fx = fixture();

    // {0xA021: {0xA021: [reason, count]}}
    let mut inner = std::collections::BTreeMap::new();
    inner.insert(
        Cbor::Integer(0xA021),
        Cbor::Array(vec![Cbor::Integer(0x4), Cbor::Integer(7)]),
    );
    let mut outer = std::collections::BTreeMap::new();
    outer.insert(Cbor::Integer(0xA021), Cbor::Map(inner));
    let payload = serde_cbor::to_vec(&Cbor::Map(outer)).unwrap();

    let mut updates = fx.store.subscribe(keys::POWER_MANAGER).await.unwrap();
    fx.service.handle_frame(Frame { id: 0x21, payload }).await;

    assert_eq!(
        fx.store
            .get_int(keys::POWER_MANAGER, "nrf-reset-count")
            .await
            .unwrap(),
        7
    );
    assert_eq!(
        fx.store
            .get_int(keys::POWER_MANAGER, "nrf-reset-reason")
            .await
            .unwrap(),
        4
    );
    // The reason is the published half.
    assert_eq!(updates.recv().await.unwrap(), "nrf-reset-reason:4");

    // The router answers with (ble-debug, reset-ack, 0).
    let frames = fx.sink.frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].0, 0x20);
    assert_eq!(
        decode(&frames[0].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0xA020,
            entries: vec![(0xA023, Value::Int(0))],
        })
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn external_vehicle_publish_triggers_outbound_state() {
    let fx = fixture();
    fx.store
        .write_string(keys::VEHICLE, "state", "running")
        .await
        .unwrap();

    let (_frames_tx, frames_rx) = mpsc::unbounded_channel();
    let handle = fx.service.clone().start(frames_rx).await.unwrap();

    // An external producer publishes a state change.
    fx.store
        .write_and_publish_string(keys::VEHICLE, "state", "running")
        .await
        .unwrap();

    let frames = wait_for_frames(&fx.sink, 1).await;
    assert_eq!(frames[0].0, 0x20);
    // {0x0020: {0x0021: 1}} — "running" maps to 1.
    assert_eq!(frames[0].1, vec![0xA1, 0x18, 0x20, 0xA1, 0x18, 0x21, 0x01]);

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn battery_presence_publish_sends_presence_and_cycle_count() {
    let fx = fixture();
    fx.store
        .write_string("battery:1", "present", "true")
        .await
        .unwrap();
    fx.store
        .write_int("battery:1", "cycle-count", 12)
        .await
        .unwrap();

    let (_frames_tx, frames_rx) = mpsc::unbounded_channel();
    let handle = fx.service.clone().start(frames_rx).await.unwrap();

    fx.store
        .write_and_publish_string("battery:1", "present", "true")
        .await
        .unwrap();

    let frames = wait_for_frames(&fx.sink, 2).await;
    // Presence (absolute 0x00EF) then cycle count (absolute 0x00F2).
    assert_eq!(frames[0].0, 0xE0);
    assert_eq!(
        decode(&frames[0].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0x00E0,
            entries: vec![(0x00EF, Value::Int(1))],
        })
    );
    assert_eq!(
        decode(&frames[1].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0x00E0,
            entries: vec![(0x00F2, Value::Int(12))],
        })
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn inbound_writes_do_not_echo_back_out() {
    let fx = fixture();
    let (_frames_tx, frames_rx) = mpsc::unbounded_channel();
    let handle = fx.service.clone().start(frames_rx).await.unwrap();

    // Inbound charge update for slot 1 (absolute 0x00E9).
    inbound_int(&fx.service, 0x00E0, 0x09, 80).await;
    assert_eq!(fx.store.get_int("battery:0", "charge").await.unwrap(), 80);

    // The write does not publish, so no outbound frame may appear.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(fx.sink.frames().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn queued_commands_become_outbound_frames() {
    let fx = fixture();
    let (_frames_tx, frames_rx) = mpsc::unbounded_channel();
    let handle = fx.service.clone().start(frames_rx).await.unwrap();

    fx.store
        .lpush(keys::COMMAND_LIST, "delete-all-bonds")
        .await
        .unwrap();

    let frames = wait_for_frames(&fx.sink, 1).await;
    assert_eq!(frames[0].0, 0xAA);
    // {0xAA00: {0xAA05: 0}}
    assert_eq!(
        frames[0].1,
        vec![0xA1, 0x19, 0xAA, 0x00, 0xA1, 0x19, 0xAA, 0x05, 0x00]
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn command_mapping_covers_the_documented_table() {
    let fx = fixture();

    let expectations: [(&str, u16, u16, i64); 6] = [
        ("advertising-start-with-whitelisting", 0xAA00, 0xAA01, 0),
        ("advertising-restart-no-whitelisting", 0xAA00, 0xAA02, 0),
        ("advertising-stop", 0xAA00, 0xAA03, 0),
        ("delete-bond", 0xAA00, 0xAA04, 0),
        ("delete-all-bonds", 0xAA00, 0xAA05, 0),
        ("remove", 0xA083, 0xA083, 1),
    ];

    for (command, message_type, absolute, value) in expectations {
        fx.sink.clear();
        fx.service.dispatch_command(command);
        let frames = fx.sink.frames();
        assert_eq!(frames.len(), 1, "command {command} sent no frame");
        assert_eq!(
            decode(&frames[0].1).unwrap(),
            Decoded::Message(v_link_proto::Envelope {
                message_type,
                entries: vec![(absolute, Value::Int(value))],
            }),
            "command {command} produced the wrong message"
        );
    }

    // Unknown commands are discarded.
    fx.sink.clear();
    fx.service.dispatch_command("self-destruct");
    assert!(fx.sink.frames().is_empty());
}

#[tokio::test]
async fn initialisation_sequence_sends_six_commands_in_order() {
    let fx = fixture();
    fx.service.initialize_device().await;

    let frames = fx.sink.frames();
    let ids: Vec<u8> = frames.iter().map(|(id, _)| *id).collect();
    assert_eq!(ids, vec![0xC0, 0x00, 0x80, 0xC0, 0xC0, 0xAA]);

    let decoded: Vec<(u16, u16, i64)> = frames
        .iter()
        .map(|(_, payload)| match decode(payload).unwrap() {
            Decoded::Message(message) => {
                let (absolute, value) = message.entries[0].clone();
                (
                    message.message_type,
                    absolute,
                    value.as_int().expect("init commands carry integers"),
                )
            }
            other => panic!("unexpected decode result: {other:?}"),
        })
        .collect();
    assert_eq!(
        decoded,
        vec![
            (0x00C0, 0x00C1, 0), // disable data stream
            (0xA000, 0xA001, 0), // request firmware version
            (0xA080, 0xA081, 0), // request MAC address
            (0x00C0, 0x00C1, 1), // enable data stream
            (0x00C0, 0x00C2, 1), // data stream sync
            (0xAA00, 0xAA02, 0), // restart advertising without whitelist
        ]
    );
}

#[tokio::test]
async fn outbound_power_state_hibernation_l2_sends_level_request() {
    let fx = fixture();
    fx.store
        .write_string(keys::POWER_MANAGER, "state", "hibernating-l2")
        .await
        .unwrap();

    fx.service.update_power_state().await.unwrap();

    let frames = fx.sink.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(
        decode(&frames[0].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0x0800,
            entries: vec![(0x0801, Value::Int(2))],
        })
    );
    assert_eq!(
        decode(&frames[1].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0x0800,
            entries: vec![(0x0802, Value::Int(1))],
        })
    );
}

#[tokio::test]
async fn outbound_handlebar_lock_maps_strings() {
    let fx = fixture();

    fx.store
        .write_string(keys::VEHICLE, "handlebar:lock-sensor", "unlocked")
        .await
        .unwrap();
    fx.service.update_handlebar_lock().await.unwrap();

    fx.store
        .write_string(keys::VEHICLE, "handlebar:lock-sensor", "locked")
        .await
        .unwrap();
    fx.service.update_handlebar_lock().await.unwrap();

    let frames = fx.sink.frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(
        decode(&frames[0].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0x0020,
            entries: vec![(0x0023, Value::Int(1))],
        })
    );
    assert_eq!(
        decode(&frames[1].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0x0020,
            entries: vec![(0x0023, Value::Int(0))],
        })
    );
}

#[tokio::test]
async fn missing_store_values_default_with_a_frame_still_sent() {
    let fx = fixture();

    // Nothing in the store at all: every update falls back to its default.
    fx.service.update_vehicle_state().await.unwrap();
    fx.service.update_mileage().await.unwrap();
    fx.service.update_firmware_version().await.unwrap();

    let frames = fx.sink.frames();
    assert_eq!(frames.len(), 3);
    assert_eq!(
        decode(&frames[0].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0x0020,
            entries: vec![(0x0021, Value::Int(0))],
        })
    );
    assert_eq!(
        decode(&frames[1].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0xA040,
            entries: vec![(0xA042, Value::Int(0))],
        })
    );
    assert_eq!(
        decode(&frames[2].1).unwrap(),
        Decoded::Message(v_link_proto::Envelope {
            message_type: 0xA040,
            entries: vec![(0xA041, Value::Text(String::new()))],
        })
    );
}

#[tokio::test]
async fn acknowledgement_frames_produce_no_writes_or_sends() {
    let fx = fixture();

    // Raw 4-byte ack shape for the data-stream family.
    fx.service
        .handle_frame(Frame {
            id: 0xC0,
            payload: vec![0xA1, 0x18, 0xC0, 0xA0],
        })
        .await;

    // Undecodable garbage is dropped without effect.
    fx.service
        .handle_frame(Frame {
            id: 0x20,
            payload: vec![0xFF, 0x00, 0x13],
        })
        .await;

    assert!(fx.sink.frames().is_empty());
}
