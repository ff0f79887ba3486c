mod common;

use common::{RecordingTransport, calls, controller, counter, documents};
use rehau_nea_smart::{
    APP_TOPIC, Controller, EnergyLevel, Error, InboundMessage, Temperature, TemperaturePayload,
    USER_TOPIC, handle_message,
};
use serde_json::json;

fn live_dido(unique: &str, inputs: [bool; 5], outputs: [bool; 5]) -> String {
    json!({
        "type": "live_data",
        "data": {
            "type": "LIVE_DIDO",
            "unique": unique,
            "data": {"00": {"DI": inputs, "DO": outputs}}
        }
    })
    .to_string()
}

#[test]
fn channel_update_applies_echo() {
    let mut c = controller(RecordingTransport::default());
    let (count, observer) = counter();
    c.register_callback(observer);

    let payload = json!({
        "type": "channel_update",
        "data": {
            "channel": "c1",
            "unique": "inst-1",
            "data": {"setpoint_used": 716, "mode_used": 1}
        }
    });
    handle_message(&mut c, USER_TOPIC, &payload.to_string()).unwrap();

    let channel = &c.get_zone("z1").unwrap().channels[0];
    assert_eq!(channel.target_temperature, Some(Temperature::from_raw(716)));
    assert_eq!(channel.energy_level, EnergyLevel::Absent);
    assert_eq!(c.get_target_temperature("z1").unwrap(), Some(22.0));
    assert_eq!(calls(&count), 1);
}

#[test]
fn channel_update_with_only_setpoint_keeps_mode() {
    let mut c = controller(RecordingTransport::default());
    let payload = json!({
        "type": "channel_update",
        "data": {"channel": "c1", "unique": "inst-1", "data": {"setpoint_used": 680}}
    });
    handle_message(&mut c, USER_TOPIC, &payload.to_string()).unwrap();
    assert_eq!(c.get_energy_level("z1").unwrap(), EnergyLevel::Present);
    assert_eq!(c.get_target_temperature("z1").unwrap(), Some(20.0));
}

#[test]
fn channel_update_keeps_setpoint_when_mode_is_unreadable() {
    let mut c = controller(RecordingTransport::default());
    let payload = json!({
        "type": "channel_update",
        "data": {
            "channel": "c1",
            "unique": "inst-1",
            "data": {"setpoint_used": 716.0, "mode_used": 300}
        }
    });
    handle_message(&mut c, USER_TOPIC, &payload.to_string()).unwrap();

    let channel = &c.get_zone("z1").unwrap().channels[0];
    assert_eq!(channel.target_temperature, Some(Temperature::from_raw(716)));
    assert_eq!(channel.energy_level, EnergyLevel::Present);
}

#[test]
fn channel_update_for_unknown_targets() {
    let mut c = controller(RecordingTransport::default());
    let unknown_installation = json!({
        "type": "channel_update",
        "data": {"channel": "c1", "unique": "inst-9", "data": {"mode_used": 1}}
    });
    let err = handle_message(&mut c, USER_TOPIC, &unknown_installation.to_string()).unwrap_err();
    assert!(matches!(err, Error::InstallationNotFound(ref u) if u == "inst-9"));

    // c4 belongs to inst-2, not inst-1
    let wrong_installation = json!({
        "type": "channel_update",
        "data": {"channel": "c4", "unique": "inst-1", "data": {"mode_used": 1}}
    });
    let err = handle_message(&mut c, USER_TOPIC, &wrong_installation.to_string()).unwrap_err();
    assert!(matches!(err, Error::ChannelNotFound(ref id) if id == "c4"));
    assert_eq!(c.get_energy_level("z3").unwrap(), EnergyLevel::Standby);
}

#[tokio::test]
async fn referential_message_enables_commands() {
    let transport = RecordingTransport::default();
    let mut c = Controller::builder(transport.clone()).build().unwrap();
    c.load_installations(&documents()).unwrap();
    assert!(!c.is_ready());

    let blob = lz_str::compress_to_utf16(r#"{"type":"t","zone":"z","data":"d"}"#);
    let payload = json!({"type": "referential", "data": blob});
    handle_message(&mut c, USER_TOPIC, &payload.to_string()).unwrap();
    assert!(c.is_ready());

    c.set_temperature(&TemperaturePayload::new("z1", 20.0)).await.unwrap();
    assert_eq!(
        transport.bodies()[0],
        json!({"controller": 0, "d": {"setpoint_used": 680}, "t": "REQ_TH", "z": "z1"})
    );
}

#[test]
fn undecodable_referential_is_an_error() {
    let mut c = controller(RecordingTransport::default());
    let blob = lz_str::compress_to_utf16("[1, 2]");
    let payload = json!({"type": "referential", "data": blob});
    assert!(handle_message(&mut c, USER_TOPIC, &payload.to_string()).is_err());
    assert!(c.is_ready());
}

#[test]
fn live_dido_updates_only_matching_installation() {
    let mut c = controller(RecordingTransport::default());
    handle_message(
        &mut c,
        USER_TOPIC,
        &live_dido("inst-1", [true, false, true, false, false], [false, false, false, false, true]),
    )
    .unwrap();

    let dido = c.get_live_dido("inst-1");
    assert_eq!(dido.input(1), Some(true));
    assert_eq!(dido.input(2), Some(false));
    assert_eq!(dido.input(3), Some(true));
    assert_eq!(dido.output(5), Some(true));

    let other = c.get_live_dido("inst-2");
    assert_eq!(other.inputs, [None; 5]);
    assert_eq!(other.outputs, [None; 5]);
}

#[test]
fn live_dido_replaces_previous_reading() {
    let mut c = controller(RecordingTransport::default());
    handle_message(&mut c, USER_TOPIC, &live_dido("inst-1", [true; 5], [true; 5])).unwrap();
    handle_message(&mut c, USER_TOPIC, &live_dido("inst-1", [false; 5], [false; 5])).unwrap();
    let dido = c.get_live_dido("inst-1");
    assert_eq!(dido.inputs, [Some(false); 5]);
    assert_eq!(dido.outputs, [Some(false); 5]);
}

#[test]
fn live_emu_partial_update_keeps_other_fields() {
    let mut c = controller(RecordingTransport::default());
    let first = json!({
        "type": "live_data",
        "data": {
            "type": "LIVE_EMU",
            "unique": "inst-1",
            "data": {"MC0": {
                "pumpOn": 1,
                "mixed_circuit1_setpoint": 950,
                "mixed_circuit1_supply": 930,
                "mixed_circuit1_return": 850,
                "mixed_circuit1_opening": 40
            }}
        }
    });
    let second = json!({
        "type": "live_data",
        "data": {
            "type": "LIVE_EMU",
            "unique": "inst-1",
            "data": {"MC0": {"pumpOn": false, "mixed_circuit1_supply": 940}}
        }
    });
    handle_message(&mut c, USER_TOPIC, &first.to_string()).unwrap();
    handle_message(&mut c, USER_TOPIC, &second.to_string()).unwrap();

    let emu = c.get_live_emu("inst-1");
    assert_eq!(emu.pump_on, Some(false));
    assert_eq!(emu.mixed_circuit1_setpoint, Some(Temperature::from_raw(950)));
    assert_eq!(emu.mixed_circuit1_supply, Some(Temperature::from_raw(940)));
    assert_eq!(emu.mixed_circuit1_return, Some(Temperature::from_raw(850)));
    assert_eq!(emu.mixed_circuit1_opening, Some(40));
    assert_eq!(c.get_live_emu("inst-2").pump_on, None);
}

#[test]
fn unknown_types_are_ignored() {
    let mut c = controller(RecordingTransport::default());
    let (count, observer) = counter();
    c.register_callback(observer);

    handle_message(&mut c, USER_TOPIC, r#"{"type":"firmware_notice","data":{}}"#).unwrap();
    handle_message(&mut c, USER_TOPIC, r#"{"data":{"unique":"inst-1"}}"#).unwrap();
    handle_message(&mut c, APP_TOPIC, r#"{"type":null}"#).unwrap();
    let unknown_live = json!({"type": "live_data", "data": {"type": "LIVE_HEATPUMP", "unique": "inst-1"}});
    handle_message(&mut c, USER_TOPIC, &unknown_live.to_string()).unwrap();

    assert_eq!(calls(&count), 0);
}

#[test]
fn legacy_types_are_deprecated() {
    let mut c = controller(RecordingTransport::default());
    assert!(matches!(
        handle_message(&mut c, APP_TOPIC, r#"{"type":"auth_user"}"#),
        Err(Error::Deprecated("auth_user"))
    ));
    assert!(matches!(
        handle_message(&mut c, USER_TOPIC, r#"{"type":"read_user"}"#),
        Err(Error::Deprecated("read_user"))
    ));
}

#[test]
fn handle_accepts_inbound_message() {
    let mut c = controller(RecordingTransport::default());
    let message = InboundMessage {
        topic: "client/inst-1/realtime".into(),
        payload: live_dido("inst-1", [false; 5], [true; 5]),
    };
    c.handle(&message).unwrap();
    assert_eq!(c.get_live_dido("inst-1").output(1), Some(true));
}

#[test]
fn inbound_traffic_is_captured() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let mut c = Controller::builder(RecordingTransport::default())
        .message_log(rehau_nea_smart::MessageLogMode::Full, tmp.path())
        .build()
        .unwrap();
    handle_message(&mut c, USER_TOPIC, r#"{"type":"firmware_notice"}"#).unwrap();

    let log = std::fs::read_to_string(tmp.path()).unwrap();
    let line: serde_json::Value = serde_json::from_str(log.lines().next().unwrap()).unwrap();
    assert_eq!(line["dir"], "in");
    assert_eq!(line["topic"], USER_TOPIC);
    assert_eq!(line["body"]["type"], "firmware_notice");
}
