use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::types::DIDO_PORTS;
use crate::{Error, Result};

/// Application channel; only carried the legacy auth echo.
pub const APP_TOPIC: &str = "$client/app";
pub const USER_TOPIC: &str = "$client/user";

pub fn command_topic(unique: &str) -> String {
    format!("client/{unique}")
}

pub fn user_topic(unique: &str) -> String {
    format!("client/{unique}/realtime")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageChannel {
    App,
    User,
}

impl MessageChannel {
    pub fn from_topic(topic: &str) -> Self {
        if topic == APP_TOPIC {
            MessageChannel::App
        } else {
            MessageChannel::User
        }
    }
}

/// A broker message, classified by channel and `type`.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    AuthUser,
    ReadUser,
    ChannelUpdate(ChannelUpdate),
    Referential(String),
    LiveData(LiveData),
    Unrecognized { channel: MessageChannel, kind: String },
}

impl Inbound {
    pub fn kind(&self) -> &str {
        match self {
            Inbound::AuthUser => "auth_user",
            Inbound::ReadUser => "read_user",
            Inbound::ChannelUpdate(_) => "channel_update",
            Inbound::Referential(_) => "referential",
            Inbound::LiveData(_) => "live_data",
            Inbound::Unrecognized { kind, .. } => kind,
        }
    }
}

/// Temperature/mode echo for one channel. Either value may be absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelUpdate {
    pub channel: String,
    pub unique: String,
    #[serde(default, rename = "data")]
    pub values: ChannelValues,
}

/// Values are read leniently: floats are rounded and anything unreadable is
/// `None`, so one bad field never drops the other.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChannelValues {
    #[serde(default, deserialize_with = "lenient_int")]
    pub mode_used: Option<i32>,
    #[serde(default, deserialize_with = "lenient_int")]
    pub setpoint_used: Option<i32>,
}

fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i32>, D::Error> {
    Ok(Option::<Value>::deserialize(d)?.as_ref().and_then(int))
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiveData {
    Dido(DidoReading),
    Emu(EmuReading),
    Unrecognized { kind: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DidoReading {
    pub unique: String,
    pub inputs: [Option<bool>; DIDO_PORTS],
    pub outputs: [Option<bool>; DIDO_PORTS],
}

/// Mixed circuit 1 readings; fields absent from the message stay `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmuReading {
    pub unique: String,
    pub pump_on: Option<bool>,
    pub setpoint: Option<i32>,
    pub supply: Option<i32>,
    pub return_temp: Option<i32>,
    pub opening: Option<i32>,
}

pub fn parse_inbound(topic: &str, payload: &str) -> Result<Inbound> {
    let message: Value = serde_json::from_str(payload)?;
    let channel = MessageChannel::from_topic(topic);
    let Some(kind) = message.get("type").and_then(|v| v.as_str()) else {
        debug!(%topic, "message without type");
        return Ok(Inbound::Unrecognized {
            channel,
            kind: String::new(),
        });
    };

    let inbound = match (channel, kind) {
        (MessageChannel::App, "auth_user") => Inbound::AuthUser,
        (MessageChannel::User, "read_user") => Inbound::ReadUser,
        (MessageChannel::User, "channel_update") => {
            let data = message.get("data").cloned().unwrap_or(Value::Null);
            let update = serde_json::from_value(data)
                .map_err(|e| Error::Protocol(format!("channel_update: {e}")))?;
            Inbound::ChannelUpdate(update)
        }
        (MessageChannel::User, "referential") => match message.get("data") {
            Some(Value::String(blob)) => Inbound::Referential(blob.clone()),
            _ => return Err(Error::Protocol("referential without encoded data".into())),
        },
        (MessageChannel::User, "live_data") => {
            Inbound::LiveData(parse_live_data(message.get("data").unwrap_or(&Value::Null))?)
        }
        (channel, other) => Inbound::Unrecognized {
            channel,
            kind: other.to_string(),
        },
    };
    Ok(inbound)
}

fn parse_live_data(data: &Value) -> Result<LiveData> {
    let Some(kind) = data.get("type").and_then(|v| v.as_str()) else {
        debug!("live_data without type");
        return Ok(LiveData::Unrecognized {
            kind: String::new(),
        });
    };
    let unique = || {
        data.get("unique")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol(format!("{kind} without unique")))
    };

    match kind {
        "LIVE_DIDO" => {
            let ports = data
                .pointer("/data/00")
                .ok_or_else(|| Error::Protocol("LIVE_DIDO without data.00".into()))?;
            Ok(LiveData::Dido(DidoReading {
                unique: unique()?,
                inputs: flags(ports.get("DI")),
                outputs: flags(ports.get("DO")),
            }))
        }
        "LIVE_EMU" => {
            let circuit = data
                .pointer("/data/MC0")
                .ok_or_else(|| Error::Protocol("LIVE_EMU without data.MC0".into()))?;
            Ok(LiveData::Emu(EmuReading {
                unique: unique()?,
                pump_on: circuit.get("pumpOn").and_then(flag),
                setpoint: circuit.get("mixed_circuit1_setpoint").and_then(int),
                supply: circuit.get("mixed_circuit1_supply").and_then(int),
                return_temp: circuit.get("mixed_circuit1_return").and_then(int),
                opening: circuit.get("mixed_circuit1_opening").and_then(int),
            }))
        }
        other => Ok(LiveData::Unrecognized {
            kind: other.to_string(),
        }),
    }
}

fn flags(array: Option<&Value>) -> [Option<bool>; DIDO_PORTS] {
    let mut out = [None; DIDO_PORTS];
    if let Some(Value::Array(items)) = array {
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = flag(item);
        }
    }
    out
}

/// The base station sends booleans on newer firmware and 0/1 on older.
pub(crate) fn flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|n| n != 0.0),
        _ => None,
    }
}

pub(crate) fn int(v: &Value) -> Option<i32> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.round() as i64))
            .and_then(|n| i32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn app_channel_auth_echo() {
        let msg = parse_inbound(APP_TOPIC, r#"{"type":"auth_user"}"#).unwrap();
        assert_eq!(msg, Inbound::AuthUser);
    }

    #[test]
    fn user_type_on_app_channel_is_unrecognized() {
        let msg = parse_inbound(APP_TOPIC, r#"{"type":"channel_update"}"#).unwrap();
        assert_eq!(
            msg,
            Inbound::Unrecognized {
                channel: MessageChannel::App,
                kind: "channel_update".into()
            }
        );
    }

    #[test]
    fn channel_update_fields() {
        let payload = json!({
            "type": "channel_update",
            "data": {
                "channel": "ch1",
                "unique": "inst-1",
                "data": {"mode_used": 1, "setpoint_used": 698}
            }
        });
        let msg = parse_inbound(USER_TOPIC, &payload.to_string()).unwrap();
        let Inbound::ChannelUpdate(update) = msg else {
            panic!("expected channel_update, got {msg:?}");
        };
        assert_eq!(update.channel, "ch1");
        assert_eq!(update.unique, "inst-1");
        assert_eq!(update.values.mode_used, Some(1));
        assert_eq!(update.values.setpoint_used, Some(698));
    }

    #[test]
    fn channel_update_without_channel_is_protocol_error() {
        let payload = json!({"type": "channel_update", "data": {"unique": "inst-1"}});
        let err = parse_inbound(USER_TOPIC, &payload.to_string()).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)), "got {err:?}");
    }

    #[test]
    fn referential_requires_string_blob() {
        let ok = parse_inbound(USER_TOPIC, r#"{"type":"referential","data":"abc"}"#).unwrap();
        assert_eq!(ok, Inbound::Referential("abc".into()));
        let err = parse_inbound(USER_TOPIC, r#"{"type":"referential","data":{}}"#).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn live_dido_reads_fixed_subpath() {
        let payload = json!({
            "type": "live_data",
            "data": {
                "type": "LIVE_DIDO",
                "unique": "inst-1",
                "data": {"00": {"DI": [true, false, 1, 0, true], "DO": [false, false, false, true, false]}}
            }
        });
        let msg = parse_inbound(USER_TOPIC, &payload.to_string()).unwrap();
        let Inbound::LiveData(LiveData::Dido(reading)) = msg else {
            panic!("expected LIVE_DIDO, got {msg:?}");
        };
        assert_eq!(reading.unique, "inst-1");
        assert_eq!(
            reading.inputs,
            [Some(true), Some(false), Some(true), Some(false), Some(true)]
        );
        assert_eq!(reading.outputs[3], Some(true));
    }

    #[test]
    fn live_emu_partial_fields() {
        let payload = json!({
            "type": "live_data",
            "data": {
                "type": "LIVE_EMU",
                "unique": "inst-1",
                "data": {"MC0": {"pumpOn": true, "mixed_circuit1_supply": 950}}
            }
        });
        let msg = parse_inbound(USER_TOPIC, &payload.to_string()).unwrap();
        let Inbound::LiveData(LiveData::Emu(reading)) = msg else {
            panic!("expected LIVE_EMU, got {msg:?}");
        };
        assert_eq!(reading.pump_on, Some(true));
        assert_eq!(reading.supply, Some(950));
        assert_eq!(reading.setpoint, None);
    }

    #[test]
    fn unknown_live_data_type() {
        let payload = json!({"type": "live_data", "data": {"type": "LIVE_HEATPUMP", "unique": "x"}});
        let msg = parse_inbound(USER_TOPIC, &payload.to_string()).unwrap();
        assert_eq!(
            msg,
            Inbound::LiveData(LiveData::Unrecognized {
                kind: "LIVE_HEATPUMP".into()
            })
        );
    }

    #[test]
    fn message_without_type_is_unrecognized() {
        let expected = Inbound::Unrecognized {
            channel: MessageChannel::User,
            kind: String::new(),
        };
        assert_eq!(parse_inbound(USER_TOPIC, "{}").unwrap(), expected);
        assert_eq!(parse_inbound(USER_TOPIC, r#"{"type": 7}"#).unwrap(), expected);
        assert!(matches!(parse_inbound(USER_TOPIC, "nope"), Err(Error::Json(_))));
    }

    #[test]
    fn live_data_without_type_is_unrecognized() {
        let payload = json!({"type": "live_data", "data": {"unique": "inst-1"}});
        assert_eq!(
            parse_inbound(USER_TOPIC, &payload.to_string()).unwrap(),
            Inbound::LiveData(LiveData::Unrecognized { kind: String::new() })
        );
    }

    #[test]
    fn channel_update_tolerates_float_and_bad_mode() {
        let payload = json!({
            "type": "channel_update",
            "data": {
                "channel": "ch1",
                "unique": "inst-1",
                "data": {"mode_used": "away", "setpoint_used": 698.0}
            }
        });
        let Inbound::ChannelUpdate(update) = parse_inbound(USER_TOPIC, &payload.to_string()).unwrap()
        else {
            panic!("expected channel_update");
        };
        assert_eq!(update.values.setpoint_used, Some(698));
        assert_eq!(update.values.mode_used, None);
    }

    #[test]
    fn topics() {
        assert_eq!(command_topic("inst-1"), "client/inst-1");
        assert_eq!(MessageChannel::from_topic("client/inst-1/realtime"), MessageChannel::User);
    }
}
