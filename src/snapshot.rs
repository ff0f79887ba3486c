use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::protocol::flag;
use crate::types::*;
use crate::{Error, Result};

/// Bounds the controller enforces on every channel setpoint, in raw tenths-Fahrenheit.
pub const SETPOINT_MIN: Temperature = Temperature::from_raw(644);
pub const SETPOINT_MAX: Temperature = Temperature::from_raw(806);

const LAST_CONNECTION_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.fZ";

#[derive(Deserialize)]
struct RawInstallation {
    #[serde(rename = "_id")]
    id: String,
    unique: String,
    #[serde(deserialize_with = "raw_temperature")]
    outside_temp: Temperature,
    #[serde(rename = "outsideTempFiltered", deserialize_with = "raw_temperature")]
    outside_temp_filtered: Temperature,
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(rename = "connectionState", default)]
    connection_state: Option<Value>,
    #[serde(rename = "lastConnection", default)]
    last_connection: Option<String>,
    #[serde(default)]
    groups: Vec<RawGroup>,
}

#[derive(Deserialize)]
struct RawUser {
    heatcool_auto_01: Option<OperatingMode>,
}

#[derive(Deserialize)]
struct RawGroup {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    zones: Vec<RawZone>,
}

#[derive(Deserialize)]
struct RawZone {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    number: u32,
    channels: Vec<RawChannel>,
}

#[derive(Deserialize)]
struct RawChannel {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default, deserialize_with = "raw_int")]
    humidity: i32,
    #[serde(default, deserialize_with = "raw_int")]
    demand: i32,
    #[serde(default, deserialize_with = "optional_temperature")]
    setpoint_used: Option<Temperature>,
    #[serde(deserialize_with = "raw_temperature")]
    temp_zone: Temperature,
    mode_permanent: u8,
    #[serde(default, deserialize_with = "raw_temperature")]
    setpoint_c_normal: Temperature,
    #[serde(default, deserialize_with = "raw_temperature")]
    setpoint_c_reduced: Temperature,
    #[serde(default, deserialize_with = "raw_temperature")]
    setpoint_h_normal: Temperature,
    #[serde(default, deserialize_with = "raw_temperature")]
    setpoint_h_reduced: Temperature,
    #[serde(default, deserialize_with = "raw_temperature")]
    setpoint_h_standby: Temperature,
}

fn raw_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i32, D::Error> {
    let v = f64::deserialize(d)?;
    Ok(v.round() as i32)
}

fn raw_temperature<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Temperature, D::Error> {
    raw_int(d).map(Temperature::from_raw)
}

fn optional_temperature<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<Temperature>, D::Error> {
    let v = Option::<f64>::deserialize(d)?;
    Ok(v.map(|v| Temperature::from_raw(v.round() as i32)))
}

/// Builds the installation tree from the broker's authoritative installation documents.
///
/// Documents without a `user` block inherit `last_operating_mode`, the mode last
/// seen for the session.
pub fn parse_installations(
    documents: &[Value],
    last_operating_mode: OperatingMode,
) -> Result<Vec<Installation>> {
    documents
        .iter()
        .map(|doc| parse_installation(doc, last_operating_mode))
        .collect()
}

pub fn parse_installation(document: &Value, last_operating_mode: OperatingMode) -> Result<Installation> {
    let raw = RawInstallation::deserialize(document)
        .map_err(|e| Error::Protocol(format!("installation document: {e}")))?;

    let operating_mode = raw
        .user
        .as_ref()
        .and_then(|u| u.heatcool_auto_01)
        .unwrap_or(last_operating_mode);
    let connected = is_connected(raw.connection_state.as_ref(), raw.last_connection.as_deref());

    let groups = raw
        .groups
        .into_iter()
        .map(|group| Group {
            id: group.id,
            name: group.name,
            zones: group
                .zones
                .into_iter()
                .map(|zone| build_zone(zone, operating_mode))
                .collect(),
        })
        .collect();

    let mut installation = Installation {
        id: raw.id,
        unique: raw.unique,
        hash: raw.hash,
        global_energy_level: EnergyLevel::default(),
        connected,
        operating_mode,
        groups,
        outside_temp: raw.outside_temp,
        outside_temp_filtered: raw.outside_temp_filtered,
    };
    installation.global_energy_level = global_energy_level(&installation);
    debug!(
        unique = %installation.unique,
        zones = installation.zones().count(),
        connected,
        "parsed installation"
    );
    Ok(installation)
}

fn build_zone(zone: RawZone, operating_mode: OperatingMode) -> Zone {
    if zone.channels.is_empty() {
        warn!(zone = %zone.id, "zone reported without channels");
    }
    Zone {
        id: zone.id,
        name: zone.name,
        number: zone.number,
        channels: zone
            .channels
            .into_iter()
            .map(|ch| Channel {
                energy_level: EnergyLevel::from_code(ch.mode_permanent).unwrap_or_else(|| {
                    warn!(channel = %ch.id, code = ch.mode_permanent, "unknown energy level, assuming present");
                    EnergyLevel::Present
                }),
                id: ch.id,
                target_temperature: ch.setpoint_used,
                current_temperature: ch.temp_zone,
                operating_mode,
                humidity: ch.humidity,
                demand: ch.demand,
                setpoints: Setpoints {
                    cooling: Cooling {
                        normal: ch.setpoint_c_normal,
                        reduced: ch.setpoint_c_reduced,
                    },
                    heating: Heating {
                        normal: ch.setpoint_h_normal,
                        reduced: ch.setpoint_h_reduced,
                        standby: ch.setpoint_h_standby,
                    },
                    min: SETPOINT_MIN,
                    max: SETPOINT_MAX,
                },
            })
            .collect(),
    }
}

fn is_connected(state: Option<&Value>, last_connection: Option<&str>) -> bool {
    let Some(last) = last_connection else {
        return false;
    };
    let state = state.and_then(flag).unwrap_or(false);
    state && NaiveDateTime::parse_from_str(last, LAST_CONNECTION_FORMAT).is_ok()
}

/// The energy level most channels of the installation are in. Ties go to the
/// level listed first in [`EnergyLevel::ALL`].
pub fn global_energy_level(installation: &Installation) -> EnergyLevel {
    let mut best = (EnergyLevel::Present, 0usize);
    for level in EnergyLevel::ALL {
        let count = installation
            .channels()
            .filter(|ch| ch.energy_level == level)
            .count();
        if count > best.1 {
            best = (level, count);
        }
    }
    best.0
}
