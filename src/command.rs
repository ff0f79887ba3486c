use serde::Deserialize;
use serde_json::{Value, json};

use crate::referentials::Referentials;
use crate::types::{EnergyLevel, OperatingMode, Temperature, TemperatureUnit};
use crate::{Error, Result};

pub const REQUEST_TYPE: &str = "REQ_TH";

/// Controller index used when a payload does not name one.
pub const DEFAULT_CONTROLLER: u32 = 0;

/// Payload of a set-temperature call. Adapters build it field by field or
/// deserialize it from a service call; `zone` and `temperature` are required.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TemperaturePayload {
    pub zone: Option<String>,
    pub temperature: Option<f64>,
    #[serde(default)]
    pub unit: TemperatureUnit,
    pub controller: Option<u32>,
}

impl TemperaturePayload {
    pub fn new(zone: impl Into<String>, temperature: f64) -> Self {
        Self {
            zone: Some(zone.into()),
            temperature: Some(temperature),
            ..Default::default()
        }
    }

    pub fn unit(mut self, unit: TemperatureUnit) -> Self {
        self.unit = unit;
        self
    }

    pub(crate) fn validate(&self) -> Result<(&str, Temperature)> {
        let temperature = self.temperature.ok_or(Error::MissingField("temperature"))?;
        let zone = self.zone.as_deref().ok_or(Error::MissingField("zone"))?;
        let raw = match self.unit {
            TemperatureUnit::Celsius => Temperature::from_celsius(temperature),
            TemperatureUnit::Fahrenheit => Temperature::from_fahrenheit(temperature),
        };
        Ok((zone, raw))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EnergyLevelPayload {
    pub zone: Option<String>,
    pub mode: Option<EnergyLevel>,
    pub controller: Option<u32>,
}

impl EnergyLevelPayload {
    pub fn new(zone: impl Into<String>, mode: EnergyLevel) -> Self {
        Self {
            zone: Some(zone.into()),
            mode: Some(mode),
            controller: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<(&str, EnergyLevel)> {
        let mode = self.mode.ok_or(Error::MissingField("mode"))?;
        let zone = self.zone.as_deref().ok_or(Error::MissingField("zone"))?;
        Ok((zone, mode))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct GlobalEnergyLevelPayload {
    pub mode: Option<EnergyLevel>,
    pub controller: Option<u32>,
}

impl GlobalEnergyLevelPayload {
    pub fn new(mode: EnergyLevel) -> Self {
        Self {
            mode: Some(mode),
            controller: None,
        }
    }

    pub(crate) fn validate(&self) -> Result<EnergyLevel> {
        self.mode.ok_or(Error::MissingField("mode"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct OperationModePayload {
    pub mode: Option<OperatingMode>,
}

impl OperationModePayload {
    pub fn new(mode: OperatingMode) -> Self {
        Self { mode: Some(mode) }
    }

    pub(crate) fn validate(&self) -> Result<OperatingMode> {
        self.mode.ok_or(Error::MissingField("mode"))
    }
}

impl From<OperatingMode> for OperationModePayload {
    fn from(mode: OperatingMode) -> Self {
        Self::new(mode)
    }
}

pub fn temperature_request(controller: u32, zone: &str, setpoint: Temperature) -> Value {
    json!({
        "controller": controller,
        "data": { "setpoint_used": setpoint.raw() },
        "type": REQUEST_TYPE,
        "zone": zone
    })
}

pub fn energy_level_request(controller: u32, zone: &str, level: EnergyLevel) -> Value {
    json!({
        "controller": controller,
        "data": { "mode_permanent": level.code() },
        "type": REQUEST_TYPE,
        "zone": zone
    })
}

pub fn global_energy_level_request(controller: u32, level: EnergyLevel, zones: &[u32]) -> Value {
    json!({
        "controller": controller,
        "data": {
            "mode_used": level.code(),
            "zone_impacted": zones
        },
        "type": REQUEST_TYPE
    })
}

pub fn operation_mode_request(mode: OperatingMode) -> Value {
    json!({
        "data": { "heat_cool": mode.to_wire() },
        "type": REQUEST_TYPE
    })
}

/// Translates a request through the session dictionary and serializes it.
pub fn encode(referentials: &Referentials, request: &Value) -> Result<(Value, String)> {
    let wire = referentials.translate(request)?;
    let text = serde_json::to_string(&wire)?;
    Ok((wire, text))
}
