use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Temperature as the controller reports it: tenths of a degree Fahrenheit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Temperature(i32);

impl Temperature {
    pub const fn from_raw(raw: i32) -> Self {
        Self(raw)
    }

    /// Rounds to the nearest raw tenth so float noise (`19.3 * 18.0`) never drops a step.
    pub fn from_celsius(c: f64) -> Self {
        Self((c * 10.0 * 1.8 + 320.0).round() as i32)
    }

    pub fn from_fahrenheit(f: f64) -> Self {
        Self((f * 10.0).round() as i32)
    }

    pub fn raw(&self) -> i32 {
        self.0
    }

    pub fn fahrenheit(&self) -> f64 {
        f64::from(self.0) / 10.0
    }

    pub fn celsius(&self) -> f64 {
        raw_to_celsius(f64::from(self.0))
    }

    /// Celsius rounded to one decimal, for plain sensor reads.
    pub fn display_celsius(&self) -> f64 {
        round_tenth(self.celsius())
    }

    /// Celsius rounded to the device's half-degree control step.
    pub fn setpoint_celsius(&self) -> f64 {
        round_half(self.celsius())
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}\u{00b0}C", self.display_celsius())
    }
}

/// Converts a (possibly averaged) raw tenths-Fahrenheit value to Celsius.
pub fn raw_to_celsius(raw: f64) -> f64 {
    (raw / 10.0 - 32.0) / 1.8
}

pub(crate) fn round_tenth(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

pub(crate) fn round_half(v: f64) -> f64 {
    (v * 2.0).round() / 2.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub enum TemperatureUnit {
    #[default]
    #[serde(rename = "C")]
    Celsius,
    #[serde(rename = "F")]
    Fahrenheit,
}

/// Preset ("energy level") of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum EnergyLevel {
    #[default]
    Present,
    Absent,
    Standby,
    Timing,
    Party,
    Holiday,
}

impl EnergyLevel {
    pub const ALL: [EnergyLevel; 6] = [
        EnergyLevel::Present,
        EnergyLevel::Absent,
        EnergyLevel::Standby,
        EnergyLevel::Timing,
        EnergyLevel::Party,
        EnergyLevel::Holiday,
    ];

    pub fn code(&self) -> u8 {
        match self {
            EnergyLevel::Present => 0,
            EnergyLevel::Absent => 1,
            EnergyLevel::Standby => 2,
            EnergyLevel::Timing => 3,
            EnergyLevel::Party => 6,
            EnergyLevel::Holiday => 7,
        }
    }

    /// Codes 4 and 5 are timing sub-states (program currently in its present/absent slot).
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(EnergyLevel::Present),
            1 => Some(EnergyLevel::Absent),
            2 => Some(EnergyLevel::Standby),
            3..=5 => Some(EnergyLevel::Timing),
            6 => Some(EnergyLevel::Party),
            7 => Some(EnergyLevel::Holiday),
            _ => None,
        }
    }
}

impl TryFrom<u8> for EnergyLevel {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        EnergyLevel::from_code(code).ok_or_else(|| format!("unknown energy level {code}"))
    }
}

impl From<EnergyLevel> for u8 {
    fn from(level: EnergyLevel) -> u8 {
        level.code()
    }
}

/// Installation-wide heating/cooling mode. On the wire it travels as a
/// zero-padded two digit string (`"01"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "ModeCode", into = "u8")]
pub enum OperatingMode {
    #[default]
    Auto,
    Heating,
    Cooling,
    ManualHeating,
    ManualCooling,
    Unknown(u8),
}

impl OperatingMode {
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => OperatingMode::Auto,
            1 => OperatingMode::Heating,
            2 => OperatingMode::Cooling,
            3 => OperatingMode::ManualHeating,
            4 => OperatingMode::ManualCooling,
            other => OperatingMode::Unknown(other),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            OperatingMode::Auto => 0,
            OperatingMode::Heating => 1,
            OperatingMode::Cooling => 2,
            OperatingMode::ManualHeating => 3,
            OperatingMode::ManualCooling => 4,
            OperatingMode::Unknown(code) => *code,
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        s.trim().parse::<u8>().ok().map(Self::from_code)
    }

    pub fn to_wire(&self) -> String {
        format!("{:02}", self.code())
    }

    pub fn is_heating(&self) -> bool {
        matches!(self, OperatingMode::Heating | OperatingMode::ManualHeating)
    }

    pub fn is_cooling(&self) -> bool {
        matches!(self, OperatingMode::Cooling | OperatingMode::ManualCooling)
    }
}

impl From<OperatingMode> for u8 {
    fn from(mode: OperatingMode) -> u8 {
        mode.code()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ModeCode {
    Number(u8),
    Text(String),
}

impl TryFrom<ModeCode> for OperatingMode {
    type Error = String;

    fn try_from(code: ModeCode) -> Result<Self, Self::Error> {
        match code {
            ModeCode::Number(n) => Ok(OperatingMode::from_code(n)),
            ModeCode::Text(s) => {
                OperatingMode::from_wire(&s).ok_or_else(|| format!("invalid operating mode {s:?}"))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Cooling {
    pub normal: Temperature,
    pub reduced: Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Heating {
    pub normal: Temperature,
    pub reduced: Temperature,
    pub standby: Temperature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Setpoints {
    pub cooling: Cooling,
    pub heating: Heating,
    pub min: Temperature,
    pub max: Temperature,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Channel {
    pub id: String,
    /// `None` or zero (and below) means no target is set.
    pub target_temperature: Option<Temperature>,
    pub current_temperature: Temperature,
    pub energy_level: EnergyLevel,
    pub operating_mode: OperatingMode,
    /// Percent; zero or below means the channel has no humidity sensor.
    pub humidity: i32,
    pub demand: i32,
    pub setpoints: Setpoints,
}

impl Channel {
    pub fn is_demanding(&self) -> bool {
        self.demand != 0
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub number: u32,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub zones: Vec<Zone>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Installation {
    pub id: String,
    pub unique: String,
    pub hash: Option<String>,
    pub global_energy_level: EnergyLevel,
    pub connected: bool,
    pub operating_mode: OperatingMode,
    pub groups: Vec<Group>,
    pub outside_temp: Temperature,
    pub outside_temp_filtered: Temperature,
}

impl Installation {
    pub fn zones(&self) -> impl Iterator<Item = &Zone> {
        self.groups.iter().flat_map(|g| g.zones.iter())
    }

    pub fn zones_mut(&mut self) -> impl Iterator<Item = &mut Zone> {
        self.groups.iter_mut().flat_map(|g| g.zones.iter_mut())
    }

    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.zones().flat_map(|z| z.channels.iter())
    }

    pub fn channels_mut(&mut self) -> impl Iterator<Item = &mut Channel> {
        self.zones_mut().flat_map(|z| z.channels.iter_mut())
    }

    pub fn zone_numbers(&self) -> Vec<u32> {
        self.zones().map(|z| z.number).collect()
    }
}

/// Mixed-circuit telemetry of an installation's base station.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LiveEmu {
    pub unique: String,
    pub pump_on: Option<bool>,
    pub mixed_circuit1_setpoint: Option<Temperature>,
    pub mixed_circuit1_supply: Option<Temperature>,
    pub mixed_circuit1_return: Option<Temperature>,
    pub mixed_circuit1_opening: Option<i32>,
}

impl LiveEmu {
    /// Returned for installations whose telemetry has not arrived yet.
    pub fn placeholder(unique: impl Into<String>) -> Self {
        Self {
            unique: unique.into(),
            ..Default::default()
        }
    }
}

pub const DIDO_PORTS: usize = 5;

/// Digital inputs and outputs of an installation's base station.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LiveDido {
    pub unique: String,
    pub inputs: [Option<bool>; DIDO_PORTS],
    pub outputs: [Option<bool>; DIDO_PORTS],
}

impl LiveDido {
    pub fn placeholder(unique: impl Into<String>) -> Self {
        Self {
            unique: unique.into(),
            ..Default::default()
        }
    }

    /// Digital input `DI_n`, 1-based.
    pub fn input(&self, n: usize) -> Option<bool> {
        n.checked_sub(1).and_then(|i| self.inputs.get(i).copied().flatten())
    }

    /// Digital output `DO_n`, 1-based.
    pub fn output(&self, n: usize) -> Option<bool> {
        n.checked_sub(1).and_then(|i| self.outputs.get(i).copied().flatten())
    }
}

/// Channel attributes addressable by name through
/// [`Controller::get_zone_value_by_key`](crate::Controller::get_zone_value_by_key).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelField {
    TargetTemperature,
    CurrentTemperature,
    EnergyLevel,
    OperatingMode,
    Humidity,
    Demand,
}

impl ChannelField {
    pub fn key(&self) -> &'static str {
        match self {
            ChannelField::TargetTemperature => "target_temperature",
            ChannelField::CurrentTemperature => "current_temperature",
            ChannelField::EnergyLevel => "energy_level",
            ChannelField::OperatingMode => "operating_mode",
            ChannelField::Humidity => "humidity",
            ChannelField::Demand => "demand",
        }
    }

    /// Numeric value of the field on one channel; `None` when the channel lacks it.
    pub fn value(&self, channel: &Channel) -> Option<f64> {
        match self {
            ChannelField::TargetTemperature => channel
                .target_temperature
                .filter(|t| t.raw() > 0)
                .map(|t| f64::from(t.raw())),
            ChannelField::CurrentTemperature => Some(f64::from(channel.current_temperature.raw())),
            ChannelField::EnergyLevel => Some(f64::from(channel.energy_level.code())),
            ChannelField::OperatingMode => Some(f64::from(channel.operating_mode.code())),
            ChannelField::Humidity => Some(f64::from(channel.humidity)),
            ChannelField::Demand => Some(f64::from(channel.demand)),
        }
    }
}

impl FromStr for ChannelField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "target_temperature" => Ok(ChannelField::TargetTemperature),
            "current_temperature" => Ok(ChannelField::CurrentTemperature),
            "energy_level" => Ok(ChannelField::EnergyLevel),
            "operating_mode" => Ok(ChannelField::OperatingMode),
            "humidity" => Ok(ChannelField::Humidity),
            "demand" => Ok(ChannelField::Demand),
            other => Err(format!("unknown channel field {other}")),
        }
    }
}
