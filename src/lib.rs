mod command;
mod controller;
mod diff;
mod dispatch;
mod error;
mod logger;
mod observers;
mod protocol;
mod referentials;
mod snapshot;
mod transport;
mod types;

pub use command::{
    EnergyLevelPayload, GlobalEnergyLevelPayload, OperationModePayload, REQUEST_TYPE,
    TemperaturePayload, encode, energy_level_request, global_energy_level_request,
    operation_mode_request, temperature_request,
};
pub use controller::{Controller, ControllerBuilder};
pub use dispatch::handle_message;
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use observers::{Observer, ObserverRegistry};
pub use protocol::{
    APP_TOPIC, ChannelUpdate, ChannelValues, DidoReading, EmuReading, Inbound, LiveData,
    MessageChannel, USER_TOPIC, command_topic, parse_inbound, user_topic,
};
pub use referentials::Referentials;
pub use snapshot::{SETPOINT_MAX, SETPOINT_MIN, global_energy_level, parse_installation, parse_installations};
pub use transport::{InboundMessage, MqttConfig, MqttSession, MqttTransport, Transport};
pub use types::*;

pub const MANUFACTURER: &str = "Rehau";
pub const MODEL: &str = "Neasmart 2.0 Base Station";
pub const NAME: &str = "REHAU NEA SMART 2.0 Climate Control System";
pub const DEVICE_ID: &str = "REHAU NEA SMART 2.0";
