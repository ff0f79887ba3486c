use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::command::{
    self, DEFAULT_CONTROLLER, EnergyLevelPayload, GlobalEnergyLevelPayload, OperationModePayload,
    TemperaturePayload,
};
use crate::logger::{MessageLogMode, MessageLogger};
use crate::observers::{Observer, ObserverRegistry};
use crate::protocol::{ChannelUpdate, DidoReading, EmuReading, command_topic};
use crate::referentials::Referentials;
use crate::snapshot::{global_energy_level, parse_installations};
use crate::transport::Transport;
use crate::types::*;
use crate::{Error, Result};

pub struct ControllerBuilder<T> {
    transport: T,
    observers: Vec<Observer>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<PathBuf>,
}

impl<T: Transport> ControllerBuilder<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            observers: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    pub fn on_change(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.observers.push(Arc::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<PathBuf>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<Controller<T>> {
        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, path)?),
            _ => None,
        };

        let observers = ObserverRegistry::new();
        for observer in self.observers {
            observers.register(observer);
        }

        Ok(Controller {
            transport: self.transport,
            installations: Vec::new(),
            live_emus: HashMap::new(),
            live_didos: HashMap::new(),
            referentials: Referentials::default(),
            last_operating_mode: OperatingMode::default(),
            observers,
            logger,
        })
    }
}

/// In-process mirror of every installation the session can see, plus the
/// command surface that writes to it.
///
/// Reads never touch the network. Mutators, whether driven by inbound
/// messages or by commands, notify the registered observers once they are done.
pub struct Controller<T> {
    transport: T,
    installations: Vec<Installation>,
    live_emus: HashMap<String, LiveEmu>,
    live_didos: HashMap<String, LiveDido>,
    referentials: Referentials,
    last_operating_mode: OperatingMode,
    observers: ObserverRegistry,
    logger: Option<MessageLogger>,
}

impl<T: Transport> Controller<T> {
    pub fn builder(transport: T) -> ControllerBuilder<T> {
        ControllerBuilder::new(transport)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -- Observers --

    /// Returns false when the callback was already registered.
    pub fn register_callback(&self, callback: Observer) -> bool {
        self.observers.register(callback)
    }

    /// Returns false when the callback was not registered.
    pub fn remove_callback(&self, callback: &Observer) -> bool {
        self.observers.remove(callback)
    }

    /// Shared handle to the registry, for observers that unregister themselves.
    pub fn observers(&self) -> ObserverRegistry {
        self.observers.clone()
    }

    // -- Queries --

    /// True once the broker has pushed a non-empty referential dictionary.
    pub fn is_ready(&self) -> bool {
        self.referentials.is_ready()
    }

    pub fn referentials(&self) -> &Referentials {
        &self.referentials
    }

    pub fn get_installations(&self) -> &[Installation] {
        &self.installations
    }

    pub fn get_zones(&self) -> Vec<&Zone> {
        self.installations.iter().flat_map(|i| i.zones()).collect()
    }

    pub fn get_zone(&self, zone_id: &str) -> Result<&Zone> {
        self.installations
            .iter()
            .flat_map(|i| i.zones())
            .find(|z| z.id == zone_id)
            .ok_or_else(|| Error::ZoneNotFound(zone_id.to_string()))
    }

    pub fn get_installation_by_unique(&self, unique: &str) -> Result<&Installation> {
        self.installations
            .iter()
            .find(|i| i.unique == unique)
            .ok_or_else(|| Error::InstallationNotFound(unique.to_string()))
    }

    pub fn get_installation_unique_by_zone(&self, zone_id: &str) -> Result<&str> {
        self.installations
            .iter()
            .find(|i| i.zones().any(|z| z.id == zone_id))
            .map(|i| i.unique.as_str())
            .ok_or_else(|| Error::ZoneNotFound(zone_id.to_string()))
    }

    /// Mean of `field` over the zone's channels that carry it.
    pub fn zone_value(&self, field: ChannelField, zone_id: &str) -> Result<f64> {
        let zone = self.get_zone(zone_id)?;
        mean(zone.channels.iter().filter_map(|ch| field.value(ch))).ok_or_else(|| Error::NoValue {
            key: field.key().to_string(),
            zone: zone_id.to_string(),
        })
    }

    /// Like [`zone_value`](Self::zone_value), addressed by the field's snake_case key.
    pub fn get_zone_value_by_key(&self, key: &str, zone_id: &str) -> Result<f64> {
        let zone = self.get_zone(zone_id)?;
        let field: ChannelField = key.parse().map_err(|_| Error::NoValue {
            key: key.to_string(),
            zone: zone.id.clone(),
        })?;
        self.zone_value(field, zone_id)
    }

    /// Id of the zone's only channel.
    pub fn zone_channel_id(&self, zone_id: &str) -> Result<&str> {
        let zone = self.get_zone(zone_id)?;
        match zone.channels.as_slice() {
            [channel] => Ok(channel.id.as_str()),
            [] => Err(Error::NoValue {
                key: "id".to_string(),
                zone: zone_id.to_string(),
            }),
            _ => Err(Error::MultipleChannels(zone_id.to_string())),
        }
    }

    /// Current temperature in Celsius, one decimal.
    pub fn get_temperature(&self, zone_id: &str) -> Result<f64> {
        self.get_temperature_in(zone_id, TemperatureUnit::Celsius)
    }

    pub fn get_temperature_in(&self, zone_id: &str, unit: TemperatureUnit) -> Result<f64> {
        let raw = self.zone_value(ChannelField::CurrentTemperature, zone_id)?;
        Ok(match unit {
            TemperatureUnit::Celsius => round_tenth(raw_to_celsius(raw)),
            TemperatureUnit::Fahrenheit => round_tenth(raw / 10.0),
        })
    }

    /// Target in Celsius at the device's half-degree step, averaged over the
    /// channels with a positive target. When only zero targets are reported the
    /// current temperature is used; `None` when no channel reports a target.
    pub fn get_target_temperature(&self, zone_id: &str) -> Result<Option<f64>> {
        let zone = self.get_zone(zone_id)?;
        if zone.channels.iter().all(|ch| ch.target_temperature.is_none()) {
            return Ok(None);
        }
        let raw = match mean(
            zone.channels
                .iter()
                .filter_map(|ch| ChannelField::TargetTemperature.value(ch)),
        ) {
            Some(target) => target,
            None => self.zone_value(ChannelField::CurrentTemperature, zone_id)?,
        };
        Ok(Some(round_half(raw_to_celsius(raw))))
    }

    /// Relative humidity over channels with a sensor; `None` when none has one.
    pub fn get_humidity(&self, zone_id: &str) -> Result<Option<f64>> {
        let zone = self.get_zone(zone_id)?;
        Ok(mean(
            zone.channels
                .iter()
                .filter(|ch| ch.humidity > 0)
                .map(|ch| f64::from(ch.humidity)),
        ))
    }

    pub fn get_energy_level(&self, zone_id: &str) -> Result<EnergyLevel> {
        let zone = self.get_zone(zone_id)?;
        most_common(zone.channels.iter().map(|ch| ch.energy_level)).ok_or_else(|| Error::NoValue {
            key: ChannelField::EnergyLevel.key().to_string(),
            zone: zone_id.to_string(),
        })
    }

    pub fn get_zone_operation_mode(&self, zone_id: &str) -> Result<OperatingMode> {
        let zone = self.get_zone(zone_id)?;
        most_common(zone.channels.iter().map(|ch| ch.operating_mode)).ok_or_else(|| {
            Error::NoValue {
                key: ChannelField::OperatingMode.key().to_string(),
                zone: zone_id.to_string(),
            }
        })
    }

    /// True while any channel of the zone reports demand.
    pub fn is_demanding(&self, zone_id: &str) -> Result<bool> {
        Ok(self.get_zone(zone_id)?.channels.iter().any(Channel::is_demanding))
    }

    pub fn get_operation_mode(&self, unique: &str) -> Result<OperatingMode> {
        Ok(self.get_installation_by_unique(unique)?.operating_mode)
    }

    pub fn get_global_energy_level(&self, unique: &str) -> Result<EnergyLevel> {
        Ok(self.get_installation_by_unique(unique)?.global_energy_level)
    }

    pub fn get_outside_temperature(&self, unique: &str) -> Result<f64> {
        Ok(self.get_installation_by_unique(unique)?.outside_temp.display_celsius())
    }

    pub fn get_outside_temperature_filtered(&self, unique: &str) -> Result<f64> {
        Ok(self
            .get_installation_by_unique(unique)?
            .outside_temp_filtered
            .display_celsius())
    }

    /// Unknown installations read as disconnected.
    pub fn is_connected(&self, unique: &str) -> bool {
        self.installations
            .iter()
            .any(|i| i.unique == unique && i.connected)
    }

    /// Latest mixed-circuit telemetry, or an all-`None` placeholder.
    pub fn get_live_emu(&self, unique: &str) -> LiveEmu {
        self.live_emus
            .get(unique)
            .cloned()
            .unwrap_or_else(|| LiveEmu::placeholder(unique))
    }

    pub fn get_live_dido(&self, unique: &str) -> LiveDido {
        self.live_didos
            .get(unique)
            .cloned()
            .unwrap_or_else(|| LiveDido::placeholder(unique))
    }

    // -- Mutators --

    /// Replaces the mirror with a full authoritative snapshot.
    pub fn load_installations(&mut self, documents: &[Value]) -> Result<()> {
        let installations = parse_installations(documents, self.last_operating_mode)?;
        if let Some(ref mut logger) = self.logger {
            logger.log_snapshot(&Value::Array(documents.to_vec()));
        }
        if let Some(first) = installations.first() {
            self.last_operating_mode = first.operating_mode;
        }
        debug!(count = installations.len(), "loaded installations");
        self.installations = installations;
        self.observers.notify();
        Ok(())
    }

    pub fn set_referentials(&mut self, referentials: Referentials) {
        debug!(keys = referentials.len(), "referentials updated");
        self.referentials = referentials;
        self.observers.notify();
    }

    /// Applies a broker echo for one channel; absent values are left as they are.
    pub fn apply_channel_update(&mut self, update: &ChannelUpdate) -> Result<()> {
        let installation = self
            .installations
            .iter_mut()
            .find(|i| i.unique == update.unique)
            .ok_or_else(|| Error::InstallationNotFound(update.unique.clone()))?;
        let channel = installation
            .channels_mut()
            .find(|ch| ch.id == update.channel)
            .ok_or_else(|| Error::ChannelNotFound(update.channel.clone()))?;

        if let Some(setpoint) = update.values.setpoint_used {
            channel.target_temperature = Some(Temperature::from_raw(setpoint));
        }
        if let Some(code) = update.values.mode_used {
            match u8::try_from(code).ok().and_then(EnergyLevel::from_code) {
                Some(level) => channel.energy_level = level,
                None => warn!(channel = %update.channel, code, "ignoring unknown energy level"),
            }
        }
        installation.global_energy_level = global_energy_level(installation);
        trace!(channel = %update.channel, unique = %update.unique, "channel updated");
        self.observers.notify();
        Ok(())
    }

    /// Overwrites the ports present in the reading for its installation only.
    pub fn apply_live_dido(&mut self, reading: DidoReading) {
        let entry = self
            .live_didos
            .entry(reading.unique.clone())
            .or_insert_with(|| LiveDido::placeholder(&reading.unique));
        for (slot, value) in entry.inputs.iter_mut().zip(reading.inputs) {
            if value.is_some() {
                *slot = value;
            }
        }
        for (slot, value) in entry.outputs.iter_mut().zip(reading.outputs) {
            if value.is_some() {
                *slot = value;
            }
        }
        self.observers.notify();
    }

    pub fn apply_live_emu(&mut self, reading: EmuReading) {
        let entry = self
            .live_emus
            .entry(reading.unique.clone())
            .or_insert_with(|| LiveEmu::placeholder(&reading.unique));
        if reading.pump_on.is_some() {
            entry.pump_on = reading.pump_on;
        }
        if let Some(raw) = reading.setpoint {
            entry.mixed_circuit1_setpoint = Some(Temperature::from_raw(raw));
        }
        if let Some(raw) = reading.supply {
            entry.mixed_circuit1_supply = Some(Temperature::from_raw(raw));
        }
        if let Some(raw) = reading.return_temp {
            entry.mixed_circuit1_return = Some(Temperature::from_raw(raw));
        }
        if reading.opening.is_some() {
            entry.mixed_circuit1_opening = reading.opening;
        }
        self.observers.notify();
    }

    /// Drops everything learned during the session.
    pub fn reset(&mut self) {
        debug!("resetting mirror");
        self.installations.clear();
        self.live_emus.clear();
        self.live_didos.clear();
        self.referentials = Referentials::Pending;
        self.observers.notify();
    }

    pub(crate) fn log_inbound(&mut self, topic: &str, payload: &str) {
        if let Some(ref mut logger) = self.logger {
            logger.log_inbound(topic, payload);
        }
    }

    // -- Commands --
    //
    // Every command validates its payload, encodes the request, then updates
    // the mirror and notifies before publishing. A failed publish leaves the
    // optimistic update in place until the broker echoes the real state.

    pub async fn set_temperature(&mut self, payload: &TemperaturePayload) -> Result<()> {
        let (zone_id, setpoint) = payload.validate()?;
        let unique = self.get_installation_unique_by_zone(zone_id)?.to_string();
        let controller = payload.controller.unwrap_or(DEFAULT_CONTROLLER);
        let request = command::temperature_request(controller, zone_id, setpoint);
        let (wire, body) = command::encode(&self.referentials, &request)?;

        self.update_zone(zone_id, |ch| ch.target_temperature = Some(setpoint));
        self.observers.notify();
        self.send("set_temperature", &command_topic(&unique), &wire, body)
            .await
    }

    pub async fn set_energy_level(&mut self, payload: &EnergyLevelPayload) -> Result<()> {
        let (zone_id, level) = payload.validate()?;
        let unique = self.get_installation_unique_by_zone(zone_id)?.to_string();
        let controller = payload.controller.unwrap_or(DEFAULT_CONTROLLER);
        let request = command::energy_level_request(controller, zone_id, level);
        let (wire, body) = command::encode(&self.referentials, &request)?;

        self.update_zone(zone_id, |ch| ch.energy_level = level);
        self.observers.notify();
        self.send("set_energy_level", &command_topic(&unique), &wire, body)
            .await
    }

    /// One request per installation, covering every zone number it knows.
    pub async fn set_global_energy_level(&mut self, payload: &GlobalEnergyLevelPayload) -> Result<()> {
        let level = payload.validate()?;
        let controller = payload.controller.unwrap_or(DEFAULT_CONTROLLER);
        let mut requests = Vec::with_capacity(self.installations.len());
        for installation in &self.installations {
            let request = command::global_energy_level_request(
                controller,
                level,
                &installation.zone_numbers(),
            );
            let (wire, body) = command::encode(&self.referentials, &request)?;
            requests.push((command_topic(&installation.unique), wire, body));
        }

        for installation in &mut self.installations {
            for channel in installation.channels_mut() {
                channel.energy_level = level;
            }
            installation.global_energy_level = level;
        }
        self.observers.notify();

        for (topic, wire, body) in requests {
            self.send("set_global_energy_level", &topic, &wire, body)
                .await?;
        }
        Ok(())
    }

    /// Switches heating/cooling on every installation.
    pub async fn set_operation_mode(&mut self, payload: impl Into<OperationModePayload>) -> Result<()> {
        let mode = payload.into().validate()?;
        let request = command::operation_mode_request(mode);
        let (wire, body) = command::encode(&self.referentials, &request)?;

        for installation in &mut self.installations {
            installation.operating_mode = mode;
            for channel in installation.channels_mut() {
                channel.operating_mode = mode;
            }
        }
        self.last_operating_mode = mode;
        self.observers.notify();

        let topics: Vec<String> = self
            .installations
            .iter()
            .map(|i| command_topic(&i.unique))
            .collect();
        for topic in topics {
            self.send("set_operation_mode", &topic, &wire, body.clone())
                .await?;
        }
        Ok(())
    }

    fn update_zone(&mut self, zone_id: &str, mut f: impl FnMut(&mut Channel)) {
        for installation in &mut self.installations {
            let mut touched = false;
            for zone in installation.zones_mut().filter(|z| z.id == zone_id) {
                zone.channels.iter_mut().for_each(&mut f);
                touched = true;
            }
            if touched {
                installation.global_energy_level = global_energy_level(installation);
            }
        }
    }

    async fn send(&mut self, action: &str, topic: &str, wire: &Value, body: String) -> Result<()> {
        debug!(action, %topic, "sending command");
        trace!(%body);
        if let Some(ref mut logger) = self.logger {
            logger.log_command(action, topic, wire);
        }
        self.transport.publish(topic, body).await
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0u32), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| sum / f64::from(count))
}

/// Most frequent value; ties go to the value seen first.
fn most_common<V: PartialEq + Copy>(values: impl Iterator<Item = V>) -> Option<V> {
    let mut counts: Vec<(V, usize)> = Vec::new();
    for value in values {
        match counts.iter_mut().find(|(v, _)| *v == value) {
            Some((_, n)) => *n += 1,
            None => counts.push((value, 1)),
        }
    }
    let mut best: Option<(V, usize)> = None;
    for (value, n) in counts {
        if best.is_none_or(|(_, m)| n > m) {
            best = Some((value, n));
        }
    }
    best.map(|(v, _)| v)
}
