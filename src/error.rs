use std::fmt;

#[derive(Debug)]
pub enum Error {
    ZoneNotFound(String),
    InstallationNotFound(String),
    ChannelNotFound(String),
    MissingField(&'static str),
    NotReady,
    Deprecated(&'static str),
    MultipleChannels(String),
    NoValue { key: String, zone: String },
    Protocol(String),
    Decode(String),
    Json(serde_json::Error),
    Io(std::io::Error),
    Mqtt(rumqttc::v5::ClientError),
    Connection(rumqttc::v5::ConnectionError),
}

impl Error {
    /// True for errors that clear up once the broker has pushed its referentials.
    pub fn is_not_ready(&self) -> bool {
        matches!(self, Error::NotReady)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::ZoneNotFound(_) | Error::InstallationNotFound(_) | Error::ChannelNotFound(_)
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ZoneNotFound(id) => write!(f, "no zone found for zone {id}"),
            Error::InstallationNotFound(unique) => write!(f, "no installation found for {unique}"),
            Error::ChannelNotFound(id) => write!(f, "no channel found for channel {id}"),
            Error::MissingField(field) => write!(f, "no {field} found in payload"),
            Error::NotReady => write!(f, "referentials not received yet"),
            Error::Deprecated(what) => write!(f, "{what} is deprecated"),
            Error::MultipleChannels(zone) => {
                write!(f, "multiple channels found for zone {zone}, cannot return channel id")
            }
            Error::NoValue { key, zone } => write!(f, "no value found for key {key} in zone {zone}"),
            Error::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Error::Decode(msg) => write!(f, "decode error: {msg}"),
            Error::Json(e) => write!(f, "JSON error: {e}"),
            Error::Io(e) => write!(f, "IO error: {e}"),
            Error::Mqtt(e) => write!(f, "MQTT client error: {e}"),
            Error::Connection(e) => write!(f, "MQTT connection error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Json(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Mqtt(e) => Some(e),
            Error::Connection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<rumqttc::v5::ClientError> for Error {
    fn from(e: rumqttc::v5::ClientError) -> Self {
        Error::Mqtt(e)
    }
}

impl From<rumqttc::v5::ConnectionError> for Error {
    fn from(e: rumqttc::v5::ConnectionError) -> Self {
        Error::Connection(e)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
