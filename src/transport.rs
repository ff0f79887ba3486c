use std::future::Future;
use std::str::from_utf8;
use std::time::Duration;

use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::mqttbytes::v5::{Packet, Publish};
use rumqttc::v5::{AsyncClient, Event, EventLoop, MqttOptions};
use serde::Deserialize;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use crate::protocol::{APP_TOPIC, USER_TOPIC, user_topic};
use crate::{Error, Result};

/// Outbound half of the broker session. Implementations publish as-is and
/// never retry; failures go back to the caller unchanged.
pub trait Transport {
    fn publish(&self, topic: &str, payload: String) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: String,
}

impl TryFrom<&Publish> for InboundMessage {
    type Error = Error;

    fn try_from(publish: &Publish) -> Result<Self> {
        let topic = from_utf8(&publish.topic)
            .map_err(|e| Error::Protocol(format!("topic is not UTF-8: {e}")))?;
        let payload = from_utf8(&publish.payload)
            .map_err(|e| Error::Protocol(format!("payload on {topic} is not UTF-8: {e}")))?;
        Ok(InboundMessage {
            topic: topic.to_string(),
            payload: payload.to_string(),
        })
    }
}

fn default_port() -> u16 {
    1883
}

fn default_keep_alive() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
}

impl MqttConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: None,
            username: None,
            password: None,
            keep_alive_secs: default_keep_alive(),
        }
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// Configured client id, or a fresh `rehau-<uuid>` per session.
    pub fn resolve_client_id(&self) -> String {
        self.client_id
            .clone()
            .unwrap_or_else(|| format!("rehau-{}", Uuid::new_v4()))
    }

    pub fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.resolve_client_id(), &self.host, self.port);
        options.set_keep_alive(Duration::from_secs(self.keep_alive_secs));
        if let (Some(user), Some(pass)) = (&self.username, &self.password) {
            options.set_credentials(user, pass);
        }
        options
    }

    /// Creates the client pair. Nothing touches the network until the
    /// session is polled.
    pub fn connect(&self) -> (MqttTransport, MqttSession) {
        debug!(host = %self.host, port = self.port, "creating MQTT session");
        let (client, event_loop) = AsyncClient::new(self.options(), 10);
        (
            MqttTransport {
                client: client.clone(),
            },
            MqttSession { client, event_loop },
        )
    }
}

#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: String) -> Result<()> {
        debug!(%topic, "publishing command");
        trace!(%payload);
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await?;
        Ok(())
    }
}

/// Inbound half: drives the rumqttc event loop and yields PUBLISH packets.
pub struct MqttSession {
    client: AsyncClient,
    event_loop: EventLoop,
}

impl MqttSession {
    /// Subscribes the application and user channels plus the installation's realtime feed.
    pub async fn subscribe(&self, unique: &str) -> Result<()> {
        for topic in [APP_TOPIC.to_string(), USER_TOPIC.to_string(), user_topic(unique)] {
            self.subscribe_topic(&topic).await?;
        }
        Ok(())
    }

    pub async fn subscribe_topic(&self, topic: &str) -> Result<()> {
        debug!(%topic, "subscribing");
        self.client.subscribe(topic, QoS::AtLeastOnce).await?;
        Ok(())
    }

    /// Polls until the next PUBLISH arrives. Connection errors end the call;
    /// the caller decides whether to reconnect.
    pub async fn next_message(&mut self) -> Result<InboundMessage> {
        loop {
            match self.event_loop.poll().await? {
                Event::Incoming(Packet::Publish(publish)) => match InboundMessage::try_from(&publish) {
                    Ok(message) => return Ok(message),
                    Err(e) => warn!("dropping undecodable message: {e}"),
                },
                other => trace!(?other, "mqtt event"),
            }
        }
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.client.disconnect().await?;
        Ok(())
    }
}
