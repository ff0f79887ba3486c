use tracing::debug;

use crate::controller::Controller;
use crate::protocol::{Inbound, LiveData, parse_inbound};
use crate::referentials::Referentials;
use crate::transport::{InboundMessage, Transport};
use crate::{Error, Result};

/// Routes one broker message to the mirror mutator for its type.
///
/// Unrecognized types are logged and accepted. Observer notification is
/// left to the mutator.
pub fn handle_message<T: Transport>(
    controller: &mut Controller<T>,
    topic: &str,
    payload: &str,
) -> Result<()> {
    controller.log_inbound(topic, payload);
    let message = parse_inbound(topic, payload)?;
    debug!(%topic, kind = message.kind(), "dispatching message");

    match message {
        Inbound::AuthUser => Err(Error::Deprecated("auth_user")),
        Inbound::ReadUser => Err(Error::Deprecated("read_user")),
        Inbound::ChannelUpdate(update) => controller.apply_channel_update(&update),
        Inbound::Referential(blob) => {
            controller.set_referentials(Referentials::decode(&blob)?);
            Ok(())
        }
        Inbound::LiveData(LiveData::Dido(reading)) => {
            controller.apply_live_dido(reading);
            Ok(())
        }
        Inbound::LiveData(LiveData::Emu(reading)) => {
            controller.apply_live_emu(reading);
            Ok(())
        }
        Inbound::LiveData(LiveData::Unrecognized { kind }) => {
            debug!(%kind, "ignoring live data");
            Ok(())
        }
        Inbound::Unrecognized { channel, kind } => {
            debug!(?channel, %kind, "ignoring message");
            Ok(())
        }
    }
}

impl<T: Transport> Controller<T> {
    pub fn handle(&mut self, message: &InboundMessage) -> Result<()> {
        handle_message(self, &message.topic, &message.payload)
    }
}
