//! The chat gateway, as far as voice is concerned.
//!
//! Joining, moving between and leaving voice channels is done by the host
//! application through its own gateway connection. Players only need to ask
//! for it, through [`VoiceGateway`]. The gateway answers asynchronously with
//! voice state and voice server updates, which the application forwards to
//! [`Client::on_voice_state_update`] and [`Client::on_voice_server_update`].
//!
//! [`Client::on_voice_state_update`]: crate::client::Client::on_voice_state_update
//! [`Client::on_voice_server_update`]: crate::client::Client::on_voice_server_update

use crate::{
    error::Result,
    protocol::{ChannelId, GuildId},
};

/// Requests voice state changes from the chat gateway.
///
/// Implementations must not call back into the player synchronously; the
/// gateway's answer is expected to arrive later as a separate update.
pub trait VoiceGateway: Send + Sync {
    /// Joins `channel` in `guild`, or leaves the guild's voice channel when
    /// `channel` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be submitted.
    fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        self_mute: bool,
        self_deaf: bool,
    ) -> Result<()>;
}

/// A gateway that only logs requests.
///
/// Useful where no chat gateway is attached, like in tests or when driving a
/// node from the command line.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoopGateway;

impl VoiceGateway for NoopGateway {
    fn update_voice_state(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        _self_mute: bool,
        _self_deaf: bool,
    ) -> Result<()> {
        match channel_id {
            Some(channel_id) => debug!("guild {guild_id}: join voice channel {channel_id}"),
            None => debug!("guild {guild_id}: leave voice channel"),
        }
        Ok(())
    }
}
