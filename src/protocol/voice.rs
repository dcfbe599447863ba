//! Voice payloads delivered by the chat gateway.
//!
//! The gateway announces a voice session in two independently-timed parts:
//! a voice *server* update with the endpoint and token, and a voice *state*
//! update with the session id and the channel the bot is in. Both are kept
//! in the gateway's own snake case wire format because the server part is
//! forwarded to the node verbatim.

use serde::{Deserialize, Serialize};

use super::{ChannelId, GuildId, UserId};

/// The `VOICE_SERVER_UPDATE` payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct VoiceServer {
    pub token: String,
    pub guild_id: GuildId,

    /// `None` while the voice server is being reallocated.
    pub endpoint: Option<String>,
}

/// The `VOICE_STATE_UPDATE` payload, reduced to what a player needs.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct VoiceState {
    pub session_id: String,

    /// `None` when the user left (or was removed from) the voice channel.
    pub channel_id: Option<ChannelId>,

    #[serde(default)]
    pub guild_id: Option<GuildId>,

    #[serde(default)]
    pub user_id: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_gateway_payloads() {
        let server: VoiceServer = serde_json::from_str(
            r#"{"token":"e5bbc4a783a1af5b","guild_id":"987654321","endpoint":"us-west43.discord.gg:80"}"#,
        )
        .unwrap();
        assert_eq!(server.endpoint.as_deref(), Some("us-west43.discord.gg:80"));

        let state: VoiceState = serde_json::from_str(
            r#"{"user_id":"1234567890","session_id":"744d1ac65d00e31fb7ab29fc2436be3e","guild_id":"987654321","channel_id":null,"self_mute":false}"#,
        )
        .unwrap();
        assert!(state.channel_id.is_none());
    }
}
