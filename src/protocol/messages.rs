//! Control channel messages.
//!
//! Outbound, every [`Command`] is a JSON object tagged by `op`:
//!
//! ```json
//! {"op":"play","guildId":"987654321","track":"QAAAjQ...","startTime":0,"noReplace":false,"pause":false}
//! ```
//!
//! Inbound, the node sends `event`, `playerUpdate` and `stats` messages,
//! decoded by [`Incoming::parse`]. Messages with any other `op` are not an
//! error: they are reported as `None` so the session can log and skip them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{filters::Filters, GuildId, VoiceServer};
use crate::{
    error::{Error, Result},
    events::Event,
};

/// A command to the node.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Command {
    /// Lets the node join the voice session the bot is in.
    VoiceUpdate {
        guild_id: GuildId,
        session_id: String,
        event: VoiceServer,
    },

    /// Tears down the node's player for a guild.
    Destroy { guild_id: GuildId },

    Play {
        guild_id: GuildId,
        track: String,
        start_time: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_time: Option<u64>,
        no_replace: bool,
        pause: bool,
    },

    Stop { guild_id: GuildId },

    Pause { guild_id: GuildId, pause: bool },

    Seek { guild_id: GuildId, position: u64 },

    Volume { guild_id: GuildId, volume: u16 },

    Filters(FilterUpdate),

    /// Asks the node to keep player state for `timeout` seconds when the
    /// control channel drops.
    ConfigureResuming { key: String, timeout: u64 },
}

/// Payload of [`Command::Filters`]: the filters sit next to `guildId`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterUpdate {
    pub guild_id: GuildId,
    #[serde(flatten)]
    pub filters: Filters,
}

impl Command {
    /// The guild this command is addressed to, if any.
    #[must_use]
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            Self::VoiceUpdate { guild_id, .. }
            | Self::Destroy { guild_id }
            | Self::Play { guild_id, .. }
            | Self::Stop { guild_id }
            | Self::Pause { guild_id, .. }
            | Self::Seek { guild_id, .. }
            | Self::Volume { guild_id, .. }
            | Self::Filters(FilterUpdate { guild_id, .. }) => Some(*guild_id),
            Self::ConfigureResuming { .. } => None,
        }
    }

    /// The `op` tag, for log lines.
    #[must_use]
    pub fn op(&self) -> &'static str {
        match self {
            Self::VoiceUpdate { .. } => "voiceUpdate",
            Self::Destroy { .. } => "destroy",
            Self::Play { .. } => "play",
            Self::Stop { .. } => "stop",
            Self::Pause { .. } => "pause",
            Self::Seek { .. } => "seek",
            Self::Volume { .. } => "volume",
            Self::Filters(_) => "filters",
            Self::ConfigureResuming { .. } => "configureResuming",
        }
    }

    /// Serializes to the wire format.
    ///
    /// # Errors
    ///
    /// Serialization of these types does not fail in practice; an error is
    /// returned rather than panicking if it ever does.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Into::into)
    }
}

/// Playback position of a guild's player as reported by the node.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PositionUpdate {
    /// Node timestamp in milliseconds since the epoch.
    #[serde(default)]
    pub time: u64,

    /// Position in milliseconds.
    #[serde(default)]
    pub position: u64,

    /// Whether the node is connected to the voice server.
    #[serde(default)]
    pub connected: bool,
}

/// Node-wide load and usage figures.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub players: u32,
    pub playing_players: u32,

    /// Uptime in milliseconds.
    pub uptime: u64,
    pub memory: MemoryStats,
    pub cpu: CpuStats,

    /// Absent until the node has been up for a minute.
    #[serde(default)]
    pub frame_stats: Option<FrameStats>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct MemoryStats {
    pub free: u64,
    pub used: u64,
    pub allocated: u64,
    pub reservable: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuStats {
    pub cores: u32,
    pub system_load: f64,
    pub lavalink_load: f64,
}

/// Audio frames per minute, averaged over all players.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FrameStats {
    pub sent: i64,
    pub nulled: i64,
    pub deficit: i64,
}

/// A decoded inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum Incoming {
    Event { guild_id: GuildId, event: Event },
    PlayerUpdate { guild_id: GuildId, state: PositionUpdate },
    Stats(Stats),
}

impl Incoming {
    const OP_EVENT: &'static str = "event";
    const OP_PLAYER_UPDATE: &'static str = "playerUpdate";
    const OP_STATS: &'static str = "stats";

    /// Decodes an inbound text message.
    ///
    /// Returns `Ok(None)` for messages with an `op` this client does not
    /// handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not JSON, has no `op`, or a known
    /// `op` comes with fields of the wrong shape.
    pub fn parse(text: &str) -> Result<Option<Self>> {
        let value: Value = serde_json::from_str(text)?;
        let op = value
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_argument("message has no op"))?;

        let message = match op {
            Self::OP_EVENT => Self::Event {
                guild_id: Self::guild_id(&value)?,
                event: Event::deserialize(&value)?,
            },
            Self::OP_PLAYER_UPDATE => Self::PlayerUpdate {
                guild_id: Self::guild_id(&value)?,
                state: value
                    .get("state")
                    .map(PositionUpdate::deserialize)
                    .transpose()?
                    .unwrap_or_default(),
            },
            Self::OP_STATS => Self::Stats(Stats::deserialize(&value)?),
            other => {
                trace!("unhandled op: {other}");
                return Ok(None);
            }
        };

        Ok(Some(message))
    }

    fn guild_id(value: &Value) -> Result<GuildId> {
        value
            .get("guildId")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::invalid_argument("message has no guild id"))?
            .parse()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{events::TrackEndReason, protocol::filters::Band};

    fn guild() -> GuildId {
        GuildId::try_from(987_654_321).unwrap()
    }

    #[test]
    fn voice_update_wire_format() {
        let command = Command::VoiceUpdate {
            guild_id: guild(),
            session_id: "744d1ac6".to_owned(),
            event: VoiceServer {
                token: "e5bbc4a7".to_owned(),
                guild_id: guild(),
                endpoint: Some("us-west43.discord.gg:80".to_owned()),
            },
        };

        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({
                "op": "voiceUpdate",
                "guildId": "987654321",
                "sessionId": "744d1ac6",
                "event": {
                    "token": "e5bbc4a7",
                    "guild_id": "987654321",
                    "endpoint": "us-west43.discord.gg:80"
                }
            })
        );
    }

    #[test]
    fn play_and_resume_wire_format() {
        let play = Command::Play {
            guild_id: guild(),
            track: "QAAA".to_owned(),
            start_time: 1_000,
            end_time: None,
            no_replace: false,
            pause: true,
        };
        assert_eq!(
            serde_json::to_value(&play).unwrap(),
            json!({
                "op": "play",
                "guildId": "987654321",
                "track": "QAAA",
                "startTime": 1000,
                "noReplace": false,
                "pause": true
            })
        );

        let resuming = Command::ConfigureResuming {
            key: "Test".to_owned(),
            timeout: 60,
        };
        assert_eq!(
            serde_json::to_value(&resuming).unwrap(),
            json!({"op": "configureResuming", "key": "Test", "timeout": 60})
        );
        assert_eq!(resuming.guild_id(), None);
    }

    #[test]
    fn filters_sit_next_to_guild_id() {
        let mut filters = Filters::default();
        filters.merge_equalizer(&[Band { band: 1, gain: 0.25 }]);
        let command = Command::Filters(FilterUpdate {
            guild_id: guild(),
            filters,
        });

        assert_eq!(
            serde_json::to_value(&command).unwrap(),
            json!({
                "op": "filters",
                "guildId": "987654321",
                "equalizer": [{"band": 1, "gain": 0.25}]
            })
        );
    }

    #[test]
    fn parses_inbound_messages() {
        let event = Incoming::parse(
            r#"{"op":"event","type":"TrackEndEvent","guildId":"987654321","track":"QAAA","reason":"FINISHED"}"#,
        )
        .unwrap();
        assert_eq!(
            event,
            Some(Incoming::Event {
                guild_id: guild(),
                event: Event::TrackEnd {
                    track: Some("QAAA".to_owned()),
                    reason: TrackEndReason::Finished,
                },
            })
        );

        let update = Incoming::parse(
            r#"{"op":"playerUpdate","guildId":"987654321","state":{"time":1500467109,"position":60000,"connected":true}}"#,
        )
        .unwrap();
        assert!(matches!(
            update,
            Some(Incoming::PlayerUpdate { state: PositionUpdate { position: 60_000, .. }, .. })
        ));

        let stats = Incoming::parse(
            r#"{"op":"stats","players":2,"playingPlayers":1,"uptime":1000,
                "memory":{"free":1,"used":2,"allocated":3,"reservable":4},
                "cpu":{"cores":4,"systemLoad":0.5,"lavalinkLoad":0.1}}"#,
        )
        .unwrap();
        assert!(matches!(stats, Some(Incoming::Stats(Stats { players: 2, .. }))));
    }

    #[test]
    fn unknown_op_is_skipped() {
        assert_eq!(Incoming::parse(r#"{"op":"ready","resumed":false}"#).unwrap(), None);
        assert!(Incoming::parse(r#"{"type":"TrackEndEvent"}"#).is_err());
        assert!(Incoming::parse("not json").is_err());
    }
}
