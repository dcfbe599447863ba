//! Track and connection lifecycle events.
//!
//! Nodes report what happens to a guild's playback through `event` messages.
//! Each message is decoded into an [`Event`], a tagged union in which every
//! variant carries only the fields that are valid for its kind.
//!
//! Two variants never arrive from a node:
//! * [`Event::ForcedDisconnect`] is synthesized when a player is forcibly
//!   torn down, for instance because the gateway reported that the bot was
//!   removed from the voice channel.
//! * [`Event::QueueEnd`] is raised when advancing playback finds the queue
//!   exhausted.
//!
//! # Example
//!
//! ```rust
//! use nodelink::events::{Event, TrackEndReason};
//!
//! fn describe(event: &Event) -> &'static str {
//!     match event {
//!         Event::TrackEnd { reason: TrackEndReason::Finished, .. } => "finished",
//!         Event::TrackEnd { .. } => "interrupted",
//!         Event::QueueEnd => "nothing left to play",
//!         _ => "other",
//!     }
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// Close code of a synthesized [`Event::ForcedDisconnect`].
pub const FORCED_DISCONNECT_CODE: u16 = 42069;

/// Reason of a synthesized [`Event::ForcedDisconnect`].
pub const FORCED_DISCONNECT_REASON: &str = "Forced Disconnect - Do not Reconnect";

/// A track or connection lifecycle event for one guild.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Playback of a track started.
    #[serde(rename = "TrackStartEvent")]
    TrackStart {
        #[serde(default)]
        track: Option<String>,
    },

    /// Playback of a track ended.
    #[serde(rename = "TrackEndEvent")]
    TrackEnd {
        #[serde(default)]
        track: Option<String>,
        reason: TrackEndReason,
    },

    /// Playback of a track failed.
    #[serde(rename = "TrackExceptionEvent")]
    TrackException {
        #[serde(default)]
        track: Option<String>,
        #[serde(default)]
        exception: Option<TrackException>,
        /// Older nodes send a bare message instead of `exception`.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// A track did not provide audio for longer than the threshold.
    #[serde(rename = "TrackStuckEvent")]
    TrackStuck {
        #[serde(default)]
        track: Option<String>,
        #[serde(rename = "thresholdMs")]
        threshold_ms: u64,
    },

    /// The node's voice connection to the chat service was closed.
    #[serde(rename = "WebSocketClosedEvent")]
    WebSocketClosed {
        code: u16,
        #[serde(default)]
        reason: String,
        #[serde(rename = "byRemote", default)]
        by_remote: bool,
    },

    /// The connection was torn down and must not be re-established.
    #[serde(rename = "ForcefulDisconnectEvent")]
    ForcedDisconnect { code: u16, reason: String },

    /// The queue ran out of tracks.
    #[serde(rename = "QueueEndEvent")]
    QueueEnd,

    /// An event type this client does not know.
    #[serde(other)]
    Unknown,
}

/// Details of a failed track.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackException {
    #[serde(default)]
    pub message: Option<String>,
    pub severity: Severity,
    #[serde(default)]
    pub cause: Option<String>,
}

/// Severity of a [`TrackException`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Common,
    Suspicious,
    Fatal,
}

/// Why playback of a track ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrackEndReason {
    /// The track reached its end, or ended with an exception.
    Finished,
    /// The track failed before providing any audio.
    LoadFailed,
    /// The player was stopped.
    Stopped,
    /// Another track started playing.
    Replaced,
    /// The node's cleanup threshold for idle players was reached.
    Cleanup,
}

impl TrackEndReason {
    /// Whether the next track may be started in response.
    #[must_use]
    pub fn may_start_next(self) -> bool {
        matches!(self, Self::Finished)
    }
}

/// The kind of an [`Event`], without its payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    TrackStart,
    TrackEnd,
    TrackException,
    TrackStuck,
    WebSocketClosed,
    ForcedDisconnect,
    QueueEnd,
    Unknown,
}

impl Event {
    /// Builds the event that is synthesized on a forced disconnect.
    #[must_use]
    pub fn forced_disconnect() -> Self {
        Self::ForcedDisconnect {
            code: FORCED_DISCONNECT_CODE,
            reason: FORCED_DISCONNECT_REASON.to_owned(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::TrackStart { .. } => EventKind::TrackStart,
            Self::TrackEnd { .. } => EventKind::TrackEnd,
            Self::TrackException { .. } => EventKind::TrackException,
            Self::TrackStuck { .. } => EventKind::TrackStuck,
            Self::WebSocketClosed { .. } => EventKind::WebSocketClosed,
            Self::ForcedDisconnect { .. } => EventKind::ForcedDisconnect,
            Self::QueueEnd => EventKind::QueueEnd,
            Self::Unknown => EventKind::Unknown,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TrackStart => "TrackStartEvent",
            Self::TrackEnd => "TrackEndEvent",
            Self::TrackException => "TrackExceptionEvent",
            Self::TrackStuck => "TrackStuckEvent",
            Self::WebSocketClosed => "WebSocketClosedEvent",
            Self::ForcedDisconnect => "ForcefulDisconnectEvent",
            Self::QueueEnd => "QueueEndEvent",
            Self::Unknown => "UnknownEvent",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TrackEnd { reason, .. } => write!(f, "{} ({reason:?})", self.kind()),
            Self::TrackStuck { threshold_ms, .. } => {
                write!(f, "{} ({threshold_ms} ms)", self.kind())
            }
            Self::WebSocketClosed { code, reason, .. } | Self::ForcedDisconnect { code, reason } => {
                write!(f, "{} ({code}: {reason})", self.kind())
            }
            _ => write!(f, "{}", self.kind()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_track_end() {
        let event: Event =
            serde_json::from_str(r#"{"type":"TrackEndEvent","track":"abc","reason":"FINISHED"}"#)
                .unwrap();
        assert_eq!(
            event,
            Event::TrackEnd {
                track: Some("abc".to_owned()),
                reason: TrackEndReason::Finished,
            }
        );
    }

    #[test]
    fn decodes_websocket_closed() {
        let event: Event = serde_json::from_str(
            r#"{"type":"WebSocketClosedEvent","code":4006,"reason":"Session is no longer valid.","byRemote":true}"#,
        )
        .unwrap();
        assert_eq!(event.kind(), EventKind::WebSocketClosed);
        assert_eq!(
            event.to_string(),
            "WebSocketClosedEvent (4006: Session is no longer valid.)"
        );
    }

    #[test]
    fn decodes_exception_in_both_shapes() {
        let modern: Event = serde_json::from_str(
            r#"{"type":"TrackExceptionEvent","track":"abc","exception":{"message":"boom","severity":"FATAL","cause":"io"}}"#,
        )
        .unwrap();
        assert!(matches!(
            modern,
            Event::TrackException { exception: Some(TrackException { severity: Severity::Fatal, .. }), .. }
        ));

        let legacy: Event =
            serde_json::from_str(r#"{"type":"TrackExceptionEvent","track":"abc","error":"boom"}"#)
                .unwrap();
        assert!(matches!(legacy, Event::TrackException { error: Some(_), .. }));
    }

    #[test]
    fn unknown_types_do_not_fail() {
        let event: Event = serde_json::from_str(r#"{"type":"SegmentSkipped"}"#).unwrap();
        assert_eq!(event, Event::Unknown);
    }

    #[test]
    fn only_finished_starts_next() {
        assert!(TrackEndReason::Finished.may_start_next());
        assert!(!TrackEndReason::Replaced.may_start_next());
        assert!(!TrackEndReason::Stopped.may_start_next());
    }
}
