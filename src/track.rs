//! Track descriptors as resolved by a node.
//!
//! A [`Track`] is an immutable description of something a node can play. Its
//! `encoded` token is opaque to this client: it is issued by the node when a
//! track is loaded and handed back verbatim in `play` commands.
//!
//! Tracks can be tagged through their `extras`. The only tag this crate
//! interprets is `"bumped"`, which excludes a queued track from shuffling
//! (see [`Player::force_shuffle`]).
//!
//! [`Player::force_shuffle`]: crate::player::Player::force_shuffle

use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::UserId;

/// Metadata of a track as reported by the node.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub identifier: String,
    pub is_seekable: bool,
    pub author: String,

    /// Length in milliseconds.
    pub length: u64,
    pub is_stream: bool,

    /// Start offset in milliseconds.
    #[serde(default)]
    pub position: u64,
    pub title: String,
    pub uri: Option<String>,
    pub source_name: String,
}

/// A playable track.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Track {
    /// Node-issued opaque token.
    #[serde(rename = "track", alias = "encoded")]
    encoded: String,

    info: TrackInfo,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    extras: HashMap<String, Value>,

    #[serde(skip)]
    requester: Option<UserId>,
}

impl Track {
    /// Tag marking a track as bumped.
    pub const BUMPED: &'static str = "bumped";

    #[must_use]
    pub fn new(encoded: impl Into<String>, info: TrackInfo) -> Self {
        Self {
            encoded: encoded.into(),
            info,
            extras: HashMap::new(),
            requester: None,
        }
    }

    #[must_use]
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    #[must_use]
    pub fn info(&self) -> &TrackInfo {
        &self.info
    }

    #[must_use]
    pub fn identifier(&self) -> &str {
        &self.info.identifier
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.info.title
    }

    #[must_use]
    pub fn author(&self) -> &str {
        &self.info.author
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.info.source_name
    }

    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.info.uri.as_deref()
    }

    /// Length in milliseconds.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.info.length
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.info.length)
    }

    #[must_use]
    pub fn is_seekable(&self) -> bool {
        self.info.is_seekable
    }

    #[must_use]
    pub fn is_stream(&self) -> bool {
        self.info.is_stream
    }

    /// Offset in milliseconds at which playback of this track starts.
    #[must_use]
    pub fn start_offset(&self) -> u64 {
        self.info.position
    }

    #[must_use]
    pub fn requester(&self) -> Option<UserId> {
        self.requester
    }

    pub(crate) fn set_requester(&mut self, requester: UserId) {
        self.requester = Some(requester);
    }

    #[must_use]
    pub fn extras(&self) -> &HashMap<String, Value> {
        &self.extras
    }

    /// Returns a copy of this track carrying an additional tag.
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Whether this track is tagged as bumped.
    ///
    /// Any value other than `null`, `false`, `0` or an empty string counts.
    #[must_use]
    pub fn is_bumped(&self) -> bool {
        match self.extras.get(Self::BUMPED) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(a)) => !a.is_empty(),
            Some(Value::Object(o)) => !o.is_empty(),
        }
    }

    /// Thumbnail URL for sources that have a predictable one.
    #[must_use]
    pub fn thumbnail(&self) -> Option<String> {
        (self.info.source_name == "youtube").then(|| {
            format!(
                "https://img.youtube.com/vi/{}/mqdefault.jpg",
                self.info.identifier
            )
        })
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.info.author, self.info.title)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a seekable test track of one minute.
    pub(crate) fn track(name: &str) -> Track {
        Track::new(
            format!("encoded-{name}"),
            TrackInfo {
                identifier: name.to_owned(),
                is_seekable: true,
                author: "author".to_owned(),
                length: 60_000,
                is_stream: false,
                position: 0,
                title: name.to_owned(),
                uri: None,
                source_name: "http".to_owned(),
            },
        )
    }

    #[test]
    fn deserializes_node_track() {
        let json = r#"{
            "track": "QAAAjQIAJVJpY2sgQXN0bGV5",
            "info": {
                "identifier": "dQw4w9WgXcQ",
                "isSeekable": true,
                "author": "RickAstleyVEVO",
                "length": 212000,
                "isStream": false,
                "position": 0,
                "title": "Rick Astley - Never Gonna Give You Up",
                "uri": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                "sourceName": "youtube"
            }
        }"#;

        let track: Track = serde_json::from_str(json).unwrap();
        assert_eq!(track.source(), "youtube");
        assert_eq!(track.identifier(), "dQw4w9WgXcQ");
        assert_eq!(
            track.thumbnail().as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/mqdefault.jpg")
        );
        assert!(!track.is_stream());
        assert_eq!(track.duration(), Duration::from_secs(212));
    }

    #[test]
    fn bumped_tag_truthiness() {
        assert!(!track("a").is_bumped());
        assert!(track("a").with_extra(Track::BUMPED, true).is_bumped());
        assert!(!track("a").with_extra(Track::BUMPED, false).is_bumped());
        assert!(track("a").with_extra(Track::BUMPED, 1).is_bumped());
        assert!(!track("a").with_extra(Track::BUMPED, "").is_bumped());
    }
}
