//! Responses of the node's REST endpoints.

use serde::{Deserialize, Serialize};

use crate::{events::Severity, track::Track};

/// How a `loadtracks` query was resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    TrackLoaded,
    PlaylistLoaded,
    SearchResult,
    NoMatches,
    LoadFailed,

    /// Sent by nodes old enough to not report a load type.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistInfo {
    #[serde(default)]
    pub name: Option<String>,

    /// Index into the result's tracks, or `-1` when none was selected.
    #[serde(default)]
    pub selected_track: Option<i32>,
}

/// Why loading failed.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct LoadException {
    #[serde(default)]
    pub message: Option<String>,
    pub severity: Severity,
}

/// Result of a `loadtracks` query.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadResult {
    #[serde(default = "LoadResult::unknown_load_type")]
    pub load_type: LoadType,

    #[serde(default)]
    pub playlist_info: PlaylistInfo,

    #[serde(default)]
    pub tracks: Vec<Track>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exception: Option<LoadException>,
}

impl LoadResult {
    fn unknown_load_type() -> LoadType {
        LoadType::Unknown
    }

    #[must_use]
    pub fn has_error(&self) -> bool {
        self.load_type == LoadType::LoadFailed
    }

    #[must_use]
    pub fn is_playlist(&self) -> bool {
        self.load_type == LoadType::PlaylistLoaded
    }

    /// The selected track of a playlist, if the node reported one.
    #[must_use]
    pub fn selected_track(&self) -> Option<&Track> {
        let index = usize::try_from(self.playlist_info.selected_track?).ok()?;
        self.tracks.get(index)
    }

    /// The failure message, if any.
    #[must_use]
    pub fn exception_message(&self) -> Option<&str> {
        self.exception.as_ref()?.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RICK: &str = r#"{
        "track": "QAAAjQIAJVJpY2sgQXN0bGV5IC0gTmV2ZXIgR29ubmEgR2l2ZSBZb3UgVXAADlJpY2tBc3RsZXlWRVZP",
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

    #[test]
    fn single_track() {
        let json = format!(r#"{{"loadType":"TRACK_LOADED","playlistInfo":{{}},"tracks":[{RICK}]}}"#);
        let result: LoadResult = serde_json::from_str(&json).unwrap();

        assert!(!result.has_error());
        assert!(!result.is_playlist());
        assert_eq!(result.tracks.len(), 1);
        assert_eq!(result.selected_track(), None);
    }

    #[test]
    fn playlist() {
        let json = format!(
            r#"{{"loadType":"PLAYLIST_LOADED",
                "playlistInfo":{{"name":"Example YouTube Playlist","selectedTrack":1}},
                "tracks":[{RICK},{RICK}]}}"#
        );
        let result: LoadResult = serde_json::from_str(&json).unwrap();

        assert!(result.is_playlist());
        assert_eq!(result.tracks.len(), 2);
        assert_eq!(result.playlist_info.name.as_deref(), Some("Example YouTube Playlist"));
        assert!(result.selected_track().is_some());
    }

    #[test]
    fn failure() {
        let result: LoadResult = serde_json::from_str(
            r#"{"loadType":"LOAD_FAILED","playlistInfo":{"selectedTrack":-1},"tracks":[],
                "exception":{"message":"This video is unavailable","severity":"COMMON"}}"#,
        )
        .unwrap();

        assert!(result.has_error());
        assert_eq!(result.selected_track(), None);
        assert_eq!(result.exception_message(), Some("This video is unavailable"));
    }

    #[test]
    fn legacy_bare_list() {
        let result: LoadResult = serde_json::from_str(r#"{"tracks":[]}"#).unwrap();
        assert_eq!(result.load_type, LoadType::Unknown);
    }
}
