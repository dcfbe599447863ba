//! Audio filter parameters.
//!
//! Filters are applied by the node; this client only keeps track of what it
//! sent. Every field of [`Filters`] is independent and optional. The node
//! applies exactly the set it last received, so a player sends the union of
//! everything it has configured, and an empty set resets all filters at once.

use serde::{Deserialize, Serialize};

/// Number of equalizer bands a node supports.
pub const EQUALIZER_BANDS: u8 = 15;

/// One equalizer band.
///
/// `band` is nominally in `0..=14`, `gain` in `-0.25..=1.0`, where `0.0`
/// leaves the band unchanged. Values are forwarded as-is.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Band {
    pub band: u8,
    pub gain: f32,
}

/// Removes vocals by filtering a frequency band.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Karaoke {
    pub level: f32,
    pub mono_level: f32,
    pub filter_band: f32,
    pub filter_width: f32,
}

impl Default for Karaoke {
    fn default() -> Self {
        Self {
            level: 1.0,
            mono_level: 1.0,
            filter_band: 220.0,
            filter_width: 100.0,
        }
    }
}

/// Changes speed, pitch and rate. All three should be `>= 0`.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Timescale {
    pub speed: f32,
    pub pitch: f32,
    pub rate: f32,
}

impl Default for Timescale {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            rate: 1.0,
        }
    }
}

/// Oscillation of volume (tremolo) or pitch (vibrato).
///
/// `depth` is nominally in `(0, 1]`; vibrato `frequency` in `(0, 14]`.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Oscillation {
    pub frequency: f32,
    pub depth: f32,
}

impl Default for Oscillation {
    fn default() -> Self {
        Self {
            frequency: 2.0,
            depth: 0.5,
        }
    }
}

/// Audio panning around the listener.
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rotation {
    pub rotation_hz: f32,
}

#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distortion {
    pub sin_offset: f32,
    pub sin_scale: f32,
    pub cos_offset: f32,
    pub cos_scale: f32,
    pub tan_offset: f32,
    pub tan_scale: f32,
    pub offset: f32,
    pub scale: f32,
}

impl Default for Distortion {
    fn default() -> Self {
        Self {
            sin_offset: 0.0,
            sin_scale: 1.0,
            cos_offset: 0.0,
            cos_scale: 1.0,
            tan_offset: 0.0,
            tan_scale: 1.0,
            offset: 0.0,
            scale: 1.0,
        }
    }
}

/// Mixes the left and right channels.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMix {
    pub left_to_left: f32,
    pub left_to_right: f32,
    pub right_to_left: f32,
    pub right_to_right: f32,
}

impl Default for ChannelMix {
    fn default() -> Self {
        Self {
            left_to_left: 1.0,
            left_to_right: 0.0,
            right_to_left: 0.0,
            right_to_right: 1.0,
        }
    }
}

/// Suppresses higher frequencies.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LowPass {
    pub smoothing: f32,
}

impl Default for LowPass {
    fn default() -> Self {
        Self { smoothing: 20.0 }
    }
}

/// The full set of filters of one player.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub equalizer: Vec<Band>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub karaoke: Option<Karaoke>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timescale: Option<Timescale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tremolo: Option<Oscillation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibrato: Option<Oscillation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion: Option<Distortion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_mix: Option<ChannelMix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_pass: Option<LowPass>,
}

impl Filters {
    /// Sets the gain of some bands, keeping the other bands as they were.
    ///
    /// Bands end up sorted by index; a band with gain `0.0` is removed since
    /// that is what the node assumes for absent bands.
    pub fn merge_equalizer(&mut self, bands: &[Band]) {
        for band in bands {
            self.equalizer.retain(|existing| existing.band != band.band);
            if band.gain != 0.0 {
                self.equalizer.push(*band);
            }
        }
        self.equalizer.sort_by_key(|band| band.band);
    }

    /// Whether no filter is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filters_serialize_to_empty_object() {
        assert_eq!(serde_json::to_string(&Filters::default()).unwrap(), "{}");
    }

    #[test]
    fn equalizer_merges_by_band() {
        let mut filters = Filters::default();
        filters.merge_equalizer(&[Band { band: 2, gain: 0.15 }, Band { band: 0, gain: 0.15 }]);
        filters.merge_equalizer(&[Band { band: 2, gain: 0.5 }]);

        assert_eq!(
            filters.equalizer,
            vec![Band { band: 0, gain: 0.15 }, Band { band: 2, gain: 0.5 }]
        );

        filters.merge_equalizer(&[Band { band: 0, gain: 0.0 }]);
        assert_eq!(filters.equalizer, vec![Band { band: 2, gain: 0.5 }]);
    }

    #[test]
    fn serializes_camel_case() {
        let filters = Filters {
            channel_mix: Some(ChannelMix::default()),
            rotation: Some(Rotation { rotation_hz: 0.2 }),
            ..Filters::default()
        };
        let json = serde_json::to_value(&filters).unwrap();
        assert_eq!(json["channelMix"]["leftToLeft"], 1.0);
        assert_eq!(json["rotation"]["rotationHz"], serde_json::json!(0.2_f32));
    }
}
