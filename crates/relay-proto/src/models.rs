use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{RelayError, Result};

/// Mopidy sends `null` for unset model fields; treat that like a missing one.
fn null_as_default<'de, D, T>(deserializer: D) -> std::result::Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Artist {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
}

/// A playable item as the media daemon describes it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Track {
    #[serde(default, deserialize_with = "null_as_default")]
    pub uri: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    /// Ordered; only the first one is ever announced.
    #[serde(default, deserialize_with = "null_as_default")]
    pub artists: Vec<Artist>,
}

impl Track {
    pub fn new(uri: impl Into<String>, name: impl Into<String>, artists: &[&str]) -> Self {
        Self {
            uri: uri.into(),
            name: name.into(),
            artists: artists
                .iter()
                .map(|a| Artist { name: a.to_string() })
                .collect(),
        }
    }

    pub fn first_artist(&self) -> Option<&str> {
        self.artists.first().map(|a| a.name.as_str())
    }
}

/// A track together with its tracklist id (tlid).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TlTrack {
    pub tlid: u64,
    pub track: Track,
}

impl TlTrack {
    /// Decode a `get_tl_tracks` result.
    pub fn list_from_value(value: Value) -> Result<Vec<TlTrack>> {
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value)
            .map_err(|e| RelayError::malformed(format!("tracklist: {}", e)))
    }

    /// Decode a `get_current_tl_track` result; `null` means nothing playing.
    pub fn optional_from_value(value: Value) -> Result<Option<TlTrack>> {
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| RelayError::malformed(format!("current track: {}", e)))
    }
}

/// One entry of the play queue, built fresh for every query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub track: Track,
    /// Position identifier; correlates with side-channel metadata.
    pub tlid: u64,
    /// Index in the play queue.
    pub index: usize,
}

impl QueueEntry {
    pub fn from_tl_tracks(tl_tracks: Vec<TlTrack>) -> Vec<QueueEntry> {
        tl_tracks
            .into_iter()
            .enumerate()
            .map(|(index, tl)| QueueEntry {
                track: tl.track,
                tlid: tl.tlid,
                index,
            })
            .collect()
    }
}

/// Payload of the daemon's `track_playback_started` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlaybackStarted {
    pub tl_track: TlTrack,
}

impl PlaybackStarted {
    pub fn new(track: Track, tlid: u64) -> Self {
        Self {
            tl_track: TlTrack { tlid, track },
        }
    }

    pub fn track(&self) -> &Track {
        &self.tl_track.track
    }

    pub fn tlid(&self) -> u64 {
        self.tl_track.tlid
    }
}
