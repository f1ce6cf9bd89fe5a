//! Song record as observed by the playback engine

use super::ids::SongId;
use serde::{Deserialize, Serialize};

/// Codec hint carried by the catalog
///
/// The engine never decodes; the hint is forwarded to the streaming URL
/// resolver so the server can pick a transcode target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SongKind {
    #[default]
    Audio,
    Flac,
    Mp3,
    Ogg,
    Aac,
}

/// A song as the engine reads it off the catalog
///
/// Opaque beyond the attributes listed here; anything else the server
/// returns is preserved by the repository layer, not by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    /// Universally-unique identifier
    pub uuid: SongId,

    /// Song title
    pub title: String,

    /// Artist name
    pub artist: String,

    /// Album name
    #[serde(default)]
    pub album: Option<String>,

    /// Codec hint
    #[serde(default)]
    pub kind: SongKind,

    /// Duration in seconds (0.0 when unknown)
    #[serde(default)]
    pub duration_secs: f64,

    /// Whether the stream supports seeking; zero/false disables the seek bar
    #[serde(default = "default_seekable")]
    pub seekable: bool,

    /// Track-level ReplayGain in dB
    #[serde(default)]
    pub replay_gain_track: Option<f64>,

    /// Album-level ReplayGain in dB
    #[serde(default)]
    pub replay_gain_album: Option<f64>,

    /// Virtual file path in the catalog, when the song maps to a file
    #[serde(default)]
    pub file: Option<String>,

    /// Disc number (for disc-aware track sorting)
    #[serde(default)]
    pub disc: Option<u32>,

    /// Track number within the disc
    #[serde(default)]
    pub track: Option<u32>,

    /// Release year
    #[serde(default)]
    pub year: Option<i32>,
}

fn default_seekable() -> bool {
    true
}

impl Song {
    /// Disc-aware track position used by queue sorting
    pub fn track_position(&self) -> u32 {
        self.disc.unwrap_or(0) * 1000 + self.track.unwrap_or(0)
    }

    /// Whether a stub record is missing display metadata
    ///
    /// Stubs appear when the offline layer reconstitutes a queue before
    /// the catalog entries are available again.
    pub fn is_metadata_stub(&self) -> bool {
        self.title.is_empty() && self.artist.is_empty()
    }
}
