//! Shared types for the Lyra engine

mod ids;
mod play_mode;
mod song;

pub use ids::{PlaylistId, SongId};
pub use play_mode::{PlayMode, RepeatMode};
pub use song::{Song, SongKind};

use serde::{Deserialize, Serialize};

/// Queue sort field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    Artist,
    Album,
    /// Disc-aware track position (disc * 1000 + track)
    Track,
    Title,
    Year,
    Duration,
    /// Fisher-Yates shuffle instead of a comparison
    Random,
}

/// Queue sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}
