//! Play mode and its UI decomposition

use serde::{Deserialize, Serialize};

/// Queue play mode
///
/// Stored as a single value; the UI sees it as two orthogonal toggles
/// (shuffle, repeat). Shuffle and the repeat modes are mutually
/// exclusive: enabling either clears the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayMode {
    #[default]
    Sequential,
    Shuffle,
    RepeatAll,
    RepeatOne,
}

/// Repeat mode as exposed to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    #[default]
    None,
    All,
    One,
}

impl PlayMode {
    /// Shuffle toggle view of the mode
    pub fn shuffle(self) -> bool {
        self == PlayMode::Shuffle
    }

    /// Repeat toggle view of the mode
    pub fn repeat(self) -> RepeatMode {
        match self {
            PlayMode::RepeatAll => RepeatMode::All,
            PlayMode::RepeatOne => RepeatMode::One,
            PlayMode::Sequential | PlayMode::Shuffle => RepeatMode::None,
        }
    }

    /// Recombine the two UI toggles into a mode
    ///
    /// Shuffle wins when both are requested; callers enforce exclusion by
    /// passing the toggle that changed last.
    pub fn from_toggles(shuffle: bool, repeat: RepeatMode) -> Self {
        if shuffle {
            return PlayMode::Shuffle;
        }
        match repeat {
            RepeatMode::None => PlayMode::Sequential,
            RepeatMode::All => PlayMode::RepeatAll,
            RepeatMode::One => PlayMode::RepeatOne,
        }
    }
}
