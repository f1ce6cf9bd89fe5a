//! ReplayGain selection and linearization
//!
//! Per-song loudness normalization from catalog-supplied track/album
//! gains. The engine never measures loudness itself; it only applies the
//! dB offsets the server computed at import time.

/// ReplayGain mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReplayGainMode {
    /// No normalization
    #[default]
    Off,
    /// Track gain, album gain ignored
    Track,
    /// Album gain when present, else track gain
    Album,
}

impl ReplayGainMode {
    /// Parse a mode by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "off" => Some(Self::Off),
            "track" => Some(Self::Track),
            "album" => Some(Self::Album),
            _ => None,
        }
    }
}

/// ReplayGain configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReplayGainConfig {
    pub mode: ReplayGainMode,

    /// Added on top of the selected gain (-12..+12 dB)
    pub preamp_db: f64,

    /// Used when the song carries no gain at all (-24..0 dB)
    pub fallback_db: f64,
}

impl Default for ReplayGainConfig {
    fn default() -> Self {
        Self {
            mode: ReplayGainMode::Off,
            preamp_db: 0.0,
            fallback_db: -6.0,
        }
    }
}

impl ReplayGainConfig {
    /// Clamp fields into their legal ranges
    pub fn clamped(self) -> Self {
        Self {
            mode: self.mode,
            preamp_db: self.preamp_db.clamp(-12.0, 12.0),
            fallback_db: self.fallback_db.clamp(-24.0, 0.0),
        }
    }
}

/// Final clamp applied to the computed gain
const GAIN_RANGE_DB: (f64, f64) = (-24.0, 12.0);

/// Select and clamp the gain for a song, in dB
///
/// Returns `None` when the mode is off. Album mode prefers the album
/// gain and falls back to the track gain; a song with neither uses the
/// configured fallback.
pub fn gain_db(
    config: &ReplayGainConfig,
    track_gain: Option<f64>,
    album_gain: Option<f64>,
) -> Option<f64> {
    let selected = match config.mode {
        ReplayGainMode::Off => return None,
        ReplayGainMode::Album => match album_gain {
            Some(gain) => gain,
            None => track_gain.unwrap_or(config.fallback_db),
        },
        ReplayGainMode::Track => track_gain.unwrap_or(config.fallback_db),
    };

    Some((selected + config.preamp_db).clamp(GAIN_RANGE_DB.0, GAIN_RANGE_DB.1))
}

/// Linear gain for a song; 1.0 when the mode is off
pub fn linear_gain(
    config: &ReplayGainConfig,
    track_gain: Option<f64>,
    album_gain: Option<f64>,
) -> f64 {
    match gain_db(config, track_gain, album_gain) {
        Some(db) => 10.0f64.powf(db / 20.0),
        None => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: ReplayGainMode) -> ReplayGainConfig {
        ReplayGainConfig {
            mode,
            ..Default::default()
        }
    }

    #[test]
    fn off_mode_is_unity() {
        assert_eq!(gain_db(&config(ReplayGainMode::Off), Some(-8.0), Some(-5.0)), None);
        assert_eq!(linear_gain(&config(ReplayGainMode::Off), Some(-8.0), None), 1.0);
    }

    #[test]
    fn track_mode_ignores_album_gain() {
        let db = gain_db(&config(ReplayGainMode::Track), Some(-8.0), Some(-2.0));
        assert_eq!(db, Some(-8.0));
    }

    #[test]
    fn album_mode_prefers_album_gain() {
        let db = gain_db(&config(ReplayGainMode::Album), Some(-8.0), Some(-2.0));
        assert_eq!(db, Some(-2.0));

        // Missing album gain falls back to track gain
        let db = gain_db(&config(ReplayGainMode::Album), Some(-8.0), None);
        assert_eq!(db, Some(-8.0));
    }

    #[test]
    fn fallback_when_song_has_no_gain() {
        let db = gain_db(&config(ReplayGainMode::Track), None, None);
        assert_eq!(db, Some(-6.0));
    }

    #[test]
    fn preamp_is_added_then_clamped() {
        let mut cfg = config(ReplayGainMode::Track);
        cfg.preamp_db = 8.0;

        assert_eq!(gain_db(&cfg, Some(6.0), None), Some(12.0)); // clamped from 14
        assert_eq!(gain_db(&cfg, Some(-40.0), None), Some(-24.0)); // clamped from -32
    }

    #[test]
    fn linear_conversion() {
        let cfg = config(ReplayGainMode::Track);
        let linear = linear_gain(&cfg, Some(-6.0), None);
        assert!((linear - 0.5012).abs() < 0.001);
    }

    #[test]
    fn config_clamping() {
        let cfg = ReplayGainConfig {
            mode: ReplayGainMode::Track,
            preamp_db: 99.0,
            fallback_db: -99.0,
        }
        .clamped();
        assert_eq!(cfg.preamp_db, 12.0);
        assert_eq!(cfg.fallback_db, -24.0);
    }
}
