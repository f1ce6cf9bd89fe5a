//! Typed settings blocks and the settings store
//!
//! Every effect parameter block the engine persists, one struct per
//! storage key. All fields carry serde defaults so a record written by an
//! older build (or a corrupted one) loads as far as it can and falls back
//! to defaults for the rest. Loads clamp every numeric field back into
//! its legal range.

use crate::error::Result;
use crate::keyvalue::KeyValueStore;
use lyra_core::types::SongId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// Storage keys
/// Volume, mute, current song and position
pub const KEY_PLAYER_LOCAL: &str = "music-player-local";

/// Graphic EQ enablement and band gains
pub const KEY_EQ: &str = "music-player-eq";

/// All effect parameters except EQ
pub const KEY_AUDIO_FX: &str = "music-player-audio-fx";

/// Shuffle history (array of song uuids)
pub const KEY_SHUFFLE_HISTORY: &str = "music-player-shuffle-history";

/// Always prefer the low-latency context ("true"/"false")
pub const KEY_LOW_LATENCY_ALWAYS: &str = "music-low-latency-always";

/// Active parametric EQ bands and preset reference
pub const KEY_PARAMETRIC_EQ_ACTIVE: &str = "music-player-parametric-eq-active";

/// Volume, mute and resume position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLocalSettings {
    #[serde(default = "default_volume")]
    pub volume: f64,

    #[serde(default)]
    pub muted: bool,

    #[serde(default)]
    pub current_song_uuid: Option<SongId>,

    #[serde(default)]
    pub current_time: f64,
}

fn default_volume() -> f64 {
    1.0
}

impl Default for PlayerLocalSettings {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            current_song_uuid: None,
            current_time: 0.0,
        }
    }
}

impl PlayerLocalSettings {
    fn clamped(mut self) -> Self {
        self.volume = self.volume.clamp(0.0, 1.0);
        self.current_time = self.current_time.max(0.0);
        self
    }
}

/// Graphic EQ block
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EqSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub gains: [f64; 10],

    #[serde(default)]
    pub preamp: f64,
}

impl EqSettings {
    fn clamped(mut self) -> Self {
        for gain in &mut self.gains {
            *gain = gain.clamp(-12.0, 12.0);
        }
        self.preamp = self.preamp.clamp(-24.0, 12.0);
        self
    }
}

/// ReplayGain block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayGainSettings {
    /// "off" | "track" | "album"
    #[serde(default = "default_rg_mode")]
    pub mode: String,

    #[serde(default)]
    pub preamp: f64,

    #[serde(default = "default_rg_fallback")]
    pub fallback: f64,
}

fn default_rg_mode() -> String {
    "off".to_string()
}

fn default_rg_fallback() -> f64 {
    -6.0
}

impl Default for ReplayGainSettings {
    fn default() -> Self {
        Self {
            mode: default_rg_mode(),
            preamp: 0.0,
            fallback: default_rg_fallback(),
        }
    }
}

/// Crossfeed block
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CrossfeedFxSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub level: f64,

    #[serde(default)]
    pub delay_ms: f64,

    #[serde(default)]
    pub shadow_hz: f64,
}

/// Loudness block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoudnessSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_reference_spl")]
    pub reference_spl: f64,

    #[serde(default = "default_strength")]
    pub strength: f64,
}

fn default_reference_spl() -> f64 {
    80.0
}

fn default_strength() -> f64 {
    100.0
}

impl Default for LoudnessSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            reference_spl: default_reference_spl(),
            strength: default_strength(),
        }
    }
}

/// Gapless block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaplessSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GaplessSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Crossfade block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossfadeSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Seconds, 1..12
    #[serde(default = "default_crossfade_duration")]
    pub duration: f64,
}

fn default_crossfade_duration() -> f64 {
    3.0
}

impl Default for CrossfadeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            duration: default_crossfade_duration(),
        }
    }
}

/// Tempo block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempoSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_rate")]
    pub rate: f64,

    #[serde(default = "default_true")]
    pub pitch_lock: bool,
}

fn default_rate() -> f64 {
    1.0
}

impl Default for TempoSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            rate: default_rate(),
            pitch_lock: true,
        }
    }
}

/// Comfort noise block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSettings {
    #[serde(default)]
    pub enabled: bool,

    /// "white" | "grey"
    #[serde(default = "default_noise_mode")]
    pub mode: String,

    #[serde(default)]
    pub tilt: f64,

    #[serde(default = "default_noise_power")]
    pub power: f64,

    #[serde(default = "default_noise_threshold")]
    pub threshold: f64,

    #[serde(default = "default_noise_attack")]
    pub attack: f64,
}

fn default_noise_mode() -> String {
    "white".to_string()
}

fn default_noise_power() -> f64 {
    -24.0
}

fn default_noise_threshold() -> f64 {
    -36.0
}

fn default_noise_attack() -> f64 {
    25.0
}

impl Default for NoiseSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: default_noise_mode(),
            tilt: 0.0,
            power: default_noise_power(),
            threshold: default_noise_threshold(),
            attack: default_noise_attack(),
        }
    }
}

/// Sleep timer mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SleepTimerMode {
    Duration,
    #[default]
    Time,
}

/// Sleep timer block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SleepTimerSettings {
    #[serde(default)]
    pub mode: SleepTimerMode,

    /// Duration-mode minutes, 0..180
    #[serde(default)]
    pub minutes: u32,

    /// Time-mode target, "HH:MM"
    #[serde(default = "default_target_time")]
    pub target_time: String,

    /// Floor applied to the time-mode target, 0..180
    #[serde(default)]
    pub minimum_minutes: u32,
}

fn default_target_time() -> String {
    "23:00".to_string()
}

impl Default for SleepTimerSettings {
    fn default() -> Self {
        Self {
            mode: SleepTimerMode::Time,
            minutes: 0,
            target_time: default_target_time(),
            minimum_minutes: 0,
        }
    }
}

/// Everything in Table 1 except the EQ blocks
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AudioFxSettings {
    #[serde(default)]
    pub replay_gain: ReplayGainSettings,

    #[serde(default)]
    pub crossfeed: CrossfeedFxSettings,

    #[serde(default)]
    pub loudness: LoudnessSettings,

    #[serde(default)]
    pub gapless: GaplessSettings,

    #[serde(default)]
    pub crossfade: CrossfadeSettings,

    #[serde(default)]
    pub tempo: TempoSettings,

    #[serde(default)]
    pub noise: NoiseSettings,

    #[serde(default)]
    pub sleep_timer: SleepTimerSettings,
}

impl AudioFxSettings {
    /// Clamp every numeric field into its legal range
    pub fn clamped(mut self) -> Self {
        self.replay_gain.preamp = self.replay_gain.preamp.clamp(-12.0, 12.0);
        self.replay_gain.fallback = self.replay_gain.fallback.clamp(-24.0, 0.0);

        self.crossfeed.level = self.crossfeed.level.clamp(-100.0, 100.0);
        self.crossfeed.delay_ms = self.crossfeed.delay_ms.clamp(0.0, 5.0);
        if self.crossfeed.shadow_hz != 0.0 {
            self.crossfeed.shadow_hz = self.crossfeed.shadow_hz.clamp(500.0, 3000.0);
        }

        self.loudness.reference_spl = self.loudness.reference_spl.clamp(60.0, 90.0);
        self.loudness.strength = self.loudness.strength.clamp(0.0, 150.0);

        self.crossfade.duration = self.crossfade.duration.clamp(1.0, 12.0);

        self.tempo.rate = self.tempo.rate.clamp(0.5, 2.0);

        self.noise.tilt = self.noise.tilt.clamp(-100.0, 100.0);
        self.noise.power = self.noise.power.clamp(-60.0, 0.0);
        self.noise.threshold = self.noise.threshold.clamp(-60.0, 0.0);
        self.noise.attack = self.noise.attack.clamp(25.0, 2000.0);

        self.sleep_timer.minutes = self.sleep_timer.minutes.min(180);
        self.sleep_timer.minimum_minutes = self.sleep_timer.minimum_minutes.min(180);

        self
    }
}

/// Parametric band filter type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BandKind {
    Lowshelf,
    Peaking,
    Highshelf,
    Lowpass,
    Highpass,
}

/// One persisted parametric band
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParametricBand {
    #[serde(rename = "type")]
    pub kind: BandKind,
    pub frequency: f64,
    pub q: f64,
    pub gain: f64,
}

/// The active parametric EQ configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ParametricEqState {
    #[serde(default)]
    pub preset_uuid: Option<String>,

    #[serde(default)]
    pub bands: Vec<ParametricBand>,
}

/// Typed access to the persisted settings blocks
///
/// A malformed stored value logs and falls back to the block's defaults;
/// writes go through unconditionally.
#[derive(Clone)]
pub struct SettingsStore {
    store: Arc<dyn KeyValueStore>,
}

impl SettingsStore {
    /// Create over a key-value backend
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    async fn load<T: Default + for<'de> Deserialize<'de>>(&self, key: &str) -> T {
        match self.store.get(key).await {
            Ok(Some(value)) => match serde_json::from_value(value) {
                Ok(parsed) => parsed,
                Err(err) => {
                    tracing::warn!(key, %err, "malformed settings record, using defaults");
                    T::default()
                }
            },
            Ok(None) => T::default(),
            Err(err) => {
                tracing::warn!(key, %err, "settings read failed, using defaults");
                T::default()
            }
        }
    }

    async fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.store.put(key, serde_json::to_value(value)?).await
    }

    /// Load the player-local block
    pub async fn player_local(&self) -> PlayerLocalSettings {
        self.load::<PlayerLocalSettings>(KEY_PLAYER_LOCAL)
            .await
            .clamped()
    }

    /// Persist the player-local block
    pub async fn set_player_local(&self, value: &PlayerLocalSettings) -> Result<()> {
        self.save(KEY_PLAYER_LOCAL, value).await
    }

    /// Load the graphic EQ block
    pub async fn eq(&self) -> EqSettings {
        self.load::<EqSettings>(KEY_EQ).await.clamped()
    }

    /// Persist the graphic EQ block
    pub async fn set_eq(&self, value: &EqSettings) -> Result<()> {
        self.save(KEY_EQ, value).await
    }

    /// Load the audio effects block
    pub async fn audio_fx(&self) -> AudioFxSettings {
        self.load::<AudioFxSettings>(KEY_AUDIO_FX).await.clamped()
    }

    /// Persist the audio effects block
    pub async fn set_audio_fx(&self, value: &AudioFxSettings) -> Result<()> {
        self.save(KEY_AUDIO_FX, value).await
    }

    /// Load the shuffle history
    pub async fn shuffle_history(&self) -> Vec<SongId> {
        self.load(KEY_SHUFFLE_HISTORY).await
    }

    /// Persist the shuffle history
    pub async fn set_shuffle_history(&self, history: &[SongId]) -> Result<()> {
        self.save(KEY_SHUFFLE_HISTORY, &history).await
    }

    /// Remove the shuffle history
    pub async fn clear_shuffle_history(&self) -> Result<()> {
        self.store.remove(KEY_SHUFFLE_HISTORY).await
    }

    /// Load the low-latency-always flag
    pub async fn low_latency_always(&self) -> bool {
        // Stored as the strings "true"/"false" for host compatibility
        matches!(
            self.load::<Option<String>>(KEY_LOW_LATENCY_ALWAYS).await,
            Some(s) if s == "true"
        )
    }

    /// Persist the low-latency-always flag
    pub async fn set_low_latency_always(&self, value: bool) -> Result<()> {
        self.save(KEY_LOW_LATENCY_ALWAYS, &value.to_string()).await
    }

    /// Load the active parametric EQ configuration
    pub async fn parametric_eq(&self) -> ParametricEqState {
        self.load(KEY_PARAMETRIC_EQ_ACTIVE).await
    }

    /// Persist the active parametric EQ configuration
    pub async fn set_parametric_eq(&self, value: &ParametricEqState) -> Result<()> {
        self.save(KEY_PARAMETRIC_EQ_ACTIVE, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyvalue::MemoryKeyValueStore;
    use serde_json::json;

    fn store() -> SettingsStore {
        SettingsStore::new(Arc::new(MemoryKeyValueStore::new()))
    }

    #[test]
    fn table_defaults() {
        let fx = AudioFxSettings::default();
        assert_eq!(fx.replay_gain.mode, "off");
        assert_eq!(fx.replay_gain.fallback, -6.0);
        assert!(!fx.crossfeed.enabled);
        assert_eq!(fx.loudness.reference_spl, 80.0);
        assert_eq!(fx.loudness.strength, 100.0);
        assert!(fx.gapless.enabled);
        assert!(!fx.crossfade.enabled);
        assert_eq!(fx.crossfade.duration, 3.0);
        assert_eq!(fx.tempo.rate, 1.0);
        assert!(fx.tempo.pitch_lock);
        assert_eq!(fx.noise.mode, "white");
        assert_eq!(fx.noise.power, -24.0);
        assert_eq!(fx.noise.threshold, -36.0);
        assert_eq!(fx.noise.attack, 25.0);
        assert_eq!(fx.sleep_timer.mode, SleepTimerMode::Time);
        assert_eq!(fx.sleep_timer.target_time, "23:00");
    }

    #[tokio::test]
    async fn audio_fx_round_trip() {
        let store = store();
        let mut fx = AudioFxSettings::default();
        fx.crossfade.enabled = true;
        fx.crossfade.duration = 7.5;
        fx.noise.mode = "grey".to_string();

        store.set_audio_fx(&fx).await.unwrap();
        assert_eq!(store.audio_fx().await, fx);
    }

    #[tokio::test]
    async fn malformed_record_falls_back_to_defaults() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.put(KEY_AUDIO_FX, json!("not an object")).await.unwrap();

        let store = SettingsStore::new(kv);
        assert_eq!(store.audio_fx().await, AudioFxSettings::default());
    }

    #[tokio::test]
    async fn unknown_fields_are_ignored_known_ones_survive() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.put(
            KEY_AUDIO_FX,
            json!({"crossfade": {"enabled": true}, "future_field": 42}),
        )
        .await
        .unwrap();

        let store = SettingsStore::new(kv);
        let fx = store.audio_fx().await;
        assert!(fx.crossfade.enabled);
        assert_eq!(fx.crossfade.duration, 3.0); // default filled in
    }

    #[tokio::test]
    async fn loads_clamp_out_of_range_values() {
        let kv = Arc::new(MemoryKeyValueStore::new());
        kv.put(
            KEY_AUDIO_FX,
            json!({
                "crossfade": {"enabled": true, "duration": 99.0},
                "noise": {"attack": 1.0},
                "crossfeed": {"shadow_hz": 10.0}
            }),
        )
        .await
        .unwrap();

        let store = SettingsStore::new(kv);
        let fx = store.audio_fx().await;
        assert_eq!(fx.crossfade.duration, 12.0);
        assert_eq!(fx.noise.attack, 25.0);
        assert_eq!(fx.crossfeed.shadow_hz, 500.0);
    }

    #[tokio::test]
    async fn shuffle_history_round_trip_and_clear() {
        let store = store();
        let history = vec![SongId::new("a"), SongId::new("b")];

        store.set_shuffle_history(&history).await.unwrap();
        assert_eq!(store.shuffle_history().await, history);

        store.clear_shuffle_history().await.unwrap();
        assert!(store.shuffle_history().await.is_empty());
    }

    #[tokio::test]
    async fn low_latency_flag_stored_as_string() {
        let store = store();
        assert!(!store.low_latency_always().await);

        store.set_low_latency_always(true).await.unwrap();
        assert!(store.low_latency_always().await);

        store.set_low_latency_always(false).await.unwrap();
        assert!(!store.low_latency_always().await);
    }

    #[tokio::test]
    async fn parametric_state_round_trip() {
        let store = store();
        let state = ParametricEqState {
            preset_uuid: Some("preset-1".to_string()),
            bands: vec![ParametricBand {
                kind: BandKind::Peaking,
                frequency: 1000.0,
                q: 1.0,
                gain: 9.0,
            }],
        };

        store.set_parametric_eq(&state).await.unwrap();
        assert_eq!(store.parametric_eq().await, state);
    }

    #[test]
    fn band_kind_serializes_lowercase() {
        let band = ParametricBand {
            kind: BandKind::Lowshelf,
            frequency: 100.0,
            q: 0.7,
            gain: 3.0,
        };
        let json = serde_json::to_value(&band).unwrap();
        assert_eq!(json["type"], "lowshelf");
    }
}
