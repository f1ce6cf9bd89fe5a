//! Crossfeed / stereo-image matrix
//!
//! Channel splitter into four gains (L->L, R->L, L->R, R->R), an optional
//! per-cross-channel delay and a "head shadow" low-pass, then a merger.
//! The level maps to mid-side gains so that narrowing and widening share
//! one control:
//!
//! ```text
//! direct = 0.6 * (0.5 - x*0.5) + 0.6 * (0.5 + x*0.5) = 0.6
//! cross  = 0.6 * (0.5 - x*0.5) - 0.6 * (0.5 + x*0.5) = -0.6 * x
//! ```
//!
//! with x in [-1, +1]: -1 collapses to mono, 0 passes through, +1 widens.
//! Delay and shadow stages are bypassed while their parameter is zero so
//! the passthrough configuration costs nothing.

use super::biquad::BiquadFilter;
use super::AudioEffect;

/// Matrix direct gain, constant over the whole level range
const DIRECT_GAIN: f32 = 0.6;

/// Crossfeed preset
///
/// Named configurations over {level, delay, shadow}; `Off` is exact
/// passthrough.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CrossfeedPreset {
    #[default]
    Off,
    Narrow,
    Medium,
    Wide,
}

impl CrossfeedPreset {
    /// Settings for this preset: (level %, delay ms, shadow Hz)
    pub fn settings(&self) -> CrossfeedSettings {
        let (level, delay_ms, shadow_hz) = match self {
            Self::Off => (0.0, 0.0, 0.0),
            Self::Narrow => (-25.0, 0.25, 2500.0),
            Self::Medium => (-35.0, 0.4, 1500.0),
            Self::Wide => (-45.0, 0.65, 1000.0),
        };
        CrossfeedSettings::new(level, delay_ms, shadow_hz)
    }

    /// Parse a preset by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "off" => Some(Self::Off),
            "narrow" => Some(Self::Narrow),
            "medium" => Some(Self::Medium),
            "wide" => Some(Self::Wide),
            _ => None,
        }
    }
}

/// Crossfeed settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrossfeedSettings {
    /// Stereo-image level in percent (-100 mono .. +100 wide)
    pub level: f32,

    /// Cross-channel delay in ms (0 bypasses, max 5)
    pub delay_ms: f32,

    /// Head-shadow low-pass corner in Hz (0 bypasses, else 500..3000)
    pub shadow_hz: f32,
}

impl CrossfeedSettings {
    /// Create settings with clamped parameters
    pub fn new(level: f32, delay_ms: f32, shadow_hz: f32) -> Self {
        Self {
            level: level.clamp(-100.0, 100.0),
            delay_ms: delay_ms.clamp(0.0, 5.0),
            shadow_hz: if shadow_hz == 0.0 {
                0.0
            } else {
                shadow_hz.clamp(500.0, 3000.0)
            },
        }
    }
}

impl Default for CrossfeedSettings {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

/// Fixed-length fractional-free delay line for one cross channel
#[derive(Debug, Clone)]
struct DelayLine {
    buffer: Vec<f32>,
    write: usize,
    delay_samples: usize,
}

impl DelayLine {
    fn new(max_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_samples.max(1)],
            write: 0,
            delay_samples: 0,
        }
    }

    fn set_delay(&mut self, samples: usize) {
        self.delay_samples = samples.min(self.buffer.len() - 1);
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        if self.delay_samples == 0 {
            return input;
        }
        let len = self.buffer.len();
        let read = (self.write + len - self.delay_samples) % len;
        let out = self.buffer[read];
        self.buffer[self.write] = input;
        self.write = (self.write + 1) % len;
        out
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write = 0;
    }
}

/// Crossfeed matrix effect
pub struct Crossfeed {
    settings: CrossfeedSettings,

    /// Cached cross gain (-0.6 * x)
    cross_gain: f32,

    delay_l: DelayLine,
    delay_r: DelayLine,
    shadow_l: BiquadFilter,
    shadow_r: BiquadFilter,

    enabled: bool,
    sample_rate: u32,
    needs_update: bool,
}

/// Maximum delay the lines are sized for (ms)
const MAX_DELAY_MS: f32 = 5.0;

/// Head-shadow filter Q
const SHADOW_Q: f32 = 0.707;

impl Crossfeed {
    /// Create a passthrough crossfeed
    pub fn new() -> Self {
        Self::with_settings(CrossfeedSettings::default())
    }

    /// Create with specific settings
    pub fn with_settings(settings: CrossfeedSettings) -> Self {
        let sample_rate = 44100;
        let max = (MAX_DELAY_MS / 1000.0 * sample_rate as f32).ceil() as usize + 1;
        Self {
            settings,
            cross_gain: 0.0,
            delay_l: DelayLine::new(max),
            delay_r: DelayLine::new(max),
            shadow_l: BiquadFilter::new(),
            shadow_r: BiquadFilter::new(),
            enabled: true,
            sample_rate,
            needs_update: true,
        }
    }

    /// Replace the settings
    pub fn set_settings(&mut self, settings: CrossfeedSettings) {
        self.settings = settings;
        self.needs_update = true;
    }

    /// Apply a named preset
    pub fn apply_preset(&mut self, preset: CrossfeedPreset) {
        self.set_settings(preset.settings());
    }

    /// Current settings
    pub fn settings(&self) -> CrossfeedSettings {
        self.settings
    }

    fn update_parameters(&mut self) {
        if !self.needs_update {
            return;
        }

        let x = self.settings.level / 100.0;
        self.cross_gain = -DIRECT_GAIN * x;

        let sr = self.sample_rate as f32;
        let delay_samples = (self.settings.delay_ms / 1000.0 * sr).round() as usize;
        let max = (MAX_DELAY_MS / 1000.0 * sr).ceil() as usize + 1;
        if self.delay_l.buffer.len() != max {
            self.delay_l = DelayLine::new(max);
            self.delay_r = DelayLine::new(max);
        }
        self.delay_l.set_delay(delay_samples);
        self.delay_r.set_delay(delay_samples);

        if self.settings.shadow_hz > 0.0 {
            self.shadow_l
                .set_low_pass(sr, self.settings.shadow_hz, SHADOW_Q);
            self.shadow_r
                .set_low_pass(sr, self.settings.shadow_hz, SHADOW_Q);
        }

        self.needs_update = false;
    }

    /// Whether the matrix is currently pure passthrough
    fn is_passthrough(&self) -> bool {
        self.settings.level == 0.0
    }
}

impl Default for Crossfeed {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEffect for Crossfeed {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        if !self.enabled {
            return;
        }

        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.needs_update = true;
        }
        self.update_parameters();

        if self.is_passthrough() {
            return;
        }

        let use_delay = self.settings.delay_ms > 0.0;
        let use_shadow = self.settings.shadow_hz > 0.0;
        let cross = self.cross_gain;

        for chunk in buffer.chunks_exact_mut(2) {
            let left = chunk[0];
            let right = chunk[1];

            // Cross path into left comes from the right channel
            let mut cross_to_left = right;
            let mut cross_to_right = left;

            if use_delay {
                cross_to_left = self.delay_l.process(cross_to_left);
                cross_to_right = self.delay_r.process(cross_to_right);
            }
            if use_shadow {
                let (cl, cr) = (
                    self.shadow_l.process_sample(cross_to_left, 0.0).0,
                    self.shadow_r.process_sample(cross_to_right, 0.0).0,
                );
                cross_to_left = cl;
                cross_to_right = cr;
            }

            chunk[0] = DIRECT_GAIN * left + cross * cross_to_left;
            chunk[1] = DIRECT_GAIN * right + cross * cross_to_right;
        }
    }

    fn reset(&mut self) {
        self.delay_l.reset();
        self.delay_r.reset();
        self.shadow_l.reset();
        self.shadow_r.reset();
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "Crossfeed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_level_is_passthrough() {
        let mut crossfeed = Crossfeed::new();
        let mut buffer = vec![1.0, -0.5, 0.25, 0.75];
        let original = buffer.clone();

        crossfeed.process(&mut buffer, 44100);
        assert_eq!(buffer, original);
    }

    #[test]
    fn matrix_gains_follow_mid_side_derivation() {
        // At level -100% (x = -1): cross = +0.6, direct = 0.6 -> mono sum
        let mut crossfeed =
            Crossfeed::with_settings(CrossfeedSettings::new(-100.0, 0.0, 0.0));

        let mut buffer = vec![1.0, 0.0];
        crossfeed.process(&mut buffer, 44100);

        // out_l = 0.6*1 + 0.6*0 = 0.6, out_r = 0.6*0 + 0.6*1 = 0.6
        assert!((buffer[0] - 0.6).abs() < 1e-6);
        assert!((buffer[1] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn widening_subtracts_cross_signal() {
        // At level +100% (x = +1): cross = -0.6
        let mut crossfeed =
            Crossfeed::with_settings(CrossfeedSettings::new(100.0, 0.0, 0.0));

        let mut buffer = vec![1.0, 1.0];
        crossfeed.process(&mut buffer, 44100);

        // Mono content cancels toward zero: 0.6 - 0.6 = 0
        assert!(buffer[0].abs() < 1e-6);
        assert!(buffer[1].abs() < 1e-6);
    }

    #[test]
    fn delay_shifts_the_cross_path_only() {
        let mut crossfeed =
            Crossfeed::with_settings(CrossfeedSettings::new(-50.0, 1.0, 0.0));
        let sr = 44100;
        let delay_samples = (0.001 * sr as f32).round() as usize;

        // Impulse on the left channel only
        let frames = delay_samples + 8;
        let mut buffer = vec![0.0f32; frames * 2];
        buffer[0] = 1.0;

        crossfeed.process(&mut buffer, sr);

        // Direct path is immediate on the left
        assert!((buffer[0] - 0.6).abs() < 1e-6);
        // Cross contribution reaches the right channel after the delay
        assert_eq!(buffer[1], 0.0);
        let cross_at = delay_samples * 2 + 1;
        assert!((buffer[cross_at] - 0.3).abs() < 1e-6); // -0.6 * -0.5 = 0.3
    }

    #[test]
    fn preset_table() {
        let narrow = CrossfeedPreset::Narrow.settings();
        assert_eq!(narrow.level, -25.0);
        assert_eq!(narrow.delay_ms, 0.25);
        assert_eq!(narrow.shadow_hz, 2500.0);

        let off = CrossfeedPreset::Off.settings();
        assert_eq!(off, CrossfeedSettings::default());

        assert_eq!(CrossfeedPreset::from_name("wide"), Some(CrossfeedPreset::Wide));
        assert_eq!(CrossfeedPreset::from_name("ultra"), None);
    }

    #[test]
    fn settings_clamping() {
        let s = CrossfeedSettings::new(-150.0, 9.0, 100.0);
        assert_eq!(s.level, -100.0);
        assert_eq!(s.delay_ms, 5.0);
        assert_eq!(s.shadow_hz, 500.0);

        // Zero shadow stays zero (bypass), not clamped up to 500
        let s = CrossfeedSettings::new(0.0, 0.0, 0.0);
        assert_eq!(s.shadow_hz, 0.0);
    }

    #[test]
    fn disabled_bypass() {
        let mut crossfeed =
            Crossfeed::with_settings(CrossfeedSettings::new(-100.0, 0.0, 0.0));
        crossfeed.set_enabled(false);

        let mut buffer = vec![1.0, 0.0];
        let original = buffer.clone();
        crossfeed.process(&mut buffer, 44100);
        assert_eq!(buffer, original);
    }
}
