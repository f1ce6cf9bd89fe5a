//! Comfort noise generator
//!
//! Reads the music feed, tracks its windowed RMS, and mixes in shaped
//! stereo noise whenever the music falls below a threshold: quiet
//! passages and gaps get a constant noise floor instead of revealing the
//! listening room. The noise level approaches its target smoothly with
//!
//! ```text
//! coeff = 1 - exp(-blockTime / (attackMs / 1000))
//! ```
//!
//! per processed block. A threshold of 0 dBFS makes the noise
//! unconditional. The generator's output is summed into the main chain
//! just before the destination.

use super::biquad::BiquadFilter;
use super::AudioEffect;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Noise color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseMode {
    /// Spectrally flat
    #[default]
    White,
    /// Equal-loudness weighted (more lows and highs, softer mids)
    Grey,
}

impl NoiseMode {
    /// Parse a mode by name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "white" => Some(Self::White),
            "grey" => Some(Self::Grey),
            _ => None,
        }
    }
}

// Tilt shelf pair
const TILT_LOW_HZ: f32 = 250.0;
const TILT_HIGH_HZ: f32 = 2500.0;
const TILT_RANGE_DB: f32 = 6.0;

// Grey-mode equal-loudness approximation
const GREY_LOW_HZ: f32 = 300.0;
const GREY_LOW_DB: f32 = 9.0;
const GREY_HIGH_HZ: f32 = 5000.0;
const GREY_HIGH_DB: f32 = 6.0;

/// Comfort noise stage
pub struct ComfortNoise {
    mode: NoiseMode,

    /// Spectral tilt in percent (-100 dark .. +100 bright)
    tilt: f32,

    /// Noise power at full fade, dBFS (-60..0)
    power_db: f32,

    /// Music RMS threshold, dBFS (-60..0); 0 plays unconditionally
    threshold_db: f32,

    /// Fade time constant in ms (25..2000, log-scaled in the UI)
    attack_ms: f32,

    /// Current fade level (0..power-linear), smoothed per block
    level: f32,

    rng: SmallRng,
    tilt_low: BiquadFilter,
    tilt_high: BiquadFilter,
    grey_low: BiquadFilter,
    grey_high: BiquadFilter,

    enabled: bool,
    sample_rate: u32,
    needs_update: bool,
}

impl ComfortNoise {
    /// Create with defaults (white, -24 dB power, -36 dB threshold)
    pub fn new() -> Self {
        Self {
            mode: NoiseMode::White,
            tilt: 0.0,
            power_db: -24.0,
            threshold_db: -36.0,
            attack_ms: 25.0,
            level: 0.0,
            rng: SmallRng::from_entropy(),
            tilt_low: BiquadFilter::new(),
            tilt_high: BiquadFilter::new(),
            grey_low: BiquadFilter::new(),
            grey_high: BiquadFilter::new(),
            enabled: true,
            sample_rate: 44100,
            needs_update: true,
        }
    }

    /// Set the noise color
    pub fn set_mode(&mut self, mode: NoiseMode) {
        self.mode = mode;
        self.needs_update = true;
    }

    /// Set the spectral tilt in percent
    pub fn set_tilt(&mut self, tilt: f32) {
        self.tilt = tilt.clamp(-100.0, 100.0);
        self.needs_update = true;
    }

    /// Set the noise power in dBFS
    pub fn set_power_db(&mut self, power_db: f32) {
        self.power_db = power_db.clamp(-60.0, 0.0);
    }

    /// Set the music threshold in dBFS
    pub fn set_threshold_db(&mut self, threshold_db: f32) {
        self.threshold_db = threshold_db.clamp(-60.0, 0.0);
    }

    /// Set the attack time in ms
    pub fn set_attack_ms(&mut self, attack_ms: f32) {
        self.attack_ms = attack_ms.clamp(25.0, 2000.0);
    }

    /// Current smoothed fade level (linear)
    pub fn level(&self) -> f32 {
        self.level
    }

    fn update_filters(&mut self) {
        if !self.needs_update {
            return;
        }

        let sr = self.sample_rate as f32;
        let tilt_db = self.tilt / 100.0 * TILT_RANGE_DB;
        self.tilt_low.set_low_shelf(sr, TILT_LOW_HZ, -tilt_db);
        self.tilt_high.set_high_shelf(sr, TILT_HIGH_HZ, tilt_db);
        self.grey_low.set_low_shelf(sr, GREY_LOW_HZ, GREY_LOW_DB);
        self.grey_high.set_high_shelf(sr, GREY_HIGH_HZ, GREY_HIGH_DB);
        self.needs_update = false;
    }

    fn rms(buffer: &[f32]) -> f32 {
        if buffer.is_empty() {
            return 0.0;
        }
        let sum: f32 = buffer.iter().map(|s| s * s).sum();
        (sum / buffer.len() as f32).sqrt()
    }
}

impl Default for ComfortNoise {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEffect for ComfortNoise {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        if !self.enabled || buffer.is_empty() {
            return;
        }

        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.needs_update = true;
        }
        self.update_filters();

        // Windowed RMS of the music feed over this block
        let music_rms = Self::rms(buffer);
        let threshold_linear = 10.0f32.powf(self.threshold_db / 20.0);
        let power_linear = 10.0f32.powf(self.power_db / 20.0);

        // Threshold 0 dBFS (linear 1.0) keeps the target up unconditionally
        let target = if music_rms < threshold_linear {
            power_linear
        } else {
            0.0
        };

        let frames = buffer.len() / 2;
        let block_time = frames as f32 / sample_rate as f32;
        let coeff = 1.0 - (-block_time / (self.attack_ms / 1000.0)).exp();
        self.level += coeff * (target - self.level);

        if self.level < 1e-6 {
            return;
        }

        let grey = self.mode == NoiseMode::Grey;
        for chunk in buffer.chunks_exact_mut(2) {
            let mut left: f32 = self.rng.gen_range(-1.0..1.0);
            let mut right: f32 = self.rng.gen_range(-1.0..1.0);

            if grey {
                let (l, r) = self.grey_low.process_sample(left, right);
                let (l, r) = self.grey_high.process_sample(l, r);
                left = l;
                right = r;
            }

            let (l, r) = self.tilt_low.process_sample(left, right);
            let (l, r) = self.tilt_high.process_sample(l, r);

            chunk[0] += l * self.level;
            chunk[1] += r * self.level;
        }
    }

    fn reset(&mut self) {
        self.level = 0.0;
        self.tilt_low.reset();
        self.tilt_high.reset();
        self.grey_low.reset();
        self.grey_high.reset();
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.level = 0.0;
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "Comfort Noise"
    }
}
