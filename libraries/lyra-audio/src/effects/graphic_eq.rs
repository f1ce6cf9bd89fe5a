//! 10-band graphic equalizer
//!
//! Fixed octave frequencies; the lowest band is a low shelf, the highest a
//! high shelf, the middle eight are peaking filters with Q=1.4. Disabling
//! the EQ zeroes every band gain and sets the preamp to unity but keeps
//! the topology connected, so re-enabling never rewires the graph.

use super::biquad::BiquadFilter;
use super::AudioEffect;

/// Fixed band frequencies (Hz)
pub const GRAPHIC_EQ_FREQUENCIES: [f32; 10] = [
    32.0, 64.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Q for the peaking bands (1-8)
const PEAKING_Q: f32 = 1.4;

/// Per-band gain limits in dB
pub const BAND_GAIN_RANGE_DB: (f32, f32) = (-12.0, 12.0);

/// Graphic EQ preset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GraphicEqPreset {
    /// Flat - All bands at 0 dB
    #[default]
    Flat,
    /// Bass Boost - Enhanced low frequencies
    BassBoost,
    /// Treble Boost - Enhanced high frequencies
    TrebleBoost,
    /// V-Shape - Boosted lows and highs, reduced mids
    VShape,
    /// Vocal - Enhanced mid frequencies for voice
    Vocal,
    /// Rock - Classic rock music profile
    Rock,
    /// Electronic - Dance/Electronic music profile
    Electronic,
    /// Acoustic - Natural acoustic instrument profile
    Acoustic,
}

impl GraphicEqPreset {
    /// Gain values for this preset
    pub fn gains(&self) -> [f32; 10] {
        match self {
            Self::Flat => [0.0; 10],
            Self::BassBoost => [6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            Self::TrebleBoost => [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 2.0, 4.0, 5.0, 6.0],
            Self::VShape => [5.0, 4.0, 2.0, -1.0, -2.0, -2.0, -1.0, 2.0, 4.0, 5.0],
            Self::Vocal => [-2.0, -1.0, 0.0, 2.0, 4.0, 4.0, 2.0, 0.0, -1.0, -2.0],
            Self::Rock => [4.0, 3.0, 1.0, 0.0, -1.0, 0.0, 1.0, 3.0, 4.0, 4.0],
            Self::Electronic => [5.0, 4.0, 2.0, 0.0, 1.0, 2.0, 1.0, 3.0, 4.0, 4.0],
            Self::Acoustic => [2.0, 1.0, 0.0, 1.0, 2.0, 2.0, 1.0, 2.0, 2.0, 1.0],
        }
    }

    /// Parse a preset by its kebab-case name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "flat" => Some(Self::Flat),
            "bass-boost" => Some(Self::BassBoost),
            "treble-boost" => Some(Self::TrebleBoost),
            "v-shape" => Some(Self::VShape),
            "vocal" => Some(Self::Vocal),
            "rock" => Some(Self::Rock),
            "electronic" => Some(Self::Electronic),
            "acoustic" => Some(Self::Acoustic),
            _ => None,
        }
    }
}

/// 10-band graphic EQ with preamp
pub struct GraphicEq {
    filters: [BiquadFilter; 10],
    gains: [f32; 10],

    /// User preamp in dB, unity while disabled
    preamp_db: f32,
    preamp_linear: f32,

    enabled: bool,
    sample_rate: u32,
    needs_update: bool,
}

impl GraphicEq {
    /// Create a flat, enabled EQ
    pub fn new() -> Self {
        Self {
            filters: Default::default(),
            gains: [0.0; 10],
            preamp_db: 0.0,
            preamp_linear: 1.0,
            enabled: true,
            sample_rate: 44100,
            needs_update: true,
        }
    }

    /// Set one band's gain in dB (clamped to +-12)
    pub fn set_band_gain(&mut self, band: usize, gain_db: f32) {
        if band < self.gains.len() {
            self.gains[band] = gain_db.clamp(BAND_GAIN_RANGE_DB.0, BAND_GAIN_RANGE_DB.1);
            self.needs_update = true;
        }
    }

    /// Replace all band gains
    pub fn set_gains(&mut self, gains: [f32; 10]) {
        for (slot, gain) in self.gains.iter_mut().zip(gains) {
            *slot = gain.clamp(BAND_GAIN_RANGE_DB.0, BAND_GAIN_RANGE_DB.1);
        }
        self.needs_update = true;
    }

    /// Current band gains
    pub fn gains(&self) -> [f32; 10] {
        self.gains
    }

    /// Set the preamp in dB
    pub fn set_preamp_db(&mut self, preamp_db: f32) {
        self.preamp_db = preamp_db.clamp(-24.0, 12.0);
        self.preamp_linear = 10.0f32.powf(self.preamp_db / 20.0);
    }

    /// Preamp in dB
    pub fn preamp_db(&self) -> f32 {
        self.preamp_db
    }

    /// Apply a preset's gains
    pub fn apply_preset(&mut self, preset: GraphicEqPreset) {
        self.set_gains(preset.gains());
    }

    fn update_filters(&mut self) {
        if !self.needs_update {
            return;
        }

        let sr = self.sample_rate as f32;
        for (i, filter) in self.filters.iter_mut().enumerate() {
            // Disabled: flat gains, topology retained
            let gain = if self.enabled { self.gains[i] } else { 0.0 };
            let freq = GRAPHIC_EQ_FREQUENCIES[i];
            match i {
                0 => filter.set_low_shelf(sr, freq, gain),
                9 => filter.set_high_shelf(sr, freq, gain),
                _ => filter.set_peaking(sr, freq, PEAKING_Q, gain),
            }
        }
        self.needs_update = false;
    }

    fn effective_preamp(&self) -> f32 {
        if self.enabled {
            self.preamp_linear
        } else {
            1.0
        }
    }
}

impl Default for GraphicEq {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEffect for GraphicEq {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.needs_update = true;
        }
        self.update_filters();

        let preamp = self.effective_preamp();
        for chunk in buffer.chunks_exact_mut(2) {
            let mut left = chunk[0];
            let mut right = chunk[1];

            for filter in &mut self.filters {
                let (l, r) = filter.process_sample(left, right);
                left = l;
                right = r;
            }

            chunk[0] = left * preamp;
            chunk[1] = right * preamp;
        }
    }

    fn reset(&mut self) {
        for filter in &mut self.filters {
            filter.reset();
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            self.enabled = enabled;
            self.needs_update = true;
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "Graphic EQ"
    }
}
