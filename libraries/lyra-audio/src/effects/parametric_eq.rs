//! Parametric equalizer
//!
//! An ordered chain of biquad bands with configurable type, frequency, Q
//! and gain, followed by a preamp that backs the whole chain off by the
//! peak of its combined response so positive band gains cannot clip.

use super::biquad::{BiquadFilter, FilterKind};
use super::AudioEffect;

/// One parametric band
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBand {
    pub kind: FilterKind,
    /// Center/corner frequency in Hz
    pub frequency: f32,
    /// Q factor (0.1 to 10.0)
    pub q: f32,
    /// Gain in dB (-12 to +12); ignored by pass filters
    pub gain_db: f32,
}

impl EqBand {
    /// Create a band with clamped parameters
    pub fn new(kind: FilterKind, frequency: f32, q: f32, gain_db: f32) -> Self {
        Self {
            kind,
            frequency: frequency.clamp(20.0, 20000.0),
            q: q.clamp(0.1, 10.0),
            gain_db: gain_db.clamp(-12.0, 12.0),
        }
    }

    /// Create a peaking band
    pub fn peaking(frequency: f32, q: f32, gain_db: f32) -> Self {
        Self::new(FilterKind::Peaking, frequency, q, gain_db)
    }

    /// Create a low shelf band
    pub fn low_shelf(frequency: f32, gain_db: f32) -> Self {
        Self::new(FilterKind::LowShelf, frequency, 0.707, gain_db)
    }

    /// Create a high shelf band
    pub fn high_shelf(frequency: f32, gain_db: f32) -> Self {
        Self::new(FilterKind::HighShelf, frequency, 0.707, gain_db)
    }
}

/// Number of log-spaced probe points for the preamp computation
const RESPONSE_POINTS: usize = 256;

/// Compute the preamp for a set of bands, in dB
///
/// Sums the dB magnitudes of all bands over 256 log-spaced points between
/// 20 Hz and 20 kHz and backs off by the peak, at 0.1 dB precision. A flat
/// or purely-cutting chain gets no preamp.
pub fn compute_preamp_db(bands: &[EqBand], sample_rate: u32) -> f64 {
    if bands.is_empty() {
        return 0.0;
    }

    let sr = sample_rate as f32;
    let filters: Vec<BiquadFilter> = bands
        .iter()
        .map(|band| {
            let mut filter = BiquadFilter::new();
            filter.configure(band.kind, sr, band.frequency, band.q, band.gain_db);
            filter
        })
        .collect();

    let mut peak = 0.0f64;
    for i in 0..RESPONSE_POINTS {
        let t = i as f64 / (RESPONSE_POINTS - 1) as f64;
        // 20 Hz .. 20 kHz, log-spaced
        let freq = (20.0f64 * 1000.0f64.powf(t)) as f32;
        let total: f64 = filters.iter().map(|f| f.magnitude_db(freq, sr)).sum();
        peak = peak.max(total);
    }

    if peak > 0.0 {
        -(peak * 10.0).ceil() / 10.0
    } else {
        0.0
    }
}

/// Parametric EQ: ordered band chain plus preamp
pub struct ParametricEq {
    bands: Vec<EqBand>,
    filters: Vec<BiquadFilter>,

    /// Preamp in dB, applied after the chain
    preamp_db: f64,
    preamp_linear: f32,

    enabled: bool,
    sample_rate: u32,
    needs_update: bool,
}

impl ParametricEq {
    /// Create an empty chain
    pub fn new() -> Self {
        Self {
            bands: Vec::new(),
            filters: Vec::new(),
            preamp_db: 0.0,
            preamp_linear: 1.0,
            enabled: true,
            sample_rate: 44100,
            needs_update: false,
        }
    }

    /// Replace the band list and recompute the preamp
    ///
    /// An explicit preamp overrides the computed one.
    pub fn set_bands(&mut self, bands: Vec<EqBand>, preamp_db: Option<f64>) {
        self.preamp_db =
            preamp_db.unwrap_or_else(|| compute_preamp_db(&bands, self.sample_rate));
        self.preamp_linear = 10.0f32.powf(self.preamp_db as f32 / 20.0);
        self.filters = vec![BiquadFilter::new(); bands.len()];
        self.bands = bands;
        self.needs_update = true;
    }

    /// Current band list
    pub fn bands(&self) -> &[EqBand] {
        &self.bands
    }

    /// Preamp in dB
    pub fn preamp_db(&self) -> f64 {
        self.preamp_db
    }

    /// Preamp as a linear gain
    pub fn preamp_linear(&self) -> f32 {
        self.preamp_linear
    }

    /// Combined chain response at `frequency`, in dB (excluding preamp)
    pub fn response_db(&self, frequency: f32) -> f64 {
        let sr = self.sample_rate as f32;
        self.bands
            .iter()
            .map(|band| {
                let mut filter = BiquadFilter::new();
                filter.configure(band.kind, sr, band.frequency, band.q, band.gain_db);
                filter.magnitude_db(frequency, sr)
            })
            .sum()
    }

    fn update_filters(&mut self) {
        if self.needs_update {
            let sr = self.sample_rate as f32;
            for (filter, band) in self.filters.iter_mut().zip(&self.bands) {
                filter.configure(band.kind, sr, band.frequency, band.q, band.gain_db);
            }
            self.needs_update = false;
        }
    }
}

impl Default for ParametricEq {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEffect for ParametricEq {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        if !self.enabled || self.bands.is_empty() {
            return;
        }

        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.needs_update = true;
        }
        self.update_filters();

        let preamp = self.preamp_linear;
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
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "Parametric EQ"
    }
}
