//! Loudness compensation
//!
//! A user-volume gain stage followed by a 100 Hz low shelf and a 10 kHz
//! high shelf. While enabled, the media elements run at full volume for
//! headroom and the user volume is applied here instead; the shelves add
//! back the bass and treble the ear stops hearing at low listening
//! levels, on a simplified ISO-226-inspired curve.

use super::biquad::BiquadFilter;
use super::AudioEffect;

/// Low shelf corner (Hz)
const BASS_SHELF_HZ: f32 = 100.0;

/// High shelf corner (Hz)
const TREBLE_SHELF_HZ: f32 = 10000.0;

/// Compute the (bass, treble) boosts in dB for the current volume
///
/// `reference_spl` answers "what SPL does 100% volume produce?" (60-90);
/// `strength` scales the whole compensation (0-150%).
pub fn loudness_boosts_db(volume: f64, reference_spl: f64, strength: f64) -> (f64, f64) {
    if volume <= 0.0 {
        return (0.0, 0.0);
    }

    let v_db = 20.0 * volume.log10();
    let effective_spl = reference_spl + v_db;
    let phon = effective_spl.max(20.0);
    let factor = ((80.0 - phon) / 40.0).max(0.0);
    let s = strength / 100.0;

    (factor * 12.0 * s, factor * 6.0 * s)
}

/// Loudness compensation stage
pub struct Loudness {
    /// User volume applied at this stage (0..1)
    volume: f32,

    /// Reference SPL at 100% volume (60..90 dB)
    reference_spl: f32,

    /// Compensation strength (0..150 %)
    strength: f32,

    bass_shelf: BiquadFilter,
    treble_shelf: BiquadFilter,

    enabled: bool,
    sample_rate: u32,
    needs_update: bool,
}

impl Loudness {
    /// Create with the default curve (80 dB reference, 100% strength)
    pub fn new() -> Self {
        Self {
            volume: 1.0,
            reference_spl: 80.0,
            strength: 100.0,
            bass_shelf: BiquadFilter::new(),
            treble_shelf: BiquadFilter::new(),
            enabled: true,
            sample_rate: 44100,
            needs_update: true,
        }
    }

    /// Set the user volume routed through this stage
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
        self.needs_update = true;
    }

    /// Current user volume
    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Set the reference SPL (clamped to 60..90)
    pub fn set_reference_spl(&mut self, spl: f32) {
        self.reference_spl = spl.clamp(60.0, 90.0);
        self.needs_update = true;
    }

    /// Set the strength in percent (clamped to 0..150)
    pub fn set_strength(&mut self, strength: f32) {
        self.strength = strength.clamp(0.0, 150.0);
        self.needs_update = true;
    }

    /// Current (bass, treble) boosts in dB
    pub fn boosts_db(&self) -> (f64, f64) {
        loudness_boosts_db(
            f64::from(self.volume),
            f64::from(self.reference_spl),
            f64::from(self.strength),
        )
    }

    fn update_filters(&mut self) {
        if !self.needs_update {
            return;
        }

        let (bass, treble) = self.boosts_db();
        let sr = self.sample_rate as f32;
        self.bass_shelf.set_low_shelf(sr, BASS_SHELF_HZ, bass as f32);
        self.treble_shelf
            .set_high_shelf(sr, TREBLE_SHELF_HZ, treble as f32);
        self.needs_update = false;
    }
}

impl Default for Loudness {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEffect for Loudness {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        if !self.enabled {
            return;
        }

        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            self.needs_update = true;
        }
        self.update_filters();

        let gain = self.volume;
        for chunk in buffer.chunks_exact_mut(2) {
            let left = chunk[0] * gain;
            let right = chunk[1] * gain;

            let (l, r) = self.bass_shelf.process_sample(left, right);
            let (l, r) = self.treble_shelf.process_sample(l, r);

            chunk[0] = l;
            chunk[1] = r;
        }
    }

    fn reset(&mut self) {
        self.bass_shelf.reset();
        self.treble_shelf.reset();
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "Loudness"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_boost_at_full_volume_with_high_reference() {
        // 100% volume at 80 dB reference: phon = 80, factor = 0
        let (bass, treble) = loudness_boosts_db(1.0, 80.0, 100.0);
        assert_eq!(bass, 0.0);
        assert_eq!(treble, 0.0);
    }

    #[test]
    fn boost_grows_as_volume_drops() {
        // 10% volume at 80 dB: v_dB = -20, phon = 60, factor = 0.5
        let (bass, treble) = loudness_boosts_db(0.1, 80.0, 100.0);
        assert!((bass - 6.0).abs() < 1e-9);
        assert!((treble - 3.0).abs() < 1e-9);
    }

    #[test]
    fn strength_scales_linearly() {
        let (bass_full, _) = loudness_boosts_db(0.1, 80.0, 100.0);
        let (bass_half, _) = loudness_boosts_db(0.1, 80.0, 50.0);
        let (bass_max, _) = loudness_boosts_db(0.1, 80.0, 150.0);

        assert!((bass_half - bass_full * 0.5).abs() < 1e-9);
        assert!((bass_max - bass_full * 1.5).abs() < 1e-9);
    }

    #[test]
    fn phon_floor_caps_the_boost() {
        // Extremely low volume: phon clamps at 20, factor at 1.5
        let (bass, treble) = loudness_boosts_db(0.0001, 60.0, 100.0);
        assert!((bass - 18.0).abs() < 1e-9);
        assert!((treble - 9.0).abs() < 1e-9);
    }

    #[test]
    fn zero_volume_silences() {
        let mut loudness = Loudness::new();
        loudness.set_volume(0.0);

        let mut buffer = vec![0.5f32; 64];
        loudness.process(&mut buffer, 44100);
        assert!(buffer.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn volume_is_applied_at_this_stage() {
        let mut loudness = Loudness::new();
        loudness.set_volume(0.5);
        // Keep the shelves flat so only the gain shows
        loudness.set_strength(0.0);

        let mut buffer = vec![1.0f32; 8];
        loudness.process(&mut buffer, 44100);
        for s in &buffer {
            assert!((s - 0.5).abs() < 1e-4);
        }
    }

    #[test]
    fn parameters_clamp() {
        let mut loudness = Loudness::new();
        loudness.set_reference_spl(200.0);
        loudness.set_strength(900.0);
        loudness.set_volume(7.0);

        assert_eq!(loudness.reference_spl, 90.0);
        assert_eq!(loudness.strength, 150.0);
        assert_eq!(loudness.volume(), 1.0);
    }
}
