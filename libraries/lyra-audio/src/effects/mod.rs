//! Effects DSP for the playback graph
//!
//! Every effect operates in-place on interleaved stereo f32 samples in the
//! [-1.0, 1.0] range and must not allocate in its process path.

mod biquad;
pub mod crossfeed;
pub mod graphic_eq;
pub mod loudness;
pub mod noise;
pub mod parametric_eq;

pub use biquad::{BiquadFilter, FilterKind};
pub use crossfeed::{Crossfeed, CrossfeedPreset, CrossfeedSettings};
pub use graphic_eq::{GraphicEq, GraphicEqPreset, GRAPHIC_EQ_FREQUENCIES};
pub use loudness::{loudness_boosts_db, Loudness};
pub use noise::{ComfortNoise, NoiseMode};
pub use parametric_eq::{compute_preamp_db, EqBand, ParametricEq};

/// Trait for audio effects in the processing chain
///
/// # Safety
/// - Must NOT allocate memory in `process()` (real-time constraint)
/// - Must be Send to allow processing on the audio thread
pub trait AudioEffect: Send {
    /// Process audio buffer in-place
    ///
    /// # Arguments
    /// * `buffer` - Interleaved stereo samples (L, R, L, R, ...)
    /// * `sample_rate` - Sample rate in Hz
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32);

    /// Reset effect state (e.g., when seeking or rebuilding the graph)
    fn reset(&mut self);

    /// Enable/disable the effect
    fn set_enabled(&mut self, enabled: bool);

    /// Check if effect is enabled
    fn is_enabled(&self) -> bool;

    /// Get effect name (for debugging)
    fn name(&self) -> &str;
}
