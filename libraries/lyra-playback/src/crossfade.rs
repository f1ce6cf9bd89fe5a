//! Crossfade curves and trigger window
//!
//! The ramp is equal-power: fadeOut = cos(t*pi/2), fadeIn = sin(t*pi/2),
//! so total energy stays constant across the transition. Curves are
//! precomputed and handed to the fade gains as value-curve automation;
//! once scheduled they cannot be cancelled, which is why cancellation
//! force-replaces the gain nodes instead.

use std::f64::consts::FRAC_PI_2;

/// Shortest remaining time that still starts a crossfade (seconds);
/// anything closer to the end is left to the track-end path
pub const MIN_TIME_FOR_CROSSFADE: f64 = 1.0;

/// Curves start this far after "now" so the render thread picks them up
/// on a clean block boundary
pub const CURVE_START_DELAY: f64 = 0.005;

/// Extra wall-clock wait past the ramp before clamping endpoints
pub const COMPLETION_SLACK_MS: u64 = 50;

/// Crossfade bookkeeping flags
///
/// `in_progress` is the start mutex: a second trigger while it is set
/// returns immediately. `seek_lockout` suppresses re-triggering while
/// the user drags through the pre-end zone. `skip_ramp` is set by the
/// end handler when the outgoing track finishes during load, so the
/// transition completes without the audible ramp.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossfadeFlags {
    pub in_progress: bool,
    pub seek_lockout: bool,
    pub skip_ramp: bool,
}

impl CrossfadeFlags {
    /// Clear everything (crossfade end or cancel)
    pub fn clear(&mut self) {
        self.in_progress = false;
        self.seek_lockout = false;
        self.skip_ramp = false;
    }
}

/// Whether the trigger window is open
///
/// Opens when `min <= remaining <= crossfadeDuration`, and only for
/// songs long enough to hold two full ramps.
pub fn should_trigger(duration: f64, current_time: f64, crossfade_duration: f64) -> bool {
    if duration <= 0.0 || duration < 2.0 * crossfade_duration {
        return false;
    }

    let remaining = duration - current_time;
    (MIN_TIME_FOR_CROSSFADE..=crossfade_duration).contains(&remaining)
}

/// Precompute the equal-power fade curves for a ramp of `duration` seconds
///
/// Returns (fadeOut, fadeIn) with `max(100, 50 * duration)` points each.
/// Computed and carried in f64 so `out^2 + in^2 == 1` holds to 1e-12 at
/// every point; conversion to the host's value-curve sample type happens
/// only at the scheduling boundary.
pub fn equal_power_curves(duration: f64) -> (Vec<f64>, Vec<f64>) {
    let steps = ((50.0 * duration) as usize).max(100);

    let mut fade_out = Vec::with_capacity(steps);
    let mut fade_in = Vec::with_capacity(steps);
    for i in 0..steps {
        let t = i as f64 / (steps - 1) as f64;
        fade_out.push((t * FRAC_PI_2).cos());
        fade_in.push((t * FRAC_PI_2).sin());
    }

    (fade_out, fade_in)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn curves_conserve_energy() {
        let (fade_out, fade_in) = equal_power_curves(3.0);
        assert_eq!(fade_out.len(), fade_in.len());

        for (out, inn) in fade_out.iter().zip(&fade_in) {
            let energy = out * out + inn * inn;
            assert!((energy - 1.0).abs() < 1e-12, "energy was {energy}");
        }
    }

    #[test]
    fn curves_span_full_range() {
        let (fade_out, fade_in) = equal_power_curves(3.0);

        assert!((fade_out[0] - 1.0).abs() < 1e-6);
        assert!(fade_out.last().unwrap().abs() < 1e-6);
        assert!(fade_in[0].abs() < 1e-6);
        assert!((fade_in.last().unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn step_count_scales_with_duration() {
        assert_eq!(equal_power_curves(1.0).0.len(), 100); // floor at 100
        assert_eq!(equal_power_curves(3.0).0.len(), 150);
        assert_eq!(equal_power_curves(12.0).0.len(), 600);
    }

    #[test]
    fn trigger_window_boundaries() {
        // 60 s track, 3 s crossfade
        assert!(should_trigger(60.0, 57.0, 3.0)); // remaining == duration
        assert!(should_trigger(60.0, 58.0, 3.0));
        assert!(should_trigger(60.0, 59.0, 3.0)); // remaining == 1 s
        assert!(!should_trigger(60.0, 59.5, 3.0)); // track-end path takes over
        assert!(!should_trigger(60.0, 56.0, 3.0)); // too early
    }

    #[test]
    fn short_songs_never_crossfade() {
        // Duration must be at least twice the crossfade
        assert!(!should_trigger(5.0, 3.0, 3.0));
        assert!(should_trigger(6.0, 4.0, 3.0));
        assert!(!should_trigger(0.0, 0.0, 3.0));
    }

    #[test]
    fn flags_clear_together() {
        let mut flags = CrossfadeFlags {
            in_progress: true,
            seek_lockout: true,
            skip_ramp: true,
        };
        flags.clear();
        assert!(!flags.in_progress && !flags.seek_lockout && !flags.skip_ramp);
    }
}
