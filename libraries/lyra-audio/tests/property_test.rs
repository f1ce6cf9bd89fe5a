//! Property tests for gain math and parameter automation

use lyra_audio::params::GainParam;
use lyra_audio::replaygain::{gain_db, linear_gain, ReplayGainConfig, ReplayGainMode};
use proptest::prelude::*;

fn any_mode() -> impl Strategy<Value = ReplayGainMode> {
    prop_oneof![
        Just(ReplayGainMode::Off),
        Just(ReplayGainMode::Track),
        Just(ReplayGainMode::Album),
    ]
}

proptest! {
    /// The computed gain never leaves [-24, +12] dB, whatever the song
    /// metadata or settings claim
    #[test]
    fn replay_gain_is_always_clamped(
        mode in any_mode(),
        preamp in -50.0f64..50.0,
        fallback in -50.0f64..50.0,
        track in proptest::option::of(-60.0f64..60.0),
        album in proptest::option::of(-60.0f64..60.0),
    ) {
        let config = ReplayGainConfig { mode, preamp_db: preamp, fallback_db: fallback }.clamped();

        if let Some(db) = gain_db(&config, track, album) {
            prop_assert!((-24.0..=12.0).contains(&db), "gain {db} out of range");
            let linear = linear_gain(&config, track, album);
            prop_assert!(linear > 0.0);
            prop_assert!(linear <= 10.0f64.powf(12.0 / 20.0) + 1e-9);
        } else {
            prop_assert_eq!(mode, ReplayGainMode::Off);
        }
    }

    /// A curve in flight rejects every schedule until it completes, and
    /// interpolated values never leave the hull of the curve points
    #[test]
    fn automation_lock_holds_for_the_whole_curve(
        start in 0.0f64..5.0,
        duration in 0.01f64..10.0,
        probes in proptest::collection::vec(0.0f64..20.0, 1..20),
    ) {
        let mut param = GainParam::new(1.0);
        param.set_value_curve(vec![1.0, 0.5, 0.0], start, duration, 0.0).unwrap();

        for probe in probes {
            let locked = param.is_locked(probe);
            prop_assert_eq!(locked, probe < start + duration);
            if locked {
                prop_assert!(param.set_value(0.3, probe).is_err());
            }

            let value = param.value_at(probe);
            prop_assert!((0.0..=1.0).contains(&value));
        }
    }
}
