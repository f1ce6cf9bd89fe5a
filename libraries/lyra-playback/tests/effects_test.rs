//! Effect parameter operations: graph application and persistence

mod support;

use lyra_storage::{BandKind, ParametricBand, SleepTimerMode};
use support::*;

fn peaking(frequency: f64, q: f64, gain: f64) -> ParametricBand {
    ParametricBand {
        kind: BandKind::Peaking,
        frequency,
        q,
        gain,
    }
}

#[tokio::test]
async fn parametric_preamp_backs_off_the_combined_peak() {
    let fx = fixture(songs(&["a"])).await;

    fx.engine
        .set_parametric_eq(
            vec![peaking(1000.0, 1.0, 9.0), peaking(4000.0, 1.0, 6.0)],
            None,
        )
        .await;

    let preamp = fx.engine.parametric_preamp_db();
    assert!(
        (-10.0..=-8.9).contains(&preamp),
        "expected ~-9.0 dB, got {preamp}"
    );

    // 10^(-9/20) ~= 0.3548
    let linear = 10.0f64.powf(preamp / 20.0);
    assert!((0.31..=0.36).contains(&linear), "linear was {linear}");

    assert!(fx.engine.graph_topology().contains(&"parametric-eq"));
}

#[tokio::test]
async fn applying_the_same_bands_twice_is_idempotent() {
    let fx = fixture(songs(&["a"])).await;
    let bands = vec![peaking(1000.0, 1.0, 9.0)];

    fx.engine.set_parametric_eq(bands.clone(), None).await;
    let first_preamp = fx.engine.parametric_preamp_db();
    let first_topology = fx.engine.graph_topology();

    fx.engine.set_parametric_eq(bands, None).await;
    assert_eq!(fx.engine.parametric_preamp_db(), first_preamp);
    assert_eq!(fx.engine.graph_topology(), first_topology);
}

#[tokio::test]
async fn explicit_preamp_overrides_the_computed_one() {
    let fx = fixture(songs(&["a"])).await;

    fx.engine
        .set_parametric_eq(vec![peaking(1000.0, 1.0, 9.0)], Some(-4.0))
        .await;
    assert_eq!(fx.engine.parametric_preamp_db(), -4.0);
}

#[tokio::test]
async fn restore_graphic_eq_replaces_the_parametric_chain() {
    let fx = fixture(songs(&["a"])).await;
    fx.engine
        .set_parametric_eq(vec![peaking(1000.0, 1.0, 6.0)], None)
        .await;
    assert!(fx.engine.graph_topology().contains(&"parametric-eq"));

    fx.engine.restore_graphic_eq(Some("rock"));

    let state = fx.engine.state();
    assert!(state.parametric_eq.bands.is_empty());
    assert_eq!(state.eq.gains[0], 4.0); // rock preset, 32 Hz band
    assert!(fx.engine.graph_topology().contains(&"graphic-eq"));
}

#[tokio::test]
async fn disabled_graphic_eq_keeps_its_topology() {
    let fx = fixture(songs(&["a"])).await;
    fx.engine.set_eq_enabled(true).await;
    fx.engine.set_eq_band(3, 6.0);

    fx.engine.set_eq_enabled(false).await;

    // Still wired into the chain; gains retained for re-enable
    assert!(fx.engine.graph_topology().contains(&"graphic-eq"));
    assert_eq!(fx.engine.state().eq.gains[3], 6.0);
    assert!(!fx.engine.state().eq.enabled);
}

#[tokio::test]
async fn crossfeed_preset_maps_to_its_parameter_triple() {
    let fx = fixture(songs(&["a"])).await;
    fx.engine.set_crossfeed_enabled(true);

    fx.engine.set_crossfeed_preset("medium");
    let fx_block = fx.engine.state().fx.crossfeed.clone();
    assert_eq!(fx_block.level, -35.0);
    assert_eq!(fx_block.delay_ms, 0.4);
    assert_eq!(fx_block.shadow_hz, 1500.0);

    fx.engine.set_crossfeed_preset("off");
    let fx_block = fx.engine.state().fx.crossfeed.clone();
    assert_eq!(fx_block.level, 0.0);
    assert_eq!(fx_block.delay_ms, 0.0);
    assert_eq!(fx_block.shadow_hz, 0.0);
}

#[tokio::test]
async fn setter_inputs_are_clamped() {
    let fx = fixture(songs(&["a"])).await;

    fx.engine.set_replay_gain_preamp(99.0);
    fx.engine.set_replay_gain_fallback(-99.0);
    fx.engine.set_crossfade_duration(0.2);
    fx.engine.set_tempo_rate(9.0);
    fx.engine.set_noise_attack(1.0);
    fx.engine.set_loudness_strength(400.0);

    let state = fx.engine.state();
    assert_eq!(state.fx.replay_gain.preamp, 12.0);
    assert_eq!(state.fx.replay_gain.fallback, -24.0);
    assert_eq!(state.fx.crossfade.duration, 1.0);
    assert_eq!(state.fx.tempo.rate, 2.0);
    assert_eq!(state.fx.noise.attack, 25.0);
    assert_eq!(state.fx.loudness.strength, 150.0);
}

#[tokio::test]
async fn noise_stage_joins_and_leaves_the_chain() {
    let fx = fixture(songs(&["a"])).await;

    fx.engine.set_noise_enabled(true).await;
    fx.engine.set_noise_mode("grey");
    assert!(fx.engine.graph_topology().contains(&"noise"));
    assert_eq!(fx.engine.state().fx.noise.mode, "grey");

    fx.engine.set_noise_enabled(false).await;
    assert!(!fx.engine.graph_topology().contains(&"noise"));
}

#[tokio::test]
async fn settings_survive_a_simulated_restart() {
    let fx = fixture(songs(&["a"])).await;

    fx.engine.set_crossfade_duration(7.0);
    fx.engine.set_noise_mode("grey");
    fx.engine.set_eq_band(2, -4.0);
    fx.engine.set_volume(0.6);
    fx.engine.set_sleep_timer_mode(SleepTimerMode::Duration);
    fx.engine.set_sleep_timer_minutes(45);

    // Persistence is fire-and-forget; let the writes land
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    // Second engine over the same key-value store
    let fx2 = fixture_with_kv(songs(&["a"]), fx.kv.clone()).await;
    let state = fx2.engine.state();
    assert_eq!(state.fx.crossfade.duration, 7.0);
    assert_eq!(state.fx.noise.mode, "grey");
    assert_eq!(state.eq.gains[2], -4.0);
    assert_eq!(state.volume, 0.6);
    assert_eq!(state.fx.sleep_timer.mode, SleepTimerMode::Duration);
    assert_eq!(state.fx.sleep_timer.minutes, 45);
}

#[tokio::test]
async fn eq_filters_describe_the_active_chain() {
    let fx = fixture(songs(&["a"])).await;

    fx.engine.set_eq_enabled(true).await;
    let filters = fx.engine.eq_filters();
    assert_eq!(filters.len(), 10);
    assert_eq!(filters[0].kind, BandKind::Lowshelf);
    assert_eq!(filters[9].kind, BandKind::Highshelf);
    assert_eq!(filters[5].frequency, 1000.0);

    fx.engine
        .set_parametric_eq(vec![peaking(500.0, 2.0, 3.0)], None)
        .await;
    let filters = fx.engine.eq_filters();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].frequency, 500.0);
}
