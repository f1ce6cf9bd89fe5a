//! Effect parameter operations
//!
//! Every setter follows the same contract: clamp the input, mutate the
//! observable block, apply it to the live graph (building the pipeline
//! on demand where the parameter needs one), and persist the block.
//! Plain parameter setters are synchronous and infallible; the toggles
//! that (re)build pipeline stages are suspension points.

use super::{EngineCore, PlayerEngine};
use lyra_audio::effects::{
    AudioEffect, CrossfeedPreset, CrossfeedSettings, EqBand, FilterKind, GraphicEqPreset,
    NoiseMode,
};
use lyra_storage::{BandKind, ParametricBand};

fn band_to_dsp(band: &ParametricBand) -> EqBand {
    let kind = match band.kind {
        BandKind::Lowshelf => FilterKind::LowShelf,
        BandKind::Peaking => FilterKind::Peaking,
        BandKind::Highshelf => FilterKind::HighShelf,
        BandKind::Lowpass => FilterKind::LowPass,
        BandKind::Highpass => FilterKind::HighPass,
    };
    EqBand::new(
        kind,
        band.frequency as f32,
        band.q as f32,
        band.gain as f32,
    )
}

impl PlayerEngine {
    // ===== Apply helpers (graph side) =====

    /// Install the active EQ shape into the graph
    ///
    /// Parametric bands, when present, take the stage; otherwise the
    /// 10-band graphic chain does. A disabled graphic EQ keeps its
    /// topology with flat gains and a unity preamp.
    pub(crate) fn apply_eq_locked(&self, core: &mut EngineCore) {
        let parametric: Vec<EqBand> =
            core.state.parametric_eq.bands.iter().map(band_to_dsp).collect();
        let graphic_gains = core.state.eq.gains.map(|gain| gain as f32);
        let graphic_preamp = core.state.eq.preamp as f32;
        let graphic_enabled = core.state.eq.enabled;

        let Some(graph) = core.graph.as_mut() else {
            return;
        };

        if parametric.is_empty() {
            let eq = graph.ensure_graphic_eq();
            eq.set_gains(graphic_gains);
            eq.set_preamp_db(graphic_preamp);
            eq.set_enabled(graphic_enabled);
        } else {
            let eq = graph.ensure_parametric_eq();
            eq.set_bands(parametric, None);
            eq.set_enabled(true);
        }
    }

    pub(crate) fn apply_crossfeed_locked(&self, core: &mut EngineCore) {
        let enabled = core.state.fx.crossfeed.enabled;
        let settings = CrossfeedSettings::new(
            core.state.fx.crossfeed.level as f32,
            core.state.fx.crossfeed.delay_ms as f32,
            core.state.fx.crossfeed.shadow_hz as f32,
        );

        let Some(graph) = core.graph.as_mut() else {
            return;
        };
        if enabled {
            let stage = graph.ensure_crossfeed();
            stage.set_settings(settings);
            stage.set_enabled(true);
        } else if let Some(stage) = graph.crossfeed_mut() {
            stage.set_enabled(false);
        }
    }

    pub(crate) fn apply_loudness_locked(&self, core: &mut EngineCore) {
        let enabled = core.state.fx.loudness.enabled;
        let reference = core.state.fx.loudness.reference_spl as f32;
        let strength = core.state.fx.loudness.strength as f32;

        if let Some(graph) = core.graph.as_mut() {
            if enabled {
                let stage = graph.ensure_loudness();
                stage.set_reference_spl(reference);
                stage.set_strength(strength);
                stage.set_enabled(true);
            } else if let Some(stage) = graph.loudness_mut() {
                stage.set_enabled(false);
            }
        }
        // Volume ownership moves between the elements and the stage
        self.apply_volume_locked(core);
    }

    pub(crate) fn apply_noise_locked(&self, core: &mut EngineCore) {
        let noise = core.state.fx.noise.clone();

        let Some(graph) = core.graph.as_mut() else {
            return;
        };
        if noise.enabled {
            let stage = graph.ensure_noise();
            stage.set_mode(NoiseMode::from_name(&noise.mode).unwrap_or_default());
            stage.set_tilt(noise.tilt as f32);
            stage.set_power_db(noise.power as f32);
            stage.set_threshold_db(noise.threshold as f32);
            stage.set_attack_ms(noise.attack as f32);
            stage.set_enabled(true);
        } else if let Some(stage) = graph.noise_mut() {
            stage.set_enabled(false);
        }
    }

    // ===== Persistence helpers =====

    pub(crate) fn persist_fx(&self) {
        let fx = self.core().state.fx.clone();
        let settings = self.inner.deps.settings.clone();
        tokio::spawn(async move {
            let _ = settings.set_audio_fx(&fx).await;
        });
    }

    pub(crate) fn persist_eq(&self) {
        let eq = self.core().state.eq.clone();
        let settings = self.inner.deps.settings.clone();
        tokio::spawn(async move {
            let _ = settings.set_eq(&eq).await;
        });
    }

    // ===== ReplayGain =====

    /// Set the ReplayGain mode ("off" | "track" | "album")
    pub fn set_replay_gain_mode(&self, mode: &str) {
        {
            let mut core = self.core();
            core.state.fx.replay_gain.mode = match mode {
                "track" | "album" => mode.to_string(),
                _ => "off".to_string(),
            };
            self.apply_replay_gain_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the ReplayGain preamp in dB
    pub fn set_replay_gain_preamp(&self, preamp_db: f64) {
        {
            let mut core = self.core();
            core.state.fx.replay_gain.preamp = preamp_db.clamp(-12.0, 12.0);
            self.apply_replay_gain_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the fallback gain for songs without ReplayGain data
    pub fn set_replay_gain_fallback(&self, fallback_db: f64) {
        {
            let mut core = self.core();
            core.state.fx.replay_gain.fallback = fallback_db.clamp(-24.0, 0.0);
            self.apply_replay_gain_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    // ===== Graphic EQ =====

    /// Enable or disable the graphic EQ
    ///
    /// Disabling flattens the gains in the live chain but retains the
    /// topology and the persisted gains.
    pub async fn set_eq_enabled(&self, enabled: bool) {
        {
            let mut core = self.core();
            core.state.eq.enabled = enabled;
            let dual = core.state.fx.crossfade.enabled;
            if self.ensure_pipeline_locked(&mut core, dual).is_ok() {
                self.apply_eq_locked(&mut core);
            }
            self.publish(&mut core);
        }
        self.persist_eq();
    }

    /// Set one graphic EQ band gain in dB
    pub fn set_eq_band(&self, band: usize, gain_db: f64) {
        {
            let mut core = self.core();
            if band >= core.state.eq.gains.len() {
                return;
            }
            core.state.eq.gains[band] = gain_db.clamp(-12.0, 12.0);
            self.apply_eq_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_eq();
    }

    /// Set the graphic EQ preamp in dB
    pub fn set_graphic_preamp(&self, preamp_db: f64) {
        {
            let mut core = self.core();
            core.state.eq.preamp = preamp_db.clamp(-24.0, 12.0);
            self.apply_eq_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_eq();
    }

    /// Zero every band and the preamp
    pub fn reset_eq(&self) {
        {
            let mut core = self.core();
            core.state.eq.gains = [0.0; 10];
            core.state.eq.preamp = 0.0;
            self.apply_eq_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_eq();
    }

    /// Restore the graphic EQ from a named preset, or from the
    /// persisted gains when no preset is given
    pub fn restore_graphic_eq(&self, preset: Option<&str>) {
        let parametric = {
            let mut core = self.core();
            if let Some(preset) = preset.and_then(GraphicEqPreset::from_name) {
                let gains = preset.gains();
                for (slot, gain) in core.state.eq.gains.iter_mut().zip(gains) {
                    *slot = f64::from(gain);
                }
            }
            // Any parametric chain steps aside for the graphic one
            core.state.parametric_eq.bands.clear();
            core.state.parametric_eq.preset_uuid = None;
            self.apply_eq_locked(&mut core);
            self.publish(&mut core);
            core.state.parametric_eq.clone()
        };
        self.persist_eq();

        let settings = self.inner.deps.settings.clone();
        tokio::spawn(async move {
            let _ = settings.set_parametric_eq(&parametric).await;
        });
    }

    // ===== Parametric EQ =====

    /// Install a parametric band chain
    ///
    /// An explicit preamp overrides the computed one; an empty band list
    /// returns the stage to the graphic chain. May build the pipeline.
    pub async fn set_parametric_eq(&self, bands: Vec<ParametricBand>, preamp_db: Option<f64>) {
        let state = {
            let mut core = self.core();
            let dual = core.state.fx.crossfade.enabled;
            if let Err(err) = self.ensure_pipeline_locked(&mut core, dual) {
                core.state.error = Some(err.to_string());
                self.publish(&mut core);
                return;
            }

            core.state.parametric_eq.bands = bands.clone();
            if bands.is_empty() {
                self.apply_eq_locked(&mut core);
            } else {
                let dsp_bands: Vec<EqBand> = bands.iter().map(band_to_dsp).collect();
                if let Some(graph) = core.graph.as_mut() {
                    let eq = graph.ensure_parametric_eq();
                    eq.set_bands(dsp_bands, preamp_db);
                    eq.set_enabled(true);
                }
            }
            self.publish(&mut core);
            core.state.parametric_eq.clone()
        };

        if let Err(err) = self.inner.deps.settings.set_parametric_eq(&state).await {
            tracing::warn!(%err, "parametric EQ persist failed");
        }
    }

    /// The preamp the live parametric chain settled on, in dB
    pub fn parametric_preamp_db(&self) -> f64 {
        let core = self.core();
        match core.graph.as_ref().and_then(lyra_audio::AudioGraph::eq_stage) {
            Some(lyra_audio::EqStage::Parametric(eq)) => eq.preamp_db(),
            _ => 0.0,
        }
    }

    // ===== Crossfeed =====

    /// Enable or disable the crossfeed matrix
    pub fn set_crossfeed_enabled(&self, enabled: bool) {
        {
            let mut core = self.core();
            core.state.fx.crossfeed.enabled = enabled;
            let dual = core.state.fx.crossfade.enabled;
            if enabled {
                let _ = self.ensure_pipeline_locked(&mut core, dual);
            }
            self.apply_crossfeed_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the stereo-image level (-100 mono .. +100 wide)
    pub fn set_crossfeed_level(&self, level: f64) {
        {
            let mut core = self.core();
            core.state.fx.crossfeed.level = level.clamp(-100.0, 100.0);
            self.apply_crossfeed_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the cross-channel delay in ms (0 bypasses)
    pub fn set_crossfeed_delay(&self, delay_ms: f64) {
        {
            let mut core = self.core();
            core.state.fx.crossfeed.delay_ms = delay_ms.clamp(0.0, 5.0);
            self.apply_crossfeed_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the head-shadow corner in Hz (0 bypasses, else 500..3000)
    pub fn set_crossfeed_shadow(&self, shadow_hz: f64) {
        {
            let mut core = self.core();
            core.state.fx.crossfeed.shadow_hz = if shadow_hz == 0.0 {
                0.0
            } else {
                shadow_hz.clamp(500.0, 3000.0)
            };
            self.apply_crossfeed_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Apply a named crossfeed preset ("off" | "narrow" | "medium" | "wide")
    pub fn set_crossfeed_preset(&self, name: &str) {
        let Some(preset) = CrossfeedPreset::from_name(name) else {
            return;
        };
        let settings = preset.settings();
        {
            let mut core = self.core();
            core.state.fx.crossfeed.level = f64::from(settings.level);
            core.state.fx.crossfeed.delay_ms = f64::from(settings.delay_ms);
            core.state.fx.crossfeed.shadow_hz = f64::from(settings.shadow_hz);
            self.apply_crossfeed_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    // ===== Loudness =====

    /// Enable or disable loudness compensation
    ///
    /// Toggling moves volume ownership: enabled pins both media elements
    /// to 1.0 for headroom and routes the user volume through the
    /// loudness gain stage.
    pub async fn set_loudness_enabled(&self, enabled: bool) {
        {
            let mut core = self.core();
            core.state.fx.loudness.enabled = enabled;
            let dual = core.state.fx.crossfade.enabled;
            if enabled {
                let _ = self.ensure_pipeline_locked(&mut core, dual);
            }
            self.apply_loudness_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the reference SPL (60..90 dB)
    pub fn set_loudness_reference(&self, reference_spl: f64) {
        {
            let mut core = self.core();
            core.state.fx.loudness.reference_spl = reference_spl.clamp(60.0, 90.0);
            self.apply_loudness_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the compensation strength (0..150 %)
    pub fn set_loudness_strength(&self, strength: f64) {
        {
            let mut core = self.core();
            core.state.fx.loudness.strength = strength.clamp(0.0, 150.0);
            self.apply_loudness_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    // ===== Gapless / Crossfade =====

    /// Enable or disable gapless preloading
    pub fn set_gapless_enabled(&self, enabled: bool) {
        {
            let mut core = self.core();
            core.state.fx.gapless.enabled = enabled;
            if !enabled {
                core.last_preloaded = None;
            }
            self.publish(&mut core);
        }
        self.persist_fx();

        if enabled {
            let engine = self.clone();
            tokio::spawn(async move { engine.preload_next().await });
        }
    }

    /// Enable or disable crossfade
    ///
    /// Enabling builds the dual pipeline (once); disabling tears it back
    /// down to the simple topology around the surviving source.
    pub async fn set_crossfade_enabled(&self, enabled: bool) {
        {
            let mut core = self.core();
            core.state.fx.crossfade.enabled = enabled;
            if enabled {
                if let Err(err) = self.ensure_pipeline_locked(&mut core, true) {
                    core.state.error = Some(err.to_string());
                }
            } else {
                let primary = core.primary_slot();
                if let Some(graph) = core.graph.as_mut() {
                    graph.teardown_dual_pipeline(primary);
                }
            }
            self.apply_replay_gain_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();

        if enabled {
            let engine = self.clone();
            tokio::spawn(async move { engine.preload_next().await });
        }
    }

    /// Set the crossfade duration in seconds (1..12)
    pub fn set_crossfade_duration(&self, duration: f64) {
        {
            let mut core = self.core();
            core.state.fx.crossfade.duration = duration.clamp(1.0, 12.0);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    // ===== Tempo =====

    /// Enable or disable tempo adjustment
    pub fn set_tempo_enabled(&self, enabled: bool) {
        {
            let mut core = self.core();
            core.state.fx.tempo.enabled = enabled;
            self.apply_tempo_locked(&core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the playback rate (0.5..2.0)
    pub fn set_tempo_rate(&self, rate: f64) {
        {
            let mut core = self.core();
            core.state.fx.tempo.rate = rate.clamp(0.5, 2.0);
            self.apply_tempo_locked(&core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Engage or release the pitch lock
    pub fn set_tempo_pitch_lock(&self, pitch_lock: bool) {
        {
            let mut core = self.core();
            core.state.fx.tempo.pitch_lock = pitch_lock;
            self.apply_tempo_locked(&core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    // ===== Comfort noise =====

    /// Enable or disable comfort noise
    pub async fn set_noise_enabled(&self, enabled: bool) {
        {
            let mut core = self.core();
            core.state.fx.noise.enabled = enabled;
            let dual = core.state.fx.crossfade.enabled;
            if enabled {
                let _ = self.ensure_pipeline_locked(&mut core, dual);
            }
            self.apply_noise_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the noise color ("white" | "grey")
    pub fn set_noise_mode(&self, mode: &str) {
        {
            let mut core = self.core();
            core.state.fx.noise.mode = match mode {
                "grey" => "grey".to_string(),
                _ => "white".to_string(),
            };
            self.apply_noise_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the spectral tilt (-100..+100)
    pub fn set_noise_tilt(&self, tilt: f64) {
        {
            let mut core = self.core();
            core.state.fx.noise.tilt = tilt.clamp(-100.0, 100.0);
            self.apply_noise_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the noise power in dBFS (-60..0)
    pub fn set_noise_power(&self, power_db: f64) {
        {
            let mut core = self.core();
            core.state.fx.noise.power = power_db.clamp(-60.0, 0.0);
            self.apply_noise_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the music threshold in dBFS (-60..0; 0 plays unconditionally)
    pub fn set_noise_threshold(&self, threshold_db: f64) {
        {
            let mut core = self.core();
            core.state.fx.noise.threshold = threshold_db.clamp(-60.0, 0.0);
            self.apply_noise_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the attack time in ms (25..2000)
    pub fn set_noise_attack(&self, attack_ms: f64) {
        {
            let mut core = self.core();
            core.state.fx.noise.attack = attack_ms.clamp(25.0, 2000.0);
            self.apply_noise_locked(&mut core);
            self.publish(&mut core);
        }
        self.persist_fx();
    }
}
