//! The processing graph
//!
//! One graph instance per audio context. Topology is rebuilt wholesale
//! (never incrementally mutated) in two shapes:
//!
//! - **Simple**: the primary source feeds the effects chain directly.
//! - **Dual**: both sources run through per-source ReplayGain and fade
//!   gains into a mixer, and the mixer feeds the chain. Required for
//!   crossfade; the secondary path stays silent (fade 0) otherwise.
//!
//! The chain input node is the mixer in dual mode, else the source; the
//! chain end is whatever enabled stage sits last before the destination.
//! Fade gains are the only automated parameters; when a scheduled curve
//! has to be abandoned mid-flight the node is replaced, not reset (see
//! [`crate::params`]).

use crate::context::{AudioContext, LatencyMode};
use crate::effects::{
    AudioEffect, ComfortNoise, Crossfeed, GraphicEq, Loudness, ParametricEq,
};
use crate::error::{AudioError, Result};
use crate::params::GainParam;

/// The two media-source slots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceSlot {
    A,
    B,
}

impl SourceSlot {
    /// Slot index (0 or 1)
    pub fn index(self) -> usize {
        match self {
            SourceSlot::A => 0,
            SourceSlot::B => 1,
        }
    }

    /// The other slot
    pub fn other(self) -> Self {
        match self {
            SourceSlot::A => SourceSlot::B,
            SourceSlot::B => SourceSlot::A,
        }
    }

    /// Slot from an index
    pub fn from_index(index: usize) -> Self {
        if index == 0 {
            SourceSlot::A
        } else {
            SourceSlot::B
        }
    }
}

/// Graph construction parameters
#[derive(Debug, Clone, Copy)]
pub struct GraphConfig {
    pub sample_rate: u32,
    pub latency: LatencyMode,
    /// Build the dual (crossfade) pipeline immediately
    pub dual: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            latency: LatencyMode::default(),
            dual: false,
        }
    }
}

/// Per-slot media source node state
///
/// The platform allows exactly one source node per media element for the
/// life of the context; `created` enforces that here.
#[derive(Debug, Clone, Copy, Default)]
struct SourceState {
    created: bool,
    connected: bool,
}

/// A fade gain node
///
/// Carries a generation number so callers can observe force-replacement:
/// a fresh node has a new generation and a clean parameter.
#[derive(Debug, Clone)]
struct FadeGain {
    param: GainParam,
    generation: u64,
}

/// The EQ stage: one of the two chain shapes, never both
pub enum EqStage {
    Graphic(GraphicEq),
    Parametric(ParametricEq),
}

/// Tap inserted at the chain input, e.g. an external analyser
pub trait AnalyserTap: Send {
    /// Observe one block of interleaved stereo samples
    fn process(&mut self, buffer: &[f32], sample_rate: u32);
}

/// The audio processing graph
pub struct AudioGraph {
    context: AudioContext,
    dual: bool,

    sources: [SourceState; 2],
    replay_gain: [GainParam; 2],
    fade: [FadeGain; 2],
    next_fade_generation: u64,

    loudness: Option<Loudness>,
    eq: Option<EqStage>,
    crossfeed: Option<Crossfeed>,
    noise: Option<ComfortNoise>,
    analyser: Option<Box<dyn AnalyserTap>>,

    /// How many times the dual pipeline has been (re)built
    dual_builds: u32,
}

impl AudioGraph {
    /// Create a graph on a fresh context
    ///
    /// # Errors
    /// [`AudioError::ContextCreation`] when the context parameters are
    /// unusable.
    pub fn new(config: GraphConfig, generation: u64) -> Result<Self> {
        if config.sample_rate == 0 {
            return Err(AudioError::ContextCreation(
                "sample rate must be non-zero".to_string(),
            ));
        }

        let mut graph = Self {
            context: AudioContext::new(config.sample_rate, config.latency, generation),
            dual: false,
            sources: [SourceState::default(); 2],
            replay_gain: [GainParam::new(1.0), GainParam::new(1.0)],
            fade: [
                FadeGain {
                    param: GainParam::new(1.0),
                    generation: 0,
                },
                FadeGain {
                    param: GainParam::new(0.0),
                    generation: 1,
                },
            ],
            next_fade_generation: 2,
            loudness: None,
            eq: None,
            crossfeed: None,
            noise: None,
            analyser: None,
            dual_builds: 0,
        };

        if config.dual {
            graph.build_dual_pipeline(SourceSlot::A);
        }
        Ok(graph)
    }

    /// The graph's context
    pub fn context(&self) -> &AudioContext {
        &self.context
    }

    /// Whether the dual pipeline is built
    pub fn is_dual(&self) -> bool {
        self.dual
    }

    /// Dual pipeline build count (for idempotence checks)
    pub fn dual_build_count(&self) -> u32 {
        self.dual_builds
    }

    // ===== Sources =====

    /// Create the source node for a slot
    ///
    /// # Errors
    /// [`AudioError::SourceAlreadyCreated`] on a second creation; the
    /// platform forbids two source nodes for one media element.
    pub fn create_source(&mut self, slot: SourceSlot) -> Result<()> {
        let state = &mut self.sources[slot.index()];
        if state.created {
            return Err(AudioError::SourceAlreadyCreated(slot.index()));
        }
        state.created = true;
        Ok(())
    }

    /// Create the source node lazily and connect it into the pipeline
    ///
    /// Safe to call repeatedly; the node is created once per context.
    pub fn ensure_source_connected(&mut self, slot: SourceSlot) {
        let state = &mut self.sources[slot.index()];
        if !state.created {
            state.created = true;
        }
        state.connected = true;
    }

    /// Disconnect a source from the pipeline (node survives)
    pub fn disconnect_source(&mut self, slot: SourceSlot) {
        self.sources[slot.index()].connected = false;
    }

    /// Whether a slot's source node exists
    pub fn source_created(&self, slot: SourceSlot) -> bool {
        self.sources[slot.index()].created
    }

    /// Whether a slot is connected into the pipeline
    pub fn source_connected(&self, slot: SourceSlot) -> bool {
        self.sources[slot.index()].connected
    }

    // ===== Dual pipeline =====

    /// Build the dual (crossfade) pipeline
    ///
    /// Idempotent: an already-dual graph is left untouched. Fade gains
    /// start with the primary audible and the secondary silent.
    pub fn build_dual_pipeline(&mut self, primary: SourceSlot) {
        if self.dual {
            return;
        }

        self.dual = true;
        self.dual_builds += 1;
        self.ensure_source_connected(primary);
        self.replace_fade_gain(primary, 1.0);
        self.replace_fade_gain(primary.other(), 0.0);
        tracing::debug!(primary = primary.index(), "dual pipeline built");
    }

    /// Tear the dual pipeline down to the simple shape
    ///
    /// The surviving source is connected directly to the chain.
    pub fn teardown_dual_pipeline(&mut self, keep: SourceSlot) {
        if !self.dual {
            return;
        }

        self.dual = false;
        self.sources[keep.other().index()].connected = false;
        self.ensure_source_connected(keep);
        tracing::debug!(keep = keep.index(), "dual pipeline torn down");
    }

    // ===== ReplayGain and fade gains =====

    /// Set a slot's ReplayGain node to a linear gain
    pub fn set_replay_gain(&mut self, slot: SourceSlot, linear: f64) {
        let now = self.context.current_time();
        // ReplayGain nodes are never automated, so this cannot lock
        let _ = self.replay_gain[slot.index()].set_value(linear as f32, now);
    }

    /// A slot's ReplayGain linear value
    pub fn replay_gain(&self, slot: SourceSlot) -> f32 {
        self.replay_gain[slot.index()].value()
    }

    /// A slot's fade gain value at the current clock
    pub fn fade_value(&self, slot: SourceSlot) -> f32 {
        self.fade[slot.index()]
            .param
            .value_at(self.context.current_time())
    }

    /// A slot's fade node generation (changes on force-replace)
    pub fn fade_generation(&self, slot: SourceSlot) -> u64 {
        self.fade[slot.index()].generation
    }

    /// Whether a slot's fade parameter is locked by in-flight automation
    pub fn fade_locked(&self, slot: SourceSlot) -> bool {
        self.fade[slot.index()]
            .param
            .is_locked(self.context.current_time())
    }

    /// Try to set a fade gain to a static value
    ///
    /// # Errors
    /// [`AudioError::AutomationLocked`] while a curve is in flight; the
    /// caller escalates to [`Self::force_replace_fade_gain`].
    pub fn set_fade_value(&mut self, slot: SourceSlot, value: f32) -> Result<()> {
        let now = self.context.current_time();
        self.fade[slot.index()].param.set_value(value, now)
    }

    /// Schedule a value curve on a fade gain
    ///
    /// # Errors
    /// [`AudioError::AutomationLocked`] while a prior curve is in flight.
    pub fn schedule_fade_curve(
        &mut self,
        slot: SourceSlot,
        curve: Vec<f32>,
        start_time: f64,
        duration: f64,
    ) -> Result<()> {
        let now = self.context.current_time();
        self.fade[slot.index()]
            .param
            .set_value_curve(curve, start_time, duration, now)
    }

    /// Replace a fade gain with a fresh node at `target`
    ///
    /// The escape hatch for the automation lock: create a new gain node
    /// at the target value, disconnect the old one, rewire source ->
    /// new gain -> mixer. The old node (and its curve) is released.
    pub fn force_replace_fade_gain(&mut self, slot: SourceSlot, target: f32) {
        self.replace_fade_gain(slot, target);
        tracing::debug!(slot = slot.index(), target, "fade gain force-replaced");
    }

    fn replace_fade_gain(&mut self, slot: SourceSlot, target: f32) {
        self.fade[slot.index()] = FadeGain {
            param: GainParam::new(target),
            generation: self.next_fade_generation,
        };
        self.next_fade_generation += 1;
    }

    /// Reset fade gains to their resting state (primary 1.0, other 0.0)
    ///
    /// Uses force-replacement whenever a lock is detected.
    pub fn reset_fade_gains(&mut self, primary: SourceSlot) {
        for (slot, target) in [(primary, 1.0f32), (primary.other(), 0.0f32)] {
            if self.set_fade_value(slot, target).is_err() {
                self.force_replace_fade_gain(slot, target);
            }
        }
    }

    // ===== Effect stages =====

    /// Build the loudness stage on demand
    pub fn ensure_loudness(&mut self) -> &mut Loudness {
        self.loudness.get_or_insert_with(Loudness::new)
    }

    /// The loudness stage, if built
    pub fn loudness_mut(&mut self) -> Option<&mut Loudness> {
        self.loudness.as_mut()
    }

    /// Install the graphic EQ stage, replacing any parametric chain
    pub fn ensure_graphic_eq(&mut self) -> &mut GraphicEq {
        if !matches!(self.eq, Some(EqStage::Graphic(_))) {
            self.eq = Some(EqStage::Graphic(GraphicEq::new()));
        }
        match self.eq.as_mut() {
            Some(EqStage::Graphic(eq)) => eq,
            _ => unreachable!("graphic EQ installed above"),
        }
    }

    /// Install the parametric EQ stage, replacing any graphic chain
    pub fn ensure_parametric_eq(&mut self) -> &mut ParametricEq {
        if !matches!(self.eq, Some(EqStage::Parametric(_))) {
            self.eq = Some(EqStage::Parametric(ParametricEq::new()));
        }
        match self.eq.as_mut() {
            Some(EqStage::Parametric(eq)) => eq,
            _ => unreachable!("parametric EQ installed above"),
        }
    }

    /// The EQ stage, if built
    pub fn eq_stage(&self) -> Option<&EqStage> {
        self.eq.as_ref()
    }

    /// The EQ stage, if built (mutable)
    pub fn eq_stage_mut(&mut self) -> Option<&mut EqStage> {
        self.eq.as_mut()
    }

    /// Build the crossfeed stage on demand
    pub fn ensure_crossfeed(&mut self) -> &mut Crossfeed {
        self.crossfeed.get_or_insert_with(Crossfeed::new)
    }

    /// The crossfeed stage, if built
    pub fn crossfeed_mut(&mut self) -> Option<&mut Crossfeed> {
        self.crossfeed.as_mut()
    }

    /// Build the comfort-noise stage on demand
    pub fn ensure_noise(&mut self) -> &mut ComfortNoise {
        self.noise.get_or_insert_with(ComfortNoise::new)
    }

    /// The comfort-noise stage, if built
    pub fn noise_mut(&mut self) -> Option<&mut ComfortNoise> {
        self.noise.as_mut()
    }

    /// Insert an analyser tap at the chain input
    pub fn insert_analyser(&mut self, tap: Box<dyn AnalyserTap>) {
        self.analyser = Some(tap);
    }

    /// Remove the analyser tap
    pub fn remove_analyser(&mut self) {
        self.analyser = None;
    }

    /// Active stage names from chain input to destination
    ///
    /// Describes the current topology for diagnostics and tests.
    pub fn topology(&self) -> Vec<&'static str> {
        let mut stages = Vec::new();
        stages.push(if self.dual { "mixer" } else { "source" });
        if self.loudness.as_ref().is_some_and(|l| l.is_enabled()) {
            stages.push("loudness");
        }
        match &self.eq {
            Some(EqStage::Graphic(_)) => stages.push("graphic-eq"),
            Some(EqStage::Parametric(_)) => stages.push("parametric-eq"),
            None => {}
        }
        if self.crossfeed.as_ref().is_some_and(|c| c.is_enabled()) {
            stages.push("crossfeed");
        }
        if self.noise.as_ref().is_some_and(|n| n.is_enabled()) {
            stages.push("noise");
        }
        stages.push("destination");
        stages
    }

    // ===== Processing =====

    /// Process one block
    ///
    /// `primary` and `secondary` are the interleaved stereo feeds from
    /// the two media sources; the secondary feed only contributes in
    /// dual mode. The output length defines the block.
    pub fn process_block(
        &mut self,
        primary: &[f32],
        secondary: &[f32],
        output: &mut [f32],
    ) {
        let samples = output.len();
        let sample_rate = self.context.sample_rate();
        let now = self.context.current_time();
        let sr = f64::from(sample_rate);

        if self.dual {
            let rg = [self.replay_gain[0].value(), self.replay_gain[1].value()];
            let connected = [self.sources[0].connected, self.sources[1].connected];

            for i in 0..samples {
                let frame = i / 2;
                let t = now + frame as f64 / sr;

                let mut mixed = 0.0f32;
                if connected[0] {
                    let sample = primary.get(i).copied().unwrap_or(0.0);
                    mixed += sample * rg[0] * self.fade[0].param.value_at(t);
                }
                if connected[1] {
                    let sample = secondary.get(i).copied().unwrap_or(0.0);
                    mixed += sample * rg[1] * self.fade[1].param.value_at(t);
                }
                output[i] = mixed;
            }
        } else {
            for i in 0..samples {
                output[i] = primary.get(i).copied().unwrap_or(0.0);
            }
        }

        // Chain input: the visualizer taps here
        if let Some(analyser) = self.analyser.as_mut() {
            analyser.process(output, sample_rate);
        }

        if let Some(loudness) = self.loudness.as_mut() {
            loudness.process(output, sample_rate);
        }
        match self.eq.as_mut() {
            Some(EqStage::Graphic(eq)) => eq.process(output, sample_rate),
            Some(EqStage::Parametric(eq)) => eq.process(output, sample_rate),
            None => {}
        }
        if let Some(crossfeed) = self.crossfeed.as_mut() {
            crossfeed.process(output, sample_rate);
        }
        if let Some(noise) = self.noise.as_mut() {
            noise.process(output, sample_rate);
        }

        self.context.advance(samples / 2);
        let after = self.context.current_time();
        for fade in &mut self.fade {
            fade.param.settle(after);
        }
    }
}
