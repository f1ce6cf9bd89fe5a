//! The player engine façade
//!
//! One observable state object, one operation vocabulary. Everything the
//! UI does to playback goes through [`PlayerEngine`]; everything it
//! renders comes off the watch channel.
//!
//! Concurrency model: a single core mutex held only between suspension
//! points (never across an await). Async operations re-lock after each
//! await and re-validate the one-shot guard flags (`crossfade.in_progress`,
//! `is_exiting_temp_queue`, the 5-second cooldowns) before continuing.

mod effects;
mod queue_ops;
mod timer;
mod transport;

use crate::crossfade::CrossfadeFlags;
use crate::error::Result;
use crate::media::{MediaElement, MediaEvent};
use crate::queue::QueueMachine;
use crate::shuffle::ShuffleHistory;
use crate::sleep_timer::SleepTimerState;
use crate::types::{EngineEvent, PlayerState};
use lyra_audio::graph::AnalyserTap;
use lyra_audio::{AudioGraph, GraphConfig, LatencyMode, SourceSlot};
use lyra_core::repository::{
    AudioUrlResolver, CatalogRepository, MediaSessionAdapter, OfflineState, VisibilityProvider,
};
use lyra_core::types::SongId;
use lyra_storage::{ParametricBand, SettingsStore, SnapshotStore};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};

/// Buffering is only surfaced after this long in `waiting`
const LOADING_DEBOUNCE_MS: u64 = 300;

/// SCA pre-populates more songs when the tail shrinks below this
const SCA_TAIL_THRESHOLD: usize = 5;

/// How many songs one SCA population round asks for
const SCA_POPULATE_COUNT: usize = 20;

/// External collaborators the engine is constructed over
#[derive(Clone)]
pub struct EngineDeps {
    pub repo: Arc<dyn CatalogRepository>,
    pub urls: Arc<dyn AudioUrlResolver>,
    pub offline: Arc<dyn OfflineState>,
    pub media_session: Arc<dyn MediaSessionAdapter>,
    pub visibility: Arc<dyn VisibilityProvider>,
    pub settings: SettingsStore,
    pub snapshots: Arc<dyn SnapshotStore>,
    /// The two host media elements; both exist for the engine's lifetime
    pub elements: [Arc<dyn MediaElement>; 2],
}

/// Everything behind the core mutex
pub(crate) struct EngineCore {
    pub(crate) state: PlayerState,
    pub(crate) queue: QueueMachine,
    pub(crate) shuffle_history: ShuffleHistory,

    pub(crate) graph: Option<AudioGraph>,
    pub(crate) graph_generation: u64,
    pub(crate) latency: LatencyMode,

    /// Which element slot is audible; the single source of truth every
    /// media event handler checks first
    pub(crate) primary_index: usize,

    pub(crate) crossfade: CrossfadeFlags,
    pub(crate) sleep: SleepTimerState,

    /// One-shot guard against focus-refresh racing snapshot restoration
    pub(crate) is_exiting_temp_queue: bool,
    /// Epoch ms of the last temp-queue exit (5 s focus suppression)
    pub(crate) temp_exit_at_ms: i64,
    pub(crate) last_focus_refresh_ms: i64,
    pub(crate) last_hidden_at_ms: i64,
    pub(crate) syncing_queue: bool,

    pub(crate) consecutive_errors: u32,
    pub(crate) play_start_ms: i64,
    pub(crate) last_preloaded: Option<SongId>,
    pub(crate) sca_populate_pending: bool,

    /// Bumped whenever a `waiting` is superseded; debounce tasks bail
    /// when their sequence number is stale
    pub(crate) waiting_seq: u64,

    pub(crate) source_version: u64,
}

impl EngineCore {
    fn new() -> Self {
        Self {
            state: PlayerState::default(),
            queue: QueueMachine::new(),
            shuffle_history: ShuffleHistory::new(),
            graph: None,
            graph_generation: 0,
            latency: LatencyMode::default(),
            primary_index: 0,
            crossfade: CrossfadeFlags::default(),
            sleep: SleepTimerState::default(),
            is_exiting_temp_queue: false,
            temp_exit_at_ms: 0,
            last_focus_refresh_ms: 0,
            last_hidden_at_ms: 0,
            syncing_queue: false,
            consecutive_errors: 0,
            play_start_ms: 0,
            last_preloaded: None,
            sca_populate_pending: false,
            waiting_seq: 0,
            source_version: 0,
        }
    }

    /// Mirror queue fields into the observable state
    pub(crate) fn sync_queue_state(&mut self) {
        self.state.queue = self.queue.items().to_vec();
        self.state.queue_index = self.queue.index();
        self.state.queue_version = self.queue.version();
        self.state.play_mode = self.queue.play_mode();
        self.state.sca_enabled = self.queue.sca_enabled();
    }

    /// The primary slot as a graph slot
    pub(crate) fn primary_slot(&self) -> SourceSlot {
        SourceSlot::from_index(self.primary_index)
    }
}

pub(crate) struct EngineInner {
    pub(crate) deps: EngineDeps,
    pub(crate) core: Mutex<EngineCore>,
    pub(crate) state_tx: watch::Sender<PlayerState>,
    pub(crate) events_tx: broadcast::Sender<EngineEvent>,
    /// Wall-clock shift for diagnostics and simulated time in tests
    pub(crate) clock_offset_ms: std::sync::atomic::AtomicI64,
}

/// The playback engine façade
///
/// Cheap to clone; all clones share the same engine.
#[derive(Clone)]
pub struct PlayerEngine {
    pub(crate) inner: Arc<EngineInner>,
}

impl PlayerEngine {
    /// Create an engine over its collaborators
    ///
    /// Call [`Self::initialize`] afterwards to load settings and the
    /// server queue.
    pub fn new(deps: EngineDeps) -> Self {
        let (state_tx, _) = watch::channel(PlayerState::default());
        let (events_tx, _) = broadcast::channel(64);

        Self {
            inner: Arc::new(EngineInner {
                deps,
                core: Mutex::new(EngineCore::new()),
                state_tx,
                events_tx,
                clock_offset_ms: std::sync::atomic::AtomicI64::new(0),
            }),
        }
    }

    // ===== Shared plumbing =====

    pub(crate) fn core(&self) -> MutexGuard<'_, EngineCore> {
        self.inner
            .core
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Publish the current state snapshot
    pub(crate) fn publish(&self, core: &mut EngineCore) {
        core.sync_queue_state();
        let _ = self.inner.state_tx.send(core.state.clone());
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        let _ = self.inner.events_tx.send(event);
    }

    pub(crate) fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
            + self
                .inner
                .clock_offset_ms
                .load(std::sync::atomic::Ordering::Relaxed)
    }

    /// Shift the engine's wall clock forward (simulated time)
    #[doc(hidden)]
    pub fn advance_wall_clock(&self, ms: i64) {
        self.inner
            .clock_offset_ms
            .fetch_add(ms, std::sync::atomic::Ordering::Relaxed);
    }

    pub(crate) fn element(&self, index: usize) -> &Arc<dyn MediaElement> {
        &self.inner.deps.elements[index]
    }

    /// Subscribe to state snapshots
    pub fn subscribe_state(&self) -> watch::Receiver<PlayerState> {
        self.inner.state_tx.subscribe()
    }

    /// Current state snapshot
    pub fn state(&self) -> PlayerState {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribe to engine events (source changes, crossfade lifecycle)
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events_tx.subscribe()
    }

    /// Monotone source-change counter
    pub fn audio_source_version(&self) -> u64 {
        self.core().source_version
    }

    // ===== Startup =====

    /// Load settings, restore the temp-queue overlay or the server queue,
    /// and start the sleep-timer poll
    ///
    /// A queue-load failure is not fatal: the audio pipeline still comes
    /// up for local-only effects.
    pub async fn initialize(&self) {
        let settings = &self.inner.deps.settings;
        let local = settings.player_local().await;
        let fx = settings.audio_fx().await;
        let eq = settings.eq().await;
        let parametric = settings.parametric_eq().await;
        let history = settings.shuffle_history().await;
        let low_latency = settings.low_latency_always().await;

        {
            let mut core = self.core();
            core.state.volume = local.volume;
            core.state.muted = local.muted;
            core.state.current_time = local.current_time;
            core.state.fx = fx;
            core.state.eq = eq;
            core.state.parametric_eq = parametric;
            core.state.low_latency_always = low_latency;
            core.shuffle_history = ShuffleHistory::from_entries(history);
            if low_latency {
                core.latency = LatencyMode::Interactive;
            }
            self.publish(&mut core);
        }

        // Temp-queue overlay survives restarts
        let temp_state = self
            .inner
            .deps
            .snapshots
            .get_temp_queue_state()
            .await
            .unwrap_or_default();

        if let Some(temp) = temp_state.temp_queue {
            let mut core = self.core();
            core.state.temp_queue_mode = true;
            core.queue.set_items(temp.items, temp.queue_index);
            core.queue.set_play_mode(temp.play_mode);
            core.queue.set_sca_enabled(temp.sca_enabled);
            self.publish(&mut core);
        } else {
            match self.inner.deps.repo.queue_list(None).await {
                Ok(response) => {
                    let mut core = self.core();
                    core.queue.set_items(response.items, response.queue_index);
                    core.queue.set_sca_enabled(response.sca_enabled);
                    if let Some(mode) = response.play_mode {
                        core.queue.set_play_mode(mode);
                    }
                    core.state.server_loaded = true;
                    core.state.current_song = core.queue.current_song().cloned();
                    self.publish(&mut core);
                }
                Err(err) => {
                    tracing::warn!(%err, "queue load failed at startup");
                }
            }
        }

        // Pipeline comes up regardless so local-only effects work
        {
            let mut core = self.core();
            let dual = core.state.fx.crossfade.enabled;
            if let Err(err) = self.ensure_pipeline_locked(&mut core, dual) {
                core.state.error = Some(err.to_string());
                self.publish(&mut core);
            } else {
                self.apply_effect_settings_locked(&mut core);
            }
        }

        self.spawn_sleep_timer_poll();
    }

    // ===== Pipeline =====

    /// Build the graph if absent; upgrade to the dual topology on demand
    ///
    /// Idempotent in both directions of interest: an existing graph is
    /// kept, an already-dual graph is not rebuilt.
    pub(crate) fn ensure_pipeline_locked(
        &self,
        core: &mut EngineCore,
        dual: bool,
    ) -> Result<()> {
        if core.graph.is_none() {
            let config = GraphConfig {
                sample_rate: 44100,
                latency: core.latency,
                dual,
            };
            core.graph_generation += 1;
            let graph = AudioGraph::new(config, core.graph_generation)?;
            core.graph = Some(graph);
            tracing::debug!(generation = core.graph_generation, "audio pipeline created");
        }

        let primary = core.primary_slot();
        if let Some(graph) = core.graph.as_mut() {
            graph.ensure_source_connected(primary);
            if dual {
                graph.build_dual_pipeline(primary);
            }
        }
        Ok(())
    }

    /// Push every persisted effect block into the live graph
    pub(crate) fn apply_effect_settings_locked(&self, core: &mut EngineCore) {
        self.apply_eq_locked(core);
        self.apply_crossfeed_locked(core);
        self.apply_loudness_locked(core);
        self.apply_noise_locked(core);
        self.apply_volume_locked(core);
        self.apply_tempo_locked(core);
    }

    // ===== Visualizer surface =====

    /// Host render hook: feed the two source streams through the graph
    ///
    /// The host audio callback owns the buffers; the engine only shapes
    /// them. A missing pipeline passes the primary feed through.
    pub fn render(&self, primary: &[f32], secondary: &[f32], output: &mut [f32]) {
        let mut core = self.core();
        match core.graph.as_mut() {
            Some(graph) => graph.process_block(primary, secondary, output),
            None => {
                let len = output.len().min(primary.len());
                output[..len].copy_from_slice(&primary[..len]);
                output[len..].fill(0.0);
            }
        }
    }

    /// Insert an analyser tap at the chain input
    pub fn insert_analyser(&self, tap: Box<dyn AnalyserTap>) {
        let mut core = self.core();
        if let Some(graph) = core.graph.as_mut() {
            graph.insert_analyser(tap);
        }
    }

    /// Remove the analyser tap
    pub fn remove_analyser(&self) {
        let mut core = self.core();
        if let Some(graph) = core.graph.as_mut() {
            graph.remove_analyser();
        }
    }

    /// Whether the dual (crossfade) pipeline is built
    pub fn is_dual_pipeline(&self) -> bool {
        self.core()
            .graph
            .as_ref()
            .is_some_and(AudioGraph::is_dual)
    }

    /// How many times the dual pipeline has been built on this context
    pub fn dual_build_count(&self) -> u32 {
        self.core()
            .graph
            .as_ref()
            .map_or(0, AudioGraph::dual_build_count)
    }

    /// Current fade gain values, [slot A, slot B]
    pub fn fade_values(&self) -> Option<[f32; 2]> {
        let core = self.core();
        core.graph.as_ref().map(|graph| {
            [
                graph.fade_value(SourceSlot::A),
                graph.fade_value(SourceSlot::B),
            ]
        })
    }

    /// Fade node generations, [slot A, slot B]; change on force-replace
    pub fn fade_generations(&self) -> Option<[u64; 2]> {
        let core = self.core();
        core.graph.as_ref().map(|graph| {
            [
                graph.fade_generation(SourceSlot::A),
                graph.fade_generation(SourceSlot::B),
            ]
        })
    }

    /// Active stage names from chain input to destination
    pub fn graph_topology(&self) -> Vec<&'static str> {
        self.core()
            .graph
            .as_ref()
            .map(lyra_audio::AudioGraph::topology)
            .unwrap_or_default()
    }

    /// The audible element slot (0 or 1)
    pub fn primary_slot_index(&self) -> usize {
        self.core().primary_index
    }

    /// Sample rate, latency mode and generation of the live context
    pub fn audio_context_info(&self) -> Option<(u32, LatencyMode, u64)> {
        let core = self.core();
        core.graph.as_ref().map(|graph| {
            let ctx = graph.context();
            (ctx.sample_rate(), ctx.latency(), ctx.generation())
        })
    }

    /// Description of the active EQ chain (for the visualizer overlay)
    pub fn eq_filters(&self) -> Vec<ParametricBand> {
        use lyra_audio::EqStage;
        use lyra_storage::BandKind;

        let core = self.core();
        match core.graph.as_ref().and_then(|graph| graph.eq_stage()) {
            Some(EqStage::Parametric(_)) => core.state.parametric_eq.bands.clone(),
            Some(EqStage::Graphic(_)) => {
                lyra_audio::effects::GRAPHIC_EQ_FREQUENCIES
                    .iter()
                    .enumerate()
                    .map(|(i, freq)| ParametricBand {
                        kind: match i {
                            0 => BandKind::Lowshelf,
                            9 => BandKind::Highshelf,
                            _ => BandKind::Peaking,
                        },
                        frequency: f64::from(*freq),
                        q: if (1..=8).contains(&i) { 1.4 } else { 0.707 },
                        gain: core.state.eq.gains[i],
                    })
                    .collect()
            }
            None => Vec::new(),
        }
    }

    // ===== Media events =====

    /// Route an event the host observed on one of its media elements
    ///
    /// The first check is the primary-slot guard: an event from the
    /// non-primary element (e.g. one that just finished a crossfade) is
    /// dropped before it can touch observable state.
    pub async fn handle_media_event(&self, slot: usize, event: MediaEvent) {
        {
            let core = self.core();
            if slot != core.primary_index {
                return;
            }
        }

        match event {
            MediaEvent::TimeUpdate => self.handle_time_update(slot).await,
            MediaEvent::Ended => self.handle_track_ended().await,
            MediaEvent::Error(message) => self.handle_media_error(message).await,
            MediaEvent::CanPlay => {
                let mut core = self.core();
                core.waiting_seq += 1;
                if core.state.is_loading {
                    core.state.is_loading = false;
                    self.publish(&mut core);
                }
            }
            MediaEvent::Waiting => self.debounce_loading(slot),
            MediaEvent::Playing => {
                let mut core = self.core();
                if !core.state.is_playing {
                    core.state.is_playing = true;
                    core.state.is_paused = false;
                    self.publish(&mut core);
                }
            }
            MediaEvent::LoadedMetadata => {
                let mut core = self.core();
                core.state.duration = self.element(slot).duration();
                self.publish(&mut core);
            }
        }
    }

    async fn handle_time_update(&self, slot: usize) {
        let mut start_crossfade = false;
        let mut populate = false;
        {
            let mut core = self.core();
            let element = self.element(slot);
            core.state.current_time = element.current_time();
            core.state.duration = element.duration();
            core.state.buffered = element.buffered_end();

            self.inner.deps.media_session.set_position(
                core.state.current_time,
                core.state.duration,
                effective_rate(&core),
            );

            // Crossfade trigger window
            if core.state.fx.crossfade.enabled
                && !core.crossfade.in_progress
                && !core.crossfade.seek_lockout
                && crate::crossfade::should_trigger(
                    core.state.duration,
                    core.state.current_time,
                    core.state.fx.crossfade.duration,
                )
            {
                core.crossfade.seek_lockout = true;
                core.crossfade.in_progress = true;
                start_crossfade = true;
            }

            // SCA keeps the tail stocked
            if core.queue.sca_enabled()
                && !core.state.temp_queue_mode
                && core.queue.remaining_tail() < SCA_TAIL_THRESHOLD
                && !core.sca_populate_pending
            {
                core.sca_populate_pending = true;
                populate = true;
            }

            self.publish(&mut core);
        }

        if start_crossfade {
            let engine = self.clone();
            tokio::spawn(async move { engine.run_crossfade().await });
        }
        if populate {
            let engine = self.clone();
            tokio::spawn(async move { engine.populate_sca_tail().await });
        }
    }

    /// Surface `is-loading` only after 300 ms of stalled playback
    fn debounce_loading(&self, slot: usize) {
        let seq = {
            let mut core = self.core();
            core.waiting_seq += 1;
            core.waiting_seq
        };

        let engine = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(LOADING_DEBOUNCE_MS)).await;
            let mut core = engine.core();
            if core.waiting_seq == seq && slot == core.primary_index && !core.state.is_loading {
                core.state.is_loading = true;
                engine.publish(&mut core);
            }
        });
    }
}

/// Playback rate as the media session should report it
fn effective_rate(core: &EngineCore) -> f64 {
    if core.state.fx.tempo.enabled {
        core.state.fx.tempo.rate
    } else {
        1.0
    }
}
