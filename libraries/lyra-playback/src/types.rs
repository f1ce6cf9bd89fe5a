//! Observable player state and engine events

use lyra_core::types::{PlayMode, Song, SongId};
use lyra_storage::{AudioFxSettings, EqSettings, ParametricEqState};
use serde::Serialize;

/// The single observable state object the UI renders from
///
/// Published through a `tokio::sync::watch` channel; every clone is a
/// coherent snapshot taken between suspension points.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerState {
    pub current_song: Option<Song>,

    pub is_playing: bool,
    pub is_paused: bool,
    pub is_loading: bool,

    /// Seconds into the current song
    pub current_time: f64,
    /// Current song duration in seconds
    pub duration: f64,
    /// Buffered end position in seconds
    pub buffered: f64,

    /// User volume, 0..1
    pub volume: f64,
    pub muted: bool,

    pub queue: Vec<Song>,
    pub queue_index: usize,
    /// Bumped on every structural queue mutation
    pub queue_version: u64,
    pub play_mode: PlayMode,
    pub sca_enabled: bool,
    pub temp_queue_mode: bool,

    /// One-sentence error for the UI, cleared by the next successful play
    pub error: Option<String>,

    /// The authoritative queue has been loaded from the server
    pub server_loaded: bool,

    /// Effect parameter blocks
    pub fx: AudioFxSettings,
    pub eq: EqSettings,
    pub parametric_eq: ParametricEqState,

    /// Sleep timer expiry, epoch ms; None while inactive
    pub sleep_timer_end_time: Option<i64>,

    /// Always prefer the low-latency context
    pub low_latency_always: bool,
}

/// Events broadcast alongside the state channel
///
/// `SourceChanged` is the visualizer's cue to re-acquire the input node
/// after a source swap or context rebuild.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    SourceChanged {
        version: u64,
    },
    TrackChanged {
        uuid: SongId,
        previous: Option<SongId>,
    },
    CrossfadeStarted {
        from: SongId,
        to: SongId,
        duration: f64,
    },
    CrossfadeCompleted,
    CrossfadeCancelled,
    QueueItemsRestored {
        len: usize,
        index: usize,
    },
    TempQueueExited,
    SleepTimerFired,
}
