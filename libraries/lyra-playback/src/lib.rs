//! Lyra - Playback Engine
//!
//! The playback engine of the Lyra music player: the queue state machine
//! (with shuffle history and the temp-queue overlay), the dual-source
//! pipeline for gapless and crossfaded playback, effect parameter
//! control, the sleep timer, and a single observable façade for the UI.
//!
//! # Architecture
//!
//! The engine is platform-agnostic: the host supplies two media elements
//! (decoding, output), a catalog repository (server), URL resolution,
//! offline state, persistence, and visibility, all behind traits in
//! `lyra-core` and `lyra-storage`. DSP lives in `lyra-audio`; this crate
//! orchestrates it.
//!
//! # Example
//!
//! ```rust,ignore
//! use lyra_playback::{EngineDeps, PlayerEngine};
//!
//! let engine = PlayerEngine::new(deps);
//! engine.initialize().await;
//!
//! let mut state = engine.subscribe_state();
//! engine.play_at_index(0).await;
//! engine.set_crossfade_enabled(true).await;
//! ```

pub mod crossfade;
pub mod engine;
pub mod error;
pub mod media;
pub mod queue;
pub mod shuffle;
pub mod sleep_timer;
pub mod types;

pub use engine::{EngineDeps, PlayerEngine};
pub use error::{PlaybackError, Result};
pub use media::{MediaElement, MediaEvent};
pub use queue::{NextIndex, QueueMachine};
pub use shuffle::{ShuffleHistory, SHUFFLE_HISTORY_LIMIT};
pub use types::{EngineEvent, PlayerState};
