//! Lyra - Settings and Snapshot Persistence
//!
//! Device-local persistence for the playback engine:
//! - Typed settings blocks (volume, EQ, audio effects, shuffle history)
//!   serialized as self-describing JSON records over a narrow key-value
//!   contract
//! - The temp-queue snapshot in a structured store suitable for larger
//!   sequences
//!
//! Unknown keys and malformed values fall back to defaults: a settings
//! read never fails the engine.

pub mod error;
pub mod keyvalue;
pub mod settings;
pub mod snapshot;

pub use error::{Result, StorageError};
pub use keyvalue::{JsonFileStore, KeyValueStore, MemoryKeyValueStore};
pub use settings::{
    AudioFxSettings, BandKind, CrossfadeSettings, CrossfeedFxSettings, EqSettings,
    GaplessSettings, LoudnessSettings, NoiseSettings, ParametricBand, ParametricEqState,
    PlayerLocalSettings, ReplayGainSettings, SettingsStore, SleepTimerMode,
    SleepTimerSettings, TempoSettings,
};
pub use snapshot::{MemorySnapshotStore, SnapshotStore, TempQueueSnapshot, TempQueueState};
