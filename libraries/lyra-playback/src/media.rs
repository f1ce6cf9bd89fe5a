//! Host media element abstraction
//!
//! The host platform owns decoding and the two media elements; the
//! engine drives them through this trait and receives their events
//! tagged with the originating slot. Two elements always exist so the
//! non-primary one can preload the next track for gapless playback.
//!
//! Every engine event handler starts by verifying the event came from
//! the currently-primary slot; stale events from an element that just
//! finished a crossfade are dropped on that first line.

use async_trait::async_trait;

/// One of the two host media elements
#[async_trait]
pub trait MediaElement: Send + Sync {
    /// Assign a source URL (implicitly starts loading)
    fn assign_source(&self, url: &str);

    /// Release the current source
    fn clear_source(&self);

    /// The assigned source URL, if any
    fn current_source(&self) -> Option<String>;

    /// Start playback
    ///
    /// # Errors
    /// The platform's media error string on decode/network failure.
    async fn play(&self) -> std::result::Result<(), String>;

    /// Pause playback
    fn pause(&self);

    /// Whether the element is paused
    fn is_paused(&self) -> bool;

    /// Set the element volume (0..1)
    fn set_volume(&self, volume: f64);

    /// Current element volume
    fn volume(&self) -> f64;

    /// Set the playback rate; `preserve_pitch` engages the host's
    /// pitch-corrected time stretch
    fn set_playback_rate(&self, rate: f64, preserve_pitch: bool);

    /// Current playback position in seconds
    fn current_time(&self) -> f64;

    /// Seek to a position in seconds
    fn set_current_time(&self, seconds: f64);

    /// Media duration in seconds (0 while unknown)
    fn duration(&self) -> f64;

    /// End of the buffered range in seconds
    fn buffered_end(&self) -> f64;

    /// Resolve when the element can play through
    ///
    /// # Errors
    /// The media error string when loading fails instead.
    async fn wait_can_play(&self) -> std::result::Result<(), String>;

    /// Resolve when metadata (duration) is known
    ///
    /// # Errors
    /// The media error string when loading fails instead.
    async fn wait_metadata(&self) -> std::result::Result<(), String>;
}

/// Events the host forwards from its media elements
#[derive(Debug, Clone, PartialEq)]
pub enum MediaEvent {
    /// Periodic position update
    TimeUpdate,
    /// Playback reached the end of the source
    Ended,
    /// Enough data to play
    CanPlay,
    /// Stalled waiting for data
    Waiting,
    /// Playback actually started/resumed
    Playing,
    /// Decode or network failure
    Error(String),
    /// Duration and codec metadata available
    LoadedMetadata,
}
