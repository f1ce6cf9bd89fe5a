//! Audio context: sample clock and latency modes
//!
//! The context is exclusive to the engine. A rebuild closes the old
//! context (releasing every node built on it) and constructs a fresh one;
//! nodes are never migrated between contexts.

/// Preferred latency for the processing context
///
/// `Interactive` keeps blocks small so an external visualizer stays in
/// sync with the audio clock; `Playback` trades latency for fewer wakeups
/// and is the default for non-visualizer sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LatencyMode {
    Interactive,
    #[default]
    Playback,
}

impl LatencyMode {
    /// Render quantum in frames for this mode
    pub fn block_frames(self) -> usize {
        match self {
            LatencyMode::Interactive => 128,
            LatencyMode::Playback => 2048,
        }
    }
}

/// The processing context
///
/// Owns the sample clock; all parameter automation is scheduled against
/// `current_time()`. Each context carries a generation number so the
/// engine can tell whether a node handle survived a rebuild.
#[derive(Debug, Clone)]
pub struct AudioContext {
    sample_rate: u32,
    latency: LatencyMode,
    frames_processed: u64,
    generation: u64,
}

impl AudioContext {
    /// Create a context with the given sample rate and latency hint
    pub fn new(sample_rate: u32, latency: LatencyMode, generation: u64) -> Self {
        Self {
            sample_rate,
            latency,
            frames_processed: 0,
            generation,
        }
    }

    /// Sample rate in Hz
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Latency mode the context was created with
    pub fn latency(&self) -> LatencyMode {
        self.latency
    }

    /// Context generation (bumped on every rebuild)
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Current time on the sample clock, in seconds
    pub fn current_time(&self) -> f64 {
        self.frames_processed as f64 / self.sample_rate as f64
    }

    /// Duration of one render quantum, in seconds
    pub fn block_time(&self) -> f64 {
        self.latency.block_frames() as f64 / self.sample_rate as f64
    }

    /// Advance the sample clock by `frames`
    pub fn advance(&mut self, frames: usize) {
        self.frames_processed += frames as u64;
    }
}

impl Default for AudioContext {
    fn default() -> Self {
        Self::new(44100, LatencyMode::default(), 0)
    }
}
