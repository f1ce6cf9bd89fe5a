//! Lyra - Audio Graph
//!
//! Graph primitives and effects DSP for the Lyra playback engine.
//!
//! This crate provides:
//! - An audio context with a sample clock and latency modes
//! - The processing graph (single-source and dual-source topologies)
//! - Gain parameters with value-curve automation and the automation lock
//! - Effects: graphic/parametric EQ, crossfeed, loudness compensation,
//!   comfort noise, ReplayGain math
//!
//! # Architecture
//!
//! The host platform decodes audio and owns the output device; this crate
//! only shapes PCM. The host audio callback feeds the one or two source
//! streams into [`graph::AudioGraph::process_block`], which routes them
//! through ReplayGain and fade gains, the mixer, and the enabled effect
//! stages, in the fixed topology order:
//!
//! ```text
//! source0 -> rg0 -> fade0 \
//!                          mixer -> [loudness] -> [EQ] -> [preamp]
//! source1 -> rg1 -> fade1 /          -> [crossfeed] -> [noise] -> out
//! ```
//!
//! All processing is in-place on interleaved stereo `f32` buffers, no
//! allocation after construction.

pub mod context;
pub mod effects;
pub mod error;
pub mod graph;
pub mod params;
pub mod replaygain;

pub use context::{AudioContext, LatencyMode};
pub use error::{AudioError, Result};
pub use graph::{AnalyserTap, AudioGraph, EqStage, GraphConfig, SourceSlot};
pub use params::GainParam;
