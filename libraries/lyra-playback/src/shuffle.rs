//! Shuffle history and random pick
//!
//! Shuffle picks uniformly over the queue excluding the current index;
//! the history records visited uuids (bounded to 50, persisted) so that
//! "previous" can retrace the random walk.

use lyra_core::types::SongId;
use rand::Rng;
use std::collections::VecDeque;

/// Maximum retained history entries
pub const SHUFFLE_HISTORY_LIMIT: usize = 50;

/// Bounded uuid history for shuffle retracing
#[derive(Debug, Clone, Default)]
pub struct ShuffleHistory {
    entries: VecDeque<SongId>,
}

impl ShuffleHistory {
    /// Create an empty history
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from persisted uuids (oldest first)
    pub fn from_entries(entries: Vec<SongId>) -> Self {
        let mut history = Self::new();
        for entry in entries {
            history.push(entry);
        }
        history
    }

    /// Record a visited song; the oldest entry falls off past the limit
    pub fn push(&mut self, uuid: SongId) {
        if self.entries.len() >= SHUFFLE_HISTORY_LIMIT {
            self.entries.pop_front();
        }
        self.entries.push_back(uuid);
    }

    /// Pop the most recent entry
    pub fn pop(&mut self) -> Option<SongId> {
        self.entries.pop_back()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the history is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Entries oldest-first, for persistence
    pub fn to_vec(&self) -> Vec<SongId> {
        self.entries.iter().cloned().collect()
    }
}

/// Uniformly random queue index excluding the current one
///
/// `None` when the queue has fewer than two songs; shuffle never
/// triggers a transition on a single-song queue.
pub fn pick_shuffle_index<R: Rng>(len: usize, exclude: usize, rng: &mut R) -> Option<usize> {
    if len < 2 {
        return None;
    }

    let pick = rng.gen_range(0..len - 1);
    Some(if pick >= exclude { pick + 1 } else { pick })
}
