//! Queue state machine
//!
//! The ordered song list, the current index, the play mode, and the
//! version counter the UI re-renders on. Mutations here are local; the
//! engine decides whether a change also goes to the server (normal mode)
//! or only to the temp-queue snapshot.
//!
//! Invariant: while the queue is non-empty, `0 <= index < len` and the
//! current song is `items[index]`. Every structural mutation bumps the
//! version.

use lyra_core::types::{PlayMode, RepeatMode, Song, SongId, SortField, SortOrder};
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::cmp::Ordering;

/// Where `next` lands when advancing past the current song
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextIndex {
    /// Play this index next
    Index(usize),
    /// Past the end without repeat-all: stop (or ask SCA to populate)
    EndOfQueue,
}

/// The live queue
#[derive(Debug, Clone, Default)]
pub struct QueueMachine {
    items: Vec<Song>,
    index: usize,
    version: u64,
    play_mode: PlayMode,
    sca_enabled: bool,
}

impl QueueMachine {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Accessors =====

    /// Songs in play order
    pub fn items(&self) -> &[Song] {
        &self.items
    }

    /// Number of songs
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Current index
    pub fn index(&self) -> usize {
        self.index
    }

    /// Version counter
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Current play mode
    pub fn play_mode(&self) -> PlayMode {
        self.play_mode
    }

    /// SCA (radio) auto-population flag
    pub fn sca_enabled(&self) -> bool {
        self.sca_enabled
    }

    /// The current song, if the queue is non-empty
    pub fn current_song(&self) -> Option<&Song> {
        self.items.get(self.index)
    }

    /// Song at an index
    pub fn get(&self, index: usize) -> Option<&Song> {
        self.items.get(index)
    }

    /// First position of a uuid
    pub fn position_of(&self, uuid: &SongId) -> Option<usize> {
        self.items.iter().position(|song| &song.uuid == uuid)
    }

    // ===== Mode =====

    /// Set the play mode directly
    pub fn set_play_mode(&mut self, mode: PlayMode) {
        self.play_mode = mode;
    }

    /// Apply the shuffle toggle; enabling clears any repeat mode
    pub fn set_shuffle(&mut self, shuffle: bool) {
        self.play_mode = if shuffle {
            PlayMode::Shuffle
        } else if self.play_mode == PlayMode::Shuffle {
            PlayMode::Sequential
        } else {
            self.play_mode
        };
    }

    /// Apply the repeat toggle; any repeat clears shuffle
    pub fn set_repeat(&mut self, repeat: RepeatMode) {
        self.play_mode = PlayMode::from_toggles(false, repeat);
    }

    /// Set the SCA flag
    pub fn set_sca_enabled(&mut self, enabled: bool) {
        self.sca_enabled = enabled;
    }

    // ===== Structural mutations (all bump the version) =====

    fn bump(&mut self) {
        self.version += 1;
    }

    fn clamp_index(&mut self) {
        if self.items.is_empty() {
            self.index = 0;
        } else if self.index >= self.items.len() {
            self.index = self.items.len() - 1;
        }
    }

    /// Replace the whole queue
    pub fn set_items(&mut self, items: Vec<Song>, index: usize) {
        self.items = items;
        self.index = index;
        self.clamp_index();
        self.bump();
    }

    /// Move the current index
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
        self.clamp_index();
        self.bump();
    }

    /// Append songs to the tail
    pub fn append(&mut self, songs: Vec<Song>) {
        self.items.extend(songs);
        self.bump();
    }

    /// Remove one song; the current index follows its song
    pub fn remove(&mut self, index: usize) -> Option<Song> {
        if index >= self.items.len() {
            return None;
        }

        let removed = self.items.remove(index);
        if index < self.index {
            self.index -= 1;
        }
        self.clamp_index();
        self.bump();
        Some(removed)
    }

    /// Remove a batch of positions
    pub fn remove_batch(&mut self, indices: &[usize]) {
        let mut sorted: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|i| *i < self.items.len())
            .collect();
        sorted.sort_unstable();
        sorted.dedup();

        for &index in sorted.iter().rev() {
            self.items.remove(index);
            if index < self.index {
                self.index -= 1;
            }
        }
        self.clamp_index();
        self.bump();
    }

    /// Move one song from `from` to `to`; the current index follows
    pub fn reorder(&mut self, from: usize, to: usize) {
        let len = self.items.len();
        if from >= len || to >= len || from == to {
            return;
        }

        let song = self.items.remove(from);
        self.items.insert(to, song);

        if self.index == from {
            self.index = to;
        } else if from < self.index && self.index <= to {
            self.index -= 1;
        } else if to <= self.index && self.index < from {
            self.index += 1;
        }
        self.bump();
    }

    /// Move a set of positions to a target index, preserving their
    /// relative order; the current song's index follows it
    pub fn reorder_batch(&mut self, indices: &[usize], to: usize) {
        let len = self.items.len();
        let mut moved: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|i| *i < len)
            .collect();
        moved.sort_unstable();
        moved.dedup();
        if moved.is_empty() {
            return;
        }

        let current_in_moved = moved.iter().position(|&i| i == self.index);

        // Extract the moved block in order
        let mut block = Vec::with_capacity(moved.len());
        for &index in moved.iter().rev() {
            block.push(self.items.remove(index));
        }
        block.reverse();

        // The insertion point shifts by how many moved items sat before it
        let removed_before_target = moved.iter().filter(|&&i| i < to).count();
        let insert_at = to
            .saturating_sub(removed_before_target)
            .min(self.items.len());

        for (offset, song) in block.into_iter().enumerate() {
            self.items.insert(insert_at + offset, song);
        }

        self.index = match current_in_moved {
            Some(pos) => insert_at + pos,
            None => {
                // Count moved items that sat before the current song, then
                // re-add the block if it landed at or before it
                let removed_before_current =
                    moved.iter().filter(|&&i| i < self.index).count();
                let mut adjusted = self.index - removed_before_current;
                if insert_at <= adjusted {
                    adjusted += moved.len();
                }
                adjusted
            }
        };
        self.clamp_index();
        self.bump();
    }

    /// Clear the queue
    pub fn clear(&mut self) {
        self.items.clear();
        self.index = 0;
        self.bump();
    }

    /// Sort the queue; the index resets to 0 afterwards
    pub fn sort(&mut self, field: SortField, order: SortOrder) {
        match field {
            SortField::Random => {
                self.items.shuffle(&mut thread_rng());
            }
            _ => {
                self.items.sort_by(|a, b| {
                    let ordering = compare_songs(a, b, field);
                    match order {
                        SortOrder::Ascending => ordering,
                        SortOrder::Descending => ordering.reverse(),
                    }
                });
            }
        }
        self.index = 0;
        self.bump();
    }

    // ===== Navigation =====

    /// The next index under the current play mode, sequential policy
    ///
    /// Shuffle picks are made by the caller (they need the history);
    /// this handles repeat-one, wrap under repeat-all, and end-of-queue.
    pub fn next_sequential_index(&self) -> NextIndex {
        if self.items.is_empty() {
            return NextIndex::EndOfQueue;
        }

        match self.play_mode {
            PlayMode::RepeatOne => NextIndex::Index(self.index),
            PlayMode::RepeatAll => NextIndex::Index((self.index + 1) % self.items.len()),
            PlayMode::Sequential | PlayMode::Shuffle => {
                if self.index + 1 < self.items.len() {
                    NextIndex::Index(self.index + 1)
                } else {
                    NextIndex::EndOfQueue
                }
            }
        }
    }

    /// The previous index under the current play mode
    ///
    /// Wraps under repeat-all; `None` means "restart the current song".
    pub fn previous_sequential_index(&self) -> Option<usize> {
        if self.items.is_empty() {
            return None;
        }

        if self.index > 0 {
            Some(self.index - 1)
        } else if self.play_mode == PlayMode::RepeatAll {
            Some(self.items.len() - 1)
        } else {
            None
        }
    }

    /// Gapless preload target: the queue's next index
    pub fn preload_index(&self) -> Option<usize> {
        match self.next_sequential_index() {
            NextIndex::Index(index) => Some(index),
            NextIndex::EndOfQueue => None,
        }
    }

    /// Songs remaining after the current one (SCA pre-population check)
    pub fn remaining_tail(&self) -> usize {
        self.items.len().saturating_sub(self.index + 1)
    }
}

fn compare_songs(a: &Song, b: &Song, field: SortField) -> Ordering {
    match field {
        SortField::Artist => a.artist.to_lowercase().cmp(&b.artist.to_lowercase()),
        SortField::Album => a
            .album
            .as_deref()
            .unwrap_or("")
            .to_lowercase()
            .cmp(&b.album.as_deref().unwrap_or("").to_lowercase()),
        SortField::Track => a.track_position().cmp(&b.track_position()),
        SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortField::Year => a.year.unwrap_or(0).cmp(&b.year.unwrap_or(0)),
        SortField::Duration => a
            .duration_secs
            .partial_cmp(&b.duration_secs)
            .unwrap_or(Ordering::Equal),
        SortField::Random => Ordering::Equal,
    }
}
