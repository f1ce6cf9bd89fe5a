//! Collaborator interfaces for the playback engine
//!
//! The engine reaches its environment exclusively through these traits:
//! the catalog/queue server, the audio URL resolver, the offline layer,
//! and the host media session. Implementations live out of tree (HTTP
//! client, service worker cache, platform shell); the engine catches every
//! error at this boundary and never re-throws it across the façade.

use crate::error::RepositoryError;
use crate::types::{PlayMode, PlaylistId, Song, SongId, SongKind, SortField, SortOrder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Result type for repository calls
pub type RepoResult<T> = std::result::Result<T, RepositoryError>;

/// Authoritative queue state as the server reports it
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueListResponse {
    /// Queue items in play order
    pub items: Vec<Song>,

    /// 0-based position of the current song
    #[serde(default)]
    pub queue_index: usize,

    /// Server-side radio auto-population active
    #[serde(default)]
    pub sca_enabled: bool,

    /// Persisted play mode, when the server tracks one
    #[serde(default)]
    pub play_mode: Option<PlayMode>,
}

/// One page of songs from a cursor-paged listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SongPage {
    pub items: Vec<Song>,

    #[serde(default)]
    pub next_cursor: Option<String>,

    #[serde(default)]
    pub has_more: bool,
}

/// Result of starting an SCA/radio session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScaResponse {
    /// The freshly composed queue
    pub queue: Vec<Song>,

    #[serde(default)]
    pub session_id: Option<String>,

    /// Seed uuid the session was grown from, when applicable
    #[serde(default)]
    pub seed: Option<SongId>,
}

/// Source tag attached to history records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistorySource {
    Queue,
    Sca,
    Radio,
}

/// Catalog, queue, preferences, history, SCA and playlist services
///
/// One narrow interface to everything server-side. Every method is a
/// suspension point for the engine.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    // Queue operations

    /// Fetch the authoritative queue state
    async fn queue_list(&self, limit: Option<usize>) -> RepoResult<QueueListResponse>;

    /// Append songs by uuid
    async fn queue_add(&self, uuids: &[SongId]) -> RepoResult<()>;

    /// Remove songs by position
    async fn queue_remove(&self, positions: &[usize]) -> RepoResult<()>;

    /// Persist the current queue index
    async fn queue_set_index(&self, index: usize) -> RepoResult<()>;

    /// Move one song
    async fn queue_reorder(&self, from: usize, to: usize) -> RepoResult<()>;

    /// Move a set of songs to a target position, preserving relative order
    async fn queue_reorder_batch(&self, indices: &[usize], to: usize) -> RepoResult<()>;

    /// Clear the queue
    async fn queue_clear(&self) -> RepoResult<()>;

    /// Ask the server to sort the queue
    async fn queue_sort(&self, field: SortField, order: SortOrder) -> RepoResult<()>;

    /// Add every song under a catalog path
    async fn queue_add_by_path(&self, path: &str) -> RepoResult<()>;

    /// Add every song matching a filter expression
    async fn queue_add_by_filter(&self, filter: &str) -> RepoResult<()>;

    /// Add a playlist's songs, optionally shuffled server-side
    async fn queue_add_by_playlist(&self, id: &PlaylistId, shuffle: bool) -> RepoResult<()>;

    /// Save the current queue as a playlist
    async fn queue_save_as_playlist(
        &self,
        name: &str,
        description: Option<&str>,
        public: bool,
    ) -> RepoResult<PlaylistId>;

    // Preferences

    /// Fetch server-side preferences as an opaque JSON object
    async fn preferences_get(&self) -> RepoResult<serde_json::Value>;

    /// Patch server-side preferences
    async fn preferences_set(&self, patch: &serde_json::Value) -> RepoResult<()>;

    // History

    /// Record a playback history event (fire-and-forget on the engine side)
    async fn history_record(
        &self,
        uuid: &SongId,
        seconds_played: f64,
        was_skipped: bool,
        source: HistorySource,
    ) -> RepoResult<()>;

    // SCA / radio

    /// Start SCA seeded from the current queue
    async fn sca_start_from_queue(&self) -> RepoResult<ScaResponse>;

    /// Start SCA seeded from a playlist
    async fn sca_start_from_playlist(&self, id: &PlaylistId) -> RepoResult<ScaResponse>;

    /// Stop the SCA session
    async fn sca_stop(&self) -> RepoResult<()>;

    /// Ask the server to append up to `n` more songs to the queue tail
    async fn sca_populate_queue(&self, n: usize) -> RepoResult<Vec<Song>>;

    /// Start a radio session from an optional seed and/or filter
    async fn radio_start(&self, seed: Option<&SongId>, filter: Option<&str>)
        -> RepoResult<ScaResponse>;

    // Songs / playlists

    /// Page through songs under a catalog path
    async fn songs_by_path(
        &self,
        path: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> RepoResult<SongPage>;

    /// Fetch songs matching a filter expression
    async fn songs_by_filter(&self, filter: &str) -> RepoResult<Vec<Song>>;

    /// Fetch a single song record
    async fn songs_get(&self, uuid: &SongId) -> RepoResult<Song>;

    /// Page through a playlist's songs
    async fn playlists_get_songs(
        &self,
        id: &PlaylistId,
        cursor: Option<&str>,
        limit: usize,
    ) -> RepoResult<SongPage>;
}

/// Resolves a song to something the host media element can load
#[async_trait]
pub trait AudioUrlResolver: Send + Sync {
    /// URL of a locally-cached copy, when one exists
    async fn get_audio_url(&self, uuid: &SongId) -> Option<String>;

    /// Streaming URL for the given codec hint
    async fn get_stream_url(&self, uuid: &SongId, kind: SongKind) -> String;
}

/// Offline layer state the engine consults before resolving URLs
pub trait OfflineState: Send + Sync {
    /// User has forced offline mode
    fn work_offline_mode(&self) -> bool;

    /// The network is reachable
    fn is_online(&self) -> bool;

    /// Set of song uuids with a complete local copy
    fn offline_song_uuids(&self) -> HashSet<SongId>;

    /// Last time the queue finished syncing to the server, epoch ms
    fn last_queue_sync_time(&self) -> i64;

    /// Whether a song must come from the local cache right now
    fn offline_required(&self) -> bool {
        self.work_offline_mode() || !self.is_online()
    }
}

/// Playback state mirrored to the host media session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPlaybackState {
    None,
    Playing,
    Paused,
}

/// Host media-session surface
///
/// The engine pushes metadata and position; the host wires the session's
/// action handlers (play/pause/next/...) back to engine operations itself.
pub trait MediaSessionAdapter: Send + Sync {
    /// Update the now-playing metadata
    fn set_metadata(&self, song: &Song);

    /// Update the position state (position and duration in seconds)
    fn set_position(&self, position: f64, duration: f64, rate: f64);

    /// Update the playback state
    fn set_playback_state(&self, state: SessionPlaybackState);
}

/// Document visibility as the host reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
}

/// Host visibility probe, consulted by the sleep timer at expiry
pub trait VisibilityProvider: Send + Sync {
    fn visibility(&self) -> Visibility;
}
