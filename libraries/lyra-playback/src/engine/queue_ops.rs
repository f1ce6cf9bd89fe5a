//! Queue operations, temp-queue overlay, SCA and focus refresh
//!
//! Every mutating operation dispatches at the top on `temp_queue_mode`:
//! the normal branch delegates to the server and reloads the
//! authoritative state, the temp branch mutates the in-memory queue and
//! persists the overlay snapshot. Both share the autoplay rule: adding
//! to an empty queue starts playback at index 0.

use super::{PlayerEngine, SCA_POPULATE_COUNT};
use crate::types::EngineEvent;
use lyra_core::repository::ScaResponse;
use lyra_core::types::{PlaylistId, RepeatMode, Song, SongId, SortField, SortOrder};
use lyra_storage::TempQueueSnapshot;
use rand::seq::SliceRandom;

/// Page size for temp-mode catalog fetches
const FETCH_PAGE_SIZE: usize = 200;

/// Upper bound on pages per fetch (runaway-cursor guard)
const FETCH_PAGE_LIMIT: usize = 50;

/// Focus refresh / temp-exit cooldown window, ms
const FOCUS_COOLDOWN_MS: i64 = 5000;

impl PlayerEngine {
    // ===== Queue loading =====

    /// Reload the authoritative queue from the server
    pub async fn reload_queue(&self) {
        {
            self.core().syncing_queue = true;
        }
        let result = self.inner.deps.repo.queue_list(None).await;

        let mut core = self.core();
        core.syncing_queue = false;
        match result {
            Ok(response) => {
                core.queue.set_items(response.items, response.queue_index);
                core.queue.set_sca_enabled(response.sca_enabled);
                core.state.server_loaded = true;
                if !core.state.is_playing {
                    core.state.current_song = core.queue.current_song().cloned();
                }
                self.publish(&mut core);
            }
            Err(err) => {
                tracing::warn!(%err, "queue reload failed");
            }
        }
    }

    // ===== Adding =====

    /// Append songs; `play_now` jumps to the first added song
    pub async fn add_to_queue(&self, songs: Vec<Song>, play_now: bool) {
        if songs.is_empty() {
            return;
        }

        let temp = self.core().state.temp_queue_mode;
        let (was_empty, insert_at) = {
            let core = self.core();
            (core.queue.is_empty(), core.queue.len())
        };

        if temp {
            {
                let mut core = self.core();
                core.queue.append(songs);
                self.publish(&mut core);
            }
            self.save_temp_queue_snapshot().await;
        } else {
            let uuids: Vec<SongId> = songs.iter().map(|song| song.uuid.clone()).collect();
            if let Err(err) = self.inner.deps.repo.queue_add(&uuids).await {
                tracing::warn!(%err, "queue add failed");
                return;
            }
            self.reload_queue().await;
        }

        if play_now {
            self.play_at_index(insert_at).await;
        } else if was_empty {
            self.play_at_index(0).await;
        }
    }

    /// Add every song under a catalog path
    pub async fn add_by_path(&self, path: &str) {
        if self.core().state.temp_queue_mode {
            let songs = self.fetch_all_by_path(path).await;
            self.add_to_queue(songs, false).await;
        } else {
            let was_empty = self.core().queue.is_empty();
            if let Err(err) = self.inner.deps.repo.queue_add_by_path(path).await {
                tracing::warn!(%err, path, "add by path failed");
                return;
            }
            self.reload_queue().await;
            self.autoplay_after_add(was_empty).await;
        }
    }

    /// Add every song matching a filter expression
    pub async fn add_by_filter(&self, filter: &str) {
        if self.core().state.temp_queue_mode {
            let songs = self
                .inner
                .deps
                .repo
                .songs_by_filter(filter)
                .await
                .unwrap_or_default();
            self.add_to_queue(songs, false).await;
        } else {
            let was_empty = self.core().queue.is_empty();
            if let Err(err) = self.inner.deps.repo.queue_add_by_filter(filter).await {
                tracing::warn!(%err, "add by filter failed");
                return;
            }
            self.reload_queue().await;
            self.autoplay_after_add(was_empty).await;
        }
    }

    /// Add a playlist's songs, optionally shuffled
    pub async fn add_by_playlist(&self, id: &PlaylistId, shuffle: bool) {
        if self.core().state.temp_queue_mode {
            let mut songs = self.fetch_all_by_playlist(id).await;
            if shuffle {
                songs.shuffle(&mut rand::thread_rng());
            }
            self.add_to_queue(songs, false).await;
        } else {
            let was_empty = self.core().queue.is_empty();
            if let Err(err) = self
                .inner
                .deps
                .repo
                .queue_add_by_playlist(id, shuffle)
                .await
            {
                tracing::warn!(%err, "add by playlist failed");
                return;
            }
            self.reload_queue().await;
            self.autoplay_after_add(was_empty).await;
        }
    }

    async fn autoplay_after_add(&self, was_empty: bool) {
        let has_items = !self.core().queue.is_empty();
        if was_empty && has_items {
            self.play_at_index(0).await;
        }
    }

    async fn fetch_all_by_path(&self, path: &str) -> Vec<Song> {
        let mut songs = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..FETCH_PAGE_LIMIT {
            match self
                .inner
                .deps
                .repo
                .songs_by_path(path, cursor.as_deref(), FETCH_PAGE_SIZE)
                .await
            {
                Ok(page) => {
                    songs.extend(page.items);
                    if !page.has_more || page.next_cursor.is_none() {
                        break;
                    }
                    cursor = page.next_cursor;
                }
                Err(err) => {
                    tracing::warn!(%err, path, "path fetch failed");
                    break;
                }
            }
        }
        songs
    }

    async fn fetch_all_by_playlist(&self, id: &PlaylistId) -> Vec<Song> {
        let mut songs = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..FETCH_PAGE_LIMIT {
            match self
                .inner
                .deps
                .repo
                .playlists_get_songs(id, cursor.as_deref(), FETCH_PAGE_SIZE)
                .await
            {
                Ok(page) => {
                    songs.extend(page.items);
                    if !page.has_more || page.next_cursor.is_none() {
                        break;
                    }
                    cursor = page.next_cursor;
                }
                Err(err) => {
                    tracing::warn!(%err, "playlist fetch failed");
                    break;
                }
            }
        }
        songs
    }

    // ===== Structural operations =====

    /// Jump to a queue position and play it
    pub async fn play_at_index(&self, index: usize) {
        let song = {
            let mut core = self.core();
            let Some(song) = core.queue.get(index).cloned() else {
                return;
            };
            core.queue.set_index(index);
            self.publish(&mut core);
            song
        };
        self.sync_queue_index(index).await;
        self.play(song).await;
    }

    /// Remove one position
    pub async fn remove_from_queue(&self, index: usize) {
        if self.core().state.temp_queue_mode {
            {
                let mut core = self.core();
                core.queue.remove(index);
                self.publish(&mut core);
            }
            self.save_temp_queue_snapshot().await;
        } else {
            if let Err(err) = self.inner.deps.repo.queue_remove(&[index]).await {
                tracing::warn!(%err, "queue remove failed");
                return;
            }
            self.reload_queue().await;
        }
    }

    /// Remove a batch of positions
    pub async fn remove_from_queue_batch(&self, indices: &[usize]) {
        if indices.is_empty() {
            return;
        }
        if self.core().state.temp_queue_mode {
            {
                let mut core = self.core();
                core.queue.remove_batch(indices);
                self.publish(&mut core);
            }
            self.save_temp_queue_snapshot().await;
        } else {
            if let Err(err) = self.inner.deps.repo.queue_remove(indices).await {
                tracing::warn!(%err, "queue batch remove failed");
                return;
            }
            self.reload_queue().await;
        }
    }

    /// Move one song
    pub async fn reorder_queue(&self, from: usize, to: usize) {
        if self.core().state.temp_queue_mode {
            {
                let mut core = self.core();
                core.queue.reorder(from, to);
                self.publish(&mut core);
            }
            self.save_temp_queue_snapshot().await;
        } else {
            if let Err(err) = self.inner.deps.repo.queue_reorder(from, to).await {
                tracing::warn!(%err, "queue reorder failed");
                return;
            }
            self.reload_queue().await;
        }
    }

    /// Move a set of positions to a target, preserving relative order
    pub async fn reorder_queue_batch(&self, indices: &[usize], to: usize) {
        if indices.is_empty() {
            return;
        }
        if self.core().state.temp_queue_mode {
            {
                let mut core = self.core();
                core.queue.reorder_batch(indices, to);
                self.publish(&mut core);
            }
            self.save_temp_queue_snapshot().await;
        } else {
            if let Err(err) = self
                .inner
                .deps
                .repo
                .queue_reorder_batch(indices, to)
                .await
            {
                tracing::warn!(%err, "queue batch reorder failed");
                return;
            }
            self.reload_queue().await;
        }
    }

    /// Sort the queue; the index resets to 0
    pub async fn sort_queue(&self, field: SortField, order: SortOrder) {
        if self.core().state.temp_queue_mode {
            {
                let mut core = self.core();
                core.queue.sort(field, order);
                self.publish(&mut core);
            }
            self.save_temp_queue_snapshot().await;
        } else {
            if let Err(err) = self.inner.deps.repo.queue_sort(field, order).await {
                tracing::warn!(%err, "queue sort failed");
                return;
            }
            self.reload_queue().await;
            let mut core = self.core();
            core.queue.set_index(0);
            self.publish(&mut core);
        }
    }

    /// Clear the queue; playback stops and the shuffle history goes with it
    pub async fn clear_queue(&self) {
        self.stop().await;
        {
            let mut core = self.core();
            core.queue.clear();
            core.state.current_song = None;
            core.shuffle_history.clear();
            core.last_preloaded = None;
            self.publish(&mut core);
        }
        {
            let settings = self.inner.deps.settings.clone();
            tokio::spawn(async move {
                let _ = settings.clear_shuffle_history().await;
            });
        }

        if self.core().state.temp_queue_mode {
            self.save_temp_queue_snapshot().await;
        } else if let Err(err) = self.inner.deps.repo.queue_clear().await {
            tracing::warn!(%err, "queue clear failed");
        }
    }

    /// Save the current queue as a playlist
    ///
    /// The one operation whose failure the caller awaits directly.
    pub async fn save_queue_as_playlist(
        &self,
        name: &str,
        description: Option<&str>,
        public: bool,
    ) -> crate::error::Result<PlaylistId> {
        let id = self
            .inner
            .deps
            .repo
            .queue_save_as_playlist(name, description, public)
            .await?;
        Ok(id)
    }

    // ===== Modes =====

    /// Set shuffle; enabling clears repeat, disabling clears the history
    pub fn set_shuffle(&self, shuffle: bool) {
        {
            let mut core = self.core();
            core.queue.set_shuffle(shuffle);
            if !shuffle {
                core.shuffle_history.clear();
            }
            self.publish(&mut core);
        }
        if !shuffle {
            let settings = self.inner.deps.settings.clone();
            tokio::spawn(async move {
                let _ = settings.clear_shuffle_history().await;
            });
        }
        self.sync_play_mode_preference();
    }

    /// Toggle shuffle
    pub fn toggle_shuffle(&self) {
        let next = !self.core().queue.play_mode().shuffle();
        self.set_shuffle(next);
    }

    /// Set the repeat mode; any repeat clears shuffle (and its history)
    pub fn set_repeat_mode(&self, mode: RepeatMode) {
        let clear_history = {
            let mut core = self.core();
            let had_shuffle = core.queue.play_mode().shuffle();
            core.queue.set_repeat(mode);
            if had_shuffle {
                core.shuffle_history.clear();
            }
            self.publish(&mut core);
            had_shuffle
        };
        if clear_history {
            let settings = self.inner.deps.settings.clone();
            tokio::spawn(async move {
                let _ = settings.clear_shuffle_history().await;
            });
        }
        self.sync_play_mode_preference();
    }

    /// Fire-and-forget play-mode sync to server preferences
    ///
    /// Skipped in temp-queue mode, which never talks to the server.
    fn sync_play_mode_preference(&self) {
        let (temp, mode) = {
            let core = self.core();
            (core.state.temp_queue_mode, core.queue.play_mode())
        };
        if temp {
            return;
        }

        let repo = self.inner.deps.repo.clone();
        tokio::spawn(async move {
            let patch = serde_json::json!({ "play_mode": mode });
            if let Err(err) = repo.preferences_set(&patch).await {
                tracing::debug!(%err, "play mode preference sync failed");
            }
        });
    }

    /// Cycle repeat: none -> all -> one -> none
    pub fn cycle_repeat_mode(&self) {
        let next = match self.core().queue.play_mode().repeat() {
            RepeatMode::None => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::None,
        };
        self.set_repeat_mode(next);
    }

    // ===== Temp queue =====

    /// Persist the live temp queue into the structured store
    pub(crate) async fn save_temp_queue_snapshot(&self) {
        let live = {
            let core = self.core();
            if !core.state.temp_queue_mode {
                return;
            }
            TempQueueSnapshot {
                items: core.queue.items().to_vec(),
                queue_index: core.queue.index(),
                sca_enabled: core.queue.sca_enabled(),
                play_mode: core.queue.play_mode(),
            }
        };
        if let Err(err) = self
            .inner
            .deps
            .snapshots
            .save_temp_queue_state(Some(&live), None)
            .await
        {
            tracing::warn!(%err, "temp queue persist failed");
        }
    }

    /// Enter temp-queue mode
    ///
    /// Snapshots the prior queue into the structured store, clears the
    /// live queue, and stops playback. Nothing syncs to the server until
    /// exit.
    pub async fn enter_temp_queue_mode(&self) {
        if self.core().state.temp_queue_mode {
            return;
        }
        self.stop().await;

        let saved = {
            let mut core = self.core();
            let saved = TempQueueSnapshot {
                items: core.queue.items().to_vec(),
                queue_index: core.queue.index(),
                sca_enabled: core.queue.sca_enabled(),
                play_mode: core.queue.play_mode(),
            };
            core.queue.clear();
            core.queue.set_sca_enabled(false);
            core.state.temp_queue_mode = true;
            core.state.current_song = None;
            self.publish(&mut core);
            saved
        };

        if let Err(err) = self
            .inner
            .deps
            .snapshots
            .save_temp_queue_state(Some(&TempQueueSnapshot::default()), Some(&saved))
            .await
        {
            tracing::warn!(%err, "temp queue snapshot failed");
        }
        tracing::debug!("temp queue mode entered");
    }

    /// Exit temp-queue mode
    ///
    /// Restores the snapshot, pre-assigns the restored song's URL
    /// without playing, syncs the restored index to the server before
    /// clearing the exit guard, deletes the snapshot, and fires the
    /// exited notification. Focus refreshes stay suppressed for five
    /// seconds so the server's possibly-stale state cannot clobber the
    /// just-restored local state.
    pub async fn exit_temp_queue_mode(&self) {
        if !self.core().state.temp_queue_mode {
            return;
        }
        self.pause().await;

        let saved = self
            .inner
            .deps
            .snapshots
            .get_temp_queue_state()
            .await
            .ok()
            .and_then(|state| state.saved_queue);

        let restored = {
            let mut core = self.core();
            core.is_exiting_temp_queue = true;
            core.state.temp_queue_mode = false;

            if let Some(saved) = saved {
                core.queue.set_items(saved.items, saved.queue_index);
                core.queue.set_play_mode(saved.play_mode);
                core.queue.set_sca_enabled(saved.sca_enabled);
            } else {
                core.queue.clear();
            }

            core.state.current_song = core.queue.current_song().cloned();
            core.state.is_playing = false;
            core.state.is_paused = false;
            core.state.current_time = 0.0;
            core.state.duration = core
                .state
                .current_song
                .as_ref()
                .map_or(0.0, |song| song.duration_secs);
            self.publish(&mut core);
            (core.queue.index(), core.state.current_song.clone())
        };
        let (index, current) = restored;

        // Pre-assign the restored song so resume is instant; do not play
        if let Some(song) = &current {
            if let Some(url) = self.resolve_url(song).await {
                let primary = self.core().primary_index;
                self.element(primary).assign_source(&url);
            }
        }

        // Sync the restored index before releasing the exit guard
        if let Err(err) = self.inner.deps.repo.queue_set_index(index).await {
            tracing::warn!(%err, "restored index sync failed");
        }
        {
            let mut core = self.core();
            core.is_exiting_temp_queue = false;
            core.temp_exit_at_ms = self.now_ms();
        }

        if let Err(err) = self.inner.deps.snapshots.clear_temp_queue_state().await {
            tracing::warn!(%err, "temp queue snapshot delete failed");
        }
        self.emit(EngineEvent::TempQueueExited);
        tracing::debug!("temp queue mode exited");
    }

    /// Toggle the temp-queue overlay
    pub async fn toggle_temp_queue_mode(&self) {
        if self.core().state.temp_queue_mode {
            self.exit_temp_queue_mode().await;
        } else {
            self.enter_temp_queue_mode().await;
        }
    }

    // ===== Focus refresh =====

    /// Refresh the queue from the server on focus/visibility gain
    ///
    /// Gated: away at least 5 s, not refreshed in the last 5 s, not in
    /// temp-queue mode, not mid-exit, not syncing, and not within 5 s of
    /// a temp-queue exit or queue sync. The current song's index is
    /// preferred when it still matches; otherwise the nearest occurrence
    /// of its uuid wins (which can drift across duplicates); the current
    /// song itself is only overwritten while not playing.
    pub async fn focus_refresh(&self) {
        let now = self.now_ms();
        let allowed = {
            let core = self.core();
            core.last_hidden_at_ms > 0
                && now - core.last_hidden_at_ms >= FOCUS_COOLDOWN_MS
                && now - core.last_focus_refresh_ms >= FOCUS_COOLDOWN_MS
                && !core.state.temp_queue_mode
                && !core.is_exiting_temp_queue
                && !core.syncing_queue
                && now - core.temp_exit_at_ms >= FOCUS_COOLDOWN_MS
                && now - self.inner.deps.offline.last_queue_sync_time() >= FOCUS_COOLDOWN_MS
        };
        if !allowed {
            return;
        }
        {
            self.core().last_focus_refresh_ms = now;
        }

        let Ok(response) = self.inner.deps.repo.queue_list(None).await else {
            return;
        };

        let mut core = self.core();
        // Conditions may have changed across the await
        if core.state.temp_queue_mode || core.is_exiting_temp_queue {
            return;
        }
        if self.now_ms() - core.temp_exit_at_ms < FOCUS_COOLDOWN_MS {
            return;
        }

        let old_index = core.queue.index();
        let current_uuid = core.state.current_song.as_ref().map(|song| song.uuid.clone());
        let items = response.items;

        let new_index = match &current_uuid {
            Some(uuid) => {
                if items.get(old_index).is_some_and(|song| &song.uuid == uuid) {
                    old_index
                } else {
                    nearest_occurrence(&items, uuid, old_index)
                        .unwrap_or(response.queue_index)
                }
            }
            None => response.queue_index,
        };

        core.queue.set_items(items, new_index);
        core.queue.set_sca_enabled(response.sca_enabled);
        if !core.state.is_playing {
            core.state.current_song = core.queue.current_song().cloned();
        }
        self.publish(&mut core);
        tracing::debug!("queue refreshed on focus");
    }

    /// Adopt queue items reconstituted by the offline layer
    ///
    /// Keeps queue identity and upgrades a metadata-stub current song in
    /// place, re-applying ReplayGain and media-session metadata.
    pub fn adopt_restored_items(&self, items: Vec<Song>, queue_index: usize) {
        let (len, index) = {
            let mut core = self.core();
            core.queue.set_items(items, queue_index);

            let upgraded = match (&core.state.current_song, core.queue.current_song()) {
                (Some(current), Some(restored))
                    if current.uuid == restored.uuid && current.is_metadata_stub() =>
                {
                    Some(restored.clone())
                }
                _ => None,
            };
            if let Some(song) = upgraded {
                core.state.current_song = Some(song.clone());
                self.apply_replay_gain_locked(&mut core);
                self.inner.deps.media_session.set_metadata(&song);
            }

            self.publish(&mut core);
            (core.queue.len(), core.queue.index())
        };
        self.emit(EngineEvent::QueueItemsRestored { len, index });
    }

    // ===== SCA / radio =====

    /// Start SCA seeded from the current queue
    pub async fn start_sca_from_queue(&self) {
        match self.inner.deps.repo.sca_start_from_queue().await {
            Ok(response) => self.adopt_sca_queue(response).await,
            Err(err) => tracing::warn!(%err, "sca start failed"),
        }
    }

    /// Start SCA seeded from a playlist
    pub async fn start_sca_from_playlist(&self, id: &PlaylistId) {
        match self.inner.deps.repo.sca_start_from_playlist(id).await {
            Ok(response) => self.adopt_sca_queue(response).await,
            Err(err) => tracing::warn!(%err, "sca playlist start failed"),
        }
    }

    /// Start a radio session from an optional seed and/or filter
    pub async fn start_radio(&self, seed: Option<&SongId>, filter: Option<&str>) {
        match self.inner.deps.repo.radio_start(seed, filter).await {
            Ok(response) => self.adopt_sca_queue(response).await,
            Err(err) => tracing::warn!(%err, "radio start failed"),
        }
    }

    /// Stop the SCA session
    pub async fn stop_sca(&self) {
        if let Err(err) = self.inner.deps.repo.sca_stop().await {
            tracing::warn!(%err, "sca stop failed");
        }
        let mut core = self.core();
        core.queue.set_sca_enabled(false);
        self.publish(&mut core);
    }

    async fn adopt_sca_queue(&self, response: ScaResponse) {
        let first = {
            let mut core = self.core();
            core.queue.set_items(response.queue, 0);
            core.queue.set_sca_enabled(true);
            self.publish(&mut core);
            core.queue.current_song().cloned()
        };
        if let Some(song) = first {
            self.play(song).await;
        }
    }

    /// Fire-and-forget tail population while the SCA queue runs low
    pub(crate) async fn populate_sca_tail(&self) {
        let songs = self
            .inner
            .deps
            .repo
            .sca_populate_queue(SCA_POPULATE_COUNT)
            .await
            .unwrap_or_default();

        let mut core = self.core();
        if !songs.is_empty() {
            core.queue.append(songs);
            self.publish(&mut core);
        }
        core.sca_populate_pending = false;
    }
}

/// Occurrence of `uuid` in `items` nearest to `anchor`
fn nearest_occurrence(items: &[Song], uuid: &SongId, anchor: usize) -> Option<usize> {
    items
        .iter()
        .enumerate()
        .filter(|(_, song)| &song.uuid == uuid)
        .min_by_key(|(index, _)| index.abs_diff(anchor))
        .map(|(index, _)| index)
}
