//! Shared fakes for engine integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use lyra_core::error::RepositoryError;
use lyra_core::repository::{
    AudioUrlResolver, CatalogRepository, HistorySource, MediaSessionAdapter, OfflineState,
    QueueListResponse, RepoResult, ScaResponse, SessionPlaybackState, SongPage, Visibility,
    VisibilityProvider,
};
use lyra_core::types::{PlaylistId, Song, SongId, SongKind, SortField, SortOrder};
use lyra_playback::media::MediaElement;
use lyra_playback::{EngineDeps, PlayerEngine};
use lyra_storage::{MemoryKeyValueStore, MemorySnapshotStore, SettingsStore};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

pub fn song(id: &str, duration: f64) -> Song {
    serde_json::from_value(serde_json::json!({
        "uuid": id,
        "title": format!("Song {id}"),
        "artist": format!("Artist {id}"),
        "duration_secs": duration,
    }))
    .unwrap()
}

pub fn songs(ids: &[&str]) -> Vec<Song> {
    ids.iter().map(|id| song(id, 180.0)).collect()
}

// ===== Media element =====

#[derive(Debug)]
struct ElementState {
    source: Option<String>,
    paused: bool,
    volume: f64,
    rate: f64,
    pitch_lock: bool,
    current_time: f64,
    duration: f64,
    play_errors: Vec<String>,
}

/// Scripted media element
pub struct FakeMediaElement {
    state: Mutex<ElementState>,
}

impl FakeMediaElement {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ElementState {
                source: None,
                paused: true,
                volume: 1.0,
                rate: 1.0,
                pitch_lock: true,
                current_time: 0.0,
                duration: 0.0,
                play_errors: Vec::new(),
            }),
        })
    }

    /// Queue an error for the next `play()` call
    pub fn script_play_error(&self, message: &str) {
        self.state
            .lock()
            .unwrap()
            .play_errors
            .push(message.to_string());
    }

    pub fn set_media_duration(&self, duration: f64) {
        self.state.lock().unwrap().duration = duration;
    }

    pub fn set_media_time(&self, time: f64) {
        self.state.lock().unwrap().current_time = time;
    }

    pub fn media_volume(&self) -> f64 {
        self.state.lock().unwrap().volume
    }

    pub fn playback_rate(&self) -> f64 {
        self.state.lock().unwrap().rate
    }
}

#[async_trait]
impl MediaElement for FakeMediaElement {
    fn assign_source(&self, url: &str) {
        let mut state = self.state.lock().unwrap();
        state.source = Some(url.to_string());
        state.current_time = 0.0;
    }

    fn clear_source(&self) {
        self.state.lock().unwrap().source = None;
    }

    fn current_source(&self) -> Option<String> {
        self.state.lock().unwrap().source.clone()
    }

    async fn play(&self) -> Result<(), String> {
        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.play_errors.pop() {
            return Err(error);
        }
        if state.source.is_none() {
            return Err("no source".to_string());
        }
        state.paused = false;
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    fn is_paused(&self) -> bool {
        self.state.lock().unwrap().paused
    }

    fn set_volume(&self, volume: f64) {
        self.state.lock().unwrap().volume = volume;
    }

    fn volume(&self) -> f64 {
        self.state.lock().unwrap().volume
    }

    fn set_playback_rate(&self, rate: f64, preserve_pitch: bool) {
        let mut state = self.state.lock().unwrap();
        state.rate = rate;
        state.pitch_lock = preserve_pitch;
    }

    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().current_time
    }

    fn set_current_time(&self, seconds: f64) {
        self.state.lock().unwrap().current_time = seconds;
    }

    fn duration(&self) -> f64 {
        self.state.lock().unwrap().duration
    }

    fn buffered_end(&self) -> f64 {
        let state = self.state.lock().unwrap();
        state.duration
    }

    async fn wait_can_play(&self) -> Result<(), String> {
        if self.state.lock().unwrap().source.is_some() {
            Ok(())
        } else {
            Err("no source".to_string())
        }
    }

    async fn wait_metadata(&self) -> Result<(), String> {
        Ok(())
    }
}

// ===== Repository =====

#[derive(Default)]
struct RepoState {
    catalog: Vec<Song>,
    queue: Vec<Song>,
    index: usize,
    sca_enabled: bool,
    sca_fill: Vec<Song>,
}

/// In-memory catalog/queue repository that logs every call
pub struct FakeRepo {
    state: Mutex<RepoState>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeRepo {
    pub fn new(catalog: Vec<Song>, queue: Vec<Song>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(RepoState {
                catalog,
                queue,
                ..Default::default()
            }),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_server_queue(&self, queue: Vec<Song>, index: usize) {
        let mut state = self.state.lock().unwrap();
        state.queue = queue;
        state.index = index;
    }

    pub fn server_index(&self) -> usize {
        self.state.lock().unwrap().index
    }

    pub fn set_sca_fill(&self, songs: Vec<Song>) {
        self.state.lock().unwrap().sca_fill = songs;
    }
}

#[async_trait]
impl CatalogRepository for FakeRepo {
    async fn queue_list(&self, _limit: Option<usize>) -> RepoResult<QueueListResponse> {
        self.log("queue.list");
        let state = self.state.lock().unwrap();
        Ok(QueueListResponse {
            items: state.queue.clone(),
            queue_index: state.index,
            sca_enabled: state.sca_enabled,
            play_mode: None,
        })
    }

    async fn queue_add(&self, uuids: &[SongId]) -> RepoResult<()> {
        self.log("queue.add");
        let mut state = self.state.lock().unwrap();
        let additions: Vec<Song> = uuids
            .iter()
            .filter_map(|uuid| {
                state
                    .catalog
                    .iter()
                    .find(|song| &song.uuid == uuid)
                    .cloned()
            })
            .collect();
        state.queue.extend(additions);
        Ok(())
    }

    async fn queue_remove(&self, positions: &[usize]) -> RepoResult<()> {
        self.log("queue.remove");
        let mut state = self.state.lock().unwrap();
        let mut sorted: Vec<usize> = positions.to_vec();
        sorted.sort_unstable();
        for position in sorted.into_iter().rev() {
            if position < state.queue.len() {
                state.queue.remove(position);
            }
        }
        Ok(())
    }

    async fn queue_set_index(&self, index: usize) -> RepoResult<()> {
        self.log("queue.set_index");
        self.state.lock().unwrap().index = index;
        Ok(())
    }

    async fn queue_reorder(&self, from: usize, to: usize) -> RepoResult<()> {
        self.log("queue.reorder");
        let mut state = self.state.lock().unwrap();
        if from < state.queue.len() && to < state.queue.len() {
            let song = state.queue.remove(from);
            state.queue.insert(to, song);
        }
        Ok(())
    }

    async fn queue_reorder_batch(&self, _indices: &[usize], _to: usize) -> RepoResult<()> {
        self.log("queue.reorder_batch");
        Ok(())
    }

    async fn queue_clear(&self) -> RepoResult<()> {
        self.log("queue.clear");
        let mut state = self.state.lock().unwrap();
        state.queue.clear();
        state.index = 0;
        Ok(())
    }

    async fn queue_sort(&self, _field: SortField, _order: SortOrder) -> RepoResult<()> {
        self.log("queue.sort");
        Ok(())
    }

    async fn queue_add_by_path(&self, _path: &str) -> RepoResult<()> {
        self.log("queue.add_by_path");
        let mut state = self.state.lock().unwrap();
        let catalog = state.catalog.clone();
        state.queue.extend(catalog);
        Ok(())
    }

    async fn queue_add_by_filter(&self, _filter: &str) -> RepoResult<()> {
        self.log("queue.add_by_filter");
        Ok(())
    }

    async fn queue_add_by_playlist(&self, _id: &PlaylistId, _shuffle: bool) -> RepoResult<()> {
        self.log("queue.add_by_playlist");
        Ok(())
    }

    async fn queue_save_as_playlist(
        &self,
        name: &str,
        _description: Option<&str>,
        _public: bool,
    ) -> RepoResult<PlaylistId> {
        self.log("queue.save_as_playlist");
        Ok(PlaylistId::new(format!("playlist-{name}")))
    }

    async fn preferences_get(&self) -> RepoResult<serde_json::Value> {
        self.log("preferences.get");
        Ok(serde_json::json!({}))
    }

    async fn preferences_set(&self, _patch: &serde_json::Value) -> RepoResult<()> {
        self.log("preferences.set");
        Ok(())
    }

    async fn history_record(
        &self,
        _uuid: &SongId,
        _seconds_played: f64,
        _was_skipped: bool,
        _source: HistorySource,
    ) -> RepoResult<()> {
        self.log("history.record");
        Ok(())
    }

    async fn sca_start_from_queue(&self) -> RepoResult<ScaResponse> {
        self.log("sca.start_from_queue");
        let state = self.state.lock().unwrap();
        Ok(ScaResponse {
            queue: state.queue.clone(),
            session_id: Some("session".to_string()),
            seed: None,
        })
    }

    async fn sca_start_from_playlist(&self, _id: &PlaylistId) -> RepoResult<ScaResponse> {
        self.log("sca.start_from_playlist");
        Ok(ScaResponse::default())
    }

    async fn sca_stop(&self) -> RepoResult<()> {
        self.log("sca.stop");
        Ok(())
    }

    async fn sca_populate_queue(&self, _n: usize) -> RepoResult<Vec<Song>> {
        self.log("sca.populate_queue");
        Ok(self.state.lock().unwrap().sca_fill.clone())
    }

    async fn radio_start(
        &self,
        _seed: Option<&SongId>,
        _filter: Option<&str>,
    ) -> RepoResult<ScaResponse> {
        self.log("radio.start");
        Err(RepositoryError::unavailable("no radio in tests"))
    }

    async fn songs_by_path(
        &self,
        _path: &str,
        _cursor: Option<&str>,
        _limit: usize,
    ) -> RepoResult<SongPage> {
        self.log("songs.by_path");
        let state = self.state.lock().unwrap();
        Ok(SongPage {
            items: state.catalog.clone(),
            next_cursor: None,
            has_more: false,
        })
    }

    async fn songs_by_filter(&self, _filter: &str) -> RepoResult<Vec<Song>> {
        self.log("songs.by_filter");
        Ok(self.state.lock().unwrap().catalog.clone())
    }

    async fn songs_get(&self, uuid: &SongId) -> RepoResult<Song> {
        self.log("songs.get");
        self.state
            .lock()
            .unwrap()
            .catalog
            .iter()
            .find(|song| &song.uuid == uuid)
            .cloned()
            .ok_or_else(|| RepositoryError::remote("not found"))
    }

    async fn playlists_get_songs(
        &self,
        _id: &PlaylistId,
        _cursor: Option<&str>,
        _limit: usize,
    ) -> RepoResult<SongPage> {
        self.log("playlists.get_songs");
        let state = self.state.lock().unwrap();
        Ok(SongPage {
            items: state.catalog.clone(),
            next_cursor: None,
            has_more: false,
        })
    }
}

// ===== URL resolution / offline =====

pub struct FakeUrls {
    pub cached: Mutex<HashSet<SongId>>,
}

impl FakeUrls {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cached: Mutex::new(HashSet::new()),
        })
    }

    pub fn cache(&self, uuid: &str) {
        self.cached.lock().unwrap().insert(SongId::new(uuid));
    }
}

#[async_trait]
impl AudioUrlResolver for FakeUrls {
    async fn get_audio_url(&self, uuid: &SongId) -> Option<String> {
        if self.cached.lock().unwrap().contains(uuid) {
            Some(format!("offline://{uuid}"))
        } else {
            None
        }
    }

    async fn get_stream_url(&self, uuid: &SongId, _kind: SongKind) -> String {
        format!("https://stream/{uuid}")
    }
}

pub struct FakeOffline {
    pub offline_mode: AtomicBool,
    pub online: AtomicBool,
    pub cached: Mutex<HashSet<SongId>>,
    pub last_sync: AtomicI64,
}

impl FakeOffline {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            offline_mode: AtomicBool::new(false),
            online: AtomicBool::new(true),
            cached: Mutex::new(HashSet::new()),
            last_sync: AtomicI64::new(0),
        })
    }

    pub fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    pub fn cache(&self, uuid: &str) {
        self.cached.lock().unwrap().insert(SongId::new(uuid));
    }
}

impl OfflineState for FakeOffline {
    fn work_offline_mode(&self) -> bool {
        self.offline_mode.load(Ordering::SeqCst)
    }

    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn offline_song_uuids(&self) -> HashSet<SongId> {
        self.cached.lock().unwrap().clone()
    }

    fn last_queue_sync_time(&self) -> i64 {
        self.last_sync.load(Ordering::SeqCst)
    }
}

// ===== Media session / visibility =====

#[derive(Default)]
pub struct FakeMediaSession {
    pub metadata: Mutex<Option<SongId>>,
    pub playback_state: Mutex<Option<SessionPlaybackState>>,
}

impl FakeMediaSession {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl MediaSessionAdapter for FakeMediaSession {
    fn set_metadata(&self, song: &Song) {
        *self.metadata.lock().unwrap() = Some(song.uuid.clone());
    }

    fn set_position(&self, _position: f64, _duration: f64, _rate: f64) {}

    fn set_playback_state(&self, state: SessionPlaybackState) {
        *self.playback_state.lock().unwrap() = Some(state);
    }
}

pub struct FakeVisibility {
    pub hidden: AtomicBool,
}

impl FakeVisibility {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            hidden: AtomicBool::new(false),
        })
    }

    pub fn set_hidden(&self, hidden: bool) {
        self.hidden.store(hidden, Ordering::SeqCst);
    }
}

impl VisibilityProvider for FakeVisibility {
    fn visibility(&self) -> Visibility {
        if self.hidden.load(Ordering::SeqCst) {
            Visibility::Hidden
        } else {
            Visibility::Visible
        }
    }
}

// ===== Fixture =====

pub struct Fixture {
    pub engine: PlayerEngine,
    pub repo: Arc<FakeRepo>,
    pub urls: Arc<FakeUrls>,
    pub offline: Arc<FakeOffline>,
    pub media_session: Arc<FakeMediaSession>,
    pub visibility: Arc<FakeVisibility>,
    pub elements: [Arc<FakeMediaElement>; 2],
    pub kv: Arc<MemoryKeyValueStore>,
    pub snapshots: Arc<MemorySnapshotStore>,
}

/// Engine over fakes, with `queue` already on the fake server
pub async fn fixture(queue: Vec<Song>) -> Fixture {
    fixture_with_kv(queue, Arc::new(MemoryKeyValueStore::new())).await
}

/// Same, over an existing key-value store (simulated restart)
pub async fn fixture_with_kv(queue: Vec<Song>, kv: Arc<MemoryKeyValueStore>) -> Fixture {
    let repo = FakeRepo::new(queue.clone(), queue);
    let urls = FakeUrls::new();
    let offline = FakeOffline::new();
    let media_session = FakeMediaSession::new();
    let visibility = FakeVisibility::new();
    let elements = [FakeMediaElement::new(), FakeMediaElement::new()];
    let snapshots = Arc::new(MemorySnapshotStore::new());

    let engine = PlayerEngine::new(EngineDeps {
        repo: repo.clone(),
        urls: urls.clone(),
        offline: offline.clone(),
        media_session: media_session.clone(),
        visibility: visibility.clone(),
        settings: SettingsStore::new(kv.clone()),
        snapshots: snapshots.clone(),
        elements: [elements[0].clone(), elements[1].clone()],
    });
    engine.initialize().await;

    Fixture {
        engine,
        repo,
        urls,
        offline,
        media_session,
        visibility,
        elements,
        kv,
        snapshots,
    }
}
