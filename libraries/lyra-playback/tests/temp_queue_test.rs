//! Temp-queue overlay: isolation, round trip, focus suppression

mod support;

use lyra_core::types::PlaylistId;
use lyra_playback::{EngineEvent, MediaElement};
use lyra_storage::SnapshotStore;
use support::*;

/// Server-mutating repository calls that must not happen in temp mode
const QUEUE_MUTATORS: &[&str] = &[
    "queue.add",
    "queue.remove",
    "queue.set_index",
    "queue.reorder",
    "queue.reorder_batch",
    "queue.clear",
    "queue.sort",
    "queue.add_by_path",
    "queue.add_by_filter",
    "queue.add_by_playlist",
    "queue.save_as_playlist",
];

#[tokio::test]
async fn temp_queue_round_trip_restores_prior_state() {
    let fx = fixture(songs(&["a", "b", "c"])).await;
    fx.engine.play_at_index(1).await;

    let before = fx.engine.state();
    assert_eq!(before.queue_index, 1);
    assert_eq!(before.current_song.as_ref().unwrap().uuid.as_str(), "b");

    let mut events = fx.engine.subscribe_events();

    // Enter: the live queue empties, playback stops, the snapshot exists
    fx.engine.enter_temp_queue_mode().await;
    let state = fx.engine.state();
    assert!(state.temp_queue_mode);
    assert!(state.queue.is_empty());
    assert!(!state.is_playing);

    let snapshot = fx.snapshots.get_temp_queue_state().await.unwrap();
    let saved = snapshot.saved_queue.expect("snapshot saved on entry");
    assert_eq!(saved.queue_index, 1);
    assert_eq!(saved.items.len(), 3);

    // Populate locally and play from the overlay
    fx.engine
        .add_by_playlist(&PlaylistId::new("p1"), false)
        .await;
    let state = fx.engine.state();
    assert_eq!(state.queue.len(), 3);
    assert!(state.is_playing);
    assert_eq!(state.queue_index, 0);

    // Exit: prior queue, index and song come back; playback stays off;
    // the restored song is pre-assigned to the primary element
    fx.engine.exit_temp_queue_mode().await;
    let state = fx.engine.state();
    assert!(!state.temp_queue_mode);
    assert_eq!(
        state.queue.iter().map(|s| s.uuid.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
    assert_eq!(state.queue_index, 1);
    assert_eq!(state.current_song.as_ref().unwrap().uuid.as_str(), "b");
    assert!(!state.is_playing);
    assert_eq!(
        fx.elements[0].current_source().as_deref(),
        Some("https://stream/b")
    );

    // Snapshot deleted, restored index synced, event fired
    let snapshot = fx.snapshots.get_temp_queue_state().await.unwrap();
    assert!(snapshot.temp_queue.is_none());
    assert!(snapshot.saved_queue.is_none());
    assert_eq!(fx.repo.server_index(), 1);

    let mut saw_exit = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::TempQueueExited) {
            saw_exit = true;
        }
    }
    assert!(saw_exit);
}

#[tokio::test]
async fn temp_mode_never_mutates_the_server_queue() {
    let fx = fixture(songs(&["a", "b"])).await;
    fx.engine.enter_temp_queue_mode().await;

    let calls_before = fx.repo.calls().len();

    fx.engine.add_to_queue(songs(&["x", "y", "z"]), false).await;
    fx.engine.reorder_queue(0, 2).await;
    fx.engine
        .sort_queue(
            lyra_core::types::SortField::Title,
            lyra_core::types::SortOrder::Ascending,
        )
        .await;
    fx.engine.remove_from_queue(0).await;
    fx.engine.clear_queue().await;

    let new_calls = &fx.repo.calls()[calls_before..];
    for call in new_calls {
        assert!(
            !QUEUE_MUTATORS.contains(&call.as_str()),
            "temp mode issued server mutation: {call}"
        );
    }
}

#[tokio::test]
async fn temp_mutations_bump_the_version_and_persist_the_overlay() {
    let fx = fixture(songs(&["a"])).await;
    fx.engine.enter_temp_queue_mode().await;

    let version_before = fx.engine.state().queue_version;
    fx.engine.add_to_queue(songs(&["x", "y"]), false).await;
    assert!(fx.engine.state().queue_version > version_before);

    let snapshot = fx.snapshots.get_temp_queue_state().await.unwrap();
    let live = snapshot.temp_queue.expect("live overlay persisted");
    assert_eq!(live.items.len(), 2);
}

#[tokio::test]
async fn toggling_twice_returns_to_the_prior_queue() {
    let fx = fixture(songs(&["a", "b", "c"])).await;
    fx.engine.play_at_index(2).await;

    fx.engine.toggle_temp_queue_mode().await;
    assert!(fx.engine.state().temp_queue_mode);

    fx.engine.toggle_temp_queue_mode().await;
    let state = fx.engine.state();
    assert!(!state.temp_queue_mode);
    assert_eq!(state.queue.len(), 3);
    assert_eq!(state.queue_index, 2);
}

#[tokio::test]
async fn focus_refresh_is_suppressed_after_temp_exit() {
    let fx = fixture(songs(&["a", "b", "c"])).await;
    fx.engine.play_at_index(1).await;

    // Go hidden well before the exit so the "away" gate passes later
    fx.engine.on_visibility_changed(true).await;
    fx.engine.advance_wall_clock(10_000);

    fx.engine.enter_temp_queue_mode().await;
    fx.engine.exit_temp_queue_mode().await;

    // The server has drifted in the meantime
    fx.repo.set_server_queue(songs(&["x", "y", "z"]), 2);

    // Within five seconds of the exit: the refresh must not clobber the
    // just-restored state
    fx.engine.on_visibility_changed(false).await;
    let state = fx.engine.state();
    assert_eq!(
        state.queue.iter().map(|s| s.uuid.as_str()).collect::<Vec<_>>(),
        vec!["a", "b", "c"]
    );
    assert_eq!(state.queue_index, 1);

    // Past the cooldown the refresh goes through
    fx.engine.on_visibility_changed(true).await;
    fx.engine.advance_wall_clock(6_000);
    fx.engine.on_visibility_changed(false).await;
    let state = fx.engine.state();
    assert_eq!(
        state.queue.iter().map(|s| s.uuid.as_str()).collect::<Vec<_>>(),
        vec!["x", "y", "z"]
    );
}

#[tokio::test]
async fn focus_refresh_keeps_the_playing_song_index_when_it_still_matches() {
    let fx = fixture(songs(&["a", "b", "c"])).await;
    fx.engine.play_at_index(1).await;

    // Same song still at the old index after the server reload
    fx.repo.set_server_queue(songs(&["x", "b", "c"]), 0);

    fx.engine.on_visibility_changed(true).await;
    fx.engine.advance_wall_clock(6_000);
    fx.engine.on_visibility_changed(false).await;

    let state = fx.engine.state();
    assert_eq!(state.queue_index, 1);
    // Playing: the current song is never overwritten by a refresh
    assert_eq!(state.current_song.as_ref().unwrap().uuid.as_str(), "b");
}

#[tokio::test]
async fn focus_refresh_finds_the_nearest_occurrence_after_a_move() {
    let fx = fixture(songs(&["a", "b", "c"])).await;
    fx.engine.play_at_index(1).await;

    // The playing song moved to the tail server-side
    fx.repo.set_server_queue(songs(&["a", "c", "d", "b"]), 0);

    fx.engine.on_visibility_changed(true).await;
    fx.engine.advance_wall_clock(6_000);
    fx.engine.on_visibility_changed(false).await;

    assert_eq!(fx.engine.state().queue_index, 3);
}

#[tokio::test]
async fn restored_items_upgrade_a_metadata_stub_in_place() {
    let stub: lyra_core::types::Song = serde_json::from_value(serde_json::json!({
        "uuid": "a", "title": "", "artist": ""
    }))
    .unwrap();
    let fx = fixture(vec![stub.clone(), song("b", 180.0)]).await;
    fx.engine.play_at_index(0).await;
    assert!(fx
        .engine
        .state()
        .current_song
        .as_ref()
        .unwrap()
        .is_metadata_stub());

    let mut events = fx.engine.subscribe_events();

    // Offline layer reconstitutes full records
    fx.engine.adopt_restored_items(songs(&["a", "b"]), 0);

    let state = fx.engine.state();
    let current = state.current_song.as_ref().unwrap();
    assert!(!current.is_metadata_stub());
    assert_eq!(current.title, "Song a");
    assert_eq!(
        fx.media_session.metadata.lock().unwrap().as_ref().unwrap().as_str(),
        "a"
    );

    let mut saw_restore = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, EngineEvent::QueueItemsRestored { len: 2, index: 0 }) {
            saw_restore = true;
        }
    }
    assert!(saw_restore);
}
