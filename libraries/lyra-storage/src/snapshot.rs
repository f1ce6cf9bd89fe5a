//! Temp-queue snapshot persistence
//!
//! While temp-queue mode is active the prior queue is preserved verbatim
//! in the structured store, and the live temp queue is persisted beside
//! it so the overlay survives a restart. Exit restores the saved queue
//! and deletes both records.

use crate::error::{Result, StorageError};
use async_trait::async_trait;
use lyra_core::types::{PlayMode, Song};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A queue state frozen in time: items, index, play mode and SCA flag
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TempQueueSnapshot {
    pub items: Vec<Song>,

    #[serde(default)]
    pub queue_index: usize,

    #[serde(default)]
    pub sca_enabled: bool,

    #[serde(default)]
    pub play_mode: PlayMode,
}

/// Both records held by the structured store
///
/// `temp_queue` present means temp-queue mode is active; `saved_queue`
/// is the prior queue to restore on exit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TempQueueState {
    pub temp_queue: Option<TempQueueSnapshot>,
    pub saved_queue: Option<TempQueueSnapshot>,
}

/// Structured persistence for the temp-queue overlay
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist the live temp queue and, when entering, the saved prior
    /// queue; a `None` leaves that record untouched
    async fn save_temp_queue_state(
        &self,
        temp: Option<&TempQueueSnapshot>,
        saved: Option<&TempQueueSnapshot>,
    ) -> Result<()>;

    /// Read back both records
    async fn get_temp_queue_state(&self) -> Result<TempQueueState>;

    /// Remove both records (temp-queue exit)
    async fn clear_temp_queue_state(&self) -> Result<()>;
}

/// In-memory snapshot store for tests and ephemeral sessions
#[derive(Default)]
pub struct MemorySnapshotStore {
    state: Mutex<TempQueueState>,
}

impl MemorySnapshotStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_temp_queue_state(
        &self,
        temp: Option<&TempQueueSnapshot>,
        saved: Option<&TempQueueSnapshot>,
    ) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StorageError::Backend("poisoned lock".to_string()))?;
        if let Some(temp) = temp {
            state.temp_queue = Some(temp.clone());
        }
        if let Some(saved) = saved {
            state.saved_queue = Some(saved.clone());
        }
        Ok(())
    }

    async fn get_temp_queue_state(&self) -> Result<TempQueueState> {
        let state = self
            .state
            .lock()
            .map_err(|_| StorageError::Backend("poisoned lock".to_string()))?;
        Ok(state.clone())
    }

    async fn clear_temp_queue_state(&self) -> Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| StorageError::Backend("poisoned lock".to_string()))?;
        *state = TempQueueState::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lyra_core::types::SongId;

    fn song(id: &str) -> Song {
        serde_json::from_value(serde_json::json!({
            "uuid": id, "title": format!("Song {id}"), "artist": "Artist"
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn entry_saves_both_records() {
        let store = MemorySnapshotStore::new();
        let saved = TempQueueSnapshot {
            items: vec![song("a"), song("b"), song("c")],
            queue_index: 1,
            sca_enabled: true,
            play_mode: PlayMode::RepeatAll,
        };
        let live = TempQueueSnapshot::default();

        store
            .save_temp_queue_state(Some(&live), Some(&saved))
            .await
            .unwrap();

        let state = store.get_temp_queue_state().await.unwrap();
        assert_eq!(state.temp_queue, Some(live));
        assert_eq!(state.saved_queue, Some(saved));
    }

    #[tokio::test]
    async fn temp_updates_leave_saved_queue_alone() {
        let store = MemorySnapshotStore::new();
        let saved = TempQueueSnapshot {
            items: vec![song("a")],
            ..Default::default()
        };
        store
            .save_temp_queue_state(Some(&TempQueueSnapshot::default()), Some(&saved))
            .await
            .unwrap();

        // A temp-mode mutation persists only the live queue
        let live = TempQueueSnapshot {
            items: vec![song("x"), song("y")],
            ..Default::default()
        };
        store.save_temp_queue_state(Some(&live), None).await.unwrap();

        let state = store.get_temp_queue_state().await.unwrap();
        assert_eq!(state.temp_queue.unwrap().items.len(), 2);
        assert_eq!(state.saved_queue.unwrap().items[0].uuid, SongId::new("a"));
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = MemorySnapshotStore::new();
        store
            .save_temp_queue_state(
                Some(&TempQueueSnapshot::default()),
                Some(&TempQueueSnapshot::default()),
            )
            .await
            .unwrap();

        store.clear_temp_queue_state().await.unwrap();

        let state = store.get_temp_queue_state().await.unwrap();
        assert!(state.temp_queue.is_none());
        assert!(state.saved_queue.is_none());
    }
}
