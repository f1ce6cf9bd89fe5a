//! Transport operations and the crossfade sequence

use super::{EngineCore, PlayerEngine, SCA_POPULATE_COUNT};
use crate::crossfade::{
    equal_power_curves, COMPLETION_SLACK_MS, CURVE_START_DELAY,
};
use crate::types::EngineEvent;
use lyra_audio::replaygain::{self, ReplayGainConfig, ReplayGainMode};
use lyra_audio::{GraphConfig, LatencyMode};
use lyra_core::repository::{HistorySource, SessionPlaybackState};
use lyra_core::types::{PlayMode, Song};
use lyra_storage::PlayerLocalSettings;

/// Where `next` decided to go
pub(crate) enum NextDecision {
    Play(usize, Song),
    Restart,
    PopulateSca,
    Stop,
}

impl PlayerEngine {
    // ===== Transport =====

    /// Load and start a song on the primary element
    ///
    /// Resolves offline-first, builds the dual pipeline on demand when
    /// crossfade is enabled, resets fade gains, applies ReplayGain and
    /// tempo, and walks forward through the queue when the song (or its
    /// playback) is unavailable.
    pub async fn play(&self, song: Song) {
        if self.check_sleep_timer_fired().await {
            return;
        }

        let mut song = song;
        let mut offline_hops = 0usize;

        loop {
            {
                let mut core = self.core();
                core.state.is_loading = true;
                core.state.error = None;
                core.state.current_song = Some(song.clone());
                self.publish(&mut core);
            }

            let Some(url) = self.resolve_url(&song).await else {
                match self.advance_to_cached(offline_hops) {
                    Some(next) => {
                        song = next;
                        offline_hops += 1;
                        continue;
                    }
                    None => return,
                }
            };

            let dual = self.core().state.fx.crossfade.enabled;
            let primary_index = {
                let mut core = self.core();
                if let Err(err) = self.ensure_pipeline_locked(&mut core, dual) {
                    core.state.error = Some(err.to_string());
                    core.state.is_loading = false;
                    self.publish(&mut core);
                    return;
                }

                let primary = core.primary_slot();
                if let Some(graph) = core.graph.as_mut() {
                    if graph.is_dual() {
                        graph.reset_fade_gains(primary);
                    }
                }

                self.element(core.primary_index).assign_source(&url);
                self.apply_replay_gain_locked(&mut core);
                self.apply_tempo_locked(&core);
                self.inner.deps.media_session.set_metadata(&song);
                core.primary_index
            };

            match self.element(primary_index).play().await {
                Ok(()) => {
                    {
                        let mut core = self.core();
                        core.state.is_playing = true;
                        core.state.is_paused = false;
                        core.state.is_loading = false;
                        core.state.current_time = 0.0;
                        core.state.duration = self.element(primary_index).duration();
                        core.consecutive_errors = 0;
                        core.play_start_ms = self.now_ms();
                        self.publish(&mut core);
                    }
                    self.inner
                        .deps
                        .media_session
                        .set_playback_state(SessionPlaybackState::Playing);
                    self.persist_player_local();
                    self.preload_next().await;
                    return;
                }
                Err(message) => {
                    tracing::warn!(%message, uuid = %song.uuid, "media play failed");
                    match self.next_after_error() {
                        Some(next) => {
                            song = next;
                            continue;
                        }
                        None => return,
                    }
                }
            }
        }
    }

    /// Pause; cancels any in-flight crossfade first
    pub async fn pause(&self) {
        self.cancel_crossfade();

        let primary = {
            let mut core = self.core();
            core.state.is_playing = false;
            core.state.is_paused = true;
            self.publish(&mut core);
            core.primary_index
        };
        self.element(primary).pause();
        self.inner
            .deps
            .media_session
            .set_playback_state(SessionPlaybackState::Paused);
        self.persist_player_local();
    }

    /// Resume; re-attaches the source when the element lost it
    pub async fn resume(&self) {
        let (primary, reattach, song, remembered) = {
            let core = self.core();
            let primary = core.primary_index;
            let lost = self.element(primary).current_source().is_none();
            (
                primary,
                lost && core.state.current_song.is_some(),
                core.state.current_song.clone(),
                core.state.current_time,
            )
        };

        if reattach {
            if let Some(song) = &song {
                if let Some(url) = self.resolve_url(song).await {
                    let element = self.element(primary);
                    element.assign_source(&url);
                    if element.wait_metadata().await.is_ok() {
                        element.set_current_time(remembered);
                    }
                }
            }
        }

        match self.element(primary).play().await {
            Ok(()) => {
                let mut core = self.core();
                core.state.is_playing = true;
                core.state.is_paused = false;
                self.publish(&mut core);
                self.inner
                    .deps
                    .media_session
                    .set_playback_state(SessionPlaybackState::Playing);
            }
            Err(message) => self.handle_media_error(message).await,
        }
    }

    /// Toggle between play and pause
    pub async fn toggle_play_pause(&self) {
        let playing = self.core().state.is_playing;
        if playing {
            self.pause().await;
        } else {
            self.resume().await;
        }
    }

    /// Stop playback and release both element sources
    pub async fn stop(&self) {
        self.cancel_crossfade();

        for element in &self.inner.deps.elements {
            element.pause();
            element.clear_source();
        }

        {
            let mut core = self.core();
            core.state.is_playing = false;
            core.state.is_paused = false;
            core.state.is_loading = false;
            core.state.current_time = 0.0;
            core.last_preloaded = None;
            let secondary = core.primary_slot().other();
            if let Some(graph) = core.graph.as_mut() {
                graph.disconnect_source(secondary);
            }
            self.publish(&mut core);
        }
        self.inner
            .deps
            .media_session
            .set_playback_state(SessionPlaybackState::None);
    }

    /// Seek within the current song
    ///
    /// A no-op for non-seekable songs; otherwise clamped to the duration.
    pub fn seek(&self, position: f64) {
        let mut core = self.core();
        let Some(song) = core.state.current_song.as_ref() else {
            return;
        };
        if !song.seekable {
            return;
        }

        let upper = if core.state.duration > 0.0 {
            core.state.duration
        } else {
            f64::MAX
        };
        let clamped = position.clamp(0.0, upper);
        self.element(core.primary_index).set_current_time(clamped);
        core.state.current_time = clamped;
        self.publish(&mut core);
    }

    /// Advance to the next song (user initiated)
    pub async fn next(&self) {
        self.next_internal(true).await;
    }

    /// Skip; additionally records a "skipped" history event under SCA
    pub async fn skip(&self) {
        let record = {
            let core = self.core();
            if core.queue.sca_enabled() {
                core.state
                    .current_song
                    .clone()
                    .map(|song| (song, core.state.current_time))
            } else {
                None
            }
        };
        if let Some((song, seconds)) = record {
            self.record_history(&song, seconds, true);
        }

        self.next_internal(true).await;
    }

    /// Go back: restart past 90%, else retrace shuffle history, else
    /// sequential previous with wrap under repeat-all, else restart
    pub async fn previous(&self) {
        self.cancel_crossfade();

        enum PrevDecision {
            Restart,
            Play(usize, Song),
        }

        let decision = {
            let mut core = self.core();
            let duration = core.state.duration;
            if duration > 0.0 && core.state.current_time / duration > 0.9 {
                PrevDecision::Restart
            } else {
                let mut found = None;
                while let Some(uuid) = core.shuffle_history.pop() {
                    if let Some(index) = core.queue.position_of(&uuid) {
                        found = Some(index);
                        break;
                    }
                }

                let target = found.or_else(|| core.queue.previous_sequential_index());
                match target.and_then(|index| {
                    core.queue.get(index).cloned().map(|song| (index, song))
                }) {
                    Some((index, song)) => PrevDecision::Play(index, song),
                    None => PrevDecision::Restart,
                }
            }
        };
        self.persist_shuffle_history();

        match decision {
            PrevDecision::Restart => self.restart_current().await,
            PrevDecision::Play(index, song) => {
                {
                    let mut core = self.core();
                    core.queue.set_index(index);
                    self.publish(&mut core);
                }
                self.sync_queue_index(index).await;
                self.play(song).await;
            }
        }
    }

    /// Set the user volume (0..1)
    pub fn set_volume(&self, volume: f64) {
        let mut core = self.core();
        core.state.volume = volume.clamp(0.0, 1.0);
        self.apply_volume_locked(&mut core);
        self.publish(&mut core);
        drop(core);
        self.persist_player_local();
    }

    /// Toggle mute; the volume level is preserved
    pub fn toggle_mute(&self) {
        let mut core = self.core();
        core.state.muted = !core.state.muted;
        self.apply_volume_locked(&mut core);
        self.publish(&mut core);
        drop(core);
        self.persist_player_local();
    }

    // ===== Next policy =====

    /// Pick the next index under the current play mode
    ///
    /// Shuffle records the outgoing song in the history, picks uniformly
    /// excluding the current index, and never transitions on a one-song
    /// queue. Sequential wraps only under repeat-all; past the end the
    /// decision escalates to SCA population or a stop.
    pub(crate) fn choose_next_locked(&self, core: &mut EngineCore) -> NextDecision {
        if core.queue.is_empty() {
            return NextDecision::Stop;
        }

        match core.queue.play_mode() {
            PlayMode::Shuffle => {
                if let Some(song) = core.state.current_song.as_ref() {
                    core.shuffle_history.push(song.uuid.clone());
                }

                let mut rng = rand::thread_rng();
                match crate::shuffle::pick_shuffle_index(
                    core.queue.len(),
                    core.queue.index(),
                    &mut rng,
                ) {
                    Some(index) => match core.queue.get(index) {
                        Some(song) => NextDecision::Play(index, song.clone()),
                        None => NextDecision::Stop,
                    },
                    None => NextDecision::Restart,
                }
            }
            PlayMode::RepeatOne => {
                let index = core.queue.index();
                match core.queue.get(index) {
                    Some(song) => NextDecision::Play(index, song.clone()),
                    None => NextDecision::Stop,
                }
            }
            PlayMode::Sequential | PlayMode::RepeatAll => {
                let index = core.queue.index();
                if index + 1 < core.queue.len() {
                    let song = core.queue.get(index + 1).cloned();
                    match song {
                        Some(song) => NextDecision::Play(index + 1, song),
                        None => NextDecision::Stop,
                    }
                } else if core.queue.sca_enabled() && !core.state.temp_queue_mode {
                    NextDecision::PopulateSca
                } else if core.queue.play_mode() == PlayMode::RepeatAll {
                    match core.queue.get(0) {
                        Some(song) => NextDecision::Play(0, song.clone()),
                        None => NextDecision::Stop,
                    }
                } else {
                    NextDecision::Stop
                }
            }
        }
    }

    pub(crate) async fn next_internal(&self, user_initiated: bool) {
        if user_initiated {
            self.cancel_crossfade();
        }

        let mut offline_hops = 0usize;
        let mut populated = false;

        loop {
            let decision = {
                let mut core = self.core();
                self.choose_next_locked(&mut core)
            };
            self.persist_shuffle_history();

            match decision {
                NextDecision::Play(index, song) => {
                    if self.inner.deps.offline.offline_required()
                        && !self
                            .inner
                            .deps
                            .offline
                            .offline_song_uuids()
                            .contains(&song.uuid)
                    {
                        let len = self.core().queue.len();
                        offline_hops += 1;
                        if offline_hops >= len.max(1) {
                            let mut core = self.core();
                            core.state.error =
                                Some("No songs available offline".to_string());
                            self.publish(&mut core);
                            return;
                        }
                        // Advance past the uncached song and look again
                        let mut core = self.core();
                        core.queue.set_index(index);
                        continue;
                    }

                    {
                        let mut core = self.core();
                        core.queue.set_index(index);
                        self.publish(&mut core);
                    }
                    self.sync_queue_index(index).await;
                    self.play(song).await;
                    return;
                }
                NextDecision::Restart => {
                    self.restart_current().await;
                    return;
                }
                NextDecision::PopulateSca => {
                    // On exhaustion populate once; an empty result stops
                    if populated {
                        self.stop().await;
                        return;
                    }
                    populated = true;

                    let songs = self
                        .inner
                        .deps
                        .repo
                        .sca_populate_queue(SCA_POPULATE_COUNT)
                        .await
                        .unwrap_or_default();
                    if songs.is_empty() {
                        self.stop().await;
                        return;
                    }
                    let mut core = self.core();
                    core.queue.append(songs);
                    self.publish(&mut core);
                }
                NextDecision::Stop => {
                    self.stop().await;
                    return;
                }
            }
        }
    }

    /// Error-path advance used inside `play`
    ///
    /// Returns the next song to try, or `None` after the retry cap
    /// (`min(5, queue.len())`; an empty queue caps at zero and the
    /// first failure surfaces immediately).
    fn next_after_error(&self) -> Option<Song> {
        let mut core = self.core();
        core.consecutive_errors += 1;
        let cap = (core.queue.len() as u32).min(5);

        if core.consecutive_errors >= cap || cap == 0 {
            core.state.is_loading = false;
            core.state.is_playing = false;
            core.state.error = Some("Unable to play the current queue".to_string());
            self.publish(&mut core);
            return None;
        }

        match self.choose_next_locked(&mut core) {
            NextDecision::Play(index, song) => {
                core.queue.set_index(index);
                self.publish(&mut core);
                Some(song)
            }
            _ => {
                core.state.is_loading = false;
                self.publish(&mut core);
                None
            }
        }
    }

    /// Media `error` event: skip forward until the cap, then stop
    pub(crate) async fn handle_media_error(&self, message: String) {
        tracing::warn!(%message, "media element error");
        let give_up = {
            let mut core = self.core();
            core.consecutive_errors += 1;
            let cap = (core.queue.len() as u32).min(5);
            core.consecutive_errors >= cap || cap == 0
        };

        if give_up {
            {
                let mut core = self.core();
                core.state.error = Some("Unable to play the current queue".to_string());
                self.publish(&mut core);
            }
            self.stop().await;
        } else {
            Box::pin(self.next_internal(false)).await;
        }
    }

    /// Natural track end
    ///
    /// During a crossfade this only flags `skip_ramp` so the transition
    /// completes without the audible ramp.
    pub(crate) async fn handle_track_ended(&self) {
        {
            let mut core = self.core();
            if core.crossfade.in_progress {
                core.crossfade.skip_ramp = true;
                return;
            }
        }

        let (song, seconds, repeat_one) = {
            let core = self.core();
            (
                core.state.current_song.clone(),
                core.state.current_time,
                core.queue.play_mode() == PlayMode::RepeatOne,
            )
        };
        if let Some(song) = &song {
            self.record_history(song, seconds, false);
        }

        if self.check_sleep_timer_fired().await {
            return;
        }

        if repeat_one {
            self.restart_current().await;
        } else {
            self.next_internal(false).await;
        }
    }

    async fn restart_current(&self) {
        let primary = {
            let mut core = self.core();
            core.state.current_time = 0.0;
            self.publish(&mut core);
            core.primary_index
        };
        let element = self.element(primary);
        element.set_current_time(0.0);
        if element.is_paused() {
            if let Err(message) = element.play().await {
                self.handle_media_error(message).await;
            }
        }
    }

    // ===== Gapless preload =====

    /// Preload the next track into the non-primary element
    ///
    /// Active whenever gapless or crossfade is enabled; skipped when the
    /// target matches the last preloaded song.
    pub(crate) async fn preload_next(&self) {
        let target = {
            let core = self.core();
            if !(core.state.fx.gapless.enabled || core.state.fx.crossfade.enabled) {
                return;
            }
            let Some(index) = core.queue.preload_index() else {
                return;
            };
            let Some(song) = core.queue.get(index) else {
                return;
            };
            if core.last_preloaded.as_ref() == Some(&song.uuid) {
                return;
            }
            (core.primary_index, song.clone())
        };

        let (primary, song) = target;
        let Some(url) = self.resolve_url(&song).await else {
            return;
        };

        {
            let mut core = self.core();
            // A crossfade may have swapped primaries while resolving
            if core.primary_index != primary {
                return;
            }
            core.last_preloaded = Some(song.uuid.clone());
        }
        self.element(1 - primary).assign_source(&url);
        tracing::debug!(uuid = %song.uuid, "next track preloaded");
    }

    // ===== Crossfade =====

    /// Cancel an in-flight crossfade
    ///
    /// Clears the flags, stops the non-active element, synchronizes the
    /// primary index to whichever element is audibly playing, and
    /// force-replaces both fade gains: a curve in flight cannot be
    /// cancelled by any parameter method.
    pub(crate) fn cancel_crossfade(&self) {
        let cancelled = {
            let mut core = self.core();
            if !core.crossfade.in_progress {
                false
            } else {
                core.crossfade.clear();

                if let Some(playing) = (0..2).find(|i| !self.element(*i).is_paused()) {
                    core.primary_index = playing;
                }
                let primary = core.primary_slot();
                self.element(primary.other().index()).pause();

                if let Some(graph) = core.graph.as_mut() {
                    graph.force_replace_fade_gain(primary, 1.0);
                    graph.force_replace_fade_gain(primary.other(), 0.0);
                }
                true
            }
        };

        if cancelled {
            tracing::debug!("crossfade cancelled");
            self.emit(EngineEvent::CrossfadeCancelled);
        }
    }

    /// The crossfade sequence
    ///
    /// Entered with `in_progress` and `seek_lockout` already set by the
    /// trigger. Every re-lock checks the in-progress flag: a cancel in
    /// the meantime abandons the task.
    pub(crate) async fn run_crossfade(&self) {
        // 1-3: dual pipeline, next index, outgoing history
        let Some(setup) = ({
            let mut core = self.core();
            if !core.crossfade.in_progress {
                None
            } else if self.ensure_pipeline_locked(&mut core, true).is_err() {
                core.crossfade.clear();
                None
            } else {
                match self.choose_next_locked(&mut core) {
                    NextDecision::Play(index, song) => {
                        let out_slot = core.primary_slot();
                        let outgoing = core.state.current_song.clone();
                        let seconds = core.state.current_time;
                        let duration = core.state.fx.crossfade.duration;
                        Some((index, song, out_slot, outgoing, seconds, duration))
                    }
                    _ => {
                        // Nothing to fade into; the end handler takes over
                        core.crossfade.clear();
                        None
                    }
                }
            }
        }) else {
            return;
        };
        let (next_index, next_song, out_slot, outgoing, seconds, cf_duration) = setup;
        let in_slot = out_slot.other();
        self.persist_shuffle_history();

        if let Some(outgoing) = &outgoing {
            self.record_history(outgoing, seconds, false);
        }

        // 4: resolve the incoming URL
        let Some(url) = self.resolve_url(&next_song).await else {
            let ended = {
                let mut core = self.core();
                let ended = core.crossfade.skip_ramp;
                core.crossfade.clear();
                ended
            };
            if ended {
                self.next_internal(false).await;
            }
            return;
        };

        // 5: feed the secondary element and wait until it can play
        let in_element = self.element(in_slot.index()).clone();
        in_element.assign_source(&url);
        {
            let core = self.core();
            let volume = if core.state.fx.loudness.enabled {
                1.0
            } else if core.state.muted {
                0.0
            } else {
                core.state.volume
            };
            in_element.set_volume(volume);
        }
        if in_element.wait_can_play().await.is_err() {
            let mut core = self.core();
            core.crossfade.clear();
            return;
        }
        if !self.core().crossfade.in_progress {
            return;
        }

        // 6: connect the incoming source and its ReplayGain
        {
            let mut core = self.core();
            let linear = self.rg_linear_locked(&core, &next_song);
            if let Some(graph) = core.graph.as_mut() {
                graph.ensure_source_connected(in_slot);
                graph.set_replay_gain(in_slot, linear);
            }
        }

        // 7: start it playing; inaudible behind the zero fade gain
        if in_element.play().await.is_err() {
            let mut core = self.core();
            core.crossfade.clear();
            return;
        }

        // 8: reference swap, immediately, so stale events from the
        // outgoing element are ignored from here on
        {
            let mut core = self.core();
            if !core.crossfade.in_progress {
                return;
            }
            core.primary_index = in_slot.index();
            core.queue.set_index(next_index);
            core.state.current_song = Some(next_song.clone());
            core.state.current_time = 0.0;
            core.state.duration = in_element.duration();
            core.state.is_playing = true;
            core.state.is_paused = false;
            self.publish(&mut core);
            self.inner.deps.media_session.set_metadata(&next_song);
        }
        self.emit(EngineEvent::TrackChanged {
            uuid: next_song.uuid.clone(),
            previous: outgoing.as_ref().map(|song| song.uuid.clone()),
        });
        self.emit(EngineEvent::CrossfadeStarted {
            from: outgoing
                .as_ref()
                .map(|song| song.uuid.clone())
                .unwrap_or_else(|| next_song.uuid.clone()),
            to: next_song.uuid.clone(),
            duration: cf_duration,
        });

        // 9-11: ramp, or jump straight to the endpoints
        let skip_ramp = self.core().crossfade.skip_ramp;
        if skip_ramp {
            let mut core = self.core();
            if let Some(graph) = core.graph.as_mut() {
                graph.force_replace_fade_gain(out_slot, 0.0);
                graph.force_replace_fade_gain(in_slot, 1.0);
            }
        } else {
            {
                let mut core = self.core();
                if let Some(graph) = core.graph.as_mut() {
                    let start = graph.context().current_time() + CURVE_START_DELAY;
                    // The curves are exact in f64; the value-curve samples
                    // the graph schedules are f32
                    let (fade_out, fade_in) = equal_power_curves(cf_duration);
                    let fade_out: Vec<f32> = fade_out.iter().map(|v| *v as f32).collect();
                    let fade_in: Vec<f32> = fade_in.iter().map(|v| *v as f32).collect();

                    if graph
                        .schedule_fade_curve(out_slot, fade_out.clone(), start, cf_duration)
                        .is_err()
                    {
                        // A prior uncancellable automation holds the node
                        graph.force_replace_fade_gain(out_slot, 1.0);
                        let _ = graph.schedule_fade_curve(out_slot, fade_out, start, cf_duration);
                    }
                    if graph
                        .schedule_fade_curve(in_slot, fade_in.clone(), start, cf_duration)
                        .is_err()
                    {
                        graph.force_replace_fade_gain(in_slot, 0.0);
                        let _ = graph.schedule_fade_curve(in_slot, fade_in, start, cf_duration);
                    }
                }
            }

            tokio::time::sleep(std::time::Duration::from_millis(
                (cf_duration * 1000.0) as u64 + COMPLETION_SLACK_MS,
            ))
            .await;
            if !self.core().crossfade.in_progress {
                return;
            }

            // Clamp the endpoints; force-replace when still locked
            let mut core = self.core();
            if let Some(graph) = core.graph.as_mut() {
                if graph.set_fade_value(out_slot, 0.0).is_err() {
                    graph.force_replace_fade_gain(out_slot, 0.0);
                }
                if graph.set_fade_value(in_slot, 1.0).is_err() {
                    graph.force_replace_fade_gain(in_slot, 1.0);
                }
            }
        }

        // 12: release the outgoing element and finish up
        let out_element = self.element(out_slot.index());
        out_element.pause();
        out_element.clear_source();

        let (version, sync_index) = {
            let mut core = self.core();
            if let Some(graph) = core.graph.as_mut() {
                graph.disconnect_source(out_slot);
            }
            core.source_version += 1;
            self.apply_replay_gain_locked(&mut core);
            core.crossfade.clear();
            self.publish(&mut core);
            (core.source_version, core.queue.index())
        };
        self.emit(EngineEvent::SourceChanged { version });
        self.emit(EngineEvent::CrossfadeCompleted);

        self.sync_queue_index(sync_index).await;
        self.preload_next().await;
        tracing::debug!(uuid = %next_song.uuid, "crossfade completed");
    }

    // ===== Latency switch =====

    /// Tear the context down and rebuild it with a new latency hint
    ///
    /// Preserves the current song, position, volume, mute, the dual
    /// pipeline, the EQ mode and the active bands; the media elements
    /// are untouched and keep playing through the swap.
    pub async fn switch_latency_mode(&self, latency: LatencyMode) {
        let version = {
            let mut core = self.core();
            if core.latency == latency && core.graph.is_some() {
                return;
            }
            core.latency = latency;

            let dual = core
                .graph
                .as_ref()
                .map_or(core.state.fx.crossfade.enabled, lyra_audio::AudioGraph::is_dual);

            // Old context closes, releasing every node with it
            core.graph = None;
            core.graph_generation += 1;
            let config = GraphConfig {
                sample_rate: 44100,
                latency,
                dual,
            };
            match lyra_audio::AudioGraph::new(config, core.graph_generation) {
                Ok(graph) => core.graph = Some(graph),
                Err(err) => {
                    core.state.error = Some(err.to_string());
                    self.publish(&mut core);
                    return;
                }
            }

            let primary = core.primary_slot();
            if let Some(graph) = core.graph.as_mut() {
                graph.ensure_source_connected(primary);
                if dual {
                    graph.build_dual_pipeline(primary);
                }
            }
            self.apply_effect_settings_locked(&mut core);
            self.apply_replay_gain_locked(&mut core);
            core.source_version += 1;
            self.publish(&mut core);
            core.source_version
        };
        self.emit(EngineEvent::SourceChanged { version });
        tracing::debug!(?latency, "latency mode switched");

        let (playing, primary) = {
            let core = self.core();
            (core.state.is_playing, core.primary_index)
        };
        if playing {
            let _ = self.element(primary).play().await;
        }
    }

    /// Persist and apply the low-latency-always preference
    pub async fn set_low_latency_always(&self, always: bool) {
        {
            let mut core = self.core();
            core.state.low_latency_always = always;
            self.publish(&mut core);
        }
        let settings = self.inner.deps.settings.clone();
        tokio::spawn(async move {
            let _ = settings.set_low_latency_always(always).await;
        });

        let target = if always {
            LatencyMode::Interactive
        } else {
            LatencyMode::Playback
        };
        self.switch_latency_mode(target).await;
    }

    // ===== Shared helpers =====

    /// Resolve a song to a playable URL, offline copy first
    pub(crate) async fn resolve_url(&self, song: &Song) -> Option<String> {
        if let Some(url) = self.inner.deps.urls.get_audio_url(&song.uuid).await {
            return Some(url);
        }
        if self.inner.deps.offline.offline_required() {
            return None;
        }
        Some(self.inner.deps.urls.get_stream_url(&song.uuid, song.kind).await)
    }

    /// Walk the queue for a cached song when offline resolution failed
    fn advance_to_cached(&self, hops_so_far: usize) -> Option<Song> {
        let mut core = self.core();
        let len = core.queue.len();
        if hops_so_far >= len {
            core.state.is_loading = false;
            core.state.error = Some("No songs available offline".to_string());
            self.publish(&mut core);
            return None;
        }

        let cached = self.inner.deps.offline.offline_song_uuids();
        for hop in 1..=len {
            let index = (core.queue.index() + hop) % len;
            if let Some(candidate) = core.queue.get(index) {
                if cached.contains(&candidate.uuid) {
                    let song = candidate.clone();
                    core.queue.set_index(index);
                    self.publish(&mut core);
                    return Some(song);
                }
            }
        }

        core.state.is_loading = false;
        core.state.error = Some("No songs available offline".to_string());
        self.publish(&mut core);
        None
    }

    /// ReplayGain config parsed from the persisted block
    pub(crate) fn rg_config_locked(core: &EngineCore) -> ReplayGainConfig {
        ReplayGainConfig {
            mode: ReplayGainMode::from_name(&core.state.fx.replay_gain.mode)
                .unwrap_or(ReplayGainMode::Off),
            preamp_db: core.state.fx.replay_gain.preamp,
            fallback_db: core.state.fx.replay_gain.fallback,
        }
        .clamped()
    }

    /// Linear ReplayGain for a song under the current settings
    pub(crate) fn rg_linear_locked(&self, core: &EngineCore, song: &Song) -> f64 {
        replaygain::linear_gain(
            &Self::rg_config_locked(core),
            song.replay_gain_track,
            song.replay_gain_album,
        )
    }

    /// Apply ReplayGain for the current song
    ///
    /// Dual mode: per-source gain node carries the ReplayGain and the
    /// element volume stays at the user volume (or 1.0 with loudness).
    /// Simple mode: the element volume carries both, clamped to 1.0.
    pub(crate) fn apply_replay_gain_locked(&self, core: &mut EngineCore) {
        if let Some(song) = core.state.current_song.clone() {
            let linear = self.rg_linear_locked(core, &song);
            let primary = core.primary_slot();
            if core.graph.as_ref().is_some_and(lyra_audio::AudioGraph::is_dual) {
                if let Some(graph) = core.graph.as_mut() {
                    graph.set_replay_gain(primary, linear);
                }
            }
        }
        self.apply_volume_locked(core);
    }

    /// Push the user volume to its owner
    ///
    /// With loudness enabled the media elements are pinned to 1.0 for
    /// headroom and the volume lives in the loudness gain stage; without
    /// it the element volume carries the user volume (and, in simple
    /// mode, the ReplayGain factor).
    pub(crate) fn apply_volume_locked(&self, core: &mut EngineCore) {
        let volume = core.state.volume;
        let muted = core.state.muted;
        let loudness_on = core.state.fx.loudness.enabled
            && core
                .graph
                .as_mut()
                .and_then(|graph| graph.loudness_mut().map(|_| ()))
                .is_some();

        if loudness_on {
            for element in &self.inner.deps.elements {
                element.set_volume(1.0);
            }
            if let Some(graph) = core.graph.as_mut() {
                if let Some(loudness) = graph.loudness_mut() {
                    loudness.set_volume(if muted { 0.0 } else { volume as f32 });
                }
            }
            return;
        }

        let dual = core.graph.as_ref().is_some_and(lyra_audio::AudioGraph::is_dual);
        if dual {
            let effective = if muted { 0.0 } else { volume };
            for element in &self.inner.deps.elements {
                element.set_volume(effective);
            }
        } else {
            let linear = core
                .state
                .current_song
                .clone()
                .map_or(1.0, |song| self.rg_linear_locked(core, &song));
            let effective = if muted {
                0.0
            } else {
                (volume * linear).min(1.0)
            };
            self.element(core.primary_index).set_volume(effective);
        }
    }

    /// Apply the tempo block to both elements
    pub(crate) fn apply_tempo_locked(&self, core: &EngineCore) {
        let rate = if core.state.fx.tempo.enabled {
            core.state.fx.tempo.rate
        } else {
            1.0
        };
        for element in &self.inner.deps.elements {
            element.set_playback_rate(rate, core.state.fx.tempo.pitch_lock);
        }
    }

    /// Fire-and-forget history record
    pub(crate) fn record_history(&self, song: &Song, seconds: f64, skipped: bool) {
        let repo = self.inner.deps.repo.clone();
        let uuid = song.uuid.clone();
        let source = if self.core().queue.sca_enabled() {
            HistorySource::Sca
        } else {
            HistorySource::Queue
        };

        tokio::spawn(async move {
            if let Err(err) = repo.history_record(&uuid, seconds, skipped, source).await {
                tracing::debug!(%err, "history record failed");
            }
        });
    }

    /// Sync the queue index: to the server normally, to the snapshot in
    /// temp-queue mode
    pub(crate) async fn sync_queue_index(&self, index: usize) {
        let temp = self.core().state.temp_queue_mode;
        if temp {
            self.save_temp_queue_snapshot().await;
            return;
        }
        if let Err(err) = self.inner.deps.repo.queue_set_index(index).await {
            tracing::debug!(%err, "queue index sync failed");
        }
    }

    /// Fire-and-forget persistence of volume/mute/position
    pub(crate) fn persist_player_local(&self) {
        let snapshot = {
            let core = self.core();
            PlayerLocalSettings {
                volume: core.state.volume,
                muted: core.state.muted,
                current_song_uuid: core
                    .state
                    .current_song
                    .as_ref()
                    .map(|song| song.uuid.clone()),
                current_time: core.state.current_time,
            }
        };
        let settings = self.inner.deps.settings.clone();
        tokio::spawn(async move {
            let _ = settings.set_player_local(&snapshot).await;
        });
    }

    /// Fire-and-forget persistence of the shuffle history
    pub(crate) fn persist_shuffle_history(&self) {
        let entries = self.core().shuffle_history.to_vec();
        let settings = self.inner.deps.settings.clone();
        tokio::spawn(async move {
            let _ = settings.set_shuffle_history(&entries).await;
        });
    }
}
