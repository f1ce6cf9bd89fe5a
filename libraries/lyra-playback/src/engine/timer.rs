//! Sleep timer operations and visibility transitions

use super::PlayerEngine;
use crate::sleep_timer::{self, FOREGROUND_RETRY_SECS, POLL_INTERVAL_SECS};
use crate::types::EngineEvent;
use lyra_core::repository::Visibility;
use lyra_storage::SleepTimerMode;
use std::sync::Arc;
use std::time::Duration;

impl PlayerEngine {
    // ===== Settings =====

    /// Set the timer mode (duration | time)
    pub fn set_sleep_timer_mode(&self, mode: SleepTimerMode) {
        {
            let mut core = self.core();
            core.state.fx.sleep_timer.mode = mode;
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the duration-mode minutes (0..180)
    pub fn set_sleep_timer_minutes(&self, minutes: u32) {
        {
            let mut core = self.core();
            core.state.fx.sleep_timer.minutes = minutes.min(180);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the time-mode target ("HH:MM")
    pub fn set_sleep_timer_target_time(&self, target: &str) {
        {
            let mut core = self.core();
            core.state.fx.sleep_timer.target_time = target.to_string();
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    /// Set the minimum-minutes floor for time mode (0..180)
    pub fn set_sleep_timer_minimum_minutes(&self, minutes: u32) {
        {
            let mut core = self.core();
            core.state.fx.sleep_timer.minimum_minutes = minutes.min(180);
            self.publish(&mut core);
        }
        self.persist_fx();
    }

    // ===== Arming =====

    /// Arm the timer from the current settings
    pub fn start_sleep_timer(&self) {
        self.start_sleep_timer_internal(false);
    }

    pub(crate) fn start_sleep_timer_internal(&self, auto: bool) {
        let end_ms = {
            let mut core = self.core();
            let now = chrono::Local::now().naive_local();
            let end = sleep_timer::compute_end(now, &core.state.fx.sleep_timer);

            let end_ms = end.map(|end| {
                let delta = end - now;
                self.now_ms() + delta.num_milliseconds()
            });

            core.sleep.end_time_ms = end_ms;
            core.sleep.auto_started = auto && end_ms.is_some();
            core.state.sleep_timer_end_time = end_ms;
            self.publish(&mut core);
            end_ms
        };

        if let Some(end_ms) = end_ms {
            tracing::debug!(end_ms, auto, "sleep timer armed");
            self.spawn_sleep_timer_wake(end_ms);
        }
    }

    /// Disarm the timer and clear the scheduled wake
    pub fn cancel_sleep_timer(&self) {
        let mut core = self.core();
        core.sleep.cancel();
        core.state.sleep_timer_end_time = None;
        self.publish(&mut core);
    }

    // ===== Checking =====

    /// Check the timer; pauses only while the document is hidden
    ///
    /// Returns true when the timer fired (playback paused). A wake in
    /// the foreground defers by one second and re-checks visibility.
    pub(crate) fn check_sleep_timer_fired(
        &self,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + '_>> {
        Box::pin(async move { self.check_sleep_timer_fired_inner().await })
    }

    async fn check_sleep_timer_fired_inner(&self) -> bool {
        let expired = {
            let core = self.core();
            core.sleep.is_expired(self.now_ms())
        };
        if !expired {
            return false;
        }

        if self.inner.deps.visibility.visibility() == Visibility::Visible {
            // Foreground: not an error, just not yet
            let engine = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(FOREGROUND_RETRY_SECS)).await;
                engine.check_sleep_timer_fired().await;
            });
            return false;
        }

        {
            let mut core = self.core();
            // Re-check under the lock; a cancel may have slipped in
            if !core.sleep.is_expired(self.now_ms()) {
                return false;
            }
            core.sleep.cancel();
            core.state.sleep_timer_end_time = None;
            self.publish(&mut core);
        }

        tracing::debug!("sleep timer fired, pausing");
        self.pause().await;
        self.emit(EngineEvent::SleepTimerFired);
        true
    }

    /// One-shot wake at the end time
    fn spawn_sleep_timer_wake(&self, end_ms: i64) {
        let weak = Arc::downgrade(&self.inner);
        let delay = (end_ms - self.now_ms()).max(0) as u64;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;

            if let Some(inner) = weak.upgrade() {
                let engine = PlayerEngine { inner };
                // The wake may be stale (cancelled or re-armed); the
                // expiry check sorts that out
                if engine.core().sleep.end_time_ms == Some(end_ms) {
                    engine.check_sleep_timer_fired().await;
                }
            }
        });
    }

    /// 60-second poll backing up the single-shot wake
    pub(crate) fn spawn_sleep_timer_poll(&self) {
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(POLL_INTERVAL_SECS));
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let engine = PlayerEngine { inner };
                engine.check_sleep_timer_fired().await;
            }
        });
    }

    // ===== Visibility =====

    /// Host visibility transition
    ///
    /// Backgrounding auto-starts a time-mode timer that is not already
    /// armed; foregrounding cancels an auto-started one (it is
    /// recomputed on the next hide) and runs the gated focus refresh.
    pub async fn on_visibility_changed(&self, hidden: bool) {
        if hidden {
            let auto_start = {
                let mut core = self.core();
                core.last_hidden_at_ms = self.now_ms();
                core.state.fx.sleep_timer.mode == SleepTimerMode::Time
                    && !core.sleep.is_active()
            };
            if auto_start {
                self.start_sleep_timer_internal(true);
            }
        } else {
            let cancel = self.core().sleep.auto_started;
            if cancel {
                self.cancel_sleep_timer();
            }
            self.focus_refresh().await;
        }
    }

    /// Host window-focus gain; shares the focus-refresh gating
    pub async fn on_focus(&self) {
        self.focus_refresh().await;
    }
}
