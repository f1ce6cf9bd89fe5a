//! Sleep timer
//!
//! Two modes: a plain duration, or a wall-clock target time with a
//! minimum-minutes floor. The timer never pauses a foregrounded app; it
//! re-checks a second later and only acts once the document is hidden.
//! Checks run from three places: a single-shot wake at the end time, a
//! 60-second poll (background timers are unreliable), and between songs.

use chrono::{Duration, NaiveDateTime, NaiveTime};
use lyra_storage::{SleepTimerMode, SleepTimerSettings};

/// Targets that passed within this window count as "tonight, already
/// over"; anything older is treated as tomorrow's target
pub const SLEEP_WINDOW_HOURS: i64 = 6;

/// Poll interval backing up the single-shot wake
pub const POLL_INTERVAL_SECS: u64 = 60;

/// Retry delay when the wake fires while the app is foregrounded
pub const FOREGROUND_RETRY_SECS: u64 = 1;

/// Runtime timer state
#[derive(Debug, Clone, Copy, Default)]
pub struct SleepTimerState {
    /// Expiry on the wall clock, epoch ms; `None` while inactive
    pub end_time_ms: Option<i64>,

    /// Started automatically on backgrounding (time mode); cancelled
    /// again when the app returns to the foreground
    pub auto_started: bool,
}

impl SleepTimerState {
    /// Whether the timer is armed
    pub fn is_active(&self) -> bool {
        self.end_time_ms.is_some()
    }

    /// Whether the timer has expired at `now_ms`
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.end_time_ms, Some(end) if now_ms >= end)
    }

    /// Disarm
    pub fn cancel(&mut self) {
        self.end_time_ms = None;
        self.auto_started = false;
    }
}

/// End time for duration mode
pub fn duration_end(now: NaiveDateTime, minutes: u32) -> NaiveDateTime {
    now + Duration::minutes(i64::from(minutes.min(180)))
}

/// End time for time mode
///
/// Parses the HH:MM target against today. A target that passed more
/// than six hours ago means tomorrow's occurrence; one that passed
/// within the window yields `None` (indefinite) unless a minimum floor
/// forces an end. The result never lands before `now + minimum`.
pub fn target_end(
    now: NaiveDateTime,
    target_hhmm: &str,
    minimum_minutes: u32,
) -> Option<NaiveDateTime> {
    let time = NaiveTime::parse_from_str(target_hhmm, "%H:%M").ok()?;
    let minimum_end = now + Duration::minutes(i64::from(minimum_minutes.min(180)));

    let mut target = now.date().and_time(time);
    if target <= now {
        if now - target > Duration::hours(SLEEP_WINDOW_HOURS) {
            target += Duration::days(1);
        } else if minimum_minutes == 0 {
            // Passed recently with no floor: indefinite
            return None;
        } else {
            return Some(minimum_end);
        }
    }

    Some(target.max(minimum_end))
}

/// End time for the given settings
pub fn compute_end(now: NaiveDateTime, settings: &SleepTimerSettings) -> Option<NaiveDateTime> {
    match settings.mode {
        SleepTimerMode::Duration => {
            if settings.minutes == 0 {
                None
            } else {
                Some(duration_end(now, settings.minutes))
            }
        }
        SleepTimerMode::Time => target_end(now, &settings.target_time, settings.minimum_minutes),
    }
}
