//! Day-over-day visit streaks.
//!
//! A streak is kept in two store slots: the last visit timestamp (RFC 3339,
//! UTC) and the streak count. Same-calendar-day revisits are read-only.

use chrono::{DateTime, TimeZone, Utc};

use crate::store::KeyValueStore;

pub const LAST_VISIT_KEY: &str = "lastVisit";
pub const STREAK_KEY: &str = "vibeStreak";

/// Visits closer together than this continue the streak.
const STREAK_WINDOW_MS: i64 = 2 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakState {
    pub last_visit: DateTime<Utc>,
    /// Always >= 1.
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakUpdate {
    pub state: StreakState,
    pub count: u32,
    /// False only for a revisit on the same calendar day.
    pub is_new_day: bool,
}

/// Apply one visit at `now` to the persisted state.
///
/// The calendar-day comparison happens in `now`'s time zone while the
/// continuation check uses absolute elapsed time, so 23:59 followed by
/// 00:01 counts as a new consecutive day.
pub fn update_streak<Tz: TimeZone>(now: &DateTime<Tz>, persisted: Option<&StreakState>) -> StreakUpdate {
    let now_utc = now.with_timezone(&Utc);

    let Some(prev) = persisted else {
        return started(now_utc);
    };

    let last_local = prev.last_visit.with_timezone(&now.timezone());
    if last_local.date_naive() == now.date_naive() {
        return StreakUpdate {
            state: *prev,
            count: prev.count,
            is_new_day: false,
        };
    }

    let elapsed_ms = (now_utc - prev.last_visit).num_milliseconds().abs();
    if elapsed_ms < STREAK_WINDOW_MS {
        let count = prev.count.saturating_add(1);
        StreakUpdate {
            state: StreakState { last_visit: now_utc, count },
            count,
            is_new_day: true,
        }
    } else {
        started(now_utc)
    }
}

fn started(now: DateTime<Utc>) -> StreakUpdate {
    StreakUpdate {
        state: StreakState { last_visit: now, count: 1 },
        count: 1,
        is_new_day: true,
    }
}

/// Reads and writes streak state through an injected store.
///
/// Store failures never escape: an unreadable store is a first-time user,
/// an unwritable one just loses the update.
pub struct StreakTracker<S> {
    store: S,
}

impl<S: KeyValueStore> StreakTracker<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Current persisted state, or `None` when absent or malformed.
    pub fn load(&self) -> Option<StreakState> {
        let read = |key: &str| match self.store.get(key) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(key, error = %e, "streak store read failed");
                None
            }
        };

        let raw_visit = read(LAST_VISIT_KEY)?;
        let raw_count = read(STREAK_KEY)?;

        let last_visit = match DateTime::parse_from_rfc3339(raw_visit.trim()) {
            Ok(t) => t.with_timezone(&Utc),
            Err(e) => {
                tracing::debug!(value = %raw_visit, error = %e, "malformed last visit; starting fresh");
                return None;
            }
        };
        let count = match raw_count.trim().parse::<u32>() {
            Ok(n) if n >= 1 => n,
            _ => {
                tracing::debug!(value = %raw_count, "malformed streak count; starting fresh");
                return None;
            }
        };

        Some(StreakState { last_visit, count })
    }

    /// Record a visit at `now`, persisting only when the day changed.
    pub fn record_visit<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> StreakUpdate {
        let prev = self.load();
        let update = update_streak(now, prev.as_ref());

        if update.is_new_day {
            self.persist(&update.state);
        }

        tracing::info!(
            count = update.count,
            is_new_day = update.is_new_day,
            "streak updated"
        );
        update
    }

    fn persist(&mut self, state: &StreakState) {
        let visit = state.last_visit.to_rfc3339();
        let count = state.count.to_string();
        for (key, value) in [(LAST_VISIT_KEY, visit.as_str()), (STREAK_KEY, count.as_str())] {
            if let Err(e) = self.store.set(key, value) {
                tracing::warn!(key, error = %e, "streak store write failed");
            }
        }
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use chrono::{Duration, FixedOffset};

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn state(s: &str, count: u32) -> StreakState {
        StreakState { last_visit: utc(s), count }
    }

    #[test]
    fn test_first_visit_starts_at_one() {
        let now = utc("2024-03-01T10:00:00Z");
        let u = update_streak(&now, None);
        assert_eq!(u.count, 1);
        assert!(u.is_new_day);
        assert_eq!(u.state, StreakState { last_visit: now, count: 1 });
    }

    #[test]
    fn test_same_day_is_idempotent() {
        let prev = state("2024-03-01T08:00:00Z", 4);
        let now = utc("2024-03-01T20:00:00Z");
        let first = update_streak(&now, Some(&prev));
        let second = update_streak(&now, Some(&first.state));
        assert_eq!(first.count, 4);
        assert_eq!(second.count, 4);
        assert!(!first.is_new_day);
        assert!(!second.is_new_day);
        assert_eq!(second.state, prev);
    }

    #[test]
    fn test_47_hours_increments() {
        let prev = state("2024-03-01T10:00:00Z", 2);
        let now = prev.last_visit + Duration::hours(47);
        let u = update_streak(&now, Some(&prev));
        assert_eq!(u.count, 3);
        assert!(u.is_new_day);
        assert_eq!(u.state.last_visit, now);
    }

    #[test]
    fn test_49_hours_resets() {
        let prev = state("2024-03-01T10:00:00Z", 9);
        let now = prev.last_visit + Duration::hours(49);
        let u = update_streak(&now, Some(&prev));
        assert_eq!(u.count, 1);
        assert!(u.is_new_day);
    }

    #[test]
    fn test_exactly_48_hours_resets() {
        let prev = state("2024-03-01T10:00:00Z", 5);
        let now = prev.last_visit + Duration::hours(48);
        assert_eq!(update_streak(&now, Some(&prev)).count, 1);
    }

    #[test]
    fn test_near_midnight_counts_as_new_day() {
        let prev = state("2024-03-01T23:59:00Z", 1);
        let now = utc("2024-03-02T00:01:00Z");
        let u = update_streak(&now, Some(&prev));
        assert_eq!(u.count, 2);
        assert!(u.is_new_day);
    }

    #[test]
    fn test_calendar_day_uses_local_zone() {
        // Same UTC day, but 23:30 -> 00:30 in UTC+2.
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let prev = state("2024-03-01T21:30:00Z", 3);
        let now = utc("2024-03-01T22:30:00Z").with_timezone(&tz);
        let u = update_streak(&now, Some(&prev));
        assert_eq!(u.count, 4);

        let now_utc = utc("2024-03-01T22:30:00Z");
        assert!(!update_streak(&now_utc, Some(&prev)).is_new_day);
    }

    #[test]
    fn test_backwards_clock_uses_absolute_gap() {
        let prev = state("2024-03-05T10:00:00Z", 6);
        let now = utc("2024-03-04T10:00:00Z");
        assert_eq!(update_streak(&now, Some(&prev)).count, 7);
    }

    #[test]
    fn test_tracker_persists_new_day() {
        let mut tracker = StreakTracker::new(MemoryStore::new());
        let day1 = utc("2024-03-01T09:00:00Z");
        assert_eq!(tracker.record_visit(&day1).count, 1);
        assert_eq!(tracker.record_visit(&(day1 + Duration::hours(2))).count, 1);
        assert_eq!(tracker.record_visit(&(day1 + Duration::hours(24))).count, 2);

        let store = tracker.into_inner();
        assert_eq!(store.get(STREAK_KEY).unwrap().as_deref(), Some("2"));
        let saved = store.get(LAST_VISIT_KEY).unwrap().unwrap();
        assert_eq!(utc(&saved), day1 + Duration::hours(24));
    }

    #[test]
    fn test_tracker_same_day_does_not_write() {
        let mut store = MemoryStore::new();
        store.set(LAST_VISIT_KEY, "2024-03-01T08:00:00+00:00").unwrap();
        store.set(STREAK_KEY, "3").unwrap();
        let mut tracker = StreakTracker::new(store);
        let u = tracker.record_visit(&utc("2024-03-01T18:00:00Z"));
        assert_eq!(u.count, 3);
        let store = tracker.into_inner();
        assert_eq!(
            store.get(LAST_VISIT_KEY).unwrap().as_deref(),
            Some("2024-03-01T08:00:00+00:00")
        );
    }

    #[test]
    fn test_malformed_state_is_first_time_user() {
        for (visit, count) in [
            ("not a date", "3"),
            ("2024-03-01T08:00:00Z", "zero"),
            ("2024-03-01T08:00:00Z", "0"),
        ] {
            let mut store = MemoryStore::new();
            store.set(LAST_VISIT_KEY, visit).unwrap();
            store.set(STREAK_KEY, count).unwrap();
            let mut tracker = StreakTracker::new(store);
            assert!(tracker.load().is_none());
            let u = tracker.record_visit(&utc("2024-03-01T18:00:00Z"));
            assert_eq!(u.count, 1);
            assert!(u.is_new_day);
        }
    }

    #[test]
    fn test_missing_count_is_first_time_user() {
        let mut store = MemoryStore::new();
        store.set(LAST_VISIT_KEY, "2024-03-01T08:00:00Z").unwrap();
        let tracker = StreakTracker::new(store);
        assert!(tracker.load().is_none());
    }

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        fn set(&mut self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
        fn remove(&mut self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk on fire".into()))
        }
    }

    #[test]
    fn test_broken_store_degrades() {
        let mut tracker = StreakTracker::new(BrokenStore);
        let u = tracker.record_visit(&utc("2024-03-01T18:00:00Z"));
        assert_eq!(u.count, 1);
        assert!(u.is_new_day);
    }
}
