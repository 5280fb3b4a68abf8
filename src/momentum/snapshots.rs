// Snapshot store: bounded, append-only history of a post's observations.
//
// Rates are always derived from pairs of stored observations. With fewer
// than two observations every rate query is undefined (None), never zero,
// so callers cannot mistake "no data" for "no momentum".

use std::collections::VecDeque;

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;

use super::record::{minutes_between, PostObservation};

/// Smallest capacity that can still produce a rate.
pub const MIN_CAPACITY: usize = 2;

/// Which observed quantity a rate is computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    Score,
    Comments,
}

impl Metric {
    fn value(&self, observation: &PostObservation) -> f64 {
        match self {
            Metric::Score => observation.score as f64,
            Metric::Comments => f64::from(observation.comment_count),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapshotError {
    #[error("observation at {observed_at} does not advance past latest snapshot at {latest}")]
    NonIncreasingTimestamp {
        observed_at: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

/// Ring buffer of observations, oldest first.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    snapshots: VecDeque<PostObservation>,
    capacity: usize,
}

impl SnapshotStore {
    /// Capacities below [`MIN_CAPACITY`] are raised to it.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY);
        Self {
            snapshots: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an observation, evicting the oldest when full.
    ///
    /// Observations must strictly advance in time; anything else (duplicate
    /// poll, clock step backwards) is rejected and the store is untouched.
    pub fn append(&mut self, observation: PostObservation) -> Result<(), SnapshotError> {
        if let Some(latest) = self.snapshots.back() {
            if observation.observed_at <= latest.observed_at {
                return Err(SnapshotError::NonIncreasingTimestamp {
                    observed_at: observation.observed_at,
                    latest: latest.observed_at,
                });
            }
        }

        if self.len() == self.capacity() {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(observation);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn latest(&self) -> Option<&PostObservation> {
        self.snapshots.back()
    }

    pub fn oldest(&self) -> Option<&PostObservation> {
        self.snapshots.front()
    }

    /// Per-minute rate over roughly the last `window` of history.
    ///
    /// Measured from the newest snapshot back to the newest earlier snapshot
    /// at or before `latest - window`. When the history is shorter than the
    /// window the oldest snapshot is used instead.
    pub fn rate_over(&self, window: TimeDelta, metric: Metric) -> Option<f64> {
        let latest = self.snapshots.back()?;
        if self.snapshots.len() < MIN_CAPACITY {
            return None;
        }

        let base = match latest.observed_at.checked_sub_signed(window) {
            Some(cutoff) => self
                .snapshots
                .iter()
                .rev()
                .skip(1)
                .find(|s| s.observed_at <= cutoff),
            None => None,
        }
        .or_else(|| self.oldest())?;

        per_minute(base, latest, metric)
    }

    /// Per-minute rate from the oldest to the newest snapshot.
    pub fn span_rate(&self, metric: Metric) -> Option<f64> {
        if self.snapshots.len() < MIN_CAPACITY {
            return None;
        }
        per_minute(self.oldest()?, self.latest()?, metric)
    }

    /// Mean of the per-interval rates across the most recent `intervals`
    /// consecutive snapshot pairs (fewer if the history is shorter).
    pub fn moving_average(&self, intervals: usize, metric: Metric) -> Option<f64> {
        if intervals == 0 || self.snapshots.len() < MIN_CAPACITY {
            return None;
        }

        let start = self.snapshots.len().saturating_sub(intervals + 1);
        let rates: Vec<f64> = self
            .snapshots
            .range(start..)
            .zip(self.snapshots.range(start + 1..))
            .filter_map(|(earlier, later)| per_minute(earlier, later, metric))
            .collect();

        if rates.is_empty() {
            None
        } else {
            Some(rates.iter().sum::<f64>() / rates.len() as f64)
        }
    }
}

/// Rate of change between two observations, undefined for a non-positive gap.
fn per_minute(earlier: &PostObservation, later: &PostObservation, metric: Metric) -> Option<f64> {
    let minutes = minutes_between(earlier.observed_at, later.observed_at);
    if minutes <= 0.0 {
        return None;
    }
    Some((metric.value(later) - metric.value(earlier)) / minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 9, 17, 12, 0, 0).unwrap() + TimeDelta::minutes(minute)
    }

    fn obs(minute: i64, score: i64, comments: u32) -> PostObservation {
        PostObservation {
            post_id: "abc".to_string(),
            observed_at: at(minute),
            score,
            comment_count: comments,
            created_at: at(0),
        }
    }

    fn store_of(points: &[(i64, i64, u32)]) -> SnapshotStore {
        let mut store = SnapshotStore::new(10);
        for &(minute, score, comments) in points {
            store.append(obs(minute, score, comments)).unwrap();
        }
        store
    }

    // ── append ──────────────────────────────────────────────────────

    #[test]
    fn test_append_evicts_oldest_at_capacity() {
        let mut store = SnapshotStore::new(3);
        for minute in 1..=5 {
            store.append(obs(minute, minute * 10, 0)).unwrap();
        }
        assert_eq!(store.len(), 3);
        assert_eq!(store.oldest().unwrap().observed_at, at(3));
        assert_eq!(store.latest().unwrap().observed_at, at(5));
    }

    #[test]
    fn test_append_rejects_duplicate_timestamp() {
        let mut store = store_of(&[(1, 10, 0)]);
        let err = store.append(obs(1, 20, 0)).unwrap_err();
        assert!(matches!(err, SnapshotError::NonIncreasingTimestamp { .. }));
        assert_eq!(store.len(), 1);
        assert_eq!(store.latest().unwrap().score, 10);
    }

    #[test]
    fn test_append_rejects_backwards_timestamp() {
        let mut store = store_of(&[(5, 10, 0)]);
        assert!(store.append(obs(4, 20, 0)).is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_capacity_floor() {
        assert_eq!(SnapshotStore::new(0).capacity(), MIN_CAPACITY);
        assert_eq!(SnapshotStore::new(1).capacity(), MIN_CAPACITY);
    }

    // ── undefined rates ─────────────────────────────────────────────

    #[test]
    fn test_rates_undefined_with_single_snapshot() {
        let store = store_of(&[(3, 40, 2)]);
        assert_eq!(store.span_rate(Metric::Score), None);
        assert_eq!(store.moving_average(3, Metric::Score), None);
        assert_eq!(store.rate_over(TimeDelta::minutes(5), Metric::Score), None);
    }

    #[test]
    fn test_rates_undefined_when_empty() {
        let store = SnapshotStore::new(5);
        assert_eq!(store.span_rate(Metric::Comments), None);
        assert_eq!(store.moving_average(1, Metric::Comments), None);
    }

    #[test]
    fn test_moving_average_zero_intervals_is_undefined() {
        let store = store_of(&[(0, 0, 0), (2, 20, 0)]);
        assert_eq!(store.moving_average(0, Metric::Score), None);
    }

    // ── rate math ───────────────────────────────────────────────────

    #[test]
    fn test_span_rate_uses_oldest_and_newest() {
        let store = store_of(&[(3, 40, 0), (5, 90, 0), (7, 120, 0)]);
        // (120 - 40) / 4 = 20
        let rate = store.span_rate(Metric::Score).unwrap();
        assert!((rate - 20.0).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn test_moving_average_over_recent_intervals() {
        // Interval rates: 10, 30, 50, 70
        let store = store_of(&[(0, 0, 0), (1, 10, 0), (2, 40, 0), (3, 90, 0), (4, 160, 0)]);
        let last_two = store.moving_average(2, Metric::Score).unwrap();
        assert!((last_two - 60.0).abs() < 1e-9, "got {last_two}");
        let all = store.moving_average(10, Metric::Score).unwrap();
        assert!((all - 40.0).abs() < 1e-9, "got {all}");
    }

    #[test]
    fn test_moving_average_smooths_uneven_gaps() {
        // 30 upvotes over 3 minutes, then 10 over 1 minute: rates 10 and 10
        let store = store_of(&[(0, 0, 0), (3, 30, 0), (4, 40, 0)]);
        let avg = store.moving_average(3, Metric::Score).unwrap();
        assert!((avg - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_negative_rate_when_score_drops() {
        let store = store_of(&[(0, 100, 0), (2, 80, 0)]);
        let rate = store.span_rate(Metric::Score).unwrap();
        assert!((rate + 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_comment_metric() {
        let store = store_of(&[(0, 0, 4), (2, 0, 10)]);
        let rate = store.span_rate(Metric::Comments).unwrap();
        assert!((rate - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_over_window_brackets_recent_history() {
        let store = store_of(&[(0, 0, 0), (10, 100, 0), (12, 160, 0), (14, 200, 0)]);
        // 4-minute window: base is the snapshot at minute 10
        let rate = store.rate_over(TimeDelta::minutes(4), Metric::Score).unwrap();
        assert!((rate - 25.0).abs() < 1e-9, "got {rate}");
    }

    #[test]
    fn test_rate_over_window_longer_than_history_uses_full_span() {
        let store = store_of(&[(2, 20, 0), (4, 60, 0)]);
        let rate = store.rate_over(TimeDelta::minutes(60), Metric::Score).unwrap();
        assert!((rate - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_rate_over_zero_window_uses_last_interval() {
        let store = store_of(&[(0, 0, 0), (1, 10, 0), (2, 40, 0)]);
        let rate = store.rate_over(TimeDelta::zero(), Metric::Score).unwrap();
        assert!((rate - 30.0).abs() < 1e-9);
    }
}
