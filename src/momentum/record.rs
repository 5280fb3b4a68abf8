// Tracking records: one per post the monitor has seen in its community.
//
// A record starts as a candidate with no history. Once the post clears the
// initial momentum bar it starts collecting snapshots, and once the
// follow-up bar is cleared it becomes triggered and stays that way. The
// state is a tagged enum so the initial rate and trigger time only exist in
// the phases where they are meaningful.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::snapshots::SnapshotStore;

/// One poll's view of a post. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostObservation {
    pub post_id: String,
    pub observed_at: DateTime<Utc>,
    /// Net upvotes as reported by the platform (fuzzed, may be negative).
    pub score: i64,
    pub comment_count: u32,
    pub created_at: DateTime<Utc>,
}

impl PostObservation {
    /// Minutes between post creation and this observation. Negative when
    /// the observation claims to predate the post.
    pub fn age_minutes(&self) -> f64 {
        minutes_between(self.created_at, self.observed_at)
    }
}

/// Fractional minutes from `from` to `to`.
///
/// Nanosecond resolution, so any strictly later `to` gives a positive gap.
/// Spans too long for nanoseconds fall back to milliseconds.
pub(crate) fn minutes_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    let gap = to - from;
    match gap.num_nanoseconds() {
        Some(nanos) => nanos as f64 / 60_000_000_000.0,
        None => gap.num_milliseconds() as f64 / 60_000.0,
    }
}

/// Coarse lifecycle phase, ordered so that transitions only ever increase it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingPhase {
    Candidate,
    Tracking,
    Triggered,
}

impl TrackingPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingPhase::Candidate => "candidate",
            TrackingPhase::Tracking => "tracking",
            TrackingPhase::Triggered => "triggered",
        }
    }
}

impl std::fmt::Display for TrackingPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Full tracking state, carrying the data each phase owns.
#[derive(Debug, Clone, PartialEq)]
pub enum TrackingState {
    /// Seen, but has not cleared the initial threshold.
    Candidate,
    /// Cleared the initial threshold; accumulating snapshots.
    Tracking { initial_rate: f64 },
    /// Cleared the follow-up threshold. Terminal.
    Triggered {
        initial_rate: f64,
        triggered_at: DateTime<Utc>,
    },
}

impl TrackingState {
    pub fn phase(&self) -> TrackingPhase {
        match self {
            TrackingState::Candidate => TrackingPhase::Candidate,
            TrackingState::Tracking { .. } => TrackingPhase::Tracking,
            TrackingState::Triggered { .. } => TrackingPhase::Triggered,
        }
    }

    /// Upvotes/minute recorded when tracking began.
    pub fn initial_rate(&self) -> Option<f64> {
        match self {
            TrackingState::Candidate => None,
            TrackingState::Tracking { initial_rate }
            | TrackingState::Triggered { initial_rate, .. } => Some(*initial_rate),
        }
    }

    pub fn triggered_at(&self) -> Option<DateTime<Utc>> {
        match self {
            TrackingState::Triggered { triggered_at, .. } => Some(*triggered_at),
            _ => None,
        }
    }
}

/// Everything the monitor knows about one post.
///
/// Fields are only mutated by the evaluator, which keeps the state
/// transitions monotonic and the snapshot history non-empty once tracking.
#[derive(Debug, Clone)]
pub struct TrackingRecord {
    pub(super) post_id: String,
    pub(super) community: String,
    pub(super) created_at: DateTime<Utc>,
    /// Latest accepted observation while still a candidate (candidates keep
    /// no snapshot history).
    pub(super) last_candidate_observation: Option<DateTime<Utc>>,
    pub(super) snapshots: SnapshotStore,
    pub(super) state: TrackingState,
}

impl TrackingRecord {
    /// A fresh candidate record.
    pub fn new(
        post_id: &str,
        community: &str,
        created_at: DateTime<Utc>,
        max_snapshots: usize,
    ) -> Self {
        Self {
            post_id: post_id.to_string(),
            community: community.to_string(),
            created_at,
            last_candidate_observation: None,
            snapshots: SnapshotStore::new(max_snapshots),
            state: TrackingState::Candidate,
        }
    }

    pub fn post_id(&self) -> &str {
        &self.post_id
    }

    pub fn community(&self) -> &str {
        &self.community
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn state(&self) -> &TrackingState {
        &self.state
    }

    pub fn phase(&self) -> TrackingPhase {
        self.state.phase()
    }

    /// Timestamp of the most recent accepted observation, if any.
    pub fn latest_observed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshots
            .latest()
            .map(|s| s.observed_at)
            .or(self.last_candidate_observation)
    }

    /// The timestamp eviction ages a record by: its newest snapshot, or the
    /// post's creation time while it is still a candidate.
    pub fn age_reference(&self) -> DateTime<Utc> {
        self.snapshots
            .latest()
            .map(|s| s.observed_at)
            .unwrap_or(self.created_at)
    }
}
