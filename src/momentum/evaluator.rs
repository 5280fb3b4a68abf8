// Momentum evaluator: the two-stage threshold state machine.
//
// Stage one is a cheap single-sample check: score divided by post age. Posts
// that clear it start collecting snapshots. Stage two requires the moving
// average of the recent per-interval rates to clear a higher bar, which
// filters out bursts that don't sustain. A post fires at most once.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::record::{PostObservation, TrackingRecord, TrackingState};
use super::snapshots::{Metric, SnapshotError};

/// How the candidate stage is gated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdMode {
    /// Candidates must clear `initial_threshold` before tracking starts.
    #[default]
    TwoStage,
    /// Every candidate old enough is tracked; only the follow-up threshold
    /// decides whether it fires.
    Single,
}

/// Thresholds and smoothing for one community.
#[derive(Debug, Clone, PartialEq)]
pub struct MomentumPolicy {
    /// Upvotes/minute since creation needed to start tracking.
    pub initial_threshold: f64,
    /// Moving-average upvotes/minute needed to fire.
    pub followup_threshold: f64,
    /// Posts younger than this are never promoted.
    pub min_age_minutes: f64,
    /// Number of inter-snapshot intervals in the moving average.
    pub moving_average_window: usize,
    pub mode: ThresholdMode,
}

impl Default for MomentumPolicy {
    fn default() -> Self {
        Self {
            initial_threshold: 10.0,
            followup_threshold: 15.0,
            min_age_minutes: 2.0,
            moving_average_window: 3,
            mode: ThresholdMode::TwoStage,
        }
    }
}

/// Rates computed for a tracked post on one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MomentumReading {
    /// Upvotes/minute across the whole tracked span.
    pub current_rate: f64,
    /// Mean of the most recent per-interval upvote rates.
    pub moving_avg_rate: f64,
    /// Comments/minute across the whole tracked span.
    pub comment_rate: f64,
    pub initial_rate: f64,
    pub snapshot_count: usize,
}

/// Outcome of feeding one observation to a record.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Out-of-order or duplicate observation; record untouched.
    Unchanged,
    TooYoung { age_minutes: f64 },
    BelowInitialThreshold { rate: f64 },
    TrackingStarted { initial_rate: f64 },
    TrackingContinues(MomentumReading),
    Triggered {
        reading: MomentumReading,
        triggered_at: DateTime<Utc>,
    },
    AlreadyTriggered,
}

impl Verdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Unchanged => "unchanged",
            Verdict::TooYoung { .. } => "too_young",
            Verdict::BelowInitialThreshold { .. } => "below_initial_threshold",
            Verdict::TrackingStarted { .. } => "tracking_started",
            Verdict::TrackingContinues(_) => "tracking_continues",
            Verdict::Triggered { .. } => "triggered",
            Verdict::AlreadyTriggered => "already_triggered",
        }
    }
}

/// Observations that cannot be applied to a record at all.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("observation for post {observed} fed to record for post {expected}")]
    PostMismatch { expected: String, observed: String },

    #[error("post {post_id} observed at {observed_at}, before its creation at {created_at}")]
    ObservedBeforeCreation {
        post_id: String,
        observed_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    },

    #[error("snapshot rejected: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("invariant violated for post {post_id}: {detail}")]
    InvariantViolation { post_id: String, detail: String },
}

/// Feed one observation through the state machine.
///
/// Either the whole transition applies or the record is left as it was;
/// a returned error never leaves a half-updated record behind.
pub fn evaluate(
    record: &mut TrackingRecord,
    observation: PostObservation,
    policy: &MomentumPolicy,
) -> Result<Verdict, EvaluationError> {
    if observation.post_id != record.post_id {
        return Err(EvaluationError::PostMismatch {
            expected: record.post_id.clone(),
            observed: observation.post_id,
        });
    }

    if let Some(latest) = record.latest_observed_at() {
        if observation.observed_at <= latest {
            debug!(
                post_id = %record.post_id,
                observed_at = %observation.observed_at,
                latest = %latest,
                "Ignoring out-of-order observation"
            );
            return Ok(Verdict::Unchanged);
        }
    }

    if observation.observed_at < record.created_at {
        return Err(EvaluationError::ObservedBeforeCreation {
            post_id: record.post_id.clone(),
            observed_at: observation.observed_at,
            created_at: record.created_at,
        });
    }

    match record.state.clone() {
        TrackingState::Candidate => evaluate_candidate(record, observation, policy),
        TrackingState::Tracking { initial_rate } => {
            evaluate_tracking(record, observation, initial_rate, policy)
        }
        TrackingState::Triggered { .. } => {
            // Kept for observability; a triggered record never fires again.
            record.snapshots.append(observation)?;
            Ok(Verdict::AlreadyTriggered)
        }
    }
}

fn evaluate_candidate(
    record: &mut TrackingRecord,
    observation: PostObservation,
    policy: &MomentumPolicy,
) -> Result<Verdict, EvaluationError> {
    // Age is measured against the record's creation time, not whatever the
    // observation claims.
    let age_minutes = super::record::minutes_between(record.created_at, observation.observed_at);
    let observed_at = observation.observed_at;

    if age_minutes <= 0.0 || age_minutes < policy.min_age_minutes {
        record.last_candidate_observation = Some(observed_at);
        return Ok(Verdict::TooYoung { age_minutes });
    }

    let rate = observation.score as f64 / age_minutes;
    let promote = match policy.mode {
        ThresholdMode::TwoStage => rate >= policy.initial_threshold,
        ThresholdMode::Single => true,
    };

    if !promote {
        record.last_candidate_observation = Some(observed_at);
        return Ok(Verdict::BelowInitialThreshold { rate });
    }

    record.snapshots.append(observation)?;
    record.last_candidate_observation = Some(observed_at);
    record.state = TrackingState::Tracking { initial_rate: rate };
    Ok(Verdict::TrackingStarted { initial_rate: rate })
}

fn evaluate_tracking(
    record: &mut TrackingRecord,
    observation: PostObservation,
    initial_rate: f64,
    policy: &MomentumPolicy,
) -> Result<Verdict, EvaluationError> {
    let observed_at = observation.observed_at;

    // Rates are computed on a copy so a rejected observation leaves the
    // record's history untouched.
    let mut snapshots = record.snapshots.clone();
    snapshots.append(observation)?;

    let rates = (
        snapshots.span_rate(Metric::Score),
        snapshots.moving_average(policy.moving_average_window, Metric::Score),
        snapshots.span_rate(Metric::Comments),
    );

    let (Some(current_rate), Some(moving_avg_rate), Some(comment_rate)) = rates else {
        return Err(EvaluationError::InvariantViolation {
            post_id: record.post_id.clone(),
            detail: format!(
                "tracked post has {} snapshot(s), rates undefined",
                snapshots.len()
            ),
        });
    };

    let reading = MomentumReading {
        current_rate,
        moving_avg_rate,
        comment_rate,
        initial_rate,
        snapshot_count: snapshots.len(),
    };
    record.snapshots = snapshots;

    if moving_avg_rate >= policy.followup_threshold {
        record.state = TrackingState::Triggered {
            initial_rate,
            triggered_at: observed_at,
        };
        return Ok(Verdict::Triggered {
            reading,
            triggered_at: observed_at,
        });
    }

    Ok(Verdict::TrackingContinues(reading))
}
