// One-shot listing probe: how each current post scores against the
// initial threshold, for tuning thresholds without running the monitor.

use chrono::{DateTime, Utc};

use crate::config::{CommunityConfig, TrackingConfig};
use crate::momentum::evaluator::{evaluate, Verdict};
use crate::momentum::record::TrackingRecord;
use crate::reddit::listing::Listing;

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeRow {
    pub post_id: String,
    pub title: String,
    pub age_minutes: f64,
    pub score: i64,
    pub comment_count: u32,
    /// Upvotes/minute since creation; None while younger than `min_age`.
    pub rate: Option<f64>,
    pub would_track: bool,
}

/// Run every post through a fresh candidate record, exactly as the monitor
/// would on first sight.
pub fn probe(
    listing: &Listing,
    community: &CommunityConfig,
    tracking: &TrackingConfig,
    observed_at: DateTime<Utc>,
) -> Vec<ProbeRow> {
    let policy = community.policy(tracking);

    listing
        .posts
        .iter()
        .map(|post| {
            let observation = post.observe(observed_at);
            let age_minutes = observation.age_minutes();
            let mut record = TrackingRecord::new(
                &post.post_id,
                &community.name,
                post.created_at,
                tracking.max_snapshots,
            );

            let (rate, would_track) = match evaluate(&mut record, observation, &policy) {
                Ok(Verdict::TrackingStarted { initial_rate }) => (Some(initial_rate), true),
                Ok(Verdict::BelowInitialThreshold { rate }) => (Some(rate), false),
                _ => (None, false),
            };

            ProbeRow {
                post_id: post.post_id.clone(),
                title: post.title.clone(),
                age_minutes,
                score: post.score,
                comment_count: post.comment_count,
                rate,
                would_track,
            }
        })
        .collect()
}
