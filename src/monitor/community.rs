// Community monitor: the polling loop for one community.
//
// Each configured community gets its own `CommunityMonitor`, running as its
// own task with its own tracking table, so a slow or failing fetch in one
// community never holds up another. The only state shared between loops is
// the listing source (and its request budget) and the alert sink.
//
// Per tick: fetch the listing, feed every post through the evaluator, report
// newly triggered posts, then evict stale records. Evaluation is synchronous
// and per post, so shutdown between posts or mid-fetch never leaves a record
// half-updated.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::table::{PhaseCounts, TrackingTable};
use crate::alert::traits::AlertSink;
use crate::alert::TriggerAlert;
use crate::config::{CommunityConfig, TrackingConfig};
use crate::momentum::evaluator::{evaluate, EvaluationError, MomentumPolicy, Verdict};
use crate::reddit::error::FetchError;
use crate::reddit::listing::{Listing, ListingPost};
use crate::reddit::traits::ListingSource;

/// Counters for one poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollStats {
    pub fetched: usize,
    pub evaluated: usize,
    pub skipped: usize,
    /// Out-of-order observations and posts the evaluator refused.
    pub rejected: usize,
    pub started_tracking: usize,
    pub triggered: usize,
    pub evicted: usize,
    /// Table size after eviction.
    pub tracked: usize,
    /// Surviving records by phase.
    pub phases: PhaseCounts,
}

/// Why a listing post was not evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Blocklisted,
    TooOld,
    AlreadyHot,
    AlreadyAlerted,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Blocklisted => "blocklisted",
            SkipReason::TooOld => "too_old",
            SkipReason::AlreadyHot => "already_hot",
            SkipReason::AlreadyAlerted => "already_alerted",
        }
    }
}

pub struct CommunityMonitor {
    community: CommunityConfig,
    tracking: TrackingConfig,
    policy: MomentumPolicy,
    max_age: TimeDelta,
    source: Arc<dyn ListingSource>,
    sink: Arc<dyn AlertSink>,
    table: TrackingTable,
}

impl CommunityMonitor {
    pub fn new(
        community: CommunityConfig,
        tracking: &TrackingConfig,
        source: Arc<dyn ListingSource>,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let policy = community.policy(tracking);
        let max_age = i64::try_from(tracking.max_post_age_minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(TimeDelta::MAX);
        let table = TrackingTable::new(&community.name, tracking.max_snapshots);

        Self {
            community,
            tracking: tracking.clone(),
            policy,
            max_age,
            source,
            sink,
            table,
        }
    }

    pub fn table(&self) -> &TrackingTable {
        &self.table
    }

    /// Poll until shutdown is signalled or a fatal fetch error occurs.
    ///
    /// Transient and rate-limit failures cost one tick and are retried on
    /// the next. Auth and unavailable-community errors end this loop only.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<(), FetchError> {
        let name = self.community.name.clone();
        let interval = Duration::from_secs(self.community.poll_interval_seconds);

        info!(
            community = %name,
            listing = %self.community.listing,
            interval_secs = interval.as_secs(),
            initial_threshold = self.policy.initial_threshold,
            followup_threshold = self.policy.followup_threshold,
            "Starting monitor for {}",
            self.community.display_name()
        );

        if self.tracking.startup_delay_seconds > 0 {
            let delay = Duration::from_secs(self.tracking.startup_delay_seconds);
            debug!(community = %name, delay_secs = delay.as_secs(), "Settling before first poll");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return Ok(()),
            }
        }

        loop {
            if *shutdown.borrow() {
                break;
            }

            // Abandoning an in-flight fetch is safe: nothing is mutated
            // until the listing is in hand.
            let fetched = tokio::select! {
                result = self.fetch() => result,
                _ = shutdown.changed() => break,
            };

            match fetched {
                Ok(listing) => {
                    let stats = self.process_listing(listing, Utc::now()).await;
                    info!(
                        community = %name,
                        fetched = stats.fetched,
                        evaluated = stats.evaluated,
                        skipped = stats.skipped,
                        rejected = stats.rejected,
                        started_tracking = stats.started_tracking,
                        triggered = stats.triggered,
                        evicted = stats.evicted,
                        tracked = stats.tracked,
                        candidates = stats.phases.candidates,
                        tracking = stats.phases.tracking,
                        triggered_records = stats.phases.triggered,
                        "Poll complete"
                    );
                }
                Err(e) if e.is_fatal() => {
                    error!(community = %name, error = %e, "Stopping monitor");
                    return Err(e);
                }
                Err(e) => {
                    debug!(community = %name, error = %e, "Fetch failed, retrying next tick");
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(community = %name, tracked = self.table.len(), "Monitor stopped");
        Ok(())
    }

    /// One complete tick without the sleep: fetch, evaluate, evict.
    pub async fn poll_once(&mut self) -> Result<PollStats, FetchError> {
        let listing = self.fetch().await?;
        Ok(self.process_listing(listing, Utc::now()).await)
    }

    async fn fetch(&self) -> Result<Listing, FetchError> {
        self.source
            .fetch_listing(
                &self.community.name,
                self.community.listing,
                self.tracking.listing_limit,
            )
            .await
    }

    /// Evaluate every post in `listing` as observed at `observed_at`, report
    /// triggers, and evict. Per-post failures are logged and skipped.
    pub async fn process_listing(
        &mut self,
        listing: Listing,
        observed_at: DateTime<Utc>,
    ) -> PollStats {
        let mut stats = PollStats {
            fetched: listing.posts.len(),
            ..PollStats::default()
        };

        for post in &listing.posts {
            if let Some(reason) = self.skip_reason(post, observed_at) {
                debug!(
                    community = %self.community.name,
                    post_id = %post.post_id,
                    reason = reason.as_str(),
                    "Skipping post"
                );
                stats.skipped += 1;
                continue;
            }

            let record = self.table.get_or_insert(&post.post_id, post.created_at);
            let verdict = match evaluate(record, post.observe(observed_at), &self.policy) {
                Ok(verdict) => verdict,
                Err(e @ EvaluationError::InvariantViolation { .. }) => {
                    error!(
                        community = %self.community.name,
                        post_id = %post.post_id,
                        error = %e,
                        "Skipping post with inconsistent tracking record"
                    );
                    stats.rejected += 1;
                    continue;
                }
                Err(e) => {
                    warn!(
                        community = %self.community.name,
                        post_id = %post.post_id,
                        error = %e,
                        "Rejected observation"
                    );
                    stats.rejected += 1;
                    continue;
                }
            };

            match verdict {
                Verdict::Unchanged => {
                    stats.rejected += 1;
                    continue;
                }
                Verdict::TrackingStarted { initial_rate } => {
                    info!(
                        community = %self.community.name,
                        post_id = %post.post_id,
                        initial_rate,
                        "Started tracking post"
                    );
                    stats.started_tracking += 1;
                }
                Verdict::Triggered {
                    reading,
                    triggered_at,
                } => {
                    self.table.mark_fired(&post.post_id, post.created_at);
                    let alert = TriggerAlert::new(&self.community, post, &reading, triggered_at);
                    if let Err(e) = self.sink.report_trigger(&alert).await {
                        error!(
                            community = %self.community.name,
                            post_id = %post.post_id,
                            error = %e,
                            "Failed to report triggered post"
                        );
                    }
                    stats.triggered += 1;
                }
                other => {
                    debug!(
                        community = %self.community.name,
                        post_id = %post.post_id,
                        verdict = other.as_str(),
                        "Evaluated post"
                    );
                }
            }
            stats.evaluated += 1;
        }

        if listing.rate_limited {
            debug!(
                community = %self.community.name,
                received = listing.posts.len(),
                "Rate limited mid-listing, remaining posts wait for the next tick"
            );
        }

        stats.evicted = self.table.evict(
            observed_at,
            self.max_age,
            self.tracking.max_tracked_posts,
        );
        stats.tracked = self.table.len();
        stats.phases = self.table.phase_counts();
        stats
    }

    fn skip_reason(&self, post: &ListingPost, now: DateTime<Utc>) -> Option<SkipReason> {
        if self.tracking.skip_post_ids.contains(&post.post_id) {
            return Some(SkipReason::Blocklisted);
        }
        if now.signed_duration_since(post.created_at) > self.max_age {
            return Some(SkipReason::TooOld);
        }
        if self
            .tracking
            .max_listing_score
            .is_some_and(|max| post.score > max)
            && self.table.get(&post.post_id).is_none()
        {
            return Some(SkipReason::AlreadyHot);
        }
        if self.table.has_fired(&post.post_id) && self.table.get(&post.post_id).is_none() {
            return Some(SkipReason::AlreadyAlerted);
        }
        None
    }
}
