// Alerts: the record emitted once per triggered post, and where it goes.

pub mod sink;
pub mod traits;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CommunityConfig;
use crate::momentum::evaluator::MomentumReading;
use crate::reddit::listing::ListingPost;

/// The thresholds in force when a post fired.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub initial: f64,
    pub followup: f64,
}

/// Everything reported about a post that cleared the follow-up threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerAlert {
    pub community: String,
    pub display_name: String,
    pub post_id: String,
    pub title: String,
    pub url: String,
    pub score: i64,
    pub comment_count: u32,
    pub current_rate: f64,
    pub moving_avg_rate: f64,
    pub comment_rate: f64,
    pub initial_rate: f64,
    pub thresholds: Thresholds,
    pub snapshot_count: usize,
    pub created_at: DateTime<Utc>,
    pub triggered_at: DateTime<Utc>,
}

impl TriggerAlert {
    pub fn new(
        community: &CommunityConfig,
        post: &ListingPost,
        reading: &MomentumReading,
        triggered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            community: community.name.clone(),
            display_name: community.display_name(),
            post_id: post.post_id.clone(),
            title: post.title.clone(),
            url: post.url.clone(),
            score: post.score,
            comment_count: post.comment_count,
            current_rate: reading.current_rate,
            moving_avg_rate: reading.moving_avg_rate,
            comment_rate: reading.comment_rate,
            initial_rate: reading.initial_rate,
            thresholds: Thresholds {
                initial: community.initial_threshold,
                followup: community.followup_threshold,
            },
            snapshot_count: reading.snapshot_count,
            created_at: post.created_at,
            triggered_at,
        }
    }
}
