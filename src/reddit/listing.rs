// Listing types: Reddit's JSON envelope and the simplified post the monitor uses.
//
// Reddit wraps every listing as `{kind: "Listing", data: {children: [{kind:
// "t3", data: {...}}], after}}`. Deserialization is lenient: fields the
// monitor doesn't strictly need default, and entries missing an id or a
// usable creation time are dropped individually instead of failing the page.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::momentum::record::PostObservation;

/// Base URL for building post permalinks.
pub const PERMALINK_BASE: &str = "https://www.reddit.com";

/// Which listing of a community to poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingSort {
    /// Newest posts first.
    #[default]
    New,
    /// Reddit's own "rising" ranking.
    Rising,
}

impl ListingSort {
    pub fn as_path(&self) -> &'static str {
        match self {
            ListingSort::New => "new",
            ListingSort::Rising => "rising",
        }
    }
}

impl std::fmt::Display for ListingSort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_path())
    }
}

/// A post as returned by one listing fetch, with just the fields the monitor needs.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPost {
    pub post_id: String,
    pub title: String,
    /// Permalink to the post's comment page.
    pub url: String,
    pub score: i64,
    pub comment_count: u32,
    pub created_at: DateTime<Utc>,
}

impl ListingPost {
    /// Freeze this post's counters into an observation taken at `observed_at`.
    pub fn observe(&self, observed_at: DateTime<Utc>) -> PostObservation {
        PostObservation {
            post_id: self.post_id.clone(),
            observed_at,
            score: self.score,
            comment_count: self.comment_count,
            created_at: self.created_at,
        }
    }
}

/// Result of one listing fetch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Listing {
    pub posts: Vec<ListingPost>,
    /// The fetch stopped early because the request budget ran out.
    pub rate_limited: bool,
}

// -- Serde types for /r/{community}/{sort} --

#[derive(Debug, Deserialize)]
pub struct ListingResponse {
    pub data: ListingData,
}

#[derive(Debug, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub children: Vec<ListingChild>,
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListingChild {
    #[serde(default)]
    pub kind: String,
    pub data: RawPost,
}

/// A `t3` (link/post) object with lenient defaults.
#[derive(Debug, Deserialize)]
pub struct RawPost {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub permalink: String,
    pub url: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u32,
    pub created_utc: Option<f64>,
}

impl RawPost {
    /// Convert to a `ListingPost`, or `None` if the entry is unusable.
    pub fn into_post(self) -> Option<ListingPost> {
        if self.id.is_empty() {
            return None;
        }

        let created_utc = self.created_utc.filter(|t| t.is_finite() && *t >= 0.0)?;
        let secs = created_utc.trunc() as i64;
        let nanos = (created_utc.fract() * 1e9) as u32;
        let created_at = DateTime::from_timestamp(secs, nanos)?;

        let url = if self.permalink.is_empty() {
            self.url.unwrap_or_default()
        } else {
            format!("{PERMALINK_BASE}{}", self.permalink)
        };

        Some(ListingPost {
            post_id: self.id,
            title: self.title,
            url,
            score: self.score,
            comment_count: self.num_comments,
            created_at,
        })
    }
}
