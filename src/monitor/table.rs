// Tracking table: one community's records, keyed by post id.
//
// Owned exclusively by that community's loop. Eviction bounds both the age
// and the number of records. Posts that already fired are remembered in a
// ledger until they are too old to reappear, so an evicted triggered record
// can't be re-admitted and alert a second time.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::momentum::record::{TrackingPhase, TrackingRecord};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseCounts {
    pub candidates: usize,
    pub tracking: usize,
    pub triggered: usize,
}

pub struct TrackingTable {
    community: String,
    max_snapshots: usize,
    records: HashMap<String, TrackingRecord>,
    /// Post id -> post creation time, for every post that has fired.
    fired: HashMap<String, DateTime<Utc>>,
}

impl TrackingTable {
    pub fn new(community: &str, max_snapshots: usize) -> Self {
        Self {
            community: community.to_string(),
            max_snapshots,
            records: HashMap::new(),
            fired: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, post_id: &str) -> Option<&TrackingRecord> {
        self.records.get(post_id)
    }

    pub fn records(&self) -> impl Iterator<Item = &TrackingRecord> {
        self.records.values()
    }

    /// The record for `post_id`, created as a fresh candidate if unseen.
    pub fn get_or_insert(
        &mut self,
        post_id: &str,
        created_at: DateTime<Utc>,
    ) -> &mut TrackingRecord {
        self.records.entry(post_id.to_string()).or_insert_with(|| {
            TrackingRecord::new(post_id, &self.community, created_at, self.max_snapshots)
        })
    }

    pub fn mark_fired(&mut self, post_id: &str, created_at: DateTime<Utc>) {
        self.fired.insert(post_id.to_string(), created_at);
    }

    pub fn has_fired(&self, post_id: &str) -> bool {
        self.fired.contains_key(post_id)
    }

    pub fn phase_counts(&self) -> PhaseCounts {
        let mut counts = PhaseCounts::default();
        for record in self.records.values() {
            match record.phase() {
                TrackingPhase::Candidate => counts.candidates += 1,
                TrackingPhase::Tracking => counts.tracking += 1,
                TrackingPhase::Triggered => counts.triggered += 1,
            }
        }
        counts
    }

    /// Drop records older than `max_age`, then the oldest remaining ones
    /// until at most `max_records` are left. Returns how many were removed.
    ///
    /// A record's age is measured from its newest snapshot, or from post
    /// creation while it is still a candidate.
    pub fn evict(&mut self, now: DateTime<Utc>, max_age: TimeDelta, max_records: usize) -> usize {
        let before = self.records.len();

        if let Some(cutoff) = now.checked_sub_signed(max_age) {
            self.records.retain(|_, r| r.age_reference() >= cutoff);
            self.fired.retain(|_, created_at| *created_at >= cutoff);
        }

        if self.records.len() > max_records {
            let mut by_age: Vec<(DateTime<Utc>, String)> = self
                .records
                .iter()
                .map(|(id, r)| (r.age_reference(), id.clone()))
                .collect();
            by_age.sort();

            let excess = self.records.len() - max_records;
            for (_, id) in by_age.into_iter().take(excess) {
                self.records.remove(&id);
            }
        }

        before - self.records.len()
    }
}
