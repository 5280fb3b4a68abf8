// Property tests for the tracking invariants.
//
// Random observation sequences drive one record through the evaluator and
// check that its phase only moves forward, it fires at most once, and its
// initial rate never changes. Random table populations check that eviction
// honours both the size bound and the age bound.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use proptest::prelude::*;

use radar::momentum::evaluator::{evaluate, MomentumPolicy, ThresholdMode, Verdict};
use radar::momentum::record::{PostObservation, TrackingPhase, TrackingRecord};
use radar::monitor::table::TrackingTable;

fn created() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 9, 17, 14, 0, 0).unwrap()
}

/// One poll: seconds since the previous poll (zero or negative replays an
/// earlier timestamp), score change, new comments.
fn arb_poll() -> impl Strategy<Value = (i64, i64, u32)> {
    (-90i64..=240, -30i64..=120, 0u32..=5)
}

fn arb_policy() -> impl Strategy<Value = MomentumPolicy> {
    (0.0f64..20.0, 0.0f64..40.0, 0.0f64..5.0, 1usize..=5, any::<bool>()).prop_map(
        |(initial, followup, min_age, window, single)| MomentumPolicy {
            initial_threshold: initial,
            followup_threshold: followup,
            min_age_minutes: min_age,
            moving_average_window: window,
            mode: if single {
                ThresholdMode::Single
            } else {
                ThresholdMode::TwoStage
            },
        },
    )
}

/// A post: minutes after the base time it was created, and optionally how
/// many minutes later it was promoted to tracking.
fn arb_population() -> impl Strategy<Value = Vec<(i64, Option<i64>)>> {
    prop::collection::vec((0i64..880, prop::option::of(2i64..=120)), 0..80)
}

proptest! {
    #[test]
    fn phase_is_monotonic_and_fires_at_most_once(
        polls in prop::collection::vec(arb_poll(), 1..60),
        policy in arb_policy(),
        capacity in 2usize..=12,
    ) {
        let mut record = TrackingRecord::new("1nkq2z", "news", created(), capacity);
        let mut clock = created() + TimeDelta::seconds(90);
        let mut score = 0i64;
        let mut comments = 0u32;

        let mut previous = record.phase();
        let mut triggers = 0;
        let mut initial_rate = None;
        let mut triggered_at = None;

        for (step, delta, new_comments) in polls {
            let observed_at = if step > 0 {
                clock += TimeDelta::seconds(step);
                clock
            } else {
                clock + TimeDelta::seconds(step)
            };
            score += delta;
            comments += new_comments;

            let latest_before = record.latest_observed_at();
            let snapshots_before = record.snapshots().len();

            let observation = PostObservation {
                post_id: "1nkq2z".to_string(),
                observed_at,
                score,
                comment_count: comments,
                created_at: created(),
            };
            let verdict = evaluate(&mut record, observation, &policy);
            prop_assert!(verdict.is_ok(), "evaluation failed: {:?}", verdict);
            let verdict = verdict.unwrap();

            if latest_before.is_some_and(|latest| observed_at <= latest) {
                prop_assert_eq!(&verdict, &Verdict::Unchanged);
                prop_assert_eq!(record.snapshots().len(), snapshots_before);
                prop_assert_eq!(record.phase(), previous);
            }

            if matches!(verdict, Verdict::Triggered { .. }) {
                triggers += 1;
            }
            prop_assert!(triggers <= 1, "fired {} times", triggers);

            prop_assert!(record.phase() >= previous, "phase went backward");
            previous = record.phase();

            if let Some(rate) = record.state().initial_rate() {
                prop_assert_eq!(*initial_rate.get_or_insert(rate), rate);
            }
            if let Some(at) = record.state().triggered_at() {
                prop_assert_eq!(*triggered_at.get_or_insert(at), at);
            }

            if record.phase() != TrackingPhase::Candidate {
                prop_assert!(!record.snapshots().is_empty());
            }
            prop_assert!(record.snapshots().len() <= capacity);
        }
    }

    #[test]
    fn eviction_honours_size_and_age_bounds(
        population in arb_population(),
        max_age_minutes in 1i64..1500,
        max_records in 0usize..60,
    ) {
        let base = created();
        let now = base + TimeDelta::minutes(1000);
        let max_age = TimeDelta::minutes(max_age_minutes);
        let cutoff = now - max_age;
        let promote = MomentumPolicy {
            mode: ThresholdMode::Single,
            ..MomentumPolicy::default()
        };

        let mut table = TrackingTable::new("news", 10);
        let mut created_at = HashMap::new();
        for (i, (created_min, promoted_after)) in population.iter().enumerate() {
            let id = format!("p{i}");
            let post_created = base + TimeDelta::minutes(*created_min);
            let record = table.get_or_insert(&id, post_created);
            if let Some(after) = promoted_after {
                let observation = PostObservation {
                    post_id: id.clone(),
                    observed_at: post_created + TimeDelta::minutes(*after),
                    score: 0,
                    comment_count: 0,
                    created_at: post_created,
                };
                let verdict = evaluate(record, observation, &promote).unwrap();
                prop_assert!(matches!(verdict, Verdict::TrackingStarted { .. }), "expected TrackingStarted, got {:?}", verdict);
            }
            if i % 3 == 0 {
                table.mark_fired(&id, post_created);
            }
            created_at.insert(id, post_created);
        }

        let before: Vec<(String, DateTime<Utc>)> = table
            .records()
            .map(|r| (r.post_id().to_string(), r.age_reference()))
            .collect();

        let removed = table.evict(now, max_age, max_records);

        prop_assert_eq!(removed, before.len() - table.len());
        prop_assert!(table.len() <= max_records);
        for record in table.records() {
            prop_assert!(record.age_reference() >= cutoff, "stale record kept");
        }

        // Size eviction drops the oldest fresh records first.
        if let Some(oldest_kept) = table.records().map(|r| r.age_reference()).min() {
            for (id, age_reference) in &before {
                if table.get(id).is_none() && *age_reference >= cutoff {
                    prop_assert!(*age_reference <= oldest_kept);
                }
            }
        }
        let fresh = before.iter().filter(|(_, r)| *r >= cutoff).count();
        prop_assert_eq!(table.len(), fresh.min(max_records));

        // The fired ledger outlives records until the post itself is too old.
        for (i, id) in (0..population.len()).map(|i| (i, format!("p{i}"))) {
            if i % 3 == 0 {
                prop_assert_eq!(table.has_fired(&id), created_at[&id] >= cutoff);
            }
        }
    }
}
