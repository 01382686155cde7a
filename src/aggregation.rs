//! Per-bucket aggregation of event counts and cumulative counter snapshots.
//!
//! Event data is summed per bucket with missing buckets filled with zero.
//! Snapshot data is reduced to the latest reading per bucket, carried forward
//! through empty buckets, and differenced against the previous bucket with
//! negative deltas clamped to zero.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::debug;

use crate::buckets::Bucketizer;
use crate::error::LookoutResult;
use crate::types::{
    BucketAggregate, Counters, DailyCount, Granularity, MetricSnapshot, SeriesPoint, TimestampedEvent,
};
use crate::utils::round_to;

/// Computes bucket totals and deltas for both kinds of source data
#[derive(Debug, Clone, Copy, Default)]
pub struct DeltaAggregator;

impl DeltaAggregator {
    /// Gap-filled per-bucket sums of daily counts over `[start, end]`.
    ///
    /// Counts dated outside the range are ignored, so the sum of the returned
    /// values equals the number of events in the range.
    pub fn event_series(
        daily: &[DailyCount],
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> LookoutResult<Vec<SeriesPoint>> {
        let mut totals: BTreeMap<String, u64> = Bucketizer::enumerate_keys(start, end, granularity)?
            .into_iter()
            .map(|key| (key, 0))
            .collect();

        for day in daily.iter().filter(|d| d.date >= start && d.date <= end) {
            let key = Bucketizer::date_key(day.date, granularity);
            if let Some(total) = totals.get_mut(&key) {
                *total += day.count;
            }
        }

        debug!(
            "Aggregated {} daily counts into {} {} buckets",
            daily.len(),
            totals.len(),
            granularity
        );

        Ok(totals
            .into_iter()
            .map(|(period, total)| SeriesPoint {
                period,
                value: total as f64,
            })
            .collect())
    }

    /// Collapse raw events into per-day counts over `[start, end]` (UTC days)
    pub fn daily_counts(events: &[TimestampedEvent], start: NaiveDate, end: NaiveDate) -> Vec<DailyCount> {
        let mut per_day: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for event in events {
            let date = event.occurred_at.date_naive();
            if date >= start && date <= end {
                *per_day.entry(date).or_insert(0) += 1;
            }
        }
        per_day
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect()
    }

    /// Gap-filled per-bucket event counts straight from raw events
    pub fn events_series(
        events: &[TimestampedEvent],
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> LookoutResult<Vec<SeriesPoint>> {
        Self::event_series(&Self::daily_counts(events, start, end), start, end, granularity)
    }

    /// Bucket totals and deltas of cumulative counters over `[start, end]`.
    ///
    /// `baseline` is the latest snapshot strictly before the range and seeds
    /// the first bucket's delta; without one every counter starts at zero.
    /// Snapshots need not be sorted. An empty result is returned when there
    /// is nothing in range and no baseline.
    pub fn snapshot_aggregates(
        snapshots: &[MetricSnapshot],
        baseline: Option<&MetricSnapshot>,
        start: NaiveDate,
        end: NaiveDate,
        granularity: Granularity,
    ) -> LookoutResult<Vec<BucketAggregate>> {
        let buckets = Bucketizer::enumerate_buckets(start, end, granularity)?;
        if snapshots.is_empty() && baseline.is_none() {
            debug!("No snapshots in range and no baseline, nothing to aggregate");
            return Ok(Vec::new());
        }

        let mut ordered: Vec<&MetricSnapshot> = snapshots.iter().collect();
        ordered.sort_by_key(|s| s.fetched_at);

        let names: BTreeSet<&str> = ordered
            .iter()
            .copied()
            .chain(baseline)
            .flat_map(|s| s.counters.keys().map(String::as_str))
            .collect();

        let mut members: BTreeMap<&str, Vec<&MetricSnapshot>> = BTreeMap::new();
        for snapshot in ordered.iter().copied() {
            let date = snapshot.fetched_at.date_naive();
            if let Some(bucket) = buckets.iter().find(|b| b.contains(date)) {
                members.entry(bucket.key.as_str()).or_default().push(snapshot);
            }
        }

        let read_all = |snapshot: Option<&MetricSnapshot>| -> Counters {
            names
                .iter()
                .map(|name| (name.to_string(), snapshot.map_or(0.0, |s| s.counter(name))))
                .collect()
        };

        let mut previous = read_all(baseline);
        let mut aggregates = Vec::with_capacity(buckets.len());

        for bucket in &buckets {
            let in_bucket = members.get(bucket.key.as_str()).map(Vec::as_slice).unwrap_or(&[]);

            let (total, within_bucket_delta) = match (in_bucket.first(), in_bucket.last()) {
                (Some(&earliest), Some(&latest)) => {
                    let total = read_all(Some(latest));
                    let within = names
                        .iter()
                        .map(|name| {
                            let delta = latest.counter(name) - earliest.counter(name);
                            (name.to_string(), round_to(delta, 2))
                        })
                        .collect();
                    (total, within)
                }
                _ => (previous.clone(), read_all(None)),
            };

            let new: Counters = total
                .iter()
                .map(|(name, value)| {
                    let prior = previous.get(name).copied().unwrap_or(0.0);
                    (name.clone(), round_to(value - prior, 2).max(0.0))
                })
                .collect();

            aggregates.push(BucketAggregate {
                period: bucket.key.clone(),
                start_date: bucket.start_date,
                end_date: bucket.end_date,
                total: total.clone(),
                new,
                within_bucket_delta,
                snapshot_count: in_bucket.len(),
            });
            previous = total;
        }

        debug!(
            "Aggregated {} snapshots into {} {} buckets",
            snapshots.len(),
            aggregates.len(),
            granularity
        );
        Ok(aggregates)
    }
}
