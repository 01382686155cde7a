// src/callbacks.rs

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::error::LookoutResult;
use crate::types::{DailyCount, MetricSnapshot};

/// Read access to timestamped events (e.g. ticket creations)
///
/// Implement this to plug the engine into whatever database holds the
/// events. Date bounds are whole UTC calendar days, both inclusive.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Count events in `[start, end]`
    ///
    /// # Arguments
    /// * `start` - First day of the range
    /// * `end` - Last day of the range
    /// * `category` - Only count events of this category when set
    async fn count_events_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<&str>,
    ) -> LookoutResult<u64>;

    /// Per-day event counts in `[start, end]`
    ///
    /// Days without events may be omitted. The engine fills the gaps.
    ///
    /// # Returns
    /// * `Ok(counts)` - Counts in ascending date order
    /// * `Err(error)` - The store could not be read
    async fn count_events_by_day(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<&str>,
    ) -> LookoutResult<Vec<DailyCount>>;

    /// Whether at least one event of `category` exists at all
    async fn has_category(&self, category: &str) -> LookoutResult<bool> {
        // Default implementation: count over every representable day
        let count = self
            .count_events_in_range(NaiveDate::MIN, NaiveDate::MAX, Some(category))
            .await?;
        Ok(count > 0)
    }
}

/// Read access to cumulative counter snapshots
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Snapshots fetched in `[start, end]`, ascending by `fetched_at`
    async fn list_snapshots(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LookoutResult<Vec<MetricSnapshot>>;

    /// Latest snapshot fetched strictly before `instant`
    ///
    /// Used as the baseline of the first bucket's delta.
    async fn latest_snapshot_before(
        &self,
        instant: DateTime<Utc>,
    ) -> LookoutResult<Option<MetricSnapshot>> {
        // Default implementation: scan everything up to the instant
        let snapshots = self.list_snapshots(DateTime::<Utc>::MIN_UTC, instant).await?;
        Ok(snapshots.into_iter().filter(|s| s.fetched_at < instant).last())
    }
}

/// Key-value store with per-entry expiry
///
/// Failures are never fatal to a report: a failing `get` is treated as a
/// miss and a failing `set` is logged and ignored.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a live entry
    ///
    /// # Returns
    /// * `Ok(Some(payload))` - Entry exists and has not expired
    /// * `Ok(None)` - No live entry
    /// * `Err(error)` - Backend failure
    async fn get(&self, key: &str) -> LookoutResult<Option<String>>;

    /// Store `payload` under `key` for `ttl`
    async fn set(&self, key: &str, payload: String, ttl: Duration) -> LookoutResult<()>;
}

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stopped at a fixed instant, for deterministic tests
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Combine all collaborators into a single struct for easier management
#[derive(Clone)]
pub struct ReportCallbacks {
    pub events: Arc<dyn EventStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub cache: Arc<dyn CacheStore>,
    pub clock: Arc<dyn Clock>,
}

impl ReportCallbacks {
    /// Create a new collaborator set using the wall clock
    pub fn new(
        events: Arc<dyn EventStore>,
        snapshots: Arc<dyn SnapshotStore>,
        cache: Arc<dyn CacheStore>,
    ) -> Self {
        Self {
            events,
            snapshots,
            cache,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}
