//! In-memory collaborators.
//!
//! Useful for tests, demos and small deployments. Every store is guarded by
//! a `tokio::sync::RwLock` so it can be shared behind an `Arc`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::RwLock;

use crate::aggregation::DeltaAggregator;
use crate::callbacks::{CacheStore, Clock, EventStore, SnapshotStore, SystemClock};
use crate::error::{LookoutError, LookoutResult};
use crate::types::{DailyCount, MetricSnapshot, TimestampedEvent};

/// Events held in a vector
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<TimestampedEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_events(events: Vec<TimestampedEvent>) -> Self {
        Self {
            events: RwLock::new(events),
        }
    }

    pub async fn insert(&self, event: TimestampedEvent) {
        self.events.write().await.push(event);
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }

    async fn matching(&self, start: NaiveDate, end: NaiveDate, category: Option<&str>) -> Vec<TimestampedEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| {
                let day = e.occurred_at.date_naive();
                day >= start && day <= end && category.map_or(true, |c| e.category == c)
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn count_events_in_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<&str>,
    ) -> LookoutResult<u64> {
        Ok(self.matching(start, end, category).await.len() as u64)
    }

    async fn count_events_by_day(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        category: Option<&str>,
    ) -> LookoutResult<Vec<DailyCount>> {
        let events = self.matching(start, end, category).await;
        Ok(DeltaAggregator::daily_counts(&events, start, end))
    }

    async fn has_category(&self, category: &str) -> LookoutResult<bool> {
        Ok(self.events.read().await.iter().any(|e| e.category == category))
    }
}

/// Snapshots kept sorted by `fetched_at`
#[derive(Debug, Default)]
pub struct InMemorySnapshotStore {
    snapshots: RwLock<Vec<MetricSnapshot>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshots(mut snapshots: Vec<MetricSnapshot>) -> Self {
        snapshots.sort_by_key(|s| s.fetched_at);
        Self {
            snapshots: RwLock::new(snapshots),
        }
    }

    pub async fn insert(&self, snapshot: MetricSnapshot) {
        let mut snapshots = self.snapshots.write().await;
        let position = snapshots.partition_point(|s| s.fetched_at <= snapshot.fetched_at);
        snapshots.insert(position, snapshot);
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn list_snapshots(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> LookoutResult<Vec<MetricSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .await
            .iter()
            .filter(|s| s.fetched_at >= start && s.fetched_at <= end)
            .cloned()
            .collect())
    }

    async fn latest_snapshot_before(
        &self,
        instant: DateTime<Utc>,
    ) -> LookoutResult<Option<MetricSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .await
            .iter()
            .rev()
            .find(|s| s.fetched_at < instant)
            .cloned())
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: String,
    expires_at: DateTime<Utc>,
}

/// TTL cache; expiry is checked against the injected clock on read
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Entries currently stored, expired or not
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Drop expired entries
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> LookoutResult<Option<String>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .filter(|entry| entry.expires_at > now)
            .map(|entry| entry.payload.clone()))
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> LookoutResult<()> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| LookoutError::cache(format!("invalid ttl: {}", e)))?;
        let expires_at = self.clock.now() + ttl;
        self.entries
            .write()
            .await
            .insert(key.to_string(), CacheEntry { payload, expires_at });
        Ok(())
    }
}
