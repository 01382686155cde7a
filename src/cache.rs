//! Report caching keyed by query parameters and a content fingerprint.
//!
//! The fingerprint is the sum of the trailing forecast window. It is an
//! approximate invalidation signal: two datasets whose windows have the same
//! sum share a cache entry until it expires.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::buckets::DATE_FORMAT;
use crate::callbacks::CacheStore;
use crate::types::{Granularity, TicketReport};

const KEY_PREFIX: &str = "ticket-report";

/// Approximate fingerprint of a historical series
pub fn series_fingerprint(window: &[f64]) -> f64 {
    window.iter().sum()
}

/// Cache key for a ticket report
pub fn cache_key(
    category: Option<&str>,
    start: NaiveDate,
    end: NaiveDate,
    granularity: Granularity,
    fingerprint: f64,
) -> String {
    let mut hasher = Sha256::new();
    for part in [
        category.unwrap_or("ALL").to_string(),
        start.format(DATE_FORMAT).to_string(),
        end.format(DATE_FORMAT).to_string(),
        granularity.to_string(),
        fingerprint.to_string(),
    ] {
        hasher.update(part.as_bytes());
        hasher.update(b"|");
    }
    format!("{}:{}", KEY_PREFIX, hex::encode(hasher.finalize()))
}

/// Typed report cache over a [`CacheStore`]
///
/// Backend and payload errors degrade to a miss or a skipped write.
#[derive(Clone)]
pub struct ReportCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ReportCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached report flagged as a hit, or `None`
    pub async fn get(&self, key: &str) -> Option<TicketReport> {
        let payload = match self.store.get(key).await {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("Cache miss for {}", key);
                return None;
            }
            Err(e) => {
                warn!("Cache read failed for {}, recomputing: {}", key, e);
                return None;
            }
        };

        match serde_json::from_str::<TicketReport>(&payload) {
            Ok(mut report) => {
                debug!("Cache hit for {}", key);
                report.metadados.cache.hit = true;
                Some(report)
            }
            Err(e) => {
                warn!("Discarding unreadable cache entry {}: {}", key, e);
                None
            }
        }
    }

    /// Store a freshly computed report
    pub async fn set(&self, key: &str, report: &TicketReport) {
        let payload = match serde_json::to_string(report) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Could not serialize report for caching: {}", e);
                return;
            }
        };

        if let Err(e) = self.store.set(key, payload, self.ttl).await {
            warn!("Cache write failed for {}: {}", key, e);
        }
    }
}

impl std::fmt::Debug for ReportCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportCache").field("ttl", &self.ttl).finish()
    }
}
