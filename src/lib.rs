//! # Lookout - Time-Bucketed Metrics Aggregation and Forecasting
//!
//! Lookout turns raw operational data into dashboard-ready reports. It works
//! with two kinds of input: timestamped events (e.g. ticket creations) and
//! periodic snapshots of cumulative counters polled from an external system.
//!
//! ## 🎯 Core Philosophy
//!
//! - **Storage-agnostic**: data comes in through async traits you implement
//! - **Exact numeric contracts**: rounding, clamping and gap-filling rules are
//!   fixed so consumers can depend on them
//! - **Never fails on statistics**: a model that cannot be fitted degrades to a
//!   moving average, and missing validation metrics are simply absent
//!
//! ## 📊 Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                           ReportEngine                               │
//! ├──────────────┬──────────────┬──────────────┬─────────────────────────┤
//! │  Calendar &  │    Delta     │   Forecast   │   Quality & Cache       │
//! │  Buckets     │  Aggregator  │   Engine     │                         │
//! │ • Business   │ • Event sums │ • Auto-ARIMA │ • Walk-forward RMSE/R²  │
//! │   days       │ • Snapshot   │ • Fallback   │ • TTL cache with        │
//! │ • Day/Week/  │   deltas     │ • 95% bounds │   content fingerprint   │
//! │   Month keys │ • Baselines  │ • Trends     │                         │
//! └──────────────┴──────────────┴──────┬───────┴─────────────────────────┘
//!                                      │
//!                            ┌─────────▼─────────┐
//!                            │  Your Callbacks   │
//!                            │ • EventStore      │
//!                            │ • SnapshotStore   │
//!                            │ • CacheStore      │
//!                            │ • Clock           │
//!                            └───────────────────┘
//! ```
//!
//! ## 🎛️ Usage
//!
//! ```rust,no_run
//! use lookout::{
//!     InMemoryCache, InMemoryEventStore, InMemorySnapshotStore, ReportCallbacks, ReportConfig,
//!     ReportEngine, TicketReportQuery, TimestampedEvent,
//! };
//! use chrono::{TimeZone, Utc};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> lookout::LookoutResult<()> {
//!     let events = InMemoryEventStore::with_events(vec![TimestampedEvent::new(
//!         "T-1",
//!         Utc.with_ymd_and_hms(2025, 3, 3, 10, 0, 0).unwrap(),
//!         "SUPPORT",
//!     )]);
//!
//!     let callbacks = ReportCallbacks::new(
//!         Arc::new(events),
//!         Arc::new(InMemorySnapshotStore::new()),
//!         Arc::new(InMemoryCache::new()),
//!     );
//!     let engine = ReportEngine::new(ReportConfig::default(), callbacks)?;
//!
//!     let report = engine
//!         .get_ticket_report(&TicketReportQuery::new("2025-03-01", "2025-03-31").with_category("SUPPORT"))
//!         .await?;
//!     println!("variation: {}%, method: {}", report.variacao, report.metadados.projection_method);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `config-toml`: load [`ReportConfig`] from TOML

pub mod aggregation;
pub mod arima;
pub mod buckets;
pub mod cache;
pub mod calendar;
pub mod callbacks;
pub mod engine;
pub mod error;
pub mod forecast;
pub mod memory;
pub mod quality;
pub mod types;
pub mod utils;

#[cfg(test)]
mod tests;

// Re-export common types for convenience
pub use types::{
    AggregationQuery, Bucket, BucketAggregate, CacheInfo, ConfidenceInterval, Counters, DailyCount,
    DailyItem, ForecastPoint, Granularity, MetricSnapshot, NewStudentsPoint, PricingConfig,
    QualityMetrics, ReportConfig, ReportConfigBuilder, ReportMetadata, SeriesItem, SeriesPoint,
    StudentsPeriodRow, TickerItem, TickerKind, TicketReport, TicketReportQuery, TimestampedEvent,
    Trend,
};

pub use error::{LookoutError, LookoutResult};

pub use callbacks::{
    CacheStore, Clock, EventStore, FixedClock, ReportCallbacks, SnapshotStore, SystemClock,
};

pub use engine::{EngineStatus, ReportEngine};

pub use aggregation::DeltaAggregator;
pub use buckets::Bucketizer;
pub use cache::ReportCache;
pub use calendar::{BusinessCalendar, FixedHoliday, HolidayTable};
pub use forecast::{
    AutoArimaForecaster, ForecastEngine, ForecastModel, Forecaster, MovingAverageForecaster,
    Prediction, Projection,
};
pub use memory::{InMemoryCache, InMemoryEventStore, InMemorySnapshotStore};
pub use quality::QualityEvaluator;
