// src/engine.rs

use std::time::Duration;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Months, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::aggregation::DeltaAggregator;
use crate::buckets::{Bucketizer, DATE_FORMAT};
use crate::cache::{cache_key, series_fingerprint, ReportCache};
use crate::calendar::{days_diff_inclusive, BusinessCalendar};
use crate::callbacks::ReportCallbacks;
use crate::error::{LookoutError, LookoutResult};
use crate::forecast::{ForecastEngine, Forecaster};
use crate::quality::QualityEvaluator;
use crate::types::{
    counters, AggregationQuery, BucketAggregate, CacheInfo, DailyItem, ForecastPoint, Granularity,
    NewStudentsPoint, QualityMetrics, ReportConfig, ReportMetadata, SeriesItem, SeriesPoint,
    StudentsPeriodRow, TickerItem, TickerKind, TicketReport, TicketReportQuery,
};
use crate::utils::{parse_date_only, parse_date_param, round_to, start_of_day};

const EVENTS_SOURCE: &str = "events";
const SNAPSHOTS_SOURCE: &str = "snapshots";

/// Counters about the reports served by an engine
#[derive(Debug, Clone, Default)]
pub struct EngineStatus {
    pub reports_generated: u64,
    pub cache_hits: u64,
    pub fallback_forecasts: u64,
    pub aggregations_served: u64,
    pub last_report_at: Option<DateTime<Utc>>,
}

/// Percent change from `previous` to `current`, rounded to 2 decimals.
/// 100 when only the current rate is positive, 0 when both are zero.
pub fn rate_variation(current: f64, previous: f64) -> f64 {
    if previous > 0.0 {
        round_to((current - previous) / previous * 100.0, 2)
    } else if current > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// Composes calendar, aggregation, forecasting, validation and caching into
/// the public report operations
pub struct ReportEngine {
    config: ReportConfig,
    callbacks: ReportCallbacks,
    calendar: BusinessCalendar,
    forecast: ForecastEngine,
    quality: QualityEvaluator,
    cache: ReportCache,
    status: RwLock<EngineStatus>,
}

impl ReportEngine {
    /// Create a new report engine
    pub fn new(config: ReportConfig, callbacks: ReportCallbacks) -> LookoutResult<Self> {
        config.validate()?;

        let cache = ReportCache::new(
            callbacks.cache.clone(),
            Duration::from_secs(config.cache_ttl_seconds),
        );

        Ok(Self {
            calendar: BusinessCalendar::new(config.calendar.clone()),
            forecast: ForecastEngine::new(&config),
            quality: QualityEvaluator::new(&config),
            cache,
            callbacks,
            config,
            status: RwLock::new(EngineStatus::default()),
        })
    }

    /// Replace the primary forecaster (used for projection and validation)
    pub fn with_forecaster(mut self, forecaster: Box<dyn Forecaster>) -> Self {
        self.forecast = self.forecast.with_forecaster(forecaster);
        self
    }

    pub fn config(&self) -> &ReportConfig {
        &self.config
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    /// Snapshot of the engine counters
    pub async fn status(&self) -> EngineStatus {
        self.status.read().await.clone()
    }

    /// Daily ticket-volume report with a short-horizon projection
    pub async fn get_ticket_report(&self, query: &TicketReportQuery) -> LookoutResult<TicketReport> {
        let category = query
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());

        info!(
            "Ticket report requested for {}..{} (category: {})",
            query.start_date,
            query.end_date,
            category.unwrap_or("ALL")
        );

        // Validation
        let start = parse_date_only(&query.start_date)?;
        let end = parse_date_only(&query.end_date)?;
        if end < start {
            return Err(LookoutError::invalid_range(&query.start_date, &query.end_date));
        }
        let total_days = days_diff_inclusive(start, end);
        if total_days > self.config.max_range_days {
            return Err(LookoutError::range_too_large(total_days, self.config.max_range_days));
        }

        let events = &self.callbacks.events;
        if let Some(category) = category {
            let exists = events
                .has_category(category)
                .await
                .map_err(|e| e.into_upstream(EVENTS_SOURCE))?;
            if !exists {
                return Err(LookoutError::category_not_found(category));
            }
        }

        // Date scaffolding
        let window_start = end - ChronoDuration::days(self.config.history_window as i64 - 1);
        let fetch_start = start.min(window_start);
        let previous_end = start - ChronoDuration::days(1);
        let previous_start = start - ChronoDuration::days(total_days);

        let (daily, previous_total) = futures::try_join!(
            events.count_events_by_day(fetch_start, end, category),
            events.count_events_in_range(previous_start, previous_end, category),
        )
        .map_err(|e| e.into_upstream(EVENTS_SOURCE))?;

        // Historical series and business-day rates
        let requested = DeltaAggregator::event_series(&daily, start, end, Granularity::Day)?;
        let window = DeltaAggregator::event_series(&daily, window_start, end, Granularity::Day)?;
        let window_values: Vec<f64> = window.iter().map(|p| p.value).collect();

        let working_days = self.calendar.count_business_days(start, end);
        let previous_working_days = self.calendar.count_business_days(previous_start, previous_end);
        let current_total: f64 = requested.iter().map(|p| p.value).sum();
        let current_rate = current_total / working_days.max(1) as f64;
        let previous_rate = previous_total as f64 / previous_working_days.max(1) as f64;
        let variacao = rate_variation(current_rate, previous_rate);

        debug!(
            "{} events over {} business days, previous period {} over {}",
            current_total, working_days, previous_total, previous_working_days
        );

        // Cache lookup
        let key = cache_key(
            category,
            start,
            end,
            Granularity::Day,
            series_fingerprint(&window_values),
        );
        if let Some(report) = self.cache.get(&key).await {
            info!("Serving ticket report from cache");
            let mut status = self.status.write().await;
            status.cache_hits += 1;
            status.last_report_at = Some(self.callbacks.clock.now());
            return Ok(report);
        }

        // Projection and diagnostics
        let periods: Vec<String> = (1..=self.config.forecast_horizon as i64)
            .map(|i| (end + ChronoDuration::days(i)).format(DATE_FORMAT).to_string())
            .collect();
        let projection = self.forecast.project(&window_values, &periods);
        let quality = self.quality.evaluate(self.forecast.primary(), &window_values);

        let report = self.assemble_report(
            ReportParts {
                start,
                end,
                category,
                variacao,
                working_days,
                previous_working_days,
            },
            requested,
            window,
            projection.points,
            projection.method,
            quality,
        );

        self.cache.set(&key, &report).await;

        let mut status = self.status.write().await;
        status.reports_generated += 1;
        if projection.fallback_error.is_some() {
            status.fallback_forecasts += 1;
        }
        status.last_report_at = Some(self.callbacks.clock.now());

        Ok(report)
    }

    fn assemble_report(
        &self,
        parts: ReportParts<'_>,
        requested: Vec<SeriesPoint>,
        window: Vec<SeriesPoint>,
        forecast: Vec<ForecastPoint>,
        method: &str,
        quality: QualityMetrics,
    ) -> TicketReport {
        let count = |value: f64| value.max(0.0).round() as u64;

        let data: Vec<DailyItem> = requested
            .iter()
            .map(|p| DailyItem {
                date: p.period.clone(),
                total: Some(count(p.value)),
                quantidade_real: Some(count(p.value)),
                quantidade_projetada: None,
                intervalo_confianca: None,
                tendencia: None,
            })
            .chain(forecast.iter().map(DailyItem::from))
            .collect();

        let serie: Vec<SeriesItem> = window
            .iter()
            .map(|p| SeriesItem {
                data: p.period.clone(),
                quantidade_real: Some(count(p.value)),
                quantidade_projetada: None,
                intervalo_confianca: None,
                tendencia: None,
            })
            .chain(forecast.iter().map(SeriesItem::from))
            .collect();

        let tickets = requested
            .iter()
            .map(|p| TickerItem {
                date: p.period.clone(),
                ticker: count(p.value),
                kind: TickerKind::Ticket,
            })
            .collect();

        let projections = forecast
            .iter()
            .map(|p| TickerItem {
                date: p.period.clone(),
                ticker: p.predicted,
                kind: TickerKind::Projection,
            })
            .collect();

        let metadados = ReportMetadata {
            projection_method: method.to_string(),
            confidence_level: self.config.confidence_level,
            r2: quality.r2,
            rmse: quality.rmse,
            ordenacao: "asc".to_string(),
            training_window: quality.training_window_size,
            forecast_horizon: self.config.forecast_horizon,
            last_date: parts.end.format(DATE_FORMAT).to_string(),
            category: parts.category.map(str::to_string),
            start_date: parts.start.format(DATE_FORMAT).to_string(),
            end_date: parts.end.format(DATE_FORMAT).to_string(),
            working_days: parts.working_days,
            previous_working_days: parts.previous_working_days,
            cache: CacheInfo {
                ttl_segundos: self.config.cache_ttl_seconds,
                hit: false,
            },
        };

        TicketReport {
            data,
            variacao: parts.variacao,
            serie,
            metadados,
            tickets,
            projections,
            historical: window,
            forecast,
        }
    }

    /// Per-bucket totals and deltas of every snapshot counter
    pub async fn get_aggregated_metrics(&self, query: &AggregationQuery) -> LookoutResult<Vec<BucketAggregate>> {
        let (start, end) = self.resolve_range(query)?;
        info!(
            "Aggregating snapshots by {} from {} to {}",
            query.group_by,
            start.to_rfc3339(),
            end.to_rfc3339()
        );

        let snapshots = &self.callbacks.snapshots;
        let (in_range, baseline) = futures::try_join!(
            snapshots.list_snapshots(start, end),
            snapshots.latest_snapshot_before(start),
        )
        .map_err(|e| e.into_upstream(SNAPSHOTS_SOURCE))?;

        let aggregates = DeltaAggregator::snapshot_aggregates(
            &in_range,
            baseline.as_ref(),
            start.date_naive(),
            end.date_naive(),
            query.group_by,
        )?;

        self.status.write().await.aggregations_served += 1;
        Ok(aggregates)
    }

    /// New and total students per bucket
    pub async fn get_new_students_aggregation(
        &self,
        query: &AggregationQuery,
    ) -> LookoutResult<Vec<NewStudentsPoint>> {
        Ok(self
            .get_aggregated_metrics(query)
            .await?
            .iter()
            .map(|a| NewStudentsPoint {
                period: a.period.clone(),
                new_students: a.new_of(counters::STUDENTS),
                total_students: a.total_of(counters::STUDENTS),
            })
            .collect())
    }

    /// Dashboard rows with pt-BR formatted figures
    pub async fn get_students_report(&self, query: &AggregationQuery) -> LookoutResult<Vec<StudentsPeriodRow>> {
        Ok(self
            .get_aggregated_metrics(query)
            .await?
            .iter()
            .map(|a| StudentsPeriodRow::from_aggregate(a, &self.config.pricing))
            .collect())
    }

    /// Explicit bounds, or a granularity-specific lookback ending now
    fn resolve_range(&self, query: &AggregationQuery) -> LookoutResult<(DateTime<Utc>, DateTime<Utc>)> {
        let end = match query.end.as_deref() {
            Some(value) => parse_date_param(value)?,
            None => self.callbacks.clock.now(),
        };
        let start = match query.start.as_deref() {
            Some(value) => parse_date_param(value)?,
            None => default_start(end, query.group_by),
        };

        if start > end {
            return Err(LookoutError::invalid_range(start.to_rfc3339(), end.to_rfc3339()));
        }
        Ok((start, end))
    }
}

/// Scalar pieces of a ticket report
struct ReportParts<'a> {
    start: NaiveDate,
    end: NaiveDate,
    category: Option<&'a str>,
    variacao: f64,
    working_days: u32,
    previous_working_days: u32,
}

/// Start of the default lookback for `granularity`
fn default_start(end: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
    match granularity {
        Granularity::Day => end - ChronoDuration::days(30),
        Granularity::Week => {
            let anchor = end.date_naive() - ChronoDuration::weeks(8);
            start_of_day(Bucketizer::bucket_start(anchor, Granularity::Week))
        }
        Granularity::Month => {
            let date = end.date_naive();
            let anchor = date
                .checked_sub_months(Months::new(12))
                .unwrap_or(date)
                .with_day(1)
                .unwrap_or(date);
            start_of_day(anchor)
        }
    }
}

impl std::fmt::Debug for ReportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReportEngine")
            .field("config", &self.config)
            .field("forecast", &self.forecast)
            .field("cache", &self.cache)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rate_variation() {
        assert_eq!(rate_variation(12.0, 10.0), 20.0);
        assert_eq!(rate_variation(1.0, 3.0), -66.67);
        assert_eq!(rate_variation(5.0, 0.0), 100.0);
        assert_eq!(rate_variation(0.0, 0.0), 0.0);
        assert_eq!(rate_variation(0.0, 4.0), -100.0);
    }

    #[test]
    fn test_default_start_per_granularity() {
        let end = Utc.with_ymd_and_hms(2025, 3, 6, 15, 30, 0).unwrap(); // Thursday

        assert_eq!(
            default_start(end, Granularity::Day),
            Utc.with_ymd_and_hms(2025, 2, 4, 15, 30, 0).unwrap()
        );
        // Eight weeks back is Thursday 2025-01-09, its week starts Monday 2025-01-06
        assert_eq!(
            default_start(end, Granularity::Week),
            Utc.with_ymd_and_hms(2025, 1, 6, 0, 0, 0).unwrap()
        );
        assert_eq!(
            default_start(end, Granularity::Month),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
    }
}
