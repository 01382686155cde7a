// src/types.rs

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::HolidayTable;
use crate::error::{LookoutError, LookoutResult};
use crate::forecast::ForecastModel;
use crate::utils::{format_currency_brl, format_number_br, round_to};

/// Counter values keyed by counter name, in stable (sorted) order
pub type Counters = BTreeMap<String, f64>;

/// Well-known counter names reported by the study-platform statistics poller
pub mod counters {
    pub const PLANS: &str = "plans";
    pub const TOPICS: &str = "topics";
    pub const SUBJECTS: &str = "subjects";
    pub const PLANNINGS: &str = "plannings";
    pub const STUDIES: &str = "studies";
    pub const DURATION_STUDIES_WEEK: &str = "durationStudiesWeek";
    pub const STUDENTS: &str = "students";
    pub const VALUE: &str = "value";

    /// Counters copied verbatim from a raw statistics payload
    pub const RAW: [&str; 6] = [PLANS, TOPICS, SUBJECTS, PLANNINGS, STUDIES, DURATION_STUDIES_WEEK];
}

/// An immutable, externally created event (e.g. a ticket creation)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub id: String,
    pub occurred_at: DateTime<Utc>,
    pub category: String,
}

impl TimestampedEvent {
    pub fn new<S: Into<String>>(id: S, occurred_at: DateTime<Utc>, category: S) -> Self {
        Self {
            id: id.into(),
            occurred_at,
            category: category.into(),
        }
    }
}

/// A point-in-time reading of several cumulative counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub fetched_at: DateTime<Utc>,
    /// Counter readings; `None` when the source did not report a value
    pub counters: BTreeMap<String, Option<f64>>,
}

impl MetricSnapshot {
    pub fn new(fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            counters: BTreeMap::new(),
        }
    }

    /// Builder-style counter setter
    pub fn with_counter(mut self, name: &str, value: f64) -> Self {
        self.counters.insert(name.to_string(), Some(value));
        self
    }

    /// Numeric reading of a counter; absent, null and NaN read as zero
    pub fn counter(&self, name: &str) -> f64 {
        match self.counters.get(name) {
            Some(Some(v)) if v.is_finite() => *v,
            _ => 0.0,
        }
    }

    /// Build a snapshot from a raw statistics payload.
    ///
    /// Zero or missing raw counters are stored as `None`. The student count is
    /// estimated from the number of plans, and the monetary value from the
    /// estimated students.
    pub fn from_statistics(
        fetched_at: DateTime<Utc>,
        stats: &HashMap<String, f64>,
        pricing: &PricingConfig,
    ) -> Self {
        let mut snapshot = Self::new(fetched_at);

        for name in counters::RAW {
            let value = stats.get(name).copied().filter(|v| v.is_finite() && *v != 0.0);
            snapshot.counters.insert(name.to_string(), value);
        }

        let plans = stats.get(counters::PLANS).copied().unwrap_or(0.0);
        let students = pricing.estimate_students(plans);
        let value = pricing.value_of(students);

        snapshot
            .counters
            .insert(counters::STUDENTS.to_string(), (students != 0.0).then_some(students));
        snapshot
            .counters
            .insert(counters::VALUE.to_string(), (value != 0.0).then_some(value));
        snapshot
    }
}

/// Calendar granularity of an aggregation bucket
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Day,
    Week,
    Month,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Day => "day",
            Granularity::Week => "week",
            Granularity::Month => "month",
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = LookoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" => Ok(Granularity::Day),
            "week" => Ok(Granularity::Week),
            "month" => Ok(Granularity::Month),
            other => Err(LookoutError::config(format!(
                "unknown granularity '{}', expected day, week or month",
                other
            ))),
        }
    }
}

/// A calendar-aligned, contiguous period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: String,
    pub start_date: NaiveDate,
    /// Last day of the bucket, inclusive
    pub end_date: NaiveDate,
}

impl Bucket {
    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start_date && date <= self.end_date
    }
}

/// Number of events recorded on one UTC calendar day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: NaiveDate,
    pub count: u64,
}

/// One historical observation after bucketing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub period: String,
    pub value: f64,
}

/// Direction of a forecast point relative to the recent baseline
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

/// One projected future observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastPoint {
    pub period: String,
    pub predicted: u64,
    pub lower_bound: u64,
    pub upper_bound: u64,
    pub trend: Trend,
}

/// Walk-forward validation results; rmse/r2 are absent when validation
/// could not run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r2: Option<f64>,
    pub training_window_size: usize,
}

// ===== Ticket report =====

/// Ticket report request; dates are `YYYY-MM-DD`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketReportQuery {
    pub start_date: String,
    pub end_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl TicketReportQuery {
    pub fn new<S: Into<String>>(start_date: S, end_date: S) -> Self {
        Self {
            start_date: start_date.into(),
            end_date: end_date.into(),
            category: None,
        }
    }

    pub fn with_category<S: Into<String>>(mut self, category: S) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// 95% confidence bounds of a projected value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub inferior: u64,
    pub superior: u64,
}

/// Merged chronological item: historical days carry `total`/`quantidade_real`,
/// projected days carry the projection fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyItem {
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantidade_real: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantidade_projetada: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervalo_confianca: Option<ConfidenceInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tendencia: Option<Trend>,
}

/// Item of the `serie` view (forecast-window history followed by projection)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesItem {
    pub data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantidade_real: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantidade_projetada: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervalo_confianca: Option<ConfidenceInterval>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tendencia: Option<Trend>,
}

impl From<&ForecastPoint> for SeriesItem {
    fn from(point: &ForecastPoint) -> Self {
        Self {
            data: point.period.clone(),
            quantidade_real: None,
            quantidade_projetada: Some(point.predicted),
            intervalo_confianca: Some(ConfidenceInterval {
                inferior: point.lower_bound,
                superior: point.upper_bound,
            }),
            tendencia: Some(point.trend),
        }
    }
}

impl From<&ForecastPoint> for DailyItem {
    fn from(point: &ForecastPoint) -> Self {
        Self {
            date: point.period.clone(),
            total: None,
            quantidade_real: None,
            quantidade_projetada: Some(point.predicted),
            intervalo_confianca: Some(ConfidenceInterval {
                inferior: point.lower_bound,
                superior: point.upper_bound,
            }),
            tendencia: Some(point.trend),
        }
    }
}

/// Cache information attached to a report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub ttl_segundos: u64,
    pub hit: bool,
}

/// Projection and quality diagnostics of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub projection_method: String,
    pub confidence_level: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r2: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,
    pub ordenacao: String,
    pub training_window: usize,
    pub forecast_horizon: usize,
    pub last_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub start_date: String,
    pub end_date: String,
    pub working_days: u32,
    pub previous_working_days: u32,
    pub cache: CacheInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TickerKind {
    Ticket,
    Projection,
}

/// Simplified `{date, ticker, type}` view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerItem {
    pub date: String,
    pub ticker: u64,
    #[serde(rename = "type")]
    pub kind: TickerKind,
}

/// Complete ticket-volume report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketReport {
    /// Requested-range history followed by the projection
    pub data: Vec<DailyItem>,
    /// Percent change of the business-day rate against the previous period
    pub variacao: f64,
    pub serie: Vec<SeriesItem>,
    pub metadados: ReportMetadata,
    pub tickets: Vec<TickerItem>,
    pub projections: Vec<TickerItem>,
    /// Forecast-window history, separate from the projection
    pub historical: Vec<SeriesPoint>,
    pub forecast: Vec<ForecastPoint>,
}

impl TicketReport {
    pub fn cache_hit(&self) -> bool {
        self.metadados.cache.hit
    }
}

// ===== Snapshot aggregation =====

/// Aggregation request; `start`/`end` accept RFC 3339, `YYYY-MM-DD` or `dd/MM/yyyy`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregationQuery {
    pub group_by: Granularity,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
}

impl AggregationQuery {
    pub fn new(group_by: Granularity) -> Self {
        Self {
            group_by,
            start: None,
            end: None,
        }
    }

    pub fn start<S: Into<String>>(mut self, start: S) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn end<S: Into<String>>(mut self, end: S) -> Self {
        self.end = Some(end.into());
        self
    }
}

/// Per-bucket counter totals and deltas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketAggregate {
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    /// Latest reading in the bucket, carried forward when the bucket is empty
    pub total: Counters,
    /// Growth against the previous bucket's total, never negative
    pub new: Counters,
    /// Latest minus earliest reading inside the bucket
    pub within_bucket_delta: Counters,
    pub snapshot_count: usize,
}

impl BucketAggregate {
    pub fn total_of(&self, counter: &str) -> f64 {
        self.total.get(counter).copied().unwrap_or(0.0)
    }

    pub fn new_of(&self, counter: &str) -> f64 {
        self.new.get(counter).copied().unwrap_or(0.0)
    }

    pub fn within_bucket_of(&self, counter: &str) -> f64 {
        self.within_bucket_delta.get(counter).copied().unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudentsPoint {
    pub period: String,
    pub new_students: f64,
    pub total_students: f64,
}

/// Dashboard row for the students report, numbers formatted for pt-BR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentsPeriodRow {
    pub period: String,
    pub novos_usuarios: String,
    pub usuarios_totais: String,
    pub novos_planos: String,
    pub planos_totais: String,
    pub novos_topicos: String,
    pub topicos_totais: String,
    pub novos_assuntos: String,
    pub assuntos_totais: String,
    pub novos_planejamentos: String,
    pub planejamentos_totais: String,
    pub novos_estudos: String,
    pub estudos_totais: String,
    pub novos_duracao_semana: String,
    pub duracao_semana_totais: String,
    pub valor_novos_usuarios: String,
    pub valor_novo: String,
    pub valor_total: String,
}

impl StudentsPeriodRow {
    pub fn from_aggregate(aggregate: &BucketAggregate, pricing: &PricingConfig) -> Self {
        let students_delta = aggregate.within_bucket_of(counters::STUDENTS);
        let num = format_number_br;

        Self {
            period: aggregate.period.clone(),
            novos_usuarios: num(students_delta),
            usuarios_totais: num(aggregate.total_of(counters::STUDENTS)),
            novos_planos: num(aggregate.new_of(counters::PLANS)),
            planos_totais: num(aggregate.total_of(counters::PLANS)),
            novos_topicos: num(aggregate.new_of(counters::TOPICS)),
            topicos_totais: num(aggregate.total_of(counters::TOPICS)),
            novos_assuntos: num(aggregate.new_of(counters::SUBJECTS)),
            assuntos_totais: num(aggregate.total_of(counters::SUBJECTS)),
            novos_planejamentos: num(aggregate.new_of(counters::PLANNINGS)),
            planejamentos_totais: num(aggregate.total_of(counters::PLANNINGS)),
            novos_estudos: num(aggregate.new_of(counters::STUDIES)),
            estudos_totais: num(aggregate.total_of(counters::STUDIES)),
            novos_duracao_semana: num(aggregate.new_of(counters::DURATION_STUDIES_WEEK)),
            duracao_semana_totais: num(aggregate.total_of(counters::DURATION_STUDIES_WEEK)),
            valor_novos_usuarios: format_currency_brl(pricing.value_of(students_delta)),
            valor_novo: format_currency_brl(aggregate.new_of(counters::VALUE)),
            valor_total: format_currency_brl(aggregate.total_of(counters::VALUE)),
        }
    }
}

// ===== Configuration =====

/// How student counts and monetary values are derived from raw counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Each student holds up to this many plans
    pub plans_per_student: f64,
    /// Monthly price per student
    pub unit_price: f64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            plans_per_student: 3.0,
            unit_price: 28.40,
        }
    }
}

impl PricingConfig {
    pub fn estimate_students(&self, plans: f64) -> f64 {
        if plans <= 0.0 || self.plans_per_student <= 0.0 {
            return 0.0;
        }
        (plans / self.plans_per_student).ceil()
    }

    /// Monetary value of a student count, kept to 2 decimals
    pub fn value_of(&self, students: f64) -> f64 {
        round_to(students * self.unit_price, 2)
    }
}

/// Main configuration for the report engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Trailing points fed to the forecaster
    pub history_window: usize,
    /// Future points to project
    pub forecast_horizon: usize,
    /// Longest accepted report range, inclusive day count
    pub max_range_days: i64,
    /// How long a computed report stays cached
    pub cache_ttl_seconds: u64,
    pub confidence_level: f64,
    /// z-score matching `confidence_level`
    pub z_score: f64,
    /// Relative distance from the baseline before a point counts as up/down
    pub trend_threshold: f64,
    /// Trailing points averaged into the trend baseline
    pub trend_baseline_window: usize,
    /// Points held out for walk-forward validation
    pub holdout_points: usize,
    /// Training points required before validation runs
    pub min_training_points: usize,
    pub forecast_model: ForecastModel,
    pub calendar: HolidayTable,
    pub pricing: PricingConfig,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            history_window: 30,
            forecast_horizon: 7,
            max_range_days: 180,
            cache_ttl_seconds: 300,
            confidence_level: 0.95,
            z_score: 1.96,
            trend_threshold: 0.05,
            trend_baseline_window: 7,
            holdout_points: 7,
            min_training_points: 10,
            forecast_model: ForecastModel::AutoArima,
            calendar: HolidayTable::default(),
            pricing: PricingConfig::default(),
        }
    }
}

impl ReportConfig {
    pub fn builder() -> ReportConfigBuilder {
        ReportConfigBuilder::new()
    }

    /// Check that the configuration can drive a report
    pub fn validate(&self) -> LookoutResult<()> {
        if self.history_window == 0 {
            return Err(LookoutError::config("history_window must be at least 1"));
        }
        if self.forecast_horizon == 0 {
            return Err(LookoutError::config("forecast_horizon must be at least 1"));
        }
        if self.max_range_days < 1 {
            return Err(LookoutError::config("max_range_days must be at least 1"));
        }
        if !(0.0..1.0).contains(&self.confidence_level) || self.z_score <= 0.0 {
            return Err(LookoutError::config("confidence_level must be in [0, 1) with a positive z_score"));
        }
        if self.trend_threshold < 0.0 {
            return Err(LookoutError::config("trend_threshold must not be negative"));
        }
        Ok(())
    }

    /// Parse a configuration from TOML; missing keys keep their defaults
    #[cfg(feature = "config-toml")]
    pub fn from_toml_str(input: &str) -> LookoutResult<Self> {
        let config: ReportConfig = toml::from_str(input)
            .map_err(|e| LookoutError::config(format!("invalid TOML configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }
}

/// Builder for creating report configurations easily
#[derive(Debug)]
pub struct ReportConfigBuilder {
    config: ReportConfig,
}

impl ReportConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: ReportConfig::default(),
        }
    }

    pub fn history_window(mut self, points: usize) -> Self {
        self.config.history_window = points;
        self
    }

    pub fn forecast_horizon(mut self, points: usize) -> Self {
        self.config.forecast_horizon = points;
        self
    }

    pub fn max_range_days(mut self, days: i64) -> Self {
        self.config.max_range_days = days;
        self
    }

    pub fn cache_ttl_seconds(mut self, seconds: u64) -> Self {
        self.config.cache_ttl_seconds = seconds;
        self
    }

    pub fn trend_threshold(mut self, threshold: f64) -> Self {
        self.config.trend_threshold = threshold;
        self
    }

    pub fn forecast_model(mut self, model: ForecastModel) -> Self {
        self.config.forecast_model = model;
        self
    }

    pub fn calendar(mut self, calendar: HolidayTable) -> Self {
        self.config.calendar = calendar;
        self
    }

    pub fn pricing(mut self, pricing: PricingConfig) -> Self {
        self.config.pricing = pricing;
        self
    }

    pub fn build(self) -> ReportConfig {
        self.config
    }
}

impl Default for ReportConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
