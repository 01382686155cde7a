//! Short-horizon forecasting with a deterministic fallback.
//!
//! A [`Forecaster`] turns a trailing window into point estimates and per-step
//! variances. [`ForecastEngine`] runs the configured primary forecaster and,
//! when it fails for any reason, substitutes a flat moving-average projection
//! with zero variance. Failures never reach the caller.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::arima::AutoArima;
use crate::error::{LookoutError, LookoutResult};
use crate::types::{ForecastPoint, ReportConfig, Trend};
use crate::utils::mean;

/// Point estimates and variances for each forecast step
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub estimates: Vec<f64>,
    pub variances: Vec<f64>,
}

impl Prediction {
    /// Usable only when both vectors cover the horizon with finite values
    fn is_valid(&self, horizon: usize) -> bool {
        self.estimates.len() == horizon
            && self.variances.len() == horizon
            && self.estimates.iter().chain(&self.variances).all(|v| v.is_finite())
    }
}

/// A forecasting strategy
pub trait Forecaster: Send + Sync {
    /// Method name reported in report metadata
    fn name(&self) -> &'static str;

    /// Fit on `history` and predict the next `horizon` points
    fn fit_predict(&self, history: &[f64], horizon: usize) -> LookoutResult<Prediction>;
}

/// Auto-order ARIMA
#[derive(Debug, Clone, Default)]
pub struct AutoArimaForecaster {
    search: AutoArima,
}

impl AutoArimaForecaster {
    pub fn new(search: AutoArima) -> Self {
        Self { search }
    }
}

impl Forecaster for AutoArimaForecaster {
    fn name(&self) -> &'static str {
        "ARIMA"
    }

    fn fit_predict(&self, history: &[f64], horizon: usize) -> LookoutResult<Prediction> {
        let model = self.search.fit(history)?;
        debug!("Selected {} with AIC {:.3}", model.order(), model.aic());
        let (estimates, variances) = model.predict(horizon);
        Ok(Prediction { estimates, variances })
    }
}

/// Flat projection at the window mean with zero variance
#[derive(Debug, Clone, Copy, Default)]
pub struct MovingAverageForecaster;

impl MovingAverageForecaster {
    pub fn flat(&self, history: &[f64], horizon: usize) -> Prediction {
        let level = mean(history);
        Prediction {
            estimates: vec![level; horizon],
            variances: vec![0.0; horizon],
        }
    }
}

impl Forecaster for MovingAverageForecaster {
    fn name(&self) -> &'static str {
        "MOVING_AVERAGE"
    }

    fn fit_predict(&self, history: &[f64], horizon: usize) -> LookoutResult<Prediction> {
        Ok(self.flat(history, horizon))
    }
}

/// Forecasting strategies selectable from configuration
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ForecastModel {
    #[default]
    AutoArima,
    MovingAverage,
}

impl ForecastModel {
    pub fn build(&self) -> Box<dyn Forecaster> {
        match self {
            ForecastModel::AutoArima => Box::new(AutoArimaForecaster::default()),
            ForecastModel::MovingAverage => Box::new(MovingAverageForecaster),
        }
    }
}

/// Forecast points for a horizon, plus how they were produced
#[derive(Debug, Clone)]
pub struct Projection {
    pub points: Vec<ForecastPoint>,
    pub method: &'static str,
    /// Set when the primary forecaster failed and the fallback was used
    pub fallback_error: Option<String>,
}

impl Projection {
    pub fn used_fallback(&self) -> bool {
        self.fallback_error.is_some()
    }
}

/// Classify a predicted value against a baseline.
///
/// Both thresholds are exclusive: a value exactly `threshold` away from the
/// baseline is flat.
pub fn classify_trend(predicted: f64, baseline: f64, threshold: f64) -> Trend {
    let ratio = if baseline > 0.0 {
        (predicted - baseline) / baseline
    } else if predicted > 0.0 {
        1.0
    } else {
        0.0
    };

    if ratio > threshold {
        Trend::Up
    } else if ratio < -threshold {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// `(predicted, lower, upper)` of one step
pub fn confidence_bounds(estimate: f64, variance: f64, z_score: f64) -> (u64, u64, u64) {
    let predicted = estimate.round().max(0.0) as u64;
    let margin = (z_score * variance.max(0.0).sqrt()).round() as u64;
    (predicted, predicted.saturating_sub(margin), predicted + margin)
}

/// Runs the primary forecaster with a moving-average safety net
pub struct ForecastEngine {
    primary: Box<dyn Forecaster>,
    fallback: MovingAverageForecaster,
    z_score: f64,
    trend_threshold: f64,
    trend_baseline_window: usize,
}

impl ForecastEngine {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            primary: config.forecast_model.build(),
            fallback: MovingAverageForecaster,
            z_score: config.z_score,
            trend_threshold: config.trend_threshold,
            trend_baseline_window: config.trend_baseline_window,
        }
    }

    /// Replace the primary forecaster
    pub fn with_forecaster(mut self, forecaster: Box<dyn Forecaster>) -> Self {
        self.primary = forecaster;
        self
    }

    pub fn primary(&self) -> &dyn Forecaster {
        self.primary.as_ref()
    }

    /// Predict `horizon` points; never fails
    pub fn predict(&self, history: &[f64], horizon: usize) -> (Prediction, &'static str, Option<String>) {
        let outcome = self.primary.fit_predict(history, horizon).and_then(|prediction| {
            if prediction.is_valid(horizon) {
                Ok(prediction)
            } else {
                Err(LookoutError::forecast_failure(
                    self.primary.name(),
                    "prediction does not cover the horizon with finite values",
                ))
            }
        });

        match outcome {
            Ok(prediction) => (prediction, self.primary.name(), None),
            Err(e) => {
                warn!("Forecast with {} failed, using moving average: {}", self.primary.name(), e);
                (self.fallback.flat(history, horizon), self.fallback.name(), Some(e.to_string()))
            }
        }
    }

    /// Forecast one point per entry of `periods`
    pub fn project(&self, history: &[f64], periods: &[String]) -> Projection {
        let (prediction, method, fallback_error) = self.predict(history, periods.len());

        let recent = &history[history.len().saturating_sub(self.trend_baseline_window)..];
        let baseline = mean(recent);

        let points = periods
            .iter()
            .zip(prediction.estimates.iter().zip(&prediction.variances))
            .map(|(period, (estimate, variance))| {
                let (predicted, lower_bound, upper_bound) = confidence_bounds(*estimate, *variance, self.z_score);
                ForecastPoint {
                    period: period.clone(),
                    predicted,
                    lower_bound,
                    upper_bound,
                    trend: classify_trend(predicted as f64, baseline, self.trend_threshold),
                }
            })
            .collect();

        Projection {
            points,
            method,
            fallback_error,
        }
    }
}

impl std::fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("primary", &self.primary.name())
            .field("z_score", &self.z_score)
            .field("trend_threshold", &self.trend_threshold)
            .finish()
    }
}
