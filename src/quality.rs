// src/quality.rs

use tracing::{debug, warn};

use crate::error::{LookoutError, LookoutResult};
use crate::forecast::Forecaster;
use crate::types::{QualityMetrics, ReportConfig};
use crate::utils::{mean, round_to};

/// Walk-forward validation of a forecaster on held-out trailing points
#[derive(Debug, Clone, Copy)]
pub struct QualityEvaluator {
    holdout: usize,
    min_training: usize,
}

impl Default for QualityEvaluator {
    fn default() -> Self {
        Self {
            holdout: 7,
            min_training: 10,
        }
    }
}

impl QualityEvaluator {
    pub fn new(config: &ReportConfig) -> Self {
        Self {
            holdout: config.holdout_points,
            min_training: config.min_training_points,
        }
    }

    /// Train on all but the last `holdout` points and score the prediction
    /// of those points. Metrics are absent when history is too short or the
    /// validation pass fails.
    pub fn evaluate(&self, forecaster: &dyn Forecaster, history: &[f64]) -> QualityMetrics {
        let training_window_size = history.len().saturating_sub(self.holdout).max(1);
        let mut metrics = QualityMetrics {
            rmse: None,
            r2: None,
            training_window_size,
        };

        if self.holdout == 0 || history.len() < self.min_training + self.holdout {
            debug!(
                "Skipping quality evaluation: {} points, need {}",
                history.len(),
                self.min_training + self.holdout
            );
            return metrics;
        }

        match self.validate(forecaster, history) {
            Ok((rmse, r2)) => {
                metrics.rmse = Some(rmse);
                metrics.r2 = Some(r2);
            }
            Err(e) => warn!("Quality evaluation failed, omitting metrics: {}", e),
        }
        metrics
    }

    fn validate(&self, forecaster: &dyn Forecaster, history: &[f64]) -> LookoutResult<(f64, f64)> {
        let split = history.len() - self.holdout;
        let (train, test) = history.split_at(split);

        let prediction = forecaster
            .fit_predict(train, test.len())
            .map_err(|e| LookoutError::quality_evaluation(e.to_string()))?;

        score(test, &prediction.estimates)
    }
}

/// RMSE and R² of `predicted` against `actual`, both rounded to 4 decimals.
/// R² is 1 when the actual values have no variance.
pub fn score(actual: &[f64], predicted: &[f64]) -> LookoutResult<(f64, f64)> {
    if actual.is_empty() || actual.len() != predicted.len() {
        return Err(LookoutError::quality_evaluation(format!(
            "expected {} predictions, got {}",
            actual.len(),
            predicted.len()
        )));
    }

    let ssr: f64 = actual.iter().zip(predicted).map(|(a, p)| (a - p).powi(2)).sum();
    let actual_mean = mean(actual);
    let sst: f64 = actual.iter().map(|a| (a - actual_mean).powi(2)).sum();

    let rmse = (ssr / actual.len() as f64).sqrt();
    let r2 = if sst == 0.0 { 1.0 } else { 1.0 - ssr / sst };

    if !rmse.is_finite() || !r2.is_finite() {
        return Err(LookoutError::quality_evaluation("non-finite validation metrics"));
    }
    Ok((round_to(rmse, 4), round_to(r2, 4)))
}
