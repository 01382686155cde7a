//! Auto-order ARIMA fitting.
//!
//! The differencing order is picked by comparing variances, then every
//! ARMA(p, q) candidate up to the configured orders is fitted with the
//! Hannan-Rissanen two-stage regression and the lowest-AIC candidate wins.
//! Everything is conditional least squares over a common sample, which keeps
//! the fit bounded and deterministic.

use std::fmt;

use crate::error::{LookoutError, LookoutResult};

const MODEL_NAME: &str = "ARIMA";
const MIN_OBSERVATIONS: usize = 6;
const MIN_SIGMA2: f64 = 1e-9;
const PIVOT_TOLERANCE: f64 = 1e-9;

fn failure<S: Into<String>>(message: S) -> LookoutError {
    LookoutError::forecast_failure(MODEL_NAME.to_string(), message.into())
}

/// `(p, d, q)` order of a fitted model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ARIMA({},{},{})", self.p, self.d, self.q)
    }
}

/// Search bounds for [`AutoArima`]
#[derive(Debug, Clone, Copy)]
pub struct AutoArima {
    pub max_p: usize,
    pub max_d: usize,
    pub max_q: usize,
}

impl Default for AutoArima {
    fn default() -> Self {
        Self {
            max_p: 2,
            max_d: 1,
            max_q: 2,
        }
    }
}

impl AutoArima {
    pub fn new(max_p: usize, max_d: usize, max_q: usize) -> Self {
        Self { max_p, max_d, max_q }
    }

    /// Fit the best model for `series`
    pub fn fit(&self, series: &[f64]) -> LookoutResult<ArimaModel> {
        if series.len() < MIN_OBSERVATIONS {
            return Err(failure(format!(
                "need at least {} observations, got {}",
                MIN_OBSERVATIONS,
                series.len()
            )));
        }
        if series.iter().any(|v| !v.is_finite()) {
            return Err(failure("series contains non-finite values"));
        }

        let d = self.select_differencing(series);
        let w = difference(series, d);
        // Every candidate is scored over the same trailing sample
        let sample_start = self.max_p.max(self.max_q);
        if w.len() <= sample_start + 2 {
            return Err(failure("series too short after differencing"));
        }

        let mut best: Option<ArimaModel> = None;
        for p in 0..=self.max_p {
            for q in 0..=self.max_q {
                let candidate = match fit_arma(&w, p, q, sample_start) {
                    Ok(arma) => arma,
                    Err(_) => continue,
                };
                let replace = best.as_ref().map_or(true, |b| candidate.aic < b.arma.aic);
                if replace {
                    best = Some(ArimaModel {
                        order: ArimaOrder { p, d, q },
                        arma: candidate,
                        levels: series.to_vec(),
                        differenced: w.clone(),
                    });
                }
            }
        }

        best.ok_or_else(|| failure("no candidate order could be fitted"))
    }

    /// Difference once only when it strictly lowers the variance
    fn select_differencing(&self, series: &[f64]) -> usize {
        if self.max_d == 0 {
            return 0;
        }
        let diffed = difference(series, 1);
        if variance(&diffed) < variance(series) {
            1
        } else {
            0
        }
    }
}

#[derive(Debug, Clone)]
struct ArmaFit {
    intercept: f64,
    ar: Vec<f64>,
    ma: Vec<f64>,
    residuals: Vec<f64>,
    sigma2: f64,
    aic: f64,
}

/// A fitted model ready to predict
#[derive(Debug, Clone)]
pub struct ArimaModel {
    order: ArimaOrder,
    arma: ArmaFit,
    levels: Vec<f64>,
    differenced: Vec<f64>,
}

impl ArimaModel {
    pub fn order(&self) -> ArimaOrder {
        self.order
    }

    pub fn aic(&self) -> f64 {
        self.arma.aic
    }

    pub fn sigma2(&self) -> f64 {
        self.arma.sigma2
    }

    pub fn ar_coefficients(&self) -> &[f64] {
        &self.arma.ar
    }

    pub fn ma_coefficients(&self) -> &[f64] {
        &self.arma.ma
    }

    /// Point estimates and their variances for the next `horizon` steps
    pub fn predict(&self, horizon: usize) -> (Vec<f64>, Vec<f64>) {
        let arma = &self.arma;
        let mut w = self.differenced.clone();
        let mut e = arma.residuals.clone();
        let mut steps = Vec::with_capacity(horizon);

        for _ in 0..horizon {
            let t = w.len();
            let mut next = arma.intercept;
            for (i, phi) in arma.ar.iter().enumerate() {
                next += phi * w[t - 1 - i];
            }
            for (j, theta) in arma.ma.iter().enumerate() {
                next += theta * e[t - 1 - j];
            }
            w.push(next);
            e.push(0.0);
            steps.push(next);
        }

        let estimates = if self.order.d == 0 {
            steps
        } else {
            let mut level = self.levels.last().copied().unwrap_or(0.0);
            steps
                .iter()
                .map(|step| {
                    level += step;
                    level
                })
                .collect()
        };

        let mut psi = psi_weights(&arma.ar, &arma.ma, horizon);
        if self.order.d > 0 {
            let mut running = 0.0;
            for weight in psi.iter_mut() {
                running += *weight;
                *weight = running;
            }
        }

        let mut accumulated = 0.0;
        let variances = psi
            .iter()
            .map(|weight| {
                accumulated += weight * weight;
                arma.sigma2 * accumulated
            })
            .collect();

        (estimates, variances)
    }
}

fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut out = series.to_vec();
    for _ in 0..d {
        out = out.windows(2).map(|w| w[1] - w[0]).collect();
    }
    out
}

fn variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64
}

/// Hannan-Rissanen: a long autoregression supplies innovation estimates,
/// then one regression on lagged values and lagged innovations gives the
/// ARMA coefficients.
fn fit_arma(w: &[f64], p: usize, q: usize, sample_start: usize) -> LookoutResult<ArmaFit> {
    let n = w.len();

    let (innovations, first_row) = if q > 0 {
        let long_order = (p + q + 2).max(3);
        let long = regress(w, long_order, &[], 0, long_order)?;
        let mut innovations = vec![0.0; n];
        for t in long_order..n {
            let fitted = long[0] + (1..=long_order).map(|i| long[i] * w[t - i]).sum::<f64>();
            innovations[t] = w[t] - fitted;
        }
        (innovations, p.max(long_order + q))
    } else {
        (Vec::new(), p)
    };
    let coefficients = regress(w, p, &innovations, q, first_row)?;

    let intercept = coefficients[0];
    let ar = coefficients[1..=p].to_vec();
    let ma = coefficients[p + 1..].to_vec();

    if ar.iter().map(|c| c.abs()).sum::<f64>() >= 1.0 {
        return Err(failure("autoregressive part is not stationary"));
    }
    if ma.iter().map(|c| c.abs()).sum::<f64>() >= 1.0 {
        return Err(failure("moving-average part is not invertible"));
    }

    // Conditional residuals over the common sample
    let mut residuals = vec![0.0; n];
    for t in sample_start..n {
        let mut fitted = intercept;
        for (i, phi) in ar.iter().enumerate() {
            fitted += phi * w[t - 1 - i];
        }
        for (j, theta) in ma.iter().enumerate() {
            if t > j {
                fitted += theta * residuals[t - 1 - j];
            }
        }
        residuals[t] = w[t] - fitted;
    }

    let effective = (n - sample_start) as f64;
    let sigma2 = (residuals[sample_start..].iter().map(|r| r * r).sum::<f64>() / effective).max(MIN_SIGMA2);
    let parameters = (p + q + 1) as f64;
    let aic = effective * sigma2.ln() + 2.0 * parameters;

    Ok(ArmaFit {
        intercept,
        ar,
        ma,
        residuals,
        sigma2,
        aic,
    })
}

/// OLS of `w[t]` on `[1, w[t-1..=t-p], innovations[t-1..=t-q]]` for `t >= first_row`
fn regress(
    w: &[f64],
    p: usize,
    innovations: &[f64],
    q: usize,
    first_row: usize,
) -> LookoutResult<Vec<f64>> {
    let columns = 1 + p + q;
    if w.len() < first_row + columns + 1 {
        return Err(failure("not enough observations for regression"));
    }

    let rows: Vec<Vec<f64>> = (first_row..w.len())
        .map(|t| {
            let mut row = Vec::with_capacity(columns);
            row.push(1.0);
            row.extend((1..=p).map(|i| w[t - i]));
            row.extend((1..=q).map(|j| innovations[t - j]));
            row
        })
        .collect();
    least_squares(&rows, &w[first_row..])
}

/// Solve the normal equations by Gaussian elimination with partial pivoting
fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> LookoutResult<Vec<f64>> {
    let k = rows.first().map(Vec::len).unwrap_or(0);
    if k == 0 {
        return Err(failure("empty design matrix"));
    }

    // Augmented [X'X | X'y]
    let mut a = vec![vec![0.0; k + 1]; k];
    for (row, target) in rows.iter().zip(y) {
        for i in 0..k {
            for j in 0..k {
                a[i][j] += row[i] * row[j];
            }
            a[i][k] += row[i] * target;
        }
    }

    let scale = a
        .iter()
        .flat_map(|r| r[..k].iter())
        .fold(0.0_f64, |m, v| m.max(v.abs()))
        .max(1.0);

    for col in 0..k {
        let pivot = (col..k)
            .max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= PIVOT_TOLERANCE * scale {
            return Err(failure("singular design matrix"));
        }
        a.swap(col, pivot);

        for r in (col + 1)..k {
            let factor = a[r][col] / a[col][col];
            if factor != 0.0 {
                for c in col..=k {
                    a[r][c] -= factor * a[col][c];
                }
            }
        }
    }

    let mut solution = vec![0.0; k];
    for i in (0..k).rev() {
        let tail: f64 = ((i + 1)..k).map(|j| a[i][j] * solution[j]).sum();
        solution[i] = (a[i][k] - tail) / a[i][i];
    }

    if solution.iter().any(|v| !v.is_finite()) {
        return Err(failure("regression produced non-finite coefficients"));
    }
    Ok(solution)
}

/// MA(infinity) weights psi_0..psi_{horizon-1} of an ARMA model
fn psi_weights(ar: &[f64], ma: &[f64], horizon: usize) -> Vec<f64> {
    let mut psi = Vec::with_capacity(horizon);
    for j in 0..horizon {
        let mut weight = if j == 0 { 1.0 } else { ma.get(j - 1).copied().unwrap_or(0.0) };
        for (i, phi) in ar.iter().enumerate() {
            let lag = i + 1;
            if lag <= j {
                weight += phi * psi[j - lag];
            }
        }
        psi.push(weight);
    }
    psi
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noisy_series(n: usize, level: f64) -> Vec<f64> {
        // Deterministic pseudo-noise around a level
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        (0..n)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                level + (state % 1000) as f64 / 100.0 - 5.0
            })
            .collect()
    }

    #[test]
    fn test_constant_series_predicts_constant() {
        let model = AutoArima::default().fit(&[10.0; 30]).unwrap();
        assert_eq!(model.order().d, 0);

        let (estimates, variances) = model.predict(7);
        assert_eq!(estimates.len(), 7);
        assert!(estimates.iter().all(|v| (v - 10.0).abs() < 1e-9));
        assert!(variances.iter().all(|v| *v < 1e-6));
    }

    #[test]
    fn test_linear_trend_is_differenced_and_extended() {
        let series: Vec<f64> = (0..30).map(|t| 5.0 + 2.0 * t as f64).collect();
        let model = AutoArima::default().fit(&series).unwrap();
        assert_eq!(model.order().d, 1);

        let (estimates, _) = model.predict(3);
        for (h, estimate) in estimates.iter().enumerate() {
            let expected = 5.0 + 2.0 * (30 + h) as f64;
            assert!((estimate - expected).abs() < 1e-6, "step {h}: {estimate} vs {expected}");
        }
    }

    #[test]
    fn test_noisy_series_fits_with_growing_variance() {
        let series = noisy_series(30, 40.0);
        let model = AutoArima::default().fit(&series).unwrap();
        let (estimates, variances) = model.predict(7);

        assert!(estimates.iter().all(|v| v.is_finite()));
        assert!(variances.iter().all(|v| v.is_finite() && *v > 0.0));
        assert!(variances.windows(2).all(|w| w[1] >= w[0]));
        assert!(model.ar_coefficients().iter().map(|c| c.abs()).sum::<f64>() < 1.0);
        assert!(model.ma_coefficients().iter().map(|c| c.abs()).sum::<f64>() < 1.0);
    }

    #[test]
    fn test_rejects_short_or_invalid_series() {
        assert!(matches!(
            AutoArima::default().fit(&[1.0, 2.0, 3.0]),
            Err(LookoutError::ForecastFailure { .. })
        ));
        let mut series = vec![3.0; 20];
        series[4] = f64::NAN;
        assert!(AutoArima::default().fit(&series).is_err());
    }

    #[test]
    fn test_psi_weights_of_ar1() {
        let psi = psi_weights(&[0.5], &[], 4);
        assert_eq!(psi, vec![1.0, 0.5, 0.25, 0.125]);

        let psi = psi_weights(&[], &[0.4], 3);
        assert_eq!(psi, vec![1.0, 0.4, 0.0]);
    }

    #[test]
    fn test_least_squares_recovers_line() {
        let rows: Vec<Vec<f64>> = (0..10).map(|x| vec![1.0, x as f64]).collect();
        let y: Vec<f64> = (0..10).map(|x| 3.0 + 0.5 * x as f64).collect();
        let beta = least_squares(&rows, &y).unwrap();
        assert!((beta[0] - 3.0).abs() < 1e-9);
        assert!((beta[1] - 0.5).abs() < 1e-9);

        let collinear: Vec<Vec<f64>> = (0..10).map(|_| vec![1.0, 2.0]).collect();
        assert!(least_squares(&collinear, &y).is_err());
    }
}
