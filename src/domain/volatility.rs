//! Rolling realized volatility.
//!
//! Sample standard deviation (n - 1 denominator) of the most recent W
//! observed returns, scaled by sqrt(periods per year).
//! VOL(W)[t] uses returns through t-1 only.

use super::error::RpsimError;

/// Sample standard deviation. Fewer than two values yield 0.
pub fn sample_stddev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values
        .iter()
        .map(|v| {
            let diff = v - mean;
            diff * diff
        })
        .sum::<f64>()
        / (n - 1) as f64;
    variance.sqrt()
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolatilityEstimator {
    window: usize,
    annualization: f64,
}

impl VolatilityEstimator {
    pub fn new(window: usize, periods_per_year: f64) -> Self {
        Self {
            window,
            annualization: periods_per_year.sqrt(),
        }
    }

    /// Estimate from a prior-period return column using the configured window.
    pub fn estimate(&self, asset: &str, prior: &[Option<f64>]) -> Result<f64, RpsimError> {
        self.estimate_with_window(asset, prior, self.window)
    }

    /// Estimate using the most recent `window` observed returns. Gaps in the
    /// column are skipped, not filled.
    pub fn estimate_with_window(
        &self,
        asset: &str,
        prior: &[Option<f64>],
        window: usize,
    ) -> Result<f64, RpsimError> {
        let mut recent: Vec<f64> = prior.iter().rev().flatten().take(window).copied().collect();
        if recent.len() < window {
            return Err(RpsimError::InsufficientHistory {
                asset: asset.to_string(),
                available: recent.len(),
                required: window,
            });
        }
        recent.reverse();
        Ok(sample_stddev(&recent) * self.annualization)
    }
}
