//! Volatility-targeting leverage overlay.
//!
//! `L = target_vol / forecast_vol`, clamped to `[min_leverage, max_leverage]`.
//! A zero forecast (nothing held) yields `L = 0`. Optional forecast floor and
//! cap bound the forecast before division, and an optional gross-exposure cap
//! clips the scaled target proportionally.

use std::fmt;
use std::str::FromStr;
use tracing::warn;

use super::panel::History;
use super::portfolio::gross_exposure;

/// How portfolio volatility is forecast from the composed weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastModel {
    /// `sqrt(Σ w_i² σ_i²)`; ignores correlation.
    Diagonal,
    /// `sqrt(wᵀ Σ w)` with Σ the annualized sample covariance of the trailing window.
    Covariance,
}

impl FromStr for ForecastModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "diagonal" => Ok(ForecastModel::Diagonal),
            "covariance" => Ok(ForecastModel::Covariance),
            other => Err(format!("unknown forecast model '{other}'")),
        }
    }
}

impl fmt::Display for ForecastModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForecastModel::Diagonal => write!(f, "diagonal"),
            ForecastModel::Covariance => write!(f, "covariance"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeverageConfig {
    pub enabled: bool,
    pub target_vol: f64,
    pub max_leverage: f64,
    pub min_leverage: f64,
    pub forecast_model: ForecastModel,
    /// 0 disables.
    pub forecast_floor: f64,
    pub forecast_cap: Option<f64>,
    pub gross_cap: Option<f64>,
}

impl Default for LeverageConfig {
    fn default() -> Self {
        LeverageConfig {
            enabled: true,
            target_vol: 0.10,
            max_leverage: 2.0,
            min_leverage: 0.0,
            forecast_model: ForecastModel::Diagonal,
            forecast_floor: 0.0,
            forecast_cap: None,
            gross_cap: None,
        }
    }
}

/// Scaled target for one period.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledTarget {
    pub weights: Vec<f64>,
    pub leverage: f64,
    /// Annualized forecast of the unscaled composed portfolio.
    pub forecast_vol: f64,
    /// True when the gross cap clipped the target.
    pub clipped: bool,
}

impl ScaledTarget {
    /// All-cash target.
    pub fn cash(n: usize) -> Self {
        ScaledTarget {
            weights: vec![0.0; n],
            leverage: 0.0,
            forecast_vol: 0.0,
            clipped: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LeverageScaler {
    config: LeverageConfig,
    window: usize,
    periods_per_year: f64,
}

impl LeverageScaler {
    /// `window` is the covariance lookback; normally the volatility window.
    pub fn new(config: LeverageConfig, window: usize, periods_per_year: f64) -> Self {
        Self {
            config,
            window,
            periods_per_year,
        }
    }

    pub fn forecast_volatility(
        &self,
        weights: &[f64],
        volatilities: &[f64],
        history: &History<'_>,
    ) -> f64 {
        match self.config.forecast_model {
            ForecastModel::Diagonal => diagonal_forecast(weights, volatilities),
            ForecastModel::Covariance => {
                let held: Vec<usize> = (0..weights.len()).filter(|&i| weights[i] != 0.0).collect();
                if held.is_empty() {
                    return 0.0;
                }
                let rows = history.recent_complete_rows(&held, self.window);
                if rows.len() < 2 {
                    warn!(
                        rows = rows.len(),
                        "not enough complete rows for covariance forecast, using diagonal"
                    );
                    return diagonal_forecast(weights, volatilities);
                }
                let w: Vec<f64> = held.iter().map(|&i| weights[i]).collect();
                let cov = sample_covariance(&rows);
                let mut variance = 0.0;
                for (a, wa) in w.iter().enumerate() {
                    for (b, wb) in w.iter().enumerate() {
                        variance += wa * wb * cov[a][b];
                    }
                }
                (variance.max(0.0) * self.periods_per_year).sqrt()
            }
        }
    }

    pub fn leverage_for(&self, forecast_vol: f64) -> f64 {
        let c = &self.config;
        if !c.enabled {
            return 1.0_f64.clamp(c.min_leverage, c.max_leverage);
        }
        if forecast_vol <= 0.0 {
            return 0.0;
        }
        let mut forecast = forecast_vol;
        if c.forecast_floor > 0.0 {
            forecast = forecast.max(c.forecast_floor);
        }
        if let Some(cap) = c.forecast_cap {
            forecast = forecast.min(cap);
        }
        (c.target_vol / forecast).clamp(c.min_leverage, c.max_leverage)
    }

    pub fn scale(
        &self,
        composed: &[f64],
        volatilities: &[f64],
        history: &History<'_>,
    ) -> ScaledTarget {
        let forecast_vol = self.forecast_volatility(composed, volatilities, history);
        let leverage = self.leverage_for(forecast_vol);
        let mut weights: Vec<f64> = composed.iter().map(|w| w * leverage).collect();

        let mut clipped = false;
        if let Some(cap) = self.config.gross_cap {
            let gross = gross_exposure(&weights);
            if gross > cap && gross > 0.0 {
                let factor = cap / gross;
                warn!(gross, cap, "gross exposure cap clipped target");
                weights.iter_mut().for_each(|w| *w *= factor);
                clipped = true;
            }
        }

        ScaledTarget {
            weights,
            leverage,
            forecast_vol,
            clipped,
        }
    }
}

fn diagonal_forecast(weights: &[f64], volatilities: &[f64]) -> f64 {
    weights
        .iter()
        .zip(volatilities)
        .map(|(w, s)| (w * s).powi(2))
        .sum::<f64>()
        .sqrt()
}

/// Sample covariance (n - 1) of equal-length rows. Needs at least two rows.
fn sample_covariance(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len();
    let k = rows.first().map_or(0, Vec::len);
    let means: Vec<f64> = (0..k)
        .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n as f64)
        .collect();
    let mut cov = vec![vec![0.0; k]; k];
    for row in rows {
        for a in 0..k {
            for b in a..k {
                cov[a][b] += (row[a] - means[a]) * (row[b] - means[b]);
            }
        }
    }
    for a in 0..k {
        for b in a..k {
            cov[a][b] /= (n - 1) as f64;
            cov[b][a] = cov[a][b];
        }
    }
    cov
}
