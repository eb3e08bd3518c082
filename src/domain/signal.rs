//! Signal generation: inverse-volatility base weights and trend flags.
//!
//! Everything here is computed from a [`History`], which ends at t-1. The
//! signal emitted for period t is therefore physically the value computed
//! from data through t-1.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::error::RpsimError;
use super::panel::History;
use super::volatility::VolatilityEstimator;

/// Trailing moving-average condition evaluated on the total-return index
/// rebuilt from an asset's observed returns (base 1.0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendRule {
    PriceAboveMa { window: usize },
    MaCrossover { fast: usize, slow: usize },
}

impl TrendRule {
    /// Price points needed before the rule can hold.
    pub fn required_prices(&self) -> usize {
        match *self {
            TrendRule::PriceAboveMa { window } => window,
            TrendRule::MaCrossover { slow, .. } => slow,
        }
    }

    /// Evaluate against a prior-period return column. False until enough
    /// price points exist.
    pub fn evaluate(&self, prior: &[Option<f64>]) -> bool {
        let prices = total_return_index(prior);
        if prices.len() < self.required_prices() {
            return false;
        }
        match *self {
            TrendRule::PriceAboveMa { window } => {
                let last = prices[prices.len() - 1];
                last > trailing_mean(&prices, window)
            }
            TrendRule::MaCrossover { fast, slow } => {
                trailing_mean(&prices, fast) > trailing_mean(&prices, slow)
            }
        }
    }
}

impl fmt::Display for TrendRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendRule::PriceAboveMa { window } => write!(f, "PRICE_ABOVE_MA({window})"),
            TrendRule::MaCrossover { fast, slow } => write!(f, "MA_CROSSOVER({fast},{slow})"),
        }
    }
}

fn total_return_index(prior: &[Option<f64>]) -> Vec<f64> {
    let mut prices = Vec::with_capacity(prior.len() + 1);
    let mut level = 1.0;
    prices.push(level);
    for r in prior.iter().flatten() {
        level *= 1.0 + r;
        prices.push(level);
    }
    prices
}

fn trailing_mean(prices: &[f64], window: usize) -> f64 {
    let start = prices.len().saturating_sub(window);
    let tail = &prices[start..];
    tail.iter().sum::<f64>() / tail.len() as f64
}

/// What to do when an asset has fewer observations than the volatility window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupPolicy {
    /// No target for the period; the engine holds cash.
    HoldCash,
    /// Estimate from whatever is available, provided at least `min_window`.
    ShorterWindow { min_window: usize },
    /// Abort the run with `InsufficientHistory`.
    Fail,
}

impl FromStr for WarmupPolicy {
    type Err = String;

    /// `shorter_window` needs its minimum set separately; it parses to a
    /// minimum of 2.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hold_cash" | "cash" | "skip" => Ok(WarmupPolicy::HoldCash),
            "shorter_window" => Ok(WarmupPolicy::ShorterWindow { min_window: 2 }),
            "fail" => Ok(WarmupPolicy::Fail),
            other => Err(format!("unknown warmup policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalConfig {
    pub vol_window: usize,
    /// Annualized floor applied to each estimate; 0 disables.
    pub vol_floor: f64,
    pub trend: Option<TrendRule>,
    pub warmup: WarmupPolicy,
}

impl Default for SignalConfig {
    fn default() -> Self {
        SignalConfig {
            vol_window: 60,
            vol_floor: 0.0,
            trend: None,
            warmup: WarmupPolicy::HoldCash,
        }
    }
}

/// Inputs consumable at one period.
#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    /// Last period whose data went into the signal.
    pub as_of: Option<NaiveDate>,
    pub volatilities: Vec<f64>,
    pub trend: Vec<bool>,
}

#[derive(Debug, Clone)]
pub struct SignalGenerator {
    config: SignalConfig,
    estimator: VolatilityEstimator,
}

impl SignalGenerator {
    pub fn new(config: SignalConfig, periods_per_year: f64) -> Self {
        let estimator = VolatilityEstimator::new(config.vol_window, periods_per_year);
        Self { config, estimator }
    }

    /// Signal for the period following `history`. `Ok(None)` means the
    /// warm-up policy chose to hold cash.
    pub fn generate(&self, history: &History<'_>) -> Result<Option<Signal>, RpsimError> {
        let assets = history.assets();
        let mut volatilities = Vec::with_capacity(assets.len());

        for (i, asset) in assets.iter().enumerate() {
            let prior = history.column(i);
            let estimate = match self.estimator.estimate(asset, prior) {
                Ok(v) => v,
                Err(RpsimError::InsufficientHistory {
                    available,
                    required,
                    ..
                }) => match self.config.warmup {
                    WarmupPolicy::HoldCash => {
                        debug!(asset = %asset, available, required, "warm-up, holding cash");
                        return Ok(None);
                    }
                    WarmupPolicy::ShorterWindow { min_window } if available >= min_window => {
                        self.estimator.estimate_with_window(asset, prior, available)?
                    }
                    WarmupPolicy::ShorterWindow { .. } => {
                        debug!(asset = %asset, available, "below minimum window, holding cash");
                        return Ok(None);
                    }
                    WarmupPolicy::Fail => {
                        return Err(RpsimError::InsufficientHistory {
                            asset: asset.clone(),
                            available,
                            required,
                        });
                    }
                },
                Err(e) => return Err(e),
            };
            volatilities.push(if self.config.vol_floor > 0.0 {
                estimate.max(self.config.vol_floor)
            } else {
                estimate
            });
        }

        let trend = match self.config.trend {
            Some(rule) => (0..assets.len())
                .map(|i| rule.evaluate(history.column(i)))
                .collect(),
            None => vec![true; assets.len()],
        };

        Ok(Some(Signal {
            as_of: history.last_date(),
            volatilities,
            trend,
        }))
    }
}

/// `w_i = (1/σ_i) / Σ_j (1/σ_j)`. Sums to 1 for positive estimates.
pub fn inverse_volatility_weights(
    assets: &[String],
    volatilities: &[f64],
) -> Result<Vec<f64>, RpsimError> {
    if let Some(i) = volatilities.iter().position(|v| *v == 0.0) {
        return Err(RpsimError::ZeroVolatility {
            asset: assets.get(i).cloned().unwrap_or_default(),
        });
    }
    let inverse: Vec<f64> = volatilities.iter().map(|v| 1.0 / v).collect();
    let total: f64 = inverse.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return Ok(vec![0.0; volatilities.len()]);
    }
    Ok(inverse.iter().map(|v| v / total).collect())
}

/// Volatility estimates and trend flags produced upstream, already lagged
/// by the producer: row t is what may be used at period t.
#[derive(Debug, Clone, PartialEq)]
pub struct SuppliedSignals {
    volatilities: Vec<Vec<Option<f64>>>,
    trend: Vec<Vec<bool>>,
}

impl SuppliedSignals {
    /// Rows indexed `[t][asset]`. A missing volatility makes that period a
    /// cash period.
    pub fn new(
        volatilities: Vec<Vec<Option<f64>>>,
        trend: Vec<Vec<bool>>,
    ) -> Result<Self, RpsimError> {
        if volatilities.len() != trend.len() {
            return Err(RpsimError::DataFormat {
                reason: format!(
                    "{} volatility rows but {} trend rows",
                    volatilities.len(),
                    trend.len()
                ),
            });
        }
        let width = volatilities.first().map_or(0, Vec::len);
        for (t, (v, f)) in volatilities.iter().zip(&trend).enumerate() {
            if v.len() != width || f.len() != width {
                return Err(RpsimError::DataFormat {
                    reason: format!(
                        "row {t} has {} volatilities and {} flags, expected {width}",
                        v.len(),
                        f.len()
                    ),
                });
            }
            if v.iter().flatten().any(|x| *x < 0.0 || !x.is_finite()) {
                return Err(RpsimError::DataFormat {
                    reason: format!("row {t} has a negative or non-finite volatility"),
                });
            }
        }
        Ok(Self {
            volatilities,
            trend,
        })
    }

    pub fn len(&self) -> usize {
        self.volatilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.volatilities.is_empty()
    }

    pub fn width(&self) -> Option<usize> {
        self.volatilities.first().map(Vec::len)
    }

    pub fn signal_at(&self, t: usize, as_of: Option<NaiveDate>) -> Option<Signal> {
        let volatilities: Option<Vec<f64>> = self.volatilities.get(t)?.iter().copied().collect();
        Some(Signal {
            as_of,
            volatilities: volatilities?,
            trend: self.trend[t].clone(),
        })
    }
}
