//! Portfolio state, per-period records and the cost ledger.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

/// Σ|w_i|.
pub fn gross_exposure(weights: &[f64]) -> f64 {
    weights.iter().map(|w| w.abs()).sum()
}

/// How held weights are carried from one period into the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DriftPolicy {
    /// Weights float with the market: `w_i (1 + r_i) / (1 + net)`.
    #[default]
    Float,
    /// Float, then rescale back to the pre-drift gross exposure.
    PreserveGross,
}

impl FromStr for DriftPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "float" => Ok(DriftPolicy::Float),
            "preserve_gross" => Ok(DriftPolicy::PreserveGross),
            other => Err(format!("unknown drift policy '{other}'")),
        }
    }
}

impl fmt::Display for DriftPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftPolicy::Float => write!(f, "float"),
            DriftPolicy::PreserveGross => write!(f, "preserve_gross"),
        }
    }
}

/// Everything that happened in one simulated period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRecord {
    pub period: NaiveDate,
    pub net_return: f64,
    /// Σ held × r before costs.
    pub gross_return: f64,
    pub turnover: f64,
    pub transaction_cost: f64,
    pub financing_cost: f64,
    pub gross_exposure: f64,
    pub leverage: f64,
    pub forecast_vol: f64,
    pub rebalanced: bool,
    /// A guardrail (gross cap or loss clip) altered this period.
    pub clipped: bool,
    /// No target was available; the period ran on held weights or cash.
    pub warmup: bool,
    pub target: Vec<f64>,
    /// Held weights after the rebalance decision.
    pub weights: Vec<f64>,
    pub equity: f64,
}

/// The engine's only mutable state: held weights and cumulative equity.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioState {
    weights: Vec<f64>,
    equity: f64,
    last_returns: Option<Vec<f64>>,
    last_net: f64,
}

impl PortfolioState {
    /// All cash, equity 1.0.
    pub fn new(asset_count: usize) -> Self {
        PortfolioState {
            weights: vec![0.0; asset_count],
            equity: 1.0,
            last_returns: None,
            last_net: 0.0,
        }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn equity(&self) -> f64 {
        self.equity
    }

    /// Held weights carried into the next period, moved by the returns
    /// realized in the last one.
    pub fn drifted_weights(&self, policy: DriftPolicy) -> Vec<f64> {
        let Some(returns) = &self.last_returns else {
            return self.weights.clone();
        };
        let denominator = 1.0 + self.last_net;
        if denominator <= 0.0 {
            return vec![0.0; self.weights.len()];
        }
        let mut drifted: Vec<f64> = self
            .weights
            .iter()
            .zip(returns)
            .map(|(w, r)| w * (1.0 + r) / denominator)
            .collect();

        if policy == DriftPolicy::PreserveGross {
            let before = gross_exposure(&self.weights);
            let after = gross_exposure(&drifted);
            if after > 0.0 {
                let factor = before / after;
                drifted.iter_mut().for_each(|w| *w *= factor);
            }
        }
        drifted
    }

    /// Commit one realized period. `returns` uses 0.0 for assets without an
    /// observation; those assets are never held.
    pub fn advance(&mut self, record: &PeriodRecord, returns: Vec<f64>) {
        self.weights = record.weights.clone();
        self.equity = record.equity;
        self.last_net = record.net_return;
        self.last_returns = Some(returns);
    }
}

/// Append-only per-period ledger.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostLedger {
    records: Vec<PeriodRecord>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, record: PeriodRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[PeriodRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&PeriodRecord> {
        self.records.last()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn returns(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.net_return).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn record(weights: Vec<f64>, net: f64, equity: f64) -> PeriodRecord {
        PeriodRecord {
            period: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            net_return: net,
            gross_return: net,
            turnover: 0.0,
            transaction_cost: 0.0,
            financing_cost: 0.0,
            gross_exposure: gross_exposure(&weights),
            leverage: 1.0,
            forecast_vol: 0.0,
            rebalanced: false,
            clipped: false,
            warmup: false,
            target: weights.clone(),
            weights,
            equity,
        }
    }

    #[test]
    fn new_state_is_cash_with_unit_equity() {
        let state = PortfolioState::new(3);
        assert_eq!(state.weights(), &[0.0, 0.0, 0.0]);
        assert!((state.equity() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn no_drift_before_first_period() {
        let state = PortfolioState::new(2);
        assert_eq!(state.drifted_weights(DriftPolicy::PreserveGross), vec![0.0, 0.0]);
    }

    #[test]
    fn float_drift_tracks_relative_performance() {
        let mut state = PortfolioState::new(2);
        // 0.5 * 0.10 + 0.5 * -0.10 = 0
        state.advance(&record(vec![0.5, 0.5], 0.0, 1.0), vec![0.10, -0.10]);
        let drifted = state.drifted_weights(DriftPolicy::Float);
        assert_relative_eq!(drifted[0], 0.55, epsilon = 1e-12);
        assert_relative_eq!(drifted[1], 0.45, epsilon = 1e-12);
    }

    #[test]
    fn float_drift_with_cash_reserve() {
        let mut state = PortfolioState::new(1);
        // half in the asset, half cash; asset up 10%
        state.advance(&record(vec![0.5], 0.05, 1.05), vec![0.10]);
        let drifted = state.drifted_weights(DriftPolicy::Float);
        assert_relative_eq!(drifted[0], 0.55 / 1.05, epsilon = 1e-12);
    }

    #[test]
    fn preserve_gross_rescales_to_pre_drift_exposure() {
        let mut state = PortfolioState::new(2);
        state.advance(&record(vec![1.0, 0.5], 0.10, 1.10), vec![0.20, -0.20]);
        let drifted = state.drifted_weights(DriftPolicy::PreserveGross);
        assert_relative_eq!(gross_exposure(&drifted), 1.5, epsilon = 1e-12);
        assert_relative_eq!(drifted[0] / drifted[1], 1.2 / 0.4, epsilon = 1e-12);
    }

    #[test]
    fn wiped_out_equity_drifts_to_zero() {
        let mut state = PortfolioState::new(1);
        state.advance(&record(vec![2.0], -1.0, 0.0), vec![-0.5]);
        assert_eq!(state.drifted_weights(DriftPolicy::Float), vec![0.0]);
    }

    #[test]
    fn ledger_appends_in_order() {
        let mut ledger = CostLedger::new();
        assert!(ledger.is_empty());
        ledger.append(record(vec![1.0], 0.01, 1.01));
        ledger.append(record(vec![1.0], -0.02, 1.01 * 0.98));
        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.returns(), vec![0.01, -0.02]);
        assert_relative_eq!(ledger.last().unwrap().equity, 0.9898, epsilon = 1e-12);
    }

    #[test]
    fn parse_drift_policy() {
        assert_eq!("preserve_gross".parse::<DriftPolicy>().unwrap(), DriftPolicy::PreserveGross);
        assert_eq!(DriftPolicy::default(), DriftPolicy::Float);
        assert!("renormalize".parse::<DriftPolicy>().is_err());
    }
}
