//! Trading frictions: turnover, transaction cost and financing drag.
//!
//! Pure functions. Rates are per unit of equity.

/// Cost parameters for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct CostConfig {
    /// Cost charged per unit of turnover (0.0005 = 5 bps).
    pub cost_per_turnover: f64,
    /// Annual risk-free rate paid on borrowed exposure.
    pub risk_free_rate: f64,
    /// Annual spread over the risk-free rate on borrowed exposure.
    pub financing_spread: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        CostConfig {
            cost_per_turnover: 0.0,
            risk_free_rate: 0.0,
            financing_spread: 0.0,
        }
    }
}

impl CostConfig {
    /// Per-period borrowing rate.
    pub fn period_financing_rate(&self, periods_per_year: f64) -> f64 {
        (self.risk_free_rate + self.financing_spread) / periods_per_year
    }
}

/// Turnover = Σ|to_i - from_i|.
pub fn turnover(from: &[f64], to: &[f64]) -> f64 {
    from.iter().zip(to).map(|(a, b)| (b - a).abs()).sum()
}

pub fn transaction_cost(turnover: f64, config: &CostConfig) -> f64 {
    turnover * config.cost_per_turnover
}

/// Exposure above 100% of equity is borrowed.
pub fn borrowed_fraction(gross_exposure: f64) -> f64 {
    (gross_exposure - 1.0).max(0.0)
}

/// Financing cost for one period on the given gross exposure.
pub fn financing_cost(gross_exposure: f64, period_rate: f64) -> f64 {
    borrowed_fraction(gross_exposure) * period_rate
}
