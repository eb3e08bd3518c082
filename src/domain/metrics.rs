//! Performance metrics over a realized return series.

use serde::Serialize;

use super::portfolio::CostLedger;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metrics {
    pub periods: usize,
    pub total_return: f64,
    pub cagr: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub max_drawdown: f64,
    pub max_drawdown_duration: usize,
    pub calmar_ratio: f64,
    pub avg_turnover: f64,
    pub total_transaction_cost: f64,
    pub total_financing_cost: f64,
    pub avg_gross_exposure: f64,
    pub rebalance_count: usize,
}

impl Metrics {
    pub fn compute(ledger: &CostLedger, periods_per_year: f64, risk_free_rate: f64) -> Self {
        let mut metrics = Self::from_returns(&ledger.returns(), periods_per_year, risk_free_rate);
        let records = ledger.records();
        if !records.is_empty() {
            let n = records.len() as f64;
            metrics.avg_turnover = records.iter().map(|r| r.turnover).sum::<f64>() / n;
            metrics.avg_gross_exposure = records.iter().map(|r| r.gross_exposure).sum::<f64>() / n;
        }
        metrics.total_transaction_cost = records.iter().map(|r| r.transaction_cost).sum();
        metrics.total_financing_cost = records.iter().map(|r| r.financing_cost).sum();
        metrics.rebalance_count = records.iter().filter(|r| r.rebalanced).count();
        metrics
    }

    /// Return-only metrics; cost and exposure fields are zero.
    pub fn from_returns(returns: &[f64], periods_per_year: f64, risk_free_rate: f64) -> Self {
        let equity = equity_from_returns(returns);
        let final_equity = equity.last().copied().unwrap_or(1.0);
        let total_return = final_equity - 1.0;

        let years = returns.len() as f64 / periods_per_year;
        let cagr = if years > 0.0 && final_equity > 0.0 {
            final_equity.powf(1.0 / years) - 1.0
        } else {
            0.0
        };

        let (max_drawdown, max_drawdown_duration) = compute_drawdown(&equity);
        let (volatility, sharpe_ratio, sortino_ratio) =
            compute_risk_adjusted(returns, periods_per_year, risk_free_rate);
        let calmar_ratio = if max_drawdown > 0.0 {
            cagr / max_drawdown
        } else {
            0.0
        };

        Metrics {
            periods: returns.len(),
            total_return,
            cagr,
            volatility,
            sharpe_ratio,
            sortino_ratio,
            max_drawdown,
            max_drawdown_duration,
            calmar_ratio,
            avg_turnover: 0.0,
            total_transaction_cost: 0.0,
            total_financing_cost: 0.0,
            avg_gross_exposure: 0.0,
            rebalance_count: 0,
        }
    }
}

/// Equity path starting at 1.0, one point longer than `returns`.
pub fn equity_from_returns(returns: &[f64]) -> Vec<f64> {
    let mut equity = Vec::with_capacity(returns.len() + 1);
    let mut level = 1.0;
    equity.push(level);
    for r in returns {
        level *= 1.0 + r;
        equity.push(level);
    }
    equity
}

/// Max drawdown as a fraction of the running peak, and the longest run of
/// periods spent below a peak.
fn compute_drawdown(equity: &[f64]) -> (f64, usize) {
    let Some(&first) = equity.first() else {
        return (0.0, 0);
    };

    let mut peak = first;
    let mut max_dd = 0.0_f64;
    let mut max_duration = 0usize;
    let mut current_duration = 0usize;

    for &value in equity {
        if value >= peak {
            peak = value;
            current_duration = 0;
        } else if peak > 0.0 {
            max_dd = max_dd.max((peak - value) / peak);
            current_duration += 1;
            max_duration = max_duration.max(current_duration);
        }
    }

    (max_dd, max_duration)
}

/// Annualized volatility, Sharpe and Sortino.
fn compute_risk_adjusted(returns: &[f64], periods_per_year: f64, risk_free_rate: f64) -> (f64, f64, f64) {
    if returns.len() < 2 {
        return (0.0, 0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let volatility = variance.sqrt() * periods_per_year.sqrt();

    let excess = mean * periods_per_year - risk_free_rate;
    let sharpe = if volatility > 0.0 {
        excess / volatility
    } else {
        0.0
    };

    let downside_variance = returns.iter().map(|r| r.min(0.0).powi(2)).sum::<f64>() / n;
    let downside = downside_variance.sqrt() * periods_per_year.sqrt();
    let sortino = if downside > 0.0 { excess / downside } else { 0.0 };

    (volatility, sharpe, sortino)
}
