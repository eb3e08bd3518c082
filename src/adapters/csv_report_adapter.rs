//! CSV report adapter: per-period ledger, performance summary and sweep table.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RpsimError;
use crate::domain::sweep::SweepRow;
use crate::ports::report_port::{ReportPort, SummaryEntry};
use serde::Serialize;
use std::path::Path;

pub struct CsvReportAdapter;

#[derive(Serialize)]
struct SummaryRow<'a> {
    label: &'a str,
    periods: usize,
    total_return: f64,
    cagr: f64,
    volatility: f64,
    sharpe_ratio: f64,
    sortino_ratio: f64,
    max_drawdown: f64,
    max_drawdown_duration: usize,
    calmar_ratio: f64,
    avg_turnover: f64,
    total_transaction_cost: f64,
    total_financing_cost: f64,
    avg_gross_exposure: f64,
    rebalance_count: usize,
}

impl<'a> From<&SummaryEntry<'a>> for SummaryRow<'a> {
    fn from(entry: &SummaryEntry<'a>) -> Self {
        let m = entry.metrics;
        SummaryRow {
            label: entry.label,
            periods: m.periods,
            total_return: m.total_return,
            cagr: m.cagr,
            volatility: m.volatility,
            sharpe_ratio: m.sharpe_ratio,
            sortino_ratio: m.sortino_ratio,
            max_drawdown: m.max_drawdown,
            max_drawdown_duration: m.max_drawdown_duration,
            calmar_ratio: m.calmar_ratio,
            avg_turnover: m.avg_turnover,
            total_transaction_cost: m.total_transaction_cost,
            total_financing_cost: m.total_financing_cost,
            avg_gross_exposure: m.avg_gross_exposure,
            rebalance_count: m.rebalance_count,
        }
    }
}

const LEDGER_COLUMNS: [&str; 13] = [
    "period",
    "net_return",
    "gross_return",
    "turnover",
    "transaction_cost",
    "financing_cost",
    "gross_exposure",
    "leverage",
    "forecast_vol",
    "rebalanced",
    "clipped",
    "warmup",
    "equity",
];

impl ReportPort for CsvReportAdapter {
    /// One row per period; held weights as `w_<asset>` and targets as
    /// `target_<asset>`.
    fn write_ledger(&self, result: &BacktestResult, path: &Path) -> Result<(), RpsimError> {
        let mut wtr = csv::Writer::from_path(path)?;

        let mut header: Vec<String> = LEDGER_COLUMNS.iter().map(|c| c.to_string()).collect();
        header.extend(result.assets.iter().map(|a| format!("w_{a}")));
        header.extend(result.assets.iter().map(|a| format!("target_{a}")));
        wtr.write_record(&header)?;

        for r in result.records() {
            let mut row = vec![
                r.period.format("%Y-%m-%d").to_string(),
                r.net_return.to_string(),
                r.gross_return.to_string(),
                r.turnover.to_string(),
                r.transaction_cost.to_string(),
                r.financing_cost.to_string(),
                r.gross_exposure.to_string(),
                r.leverage.to_string(),
                r.forecast_vol.to_string(),
                r.rebalanced.to_string(),
                r.clipped.to_string(),
                r.warmup.to_string(),
                r.equity.to_string(),
            ];
            row.extend(r.weights.iter().map(f64::to_string));
            row.extend(r.target.iter().map(f64::to_string));
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_summary(&self, entries: &[SummaryEntry<'_>], path: &Path) -> Result<(), RpsimError> {
        let mut wtr = csv::Writer::from_path(path)?;
        for entry in entries {
            wtr.serialize(SummaryRow::from(entry))?;
        }
        wtr.flush()?;
        Ok(())
    }

    fn write_sweep(&self, rows: &[SweepRow], path: &Path) -> Result<(), RpsimError> {
        let mut wtr = csv::Writer::from_path(path)?;
        for row in rows {
            wtr.serialize(row)?;
        }
        wtr.flush()?;
        Ok(())
    }
}
