//! Report output port trait.

use crate::domain::backtest::BacktestResult;
use crate::domain::error::RpsimError;
use crate::domain::metrics::Metrics;
use crate::domain::sweep::SweepRow;
use std::path::Path;

/// One labelled line of the performance summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryEntry<'a> {
    pub label: &'a str,
    pub metrics: &'a Metrics,
}

pub trait ReportPort {
    fn write_ledger(&self, result: &BacktestResult, path: &Path) -> Result<(), RpsimError>;

    fn write_summary(&self, entries: &[SummaryEntry<'_>], path: &Path) -> Result<(), RpsimError>;

    fn write_sweep(&self, rows: &[SweepRow], path: &Path) -> Result<(), RpsimError>;
}
