//! Parameter sweeps over one shared return panel.
//!
//! Every configuration gets its own engine and ledger; the panel is
//! borrowed immutably by all runs, so they execute in parallel with rayon.

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use super::backtest::{BacktestConfig, BacktestEngine};
use super::error::RpsimError;
use super::metrics::Metrics;
use super::panel::ReturnPanel;

#[derive(Debug, Clone, PartialEq)]
pub struct SweepGrid {
    pub vol_windows: Vec<usize>,
    pub target_vols: Vec<f64>,
    pub max_leverages: Vec<f64>,
}

impl SweepGrid {
    pub fn size(&self) -> usize {
        self.vol_windows.len() * self.target_vols.len() * self.max_leverages.len()
    }

    /// One config per grid point, in window-major order.
    pub fn generate_configs(&self, base: &BacktestConfig) -> Vec<BacktestConfig> {
        let mut configs = Vec::with_capacity(self.size());
        for &window in &self.vol_windows {
            for &target in &self.target_vols {
                for &cap in &self.max_leverages {
                    let mut config = base.clone();
                    config.signal.vol_window = window;
                    config.leverage.target_vol = target;
                    config.leverage.max_leverage = cap;
                    configs.push(config);
                }
            }
        }
        configs
    }
}

/// Summary of one sweep run. Failed runs keep their parameters and carry
/// the error text; their metric columns are empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepRow {
    pub vol_window: usize,
    pub target_vol: f64,
    pub max_leverage: f64,
    pub status: String,
    pub total_return: Option<f64>,
    pub cagr: Option<f64>,
    pub volatility: Option<f64>,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub avg_gross_exposure: Option<f64>,
    pub avg_turnover: Option<f64>,
    pub error: String,
}

impl SweepRow {
    fn ok(config: &BacktestConfig, metrics: &Metrics) -> Self {
        SweepRow {
            vol_window: config.signal.vol_window,
            target_vol: config.leverage.target_vol,
            max_leverage: config.leverage.max_leverage,
            status: "ok".to_string(),
            total_return: Some(metrics.total_return),
            cagr: Some(metrics.cagr),
            volatility: Some(metrics.volatility),
            sharpe_ratio: Some(metrics.sharpe_ratio),
            max_drawdown: Some(metrics.max_drawdown),
            avg_gross_exposure: Some(metrics.avg_gross_exposure),
            avg_turnover: Some(metrics.avg_turnover),
            error: String::new(),
        }
    }

    fn failed(config: &BacktestConfig, error: String) -> Self {
        SweepRow {
            vol_window: config.signal.vol_window,
            target_vol: config.leverage.target_vol,
            max_leverage: config.leverage.max_leverage,
            status: "failed".to_string(),
            total_return: None,
            cagr: None,
            volatility: None,
            sharpe_ratio: None,
            max_drawdown: None,
            avg_gross_exposure: None,
            avg_turnover: None,
            error,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

pub struct ParamSweep<'a> {
    panel: &'a ReturnPanel,
    parallel: bool,
}

impl<'a> ParamSweep<'a> {
    pub fn new(panel: &'a ReturnPanel) -> Self {
        Self {
            panel,
            parallel: true,
        }
    }

    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Run every grid point. Rows come back in grid order whatever the
    /// execution order.
    pub fn sweep(&self, grid: &SweepGrid, base: &BacktestConfig) -> Vec<SweepRow> {
        let configs = grid.generate_configs(base);
        info!(runs = configs.len(), parallel = self.parallel, "starting sweep");

        let rows: Vec<SweepRow> = if self.parallel {
            configs.par_iter().map(|config| self.run_one(config)).collect()
        } else {
            configs.iter().map(|config| self.run_one(config)).collect()
        };

        let failed = rows.iter().filter(|r| !r.is_ok()).count();
        if failed > 0 {
            warn!(failed, total = rows.len(), "some sweep runs failed");
        }
        rows
    }

    fn run_one(&self, config: &BacktestConfig) -> SweepRow {
        let outcome = BacktestEngine::new(config.clone(), self.panel)
            .map_err(|e: RpsimError| e.to_string())
            .and_then(|engine| engine.run().map_err(|f| f.to_string()));
        match outcome {
            Ok(result) => {
                let metrics = Metrics::compute(
                    &result.ledger,
                    config.periods_per_year,
                    config.costs.risk_free_rate,
                );
                SweepRow::ok(config, &metrics)
            }
            Err(error) => SweepRow::failed(config, error),
        }
    }
}
