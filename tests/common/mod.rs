#![allow(dead_code)]

use chrono::NaiveDate;
use rpsim::domain::backtest::BacktestConfig;
use rpsim::domain::error::RpsimError;
use rpsim::domain::leverage::LeverageConfig;
use rpsim::domain::panel::ReturnPanel;
use rpsim::domain::period::Cadence;
use rpsim::domain::rebalance::RebalancePolicy;
use rpsim::domain::signal::{SignalConfig, SuppliedSignals};
use rpsim::ports::data_port::DataPort;

pub struct MockDataPort {
    pub panel: Option<ReturnPanel>,
    pub error: Option<String>,
}

impl MockDataPort {
    pub fn new(panel: ReturnPanel) -> Self {
        Self {
            panel: Some(panel),
            error: None,
        }
    }

    pub fn failing(reason: &str) -> Self {
        Self {
            panel: None,
            error: Some(reason.to_string()),
        }
    }
}

impl DataPort for MockDataPort {
    fn load_panel(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<ReturnPanel, RpsimError> {
        if let Some(reason) = &self.error {
            return Err(RpsimError::DataFormat {
                reason: reason.clone(),
            });
        }
        let panel = self.panel.as_ref().ok_or_else(|| RpsimError::NoData {
            asset: "all".to_string(),
        })?;
        Ok(panel.between(start_date, end_date))
    }

    fn list_assets(&self) -> Result<Vec<String>, RpsimError> {
        Ok(self
            .panel
            .as_ref()
            .map(|p| p.assets().to_vec())
            .unwrap_or_default())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Consecutive days from 2024-01-01.
pub fn daily_dates(n: usize) -> Vec<NaiveDate> {
    let start = date(2024, 1, 1);
    (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
}

/// Panel with assets named by `names`, one column per asset, on daily dates.
pub fn make_panel(names: &[&str], columns: Vec<Vec<Option<f64>>>) -> ReturnPanel {
    let n = columns.first().map_or(0, Vec::len);
    ReturnPanel::new(
        names.iter().map(|s| s.to_string()).collect(),
        daily_dates(n),
        columns,
    )
    .unwrap()
}

pub fn complete(values: &[f64]) -> Vec<Option<f64>> {
    values.iter().copied().map(Some).collect()
}

/// Deterministic, non-constant return stream.
pub fn generate_returns(count: usize, seed: u64, scale: f64) -> Vec<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    (0..count)
        .map(|_| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let unit = (state >> 11) as f64 / (1u64 << 53) as f64;
            (unit - 0.5) * 2.0 * scale
        })
        .collect()
}

/// Constant signals for every period.
pub fn constant_signals(rows: usize, vols: &[f64], trend: &[bool]) -> SuppliedSignals {
    SuppliedSignals::new(
        vec![vols.iter().copied().map(Some).collect::<Vec<_>>(); rows],
        vec![trend.to_vec(); rows],
    )
    .unwrap()
}

/// No leverage scaling, trade every period.
pub fn unlevered_config() -> BacktestConfig {
    BacktestConfig {
        signal: SignalConfig {
            vol_window: 3,
            ..Default::default()
        },
        leverage: LeverageConfig {
            enabled: false,
            ..Default::default()
        },
        rebalance: RebalancePolicy::Calendar {
            cadence: Cadence::Every,
            deadband: 0.0,
        },
        ..Default::default()
    }
}

/// `ExitCode` has no `PartialEq`; compare through its debug form.
pub fn assert_exit_code(actual: std::process::ExitCode, expected: u8) {
    assert_eq!(
        format!("{actual:?}"),
        format!("{:?}", std::process::ExitCode::from(expected))
    );
}
