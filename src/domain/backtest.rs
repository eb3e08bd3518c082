//! Backtest engine: the per-period simulation loop.
//!
//! Each period runs in a fixed order:
//! 1. compute the scaled target from history through t-1,
//! 2. drift held weights by the returns of t-1,
//! 3. decide whether to rebalance, charging turnover cost,
//! 4. charge financing on the post-trade gross exposure,
//! 5. realize the period's returns and compound equity.
//!
//! Nothing is recorded for a period that fails; the failure carries the
//! last completed record and the ledger so far.

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use super::composer::compose_weights;
use super::cost::{CostConfig, financing_cost, transaction_cost, turnover};
use super::error::RpsimError;
use super::leverage::{LeverageConfig, LeverageScaler, ScaledTarget};
use super::panel::ReturnPanel;
use super::period::validate_grid;
use super::portfolio::{CostLedger, DriftPolicy, PeriodRecord, PortfolioState, gross_exposure};
use super::rebalance::{RebalancePolicy, TriggerContext, should_rebalance};
use super::signal::{
    SignalConfig, SignalGenerator, SuppliedSignals, TrendRule, WarmupPolicy,
    inverse_volatility_weights,
};

/// Holdings before the first simulated period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitialHoldings {
    /// Start in cash; the first trade pays full turnover.
    #[default]
    Cash,
    /// Start at the first available target without charging turnover.
    FirstTarget,
}

impl std::str::FromStr for InitialHoldings {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cash" => Ok(InitialHoldings::Cash),
            "first_target" => Ok(InitialHoldings::FirstTarget),
            other => Err(format!("unknown initial holdings '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub signal: SignalConfig,
    pub leverage: LeverageConfig,
    pub rebalance: RebalancePolicy,
    pub costs: CostConfig,
    pub drift: DriftPolicy,
    pub initial: InitialHoldings,
    /// Floor on a single period's net return, e.g. -0.95.
    pub max_period_loss: Option<f64>,
    pub periods_per_year: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            signal: SignalConfig::default(),
            leverage: LeverageConfig::default(),
            rebalance: RebalancePolicy::default(),
            costs: CostConfig::default(),
            drift: DriftPolicy::Float,
            initial: InitialHoldings::Cash,
            max_period_loss: None,
            periods_per_year: 252.0,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<(), RpsimError> {
        if !(self.periods_per_year > 0.0 && self.periods_per_year.is_finite()) {
            return Err(RpsimError::invalid("data", "periods_per_year", "must be positive"));
        }

        let s = &self.signal;
        if s.vol_window < 2 {
            return Err(RpsimError::invalid("signal", "vol_window", "must be at least 2"));
        }
        if !(s.vol_floor >= 0.0) {
            return Err(RpsimError::invalid("signal", "vol_floor", "must be non-negative"));
        }
        match s.trend {
            Some(TrendRule::PriceAboveMa { window }) if window < 1 => {
                return Err(RpsimError::invalid("signal", "trend_window", "must be at least 1"));
            }
            Some(TrendRule::MaCrossover { fast, slow }) if fast < 1 || fast >= slow => {
                return Err(RpsimError::invalid(
                    "signal",
                    "trend_fast",
                    format!("fast window {fast} must be at least 1 and below slow window {slow}"),
                ));
            }
            _ => {}
        }
        if let WarmupPolicy::ShorterWindow { min_window } = s.warmup {
            if min_window < 2 || min_window > s.vol_window {
                return Err(RpsimError::invalid(
                    "signal",
                    "min_window",
                    format!("must be between 2 and vol_window ({})", s.vol_window),
                ));
            }
        }

        let l = &self.leverage;
        if !(l.max_leverage >= 0.0) {
            return Err(RpsimError::invalid("leverage", "max_leverage", "must be non-negative"));
        }
        if !(l.min_leverage >= 0.0) || l.min_leverage > l.max_leverage {
            return Err(RpsimError::invalid(
                "leverage",
                "min_leverage",
                "must be between 0 and max_leverage",
            ));
        }
        if l.enabled && !(l.target_vol > 0.0) {
            return Err(RpsimError::invalid("leverage", "target_vol", "must be positive"));
        }
        if !(l.forecast_floor >= 0.0) {
            return Err(RpsimError::invalid("leverage", "forecast_floor", "must be non-negative"));
        }
        if let Some(cap) = l.forecast_cap {
            if !(cap > 0.0) || cap < l.forecast_floor {
                return Err(RpsimError::invalid(
                    "leverage",
                    "forecast_cap",
                    "must be positive and not below forecast_floor",
                ));
            }
        }
        if let Some(cap) = l.gross_cap {
            if !(cap > 0.0) {
                return Err(RpsimError::invalid("leverage", "gross_cap", "must be positive"));
            }
        }

        match self.rebalance {
            RebalancePolicy::Calendar { deadband, .. } if !(deadband >= 0.0) => {
                return Err(RpsimError::invalid("rebalance", "deadband", "must be non-negative"));
            }
            RebalancePolicy::Drift { tolerance, .. } if !(tolerance >= 0.0) => {
                return Err(RpsimError::invalid("rebalance", "tolerance", "must be non-negative"));
            }
            _ => {}
        }

        let c = &self.costs;
        if !(c.cost_per_turnover >= 0.0) {
            return Err(RpsimError::invalid("costs", "cost_per_turnover", "must be non-negative"));
        }
        if !c.risk_free_rate.is_finite() {
            return Err(RpsimError::invalid("costs", "risk_free_rate", "must be finite"));
        }
        if !(c.financing_spread >= 0.0) {
            return Err(RpsimError::invalid("costs", "financing_spread", "must be non-negative"));
        }

        if let Some(floor) = self.max_period_loss {
            if !(floor > -1.0 && floor <= 0.0) {
                return Err(RpsimError::invalid(
                    "engine",
                    "max_period_loss",
                    "must be in (-1, 0]",
                ));
            }
        }
        Ok(())
    }
}

/// Where per-period volatilities and trend flags come from.
#[derive(Debug, Clone, PartialEq)]
pub enum SignalSource {
    Derived,
    Supplied(SuppliedSignals),
}

/// A run that stopped at `period`.
#[derive(Debug, thiserror::Error)]
#[error("run aborted at {period}: {source}")]
pub struct RunFailure {
    pub period: NaiveDate,
    #[source]
    pub source: RpsimError,
    pub last_completed: Option<PeriodRecord>,
    pub ledger: CostLedger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub assets: Vec<String>,
    pub ledger: CostLedger,
}

impl BacktestResult {
    pub fn records(&self) -> &[PeriodRecord] {
        self.ledger.records()
    }

    pub fn final_equity(&self) -> f64 {
        self.ledger.last().map_or(1.0, |r| r.equity)
    }
}

pub struct BacktestEngine<'a> {
    config: BacktestConfig,
    panel: &'a ReturnPanel,
    generator: SignalGenerator,
    scaler: LeverageScaler,
    source: SignalSource,
}

impl<'a> BacktestEngine<'a> {
    pub fn new(config: BacktestConfig, panel: &'a ReturnPanel) -> Result<Self, RpsimError> {
        config.validate()?;
        validate_grid(panel.dates())?;
        if panel.asset_count() == 0 {
            return Err(RpsimError::invalid("data", "assets", "asset universe is empty"));
        }
        let generator = SignalGenerator::new(config.signal.clone(), config.periods_per_year);
        let scaler = LeverageScaler::new(
            config.leverage.clone(),
            config.signal.vol_window,
            config.periods_per_year,
        );
        Ok(Self {
            config,
            panel,
            generator,
            scaler,
            source: SignalSource::Derived,
        })
    }

    /// Use upstream signals instead of deriving them from the panel.
    pub fn with_supplied_signals(mut self, signals: SuppliedSignals) -> Result<Self, RpsimError> {
        if signals.len() != self.panel.len() {
            return Err(RpsimError::DataFormat {
                reason: format!(
                    "{} signal rows for {} periods",
                    signals.len(),
                    self.panel.len()
                ),
            });
        }
        if let Some(width) = signals.width() {
            if width != self.panel.asset_count() {
                return Err(RpsimError::DataFormat {
                    reason: format!(
                        "signals cover {width} assets, panel has {}",
                        self.panel.asset_count()
                    ),
                });
            }
        }
        self.source = SignalSource::Supplied(signals);
        Ok(self)
    }

    /// Scaled target for period index `t`, or `None` during warm-up.
    fn target_at(&self, t: usize) -> Result<Option<ScaledTarget>, RpsimError> {
        let history = self.panel.history_before(t);
        let signal = match &self.source {
            SignalSource::Derived => self.generator.generate(&history)?,
            SignalSource::Supplied(signals) => {
                signals.signal_at(t, history.last_date()).map(|mut signal| {
                    let floor = self.config.signal.vol_floor;
                    if floor > 0.0 {
                        signal.volatilities.iter_mut().for_each(|v| *v = v.max(floor));
                    }
                    signal
                })
            }
        };
        let Some(signal) = signal else {
            return Ok(None);
        };
        let n_assets = self.panel.asset_count();
        if signal.volatilities.len() != n_assets || signal.trend.len() != n_assets {
            return Err(RpsimError::DataFormat {
                reason: format!(
                    "signal for period {t} covers {} assets, panel has {n_assets}",
                    signal.volatilities.len()
                ),
            });
        }
        let base = inverse_volatility_weights(self.panel.assets(), &signal.volatilities)?;
        let composed = compose_weights(&base, &signal.trend);
        Ok(Some(self.scaler.scale(&composed, &signal.volatilities, &history)))
    }

    pub fn run(self) -> Result<BacktestResult, RunFailure> {
        let n_assets = self.panel.asset_count();
        let dates = self.panel.dates();
        let period_rate = self.config.costs.period_financing_rate(self.config.periods_per_year);

        info!(
            assets = n_assets,
            periods = dates.len(),
            rebalance = %self.config.rebalance,
            "starting backtest"
        );

        let mut state = PortfolioState::new(n_assets);
        let mut ledger = CostLedger::new();
        let mut last_executed: Option<Vec<f64>> = None;
        let mut seeded = self.config.initial == InitialHoldings::Cash;
        let mut warmup_periods = 0usize;

        for (t, &period) in dates.iter().enumerate() {
            let fail = |source: RpsimError, ledger: CostLedger| RunFailure {
                period,
                source,
                last_completed: ledger.last().cloned(),
                ledger,
            };

            // Step 1: target from data through t-1
            let scaled = match self.target_at(t) {
                Ok(s) => s,
                Err(e) => return Err(fail(e, ledger)),
            };
            let warmup = scaled.is_none();
            if warmup {
                warmup_periods += 1;
            }
            let target = scaled.unwrap_or_else(|| ScaledTarget::cash(n_assets));

            // Step 2: drift
            let drifted = state.drifted_weights(self.config.drift);

            // Step 3: rebalance decision
            let mut held = drifted;
            let mut period_turnover = 0.0;
            let mut rebalanced = false;
            if !seeded && !warmup {
                held = target.weights.clone();
                last_executed = Some(target.weights.clone());
                seeded = true;
                debug!(%period, "seeded holdings at first target");
            } else {
                let ctx = TriggerContext {
                    previous_period: t.checked_sub(1).map(|p| dates[p]),
                    period,
                    held: &held,
                    target: &target.weights,
                    last_executed_target: last_executed.as_deref(),
                };
                if should_rebalance(&self.config.rebalance, &ctx) {
                    period_turnover = turnover(&held, &target.weights);
                    held = target.weights.clone();
                    last_executed = Some(target.weights.clone());
                    rebalanced = true;
                    debug!(%period, turnover = period_turnover, leverage = target.leverage, "rebalanced");
                }
            }
            let tx_cost = transaction_cost(period_turnover, &self.config.costs);

            // Step 4: financing on post-trade exposure
            let gross = gross_exposure(&held);
            let fin_cost = financing_cost(gross, period_rate);

            // Step 5: realize
            let mut returns = Vec::with_capacity(n_assets);
            for (i, w) in held.iter().enumerate() {
                match self.panel.return_at(i, t) {
                    Some(r) => returns.push(r),
                    None if *w != 0.0 => {
                        let gap = RpsimError::DataGap {
                            asset: self.panel.assets()[i].clone(),
                            period,
                        };
                        return Err(fail(gap, ledger));
                    }
                    None => returns.push(0.0),
                }
            }
            let gross_return: f64 = held.iter().zip(&returns).map(|(w, r)| w * r).sum();
            let mut net_return = gross_return - tx_cost - fin_cost;
            let mut clipped = target.clipped;
            if let Some(floor) = self.config.max_period_loss {
                if net_return < floor {
                    warn!(%period, net_return, floor, "period loss clipped");
                    net_return = floor;
                    clipped = true;
                }
            }
            let equity = state.equity() * (1.0 + net_return);

            let record = PeriodRecord {
                period,
                net_return,
                gross_return,
                turnover: period_turnover,
                transaction_cost: tx_cost,
                financing_cost: fin_cost,
                gross_exposure: gross,
                leverage: target.leverage,
                forecast_vol: target.forecast_vol,
                rebalanced,
                clipped,
                warmup,
                target: target.weights,
                weights: held,
                equity,
            };
            state.advance(&record, returns);
            ledger.append(record);
        }

        if warmup_periods > 0 {
            warn!(periods = warmup_periods, "warm-up periods without a target");
        }
        info!(
            periods = ledger.len(),
            final_equity = state.equity(),
            "backtest complete"
        );

        Ok(BacktestResult {
            assets: self.panel.assets().to_vec(),
            ledger,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::period::Cadence;
    use crate::domain::rebalance::DistanceMetric;
    use approx::assert_relative_eq;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect()
    }

    fn panel(columns: Vec<Vec<Option<f64>>>) -> ReturnPanel {
        let n = columns[0].len();
        let assets = (0..columns.len()).map(|i| format!("A{i}")).collect();
        ReturnPanel::new(assets, dates(n), columns).unwrap()
    }

    fn unlevered_every_period() -> BacktestConfig {
        BacktestConfig {
            signal: SignalConfig {
                vol_window: 2,
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

    fn supplied(rows: usize, vols: Vec<f64>, trend: Vec<bool>) -> SuppliedSignals {
        SuppliedSignals::new(
            vec![vols.into_iter().map(Some).collect::<Vec<_>>(); rows],
            vec![trend; rows],
        )
        .unwrap()
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut c = BacktestConfig::default();
        c.signal.vol_window = 1;
        assert!(c.validate().unwrap_err().is_configuration());

        let mut c = BacktestConfig::default();
        c.leverage.max_leverage = -1.0;
        assert!(matches!(
            c.validate(),
            Err(RpsimError::ConfigInvalid { ref key, .. }) if key == "max_leverage"
        ));

        let mut c = BacktestConfig::default();
        c.max_period_loss = Some(-1.5);
        assert!(c.validate().is_err());

        let mut c = BacktestConfig::default();
        c.signal.trend = Some(TrendRule::MaCrossover { fast: 50, slow: 20 });
        assert!(c.validate().is_err());

        assert!(BacktestConfig::default().validate().is_ok());
    }

    #[test]
    fn warmup_periods_hold_cash() {
        let p = panel(vec![vec![Some(0.01), Some(-0.01), Some(0.02), Some(0.01)]]);
        let result = BacktestEngine::new(unlevered_every_period(), &p)
            .unwrap()
            .run()
            .unwrap();
        let records = result.records();
        assert!(records[0].warmup && records[1].warmup);
        assert_eq!(records[0].weights, vec![0.0]);
        assert_eq!(records[1].net_return, 0.0);
        assert!(!records[2].warmup);
        assert_eq!(records[2].weights, vec![1.0]);
        assert_relative_eq!(records[2].net_return, 0.02);
    }

    #[test]
    fn equity_compounds_net_returns() {
        let p = panel(vec![
            vec![Some(0.05), Some(-0.05), Some(0.03)],
            vec![Some(0.02), Some(0.02), Some(-0.01)],
        ]);
        let engine = BacktestEngine::new(unlevered_every_period(), &p)
            .unwrap()
            .with_supplied_signals(supplied(3, vec![0.1, 0.1], vec![true, true]))
            .unwrap();
        let result = engine.run().unwrap();
        let mut equity = 1.0;
        for r in result.records() {
            equity *= 1.0 + r.net_return;
            assert_relative_eq!(r.equity, equity, epsilon = 1e-12);
        }
        assert_relative_eq!(result.final_equity(), equity, epsilon = 1e-12);
    }

    #[test]
    fn transaction_cost_charged_on_turnover() {
        let p = panel(vec![vec![Some(0.0), Some(0.0)]]);
        let mut config = unlevered_every_period();
        config.costs.cost_per_turnover = 0.001;
        let result = BacktestEngine::new(config, &p)
            .unwrap()
            .with_supplied_signals(supplied(2, vec![0.1], vec![true]))
            .unwrap()
            .run()
            .unwrap();
        let first = &result.records()[0];
        assert_relative_eq!(first.turnover, 1.0);
        assert_relative_eq!(first.transaction_cost, 0.001);
        assert_relative_eq!(first.net_return, -0.001);
        // costs shrink equity, so the held weight drifts above target
        let second = &result.records()[1];
        assert!(second.rebalanced);
        assert_relative_eq!(second.turnover, 1.0 / 0.999 - 1.0, epsilon = 1e-12);
    }

    #[test]
    fn first_target_seeds_without_turnover() {
        let p = panel(vec![vec![Some(0.01), Some(0.01)]]);
        let mut config = unlevered_every_period();
        config.initial = InitialHoldings::FirstTarget;
        config.costs.cost_per_turnover = 0.01;
        let result = BacktestEngine::new(config, &p)
            .unwrap()
            .with_supplied_signals(supplied(2, vec![0.1], vec![true]))
            .unwrap()
            .run()
            .unwrap();
        let first = &result.records()[0];
        assert_eq!(first.turnover, 0.0);
        assert_eq!(first.weights, vec![1.0]);
        assert_relative_eq!(first.net_return, 0.01);
    }

    #[test]
    fn financing_charged_on_leverage() {
        let p = panel(vec![vec![Some(0.0), Some(0.0)]]);
        let mut config = unlevered_every_period();
        config.leverage = LeverageConfig {
            enabled: true,
            target_vol: 0.20,
            max_leverage: 2.0,
            ..Default::default()
        };
        config.costs.risk_free_rate = 0.0252;
        config.periods_per_year = 252.0;
        let result = BacktestEngine::new(config, &p)
            .unwrap()
            .with_supplied_signals(supplied(2, vec![0.1], vec![true]))
            .unwrap()
            .run()
            .unwrap();
        let first = &result.records()[0];
        assert_relative_eq!(first.leverage, 2.0);
        assert_relative_eq!(first.gross_exposure, 2.0);
        assert_relative_eq!(first.financing_cost, 0.0001, epsilon = 1e-15);
    }

    #[test]
    fn loss_clip_recorded() {
        let p = panel(vec![vec![Some(-0.6), Some(0.0)]]);
        let mut config = unlevered_every_period();
        config.leverage = LeverageConfig {
            enabled: false,
            max_leverage: 2.0,
            ..Default::default()
        };
        config.max_period_loss = Some(-0.5);
        let result = BacktestEngine::new(config, &p)
            .unwrap()
            .with_supplied_signals(supplied(2, vec![0.1], vec![true]))
            .unwrap()
            .run()
            .unwrap();
        let first = &result.records()[0];
        assert!(first.clipped);
        assert_relative_eq!(first.net_return, -0.5);
        assert_relative_eq!(first.equity, 0.5);
    }

    #[test]
    fn data_gap_on_held_asset_aborts_with_last_record() {
        let p = panel(vec![vec![Some(0.01), Some(0.01), None]]);
        let engine = BacktestEngine::new(unlevered_every_period(), &p)
            .unwrap()
            .with_supplied_signals(supplied(3, vec![0.1], vec![true]))
            .unwrap();
        let failure = engine.run().unwrap_err();
        assert_eq!(failure.period, p.dates()[2]);
        assert!(matches!(failure.source, RpsimError::DataGap { ref asset, .. } if asset == "A0"));
        assert_eq!(failure.ledger.len(), 2);
        assert_eq!(failure.last_completed.unwrap().period, p.dates()[1]);
    }

    #[test]
    fn gap_on_unheld_asset_is_ignored() {
        let p = panel(vec![
            vec![Some(0.01), Some(0.01)],
            vec![Some(0.02), None],
        ]);
        let result = BacktestEngine::new(unlevered_every_period(), &p)
            .unwrap()
            .with_supplied_signals(supplied(2, vec![0.1, 0.1], vec![true, false]))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(result.records().len(), 2);
        assert_relative_eq!(result.records()[1].net_return, 0.005, epsilon = 1e-12);
    }

    #[test]
    fn drift_policy_holds_inside_tolerance() {
        // a 2/9 return on half the book drifts that weight to 0.55
        let p = panel(vec![
            vec![Some(2.0 / 9.0), Some(0.0)],
            vec![Some(0.0), Some(0.0)],
        ]);
        let mut config = unlevered_every_period();
        config.rebalance = RebalancePolicy::Drift {
            tolerance: 0.25,
            metric: DistanceMetric::L1,
        };
        let result = BacktestEngine::new(config, &p)
            .unwrap()
            .with_supplied_signals(supplied(2, vec![0.1, 0.1], vec![true, true]))
            .unwrap()
            .run()
            .unwrap();
        let second = &result.records()[1];
        assert!(!second.rebalanced);
        assert_eq!(second.turnover, 0.0);
        assert_eq!(second.transaction_cost, 0.0);
        assert_relative_eq!(second.weights[0], 0.55, epsilon = 1e-12);
    }

    #[test]
    fn zero_volatility_aborts() {
        let p = panel(vec![vec![Some(0.0)]]);
        let failure = BacktestEngine::new(unlevered_every_period(), &p)
            .unwrap()
            .with_supplied_signals(supplied(1, vec![0.0], vec![true]))
            .unwrap()
            .run()
            .unwrap_err();
        assert!(matches!(failure.source, RpsimError::ZeroVolatility { .. }));
        assert!(failure.last_completed.is_none());
    }

    #[test]
    fn vol_floor_applies_to_supplied_signals() {
        let p = panel(vec![vec![Some(0.01), Some(0.02)]]);
        let mut config = unlevered_every_period();
        config.signal.vol_floor = 0.05;
        let result = BacktestEngine::new(config, &p)
            .unwrap()
            .with_supplied_signals(supplied(2, vec![0.0], vec![true]))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(result.records().len(), 2);
        assert_relative_eq!(result.records()[0].target[0], 1.0);
        assert_relative_eq!(result.records()[1].net_return, 0.02);
    }

    #[test]
    fn supplied_signals_shape_must_match_panel() {
        let p = panel(vec![vec![Some(0.0), Some(0.0)]]);
        let engine = BacktestEngine::new(unlevered_every_period(), &p).unwrap();
        assert!(
            engine
                .with_supplied_signals(supplied(1, vec![0.1], vec![true]))
                .is_err()
        );
    }
}
