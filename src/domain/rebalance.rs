//! Rebalance trigger policies.
//!
//! The decision is a pure function of the period, the drifted held weights
//! and the targets. It never mutates state.

use chrono::NaiveDate;
use std::fmt;
use std::str::FromStr;

use super::period::Cadence;

/// Tolerance below which two targets are treated as identical.
const SIGNAL_CHANGE_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistanceMetric {
    L1,
    MaxAbs,
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "l1" => Ok(DistanceMetric::L1),
            "max_abs" | "maxabs" | "linf" => Ok(DistanceMetric::MaxAbs),
            other => Err(format!("unknown distance metric '{other}'")),
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistanceMetric::L1 => write!(f, "l1"),
            DistanceMetric::MaxAbs => write!(f, "max_abs"),
        }
    }
}

pub fn distance(metric: DistanceMetric, a: &[f64], b: &[f64]) -> f64 {
    let diffs = a.iter().zip(b).map(|(x, y)| (x - y).abs());
    match metric {
        DistanceMetric::L1 => diffs.sum(),
        DistanceMetric::MaxAbs => diffs.fold(0.0, f64::max),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RebalancePolicy {
    /// Trade on the first period of each cadence bucket, unless every weight
    /// is already within `deadband` of target (0 disables the deadband).
    Calendar { cadence: Cadence, deadband: f64 },
    /// Trade when the drifted weights are strictly further than `tolerance`
    /// from target.
    Drift {
        tolerance: f64,
        metric: DistanceMetric,
    },
    /// Trade whenever the target differs from the last executed one.
    OnSignalChange,
}

impl Default for RebalancePolicy {
    fn default() -> Self {
        RebalancePolicy::Calendar {
            cadence: Cadence::Monthly,
            deadband: 0.0,
        }
    }
}

impl fmt::Display for RebalancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalancePolicy::Calendar { cadence, deadband } if *deadband > 0.0 => {
                write!(f, "calendar({cadence}, deadband {deadband})")
            }
            RebalancePolicy::Calendar { cadence, .. } => write!(f, "calendar({cadence})"),
            RebalancePolicy::Drift { tolerance, metric } => {
                write!(f, "drift({metric} > {tolerance})")
            }
            RebalancePolicy::OnSignalChange => write!(f, "signal_change"),
        }
    }
}

/// Everything the trigger may look at for one period.
#[derive(Debug, Clone, Copy)]
pub struct TriggerContext<'a> {
    pub previous_period: Option<NaiveDate>,
    pub period: NaiveDate,
    /// Held weights after drift, before any trade.
    pub held: &'a [f64],
    pub target: &'a [f64],
    pub last_executed_target: Option<&'a [f64]>,
}

pub fn should_rebalance(policy: &RebalancePolicy, ctx: &TriggerContext<'_>) -> bool {
    match *policy {
        RebalancePolicy::Calendar { cadence, deadband } => {
            cadence.starts_new_bucket(ctx.previous_period, ctx.period)
                && (deadband <= 0.0
                    || distance(DistanceMetric::MaxAbs, ctx.held, ctx.target) > deadband)
        }
        RebalancePolicy::Drift { tolerance, metric } => {
            distance(metric, ctx.held, ctx.target) > tolerance
        }
        RebalancePolicy::OnSignalChange => match ctx.last_executed_target {
            None => true,
            Some(last) => distance(DistanceMetric::MaxAbs, last, ctx.target) > SIGNAL_CHANGE_EPSILON,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn ctx<'a>(
        previous: Option<NaiveDate>,
        period: NaiveDate,
        held: &'a [f64],
        target: &'a [f64],
    ) -> TriggerContext<'a> {
        TriggerContext {
            previous_period: previous,
            period,
            held,
            target,
            last_executed_target: None,
        }
    }

    #[test]
    fn distance_metrics() {
        let a = [0.5, 0.3, 0.2];
        let b = [0.4, 0.4, 0.2];
        assert!((distance(DistanceMetric::L1, &a, &b) - 0.2).abs() < 1e-12);
        assert!((distance(DistanceMetric::MaxAbs, &a, &b) - 0.1).abs() < 1e-12);
    }

    #[test]
    fn drift_within_tolerance_holds() {
        let policy = RebalancePolicy::Drift {
            tolerance: 0.10,
            metric: DistanceMetric::L1,
        };
        let c = ctx(Some(d(1, 2)), d(1, 3), &[0.55], &[0.50]);
        assert!(!should_rebalance(&policy, &c));
    }

    #[test]
    fn drift_beyond_tolerance_trades() {
        let policy = RebalancePolicy::Drift {
            tolerance: 0.10,
            metric: DistanceMetric::MaxAbs,
        };
        let c = ctx(Some(d(1, 2)), d(1, 3), &[0.65, 0.35], &[0.50, 0.50]);
        assert!(should_rebalance(&policy, &c));
    }

    #[test]
    fn drift_exactly_at_tolerance_holds() {
        let policy = RebalancePolicy::Drift {
            tolerance: 0.25,
            metric: DistanceMetric::L1,
        };
        let c = ctx(Some(d(1, 2)), d(1, 3), &[0.75], &[0.5]);
        assert!(!should_rebalance(&policy, &c));
    }

    #[test]
    fn calendar_trades_on_new_month_only() {
        let policy = RebalancePolicy::Calendar {
            cadence: Cadence::Monthly,
            deadband: 0.0,
        };
        let held = [0.4, 0.6];
        let target = [0.5, 0.5];
        assert!(should_rebalance(&policy, &ctx(None, d(1, 15), &held, &target)));
        assert!(!should_rebalance(&policy, &ctx(Some(d(1, 15)), d(1, 16), &held, &target)));
        assert!(should_rebalance(&policy, &ctx(Some(d(1, 31)), d(2, 1), &held, &target)));
    }

    #[test]
    fn calendar_deadband_skips_small_moves() {
        let policy = RebalancePolicy::Calendar {
            cadence: Cadence::Monthly,
            deadband: 0.05,
        };
        let c = ctx(Some(d(1, 31)), d(2, 1), &[0.52, 0.48], &[0.5, 0.5]);
        assert!(!should_rebalance(&policy, &c));
        let c = ctx(Some(d(1, 31)), d(2, 1), &[0.6, 0.4], &[0.5, 0.5]);
        assert!(should_rebalance(&policy, &c));
    }

    #[test]
    fn signal_change_policy() {
        let policy = RebalancePolicy::OnSignalChange;
        let target = [0.5, 0.5];
        let mut c = ctx(Some(d(1, 1)), d(1, 2), &[0.6, 0.4], &target);
        assert!(should_rebalance(&policy, &c));
        let same = [0.5, 0.5];
        c.last_executed_target = Some(&same);
        assert!(!should_rebalance(&policy, &c));
        let changed = [0.7, 0.3];
        c.last_executed_target = Some(&changed);
        assert!(should_rebalance(&policy, &c));
    }

    #[test]
    fn parse_metric() {
        assert_eq!("L1".parse::<DistanceMetric>().unwrap(), DistanceMetric::L1);
        assert_eq!("max_abs".parse::<DistanceMetric>().unwrap(), DistanceMetric::MaxAbs);
        assert!("l2".parse::<DistanceMetric>().is_err());
    }
}
