//! Period grid and calendar cadence buckets.
//!
//! A period is a `NaiveDate`. The grid must be strictly increasing; gaps
//! (non-trading periods) are simply absent.

use chrono::{Datelike, NaiveDate};
use std::fmt;
use std::str::FromStr;

use super::error::RpsimError;

/// Calendar cadence used by the calendar rebalance policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cadence {
    Every,
    Weekly,
    Monthly,
    Quarterly,
    SemiAnnual,
    Annual,
}

impl Cadence {
    fn bucket(self, date: NaiveDate) -> (i32, u32) {
        match self {
            Cadence::Every => (date.year(), date.ordinal()),
            Cadence::Weekly => {
                let week = date.iso_week();
                (week.year(), week.week())
            }
            Cadence::Monthly => (date.year(), date.month()),
            Cadence::Quarterly => (date.year(), (date.month() - 1) / 3),
            Cadence::SemiAnnual => (date.year(), (date.month() - 1) / 6),
            Cadence::Annual => (date.year(), 0),
        }
    }

    /// True when `current` is the first grid period of a new cadence bucket.
    /// The first simulated period always opens a bucket.
    pub fn starts_new_bucket(self, previous: Option<NaiveDate>, current: NaiveDate) -> bool {
        match (self, previous) {
            (_, None) | (Cadence::Every, Some(_)) => true,
            (cadence, Some(prev)) => cadence.bucket(prev) != cadence.bucket(current),
        }
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "every" | "daily" | "1d" => Ok(Cadence::Every),
            "weekly" | "1w" => Ok(Cadence::Weekly),
            "monthly" | "1m" => Ok(Cadence::Monthly),
            "quarterly" | "3m" => Ok(Cadence::Quarterly),
            "semiannual" | "6m" => Ok(Cadence::SemiAnnual),
            "annual" | "12m" => Ok(Cadence::Annual),
            other => Err(format!("unknown cadence '{other}'")),
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Cadence::Every => "every",
            Cadence::Weekly => "weekly",
            Cadence::Monthly => "monthly",
            Cadence::Quarterly => "quarterly",
            Cadence::SemiAnnual => "semiannual",
            Cadence::Annual => "annual",
        };
        write!(f, "{name}")
    }
}

/// Reject grids that are not strictly increasing.
pub fn validate_grid(dates: &[NaiveDate]) -> Result<(), RpsimError> {
    for pair in dates.windows(2) {
        if pair[1] <= pair[0] {
            return Err(RpsimError::invalid(
                "data",
                "dates",
                format!(
                    "period grid must be strictly increasing ({} followed by {})",
                    pair[0], pair[1]
                ),
            ));
        }
    }
    Ok(())
}
