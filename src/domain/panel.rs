//! Aligned per-asset return panel and the causal `History` view.
//!
//! The panel is immutable once built. Signal code never sees the panel
//! itself: it receives a [`History`] holding only the periods strictly before
//! the one being simulated.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::error::RpsimError;
use super::period::validate_grid;

/// One asset's realized returns keyed by period. Gaps are absent keys.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSeries {
    pub asset: String,
    pub returns: BTreeMap<NaiveDate, f64>,
}

impl AssetSeries {
    pub fn new(asset: impl Into<String>, points: impl IntoIterator<Item = (NaiveDate, f64)>) -> Self {
        Self {
            asset: asset.into(),
            returns: points.into_iter().collect(),
        }
    }

    pub fn observation_count(&self) -> usize {
        self.returns.len()
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.returns.get(&date).copied()
    }
}

/// Union of all series dates, sorted.
pub fn build_unified_timeline(series: &[AssetSeries]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = series
        .iter()
        .flat_map(|s| s.returns.keys().copied())
        .collect();
    unique_dates.into_iter().collect()
}

/// Returns for a fixed asset universe on a fixed period grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnPanel {
    assets: Vec<String>,
    dates: Vec<NaiveDate>,
    /// `columns[asset][t]`
    columns: Vec<Vec<Option<f64>>>,
}

impl ReturnPanel {
    pub fn new(
        assets: Vec<String>,
        dates: Vec<NaiveDate>,
        columns: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, RpsimError> {
        validate_grid(&dates)?;
        if columns.len() != assets.len() {
            return Err(RpsimError::DataFormat {
                reason: format!(
                    "{} return columns for {} assets",
                    columns.len(),
                    assets.len()
                ),
            });
        }
        for (asset, column) in assets.iter().zip(&columns) {
            if column.len() != dates.len() {
                return Err(RpsimError::DataFormat {
                    reason: format!(
                        "{asset} has {} observations for {} periods",
                        column.len(),
                        dates.len()
                    ),
                });
            }
            if let Some(bad) = column.iter().flatten().find(|r| !r.is_finite()) {
                return Err(RpsimError::DataFormat {
                    reason: format!("{asset} has non-finite return {bad}"),
                });
            }
        }
        let mut seen = BTreeSet::new();
        for asset in &assets {
            if !seen.insert(asset.as_str()) {
                return Err(RpsimError::DataFormat {
                    reason: format!("duplicate asset {asset}"),
                });
            }
        }
        Ok(Self {
            assets,
            dates,
            columns,
        })
    }

    /// Align independently supplied series on their unified timeline.
    /// A date missing from one series becomes a gap for that asset.
    pub fn from_series(series: &[AssetSeries]) -> Result<Self, RpsimError> {
        let dates = build_unified_timeline(series);
        let columns = series
            .iter()
            .map(|s| dates.iter().map(|d| s.get(*d)).collect())
            .collect();
        let assets = series.iter().map(|s| s.asset.clone()).collect();
        Self::new(assets, dates, columns)
    }

    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn asset_index(&self, asset: &str) -> Option<usize> {
        self.assets.iter().position(|a| a == asset)
    }

    pub fn column(&self, asset_idx: usize) -> &[Option<f64>] {
        &self.columns[asset_idx]
    }

    pub fn return_at(&self, asset_idx: usize, t: usize) -> Option<f64> {
        self.columns[asset_idx][t]
    }

    pub fn observation_count(&self, asset_idx: usize) -> usize {
        self.columns[asset_idx].iter().flatten().count()
    }

    /// Everything observed strictly before period index `t`.
    pub fn history_before(&self, t: usize) -> History<'_> {
        let end = t.min(self.dates.len());
        History {
            assets: &self.assets,
            dates: &self.dates[..end],
            columns: self.columns.iter().map(|c| &c[..end]).collect(),
        }
    }

    /// A new panel restricted to `assets`, in the given order.
    pub fn select(&self, assets: &[String]) -> Result<ReturnPanel, RpsimError> {
        let index: HashMap<&str, usize> = self
            .assets
            .iter()
            .enumerate()
            .map(|(i, a)| (a.as_str(), i))
            .collect();
        let mut columns = Vec::with_capacity(assets.len());
        for asset in assets {
            let idx = index.get(asset.as_str()).ok_or_else(|| RpsimError::NoData {
                asset: asset.clone(),
            })?;
            columns.push(self.columns[*idx].clone());
        }
        ReturnPanel::new(assets.to_vec(), self.dates.clone(), columns)
    }

    /// A new panel restricted to periods within `[start, end]`.
    pub fn between(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> ReturnPanel {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e))
            .map(|(i, _)| i)
            .collect();
        ReturnPanel {
            assets: self.assets.clone(),
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| keep.iter().map(|&i| c[i]).collect())
                .collect(),
        }
    }
}

/// Read-only view of the panel ending at the period before the one being
/// simulated. There is no way to reach later periods through it.
#[derive(Debug, Clone)]
pub struct History<'a> {
    assets: &'a [String],
    dates: &'a [NaiveDate],
    columns: Vec<&'a [Option<f64>]>,
}

impl<'a> History<'a> {
    pub fn assets(&self) -> &'a [String] {
        self.assets
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// The most recent period in the view, i.e. t-1.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.dates.last().copied()
    }

    pub fn column(&self, asset_idx: usize) -> &'a [Option<f64>] {
        self.columns[asset_idx]
    }

    /// Most recent `n` rows in which every asset in `assets` is observed,
    /// oldest first. Each row holds the returns of `assets` in order.
    pub fn recent_complete_rows(&self, assets: &[usize], n: usize) -> Vec<Vec<f64>> {
        let mut rows = Vec::with_capacity(n);
        for t in (0..self.dates.len()).rev() {
            if rows.len() == n {
                break;
            }
            let row: Option<Vec<f64>> = assets.iter().map(|&a| self.columns[a][t]).collect();
            if let Some(row) = row {
                rows.push(row);
            }
        }
        rows.reverse();
        rows
    }
}
