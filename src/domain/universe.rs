//! Asset universe: parsing the configured asset list and dropping assets
//! the panel cannot support.

use std::collections::HashSet;
use tracing::warn;

use super::error::RpsimError;
use super::panel::ReturnPanel;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in asset list")]
    EmptyToken,

    #[error("duplicate asset: {0}")]
    DuplicateAsset(String),
}

impl From<UniverseError> for RpsimError {
    fn from(err: UniverseError) -> Self {
        RpsimError::invalid("data", "assets", err.to_string())
    }
}

/// Comma-separated asset names. Names are trimmed but case is kept, since
/// they must match panel column headers exactly.
pub fn parse_assets(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut assets = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        if !seen.insert(trimmed.to_string()) {
            return Err(UniverseError::DuplicateAsset(trimmed.to_string()));
        }
        assets.push(trimmed.to_string());
    }

    Ok(assets)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NotInPanel,
    InsufficientObservations { observations: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAsset {
    pub asset: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone)]
pub struct UniverseValidationResult {
    pub panel: ReturnPanel,
    pub skipped: Vec<SkippedAsset>,
}

/// Restrict `panel` to the requested assets that exist and have at least
/// `min_observations` returns. Skipped assets are logged and reported.
pub fn validate_universe(
    panel: &ReturnPanel,
    requested: &[String],
    min_observations: usize,
) -> Result<UniverseValidationResult, RpsimError> {
    let mut valid = Vec::new();
    let mut skipped = Vec::new();

    for asset in requested {
        let Some(idx) = panel.asset_index(asset) else {
            warn!(asset = %asset, "skipping asset not present in data");
            skipped.push(SkippedAsset {
                asset: asset.clone(),
                reason: SkipReason::NotInPanel,
            });
            continue;
        };
        let observations = panel.observation_count(idx);
        if observations < min_observations {
            warn!(
                asset = %asset,
                observations,
                minimum = min_observations,
                "skipping asset with insufficient observations"
            );
            skipped.push(SkippedAsset {
                asset: asset.clone(),
                reason: SkipReason::InsufficientObservations { observations },
            });
            continue;
        }
        valid.push(asset.clone());
    }

    if valid.is_empty() {
        return Err(RpsimError::NoData {
            asset: "all".to_string(),
        });
    }

    Ok(UniverseValidationResult {
        panel: panel.select(&valid)?,
        skipped,
    })
}
