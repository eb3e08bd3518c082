//! Fixed-weight benchmark, rebalanced every period without frictions.

use super::error::RpsimError;
use super::panel::ReturnPanel;

/// Parse `"SPY:0.6,IEF:0.4"` into `(asset, weight)` pairs.
pub fn parse_benchmark(input: &str) -> Result<Vec<(String, f64)>, RpsimError> {
    let mut weights: Vec<(String, f64)> = Vec::new();
    for token in input.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let (asset, weight) = token.split_once(':').ok_or_else(|| {
            RpsimError::invalid("benchmark", "weights", format!("expected ASSET:WEIGHT, got '{token}'"))
        })?;
        let asset = asset.trim();
        if asset.is_empty() {
            return Err(RpsimError::invalid("benchmark", "weights", "empty asset name"));
        }
        let weight: f64 = weight.trim().parse().map_err(|_| {
            RpsimError::invalid("benchmark", "weights", format!("invalid weight in '{token}'"))
        })?;
        if !weight.is_finite() {
            return Err(RpsimError::invalid("benchmark", "weights", format!("invalid weight in '{token}'")));
        }
        if weights.iter().any(|(a, _)| a == asset) {
            return Err(RpsimError::invalid("benchmark", "weights", format!("duplicate asset {asset}")));
        }
        weights.push((asset.to_string(), weight));
    }
    if weights.is_empty() {
        return Err(RpsimError::invalid("benchmark", "weights", "no benchmark weights"));
    }
    Ok(weights)
}

/// Per-period benchmark returns `Σ w_i r_i`, starting at the first period
/// where every constituent is observed. A later gap in any constituent is a
/// `DataGap`.
pub fn benchmark_returns(
    panel: &ReturnPanel,
    weights: &[(String, f64)],
) -> Result<Vec<f64>, RpsimError> {
    let mut indexed = Vec::with_capacity(weights.len());
    for (asset, w) in weights {
        let idx = panel
            .asset_index(asset)
            .ok_or_else(|| RpsimError::NoData { asset: asset.clone() })?;
        indexed.push((idx, *w));
    }

    let observed = |t: usize| indexed.iter().all(|&(idx, _)| panel.return_at(idx, t).is_some());
    let Some(start) = (0..panel.len()).find(|&t| observed(t)) else {
        return match panel.len().checked_sub(1) {
            None => Ok(Vec::new()),
            Some(last) => {
                let missing = indexed
                    .iter()
                    .find(|&&(idx, _)| panel.return_at(idx, last).is_none())
                    .map_or(0, |&(idx, _)| idx);
                Err(RpsimError::NoData {
                    asset: panel.assets()[missing].clone(),
                })
            }
        };
    };

    let mut returns = Vec::with_capacity(panel.len() - start);
    for (t, period) in panel.dates().iter().enumerate().skip(start) {
        let mut r = 0.0;
        for &(idx, w) in &indexed {
            let asset_return = panel.return_at(idx, t).ok_or_else(|| RpsimError::DataGap {
                asset: panel.assets()[idx].clone(),
                period: *period,
            })?;
            r += w * asset_return;
        }
        returns.push(r);
    }
    Ok(returns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn sample_panel() -> ReturnPanel {
        ReturnPanel::new(
            vec!["SPY".into(), "IEF".into()],
            vec![d(1), d(2)],
            vec![vec![Some(0.01), Some(-0.02)], vec![Some(0.005), Some(0.01)]],
        )
        .unwrap()
    }

    #[test]
    fn parse_sixty_forty() {
        let w = parse_benchmark("SPY:0.6, IEF:0.4").unwrap();
        assert_eq!(w, vec![("SPY".to_string(), 0.6), ("IEF".to_string(), 0.4)]);
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_benchmark("SPY").is_err());
        assert!(parse_benchmark("SPY:abc").is_err());
        assert!(parse_benchmark(":0.5").is_err());
        assert!(parse_benchmark("SPY:0.5,SPY:0.5").is_err());
        assert!(parse_benchmark(" , ").is_err());
    }

    #[test]
    fn weighted_returns() {
        let w = parse_benchmark("SPY:0.6,IEF:0.4").unwrap();
        let r = benchmark_returns(&sample_panel(), &w).unwrap();
        assert_relative_eq!(r[0], 0.6 * 0.01 + 0.4 * 0.005, epsilon = 1e-12);
        assert_relative_eq!(r[1], 0.6 * -0.02 + 0.4 * 0.01, epsilon = 1e-12);
    }

    #[test]
    fn unknown_asset_is_no_data() {
        let w = vec![("GLD".to_string(), 1.0)];
        assert!(matches!(
            benchmark_returns(&sample_panel(), &w),
            Err(RpsimError::NoData { .. })
        ));
    }

    #[test]
    fn gap_is_reported() {
        let panel = ReturnPanel::new(
            vec!["SPY".into()],
            vec![d(1), d(2)],
            vec![vec![Some(0.01), None]],
        )
        .unwrap();
        let err = benchmark_returns(&panel, &[("SPY".to_string(), 1.0)]).unwrap_err();
        assert!(matches!(err, RpsimError::DataGap { period, .. } if period == d(2)));
    }

    #[test]
    fn starts_once_every_constituent_is_observed() {
        let panel = ReturnPanel::new(
            vec!["SPY".into(), "GLD".into()],
            vec![d(1), d(2), d(3)],
            vec![
                vec![Some(0.01), Some(0.02), Some(0.03)],
                vec![None, Some(0.04), Some(-0.01)],
            ],
        )
        .unwrap();
        let w = parse_benchmark("SPY:0.5,GLD:0.5").unwrap();
        let r = benchmark_returns(&panel, &w).unwrap();
        assert_eq!(r.len(), 2);
        assert_relative_eq!(r[0], 0.03, epsilon = 1e-12);
        assert_relative_eq!(r[1], 0.01, epsilon = 1e-12);
    }

    #[test]
    fn constituent_never_observed_is_no_data() {
        let panel = ReturnPanel::new(
            vec!["SPY".into(), "GLD".into()],
            vec![d(1), d(2)],
            vec![vec![Some(0.01), Some(0.02)], vec![None, None]],
        )
        .unwrap();
        let w = parse_benchmark("SPY:0.5,GLD:0.5").unwrap();
        let err = benchmark_returns(&panel, &w).unwrap_err();
        assert!(matches!(err, RpsimError::NoData { ref asset } if asset == "GLD"));
    }
}
