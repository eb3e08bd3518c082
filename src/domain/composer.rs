//! Weight composition with the non-renormalizing cash-reserve policy.

/// Zero the base weight of every asset whose trend flag is false. Released
/// capital stays in cash; nothing is redistributed.
pub fn compose_weights(base: &[f64], trend: &[bool]) -> Vec<f64> {
    base.iter()
        .zip(trend)
        .map(|(w, keep)| if *keep { w.max(0.0) } else { 0.0 })
        .collect()
}

/// Fraction of capital left in cash by the composed weights.
pub fn cash_reserve(composed: &[f64]) -> f64 {
    (1.0 - composed.iter().sum::<f64>()).max(0.0)
}
