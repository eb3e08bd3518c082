//! Domain error types.

use chrono::NaiveDate;

/// Top-level error type for rpsim.
#[derive(Debug, thiserror::Error)]
pub enum RpsimError {
    #[error("insufficient history for {asset}: have {available} observations, need {required}")]
    InsufficientHistory {
        asset: String,
        available: usize,
        required: usize,
    },

    #[error("zero volatility estimate for {asset}")]
    ZeroVolatility { asset: String },

    #[error("missing return for held asset {asset} on {period}")]
    DataGap { asset: String, period: NaiveDate },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("no data for {asset}")]
    NoData { asset: String },

    #[error("data format error: {reason}")]
    DataFormat { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RpsimError {
    pub(crate) fn invalid(section: &str, key: &str, reason: impl Into<String>) -> Self {
        RpsimError::ConfigInvalid {
            section: section.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(section: &str, key: &str) -> Self {
        RpsimError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }
    }

    /// True for the configuration family, which is always raised before a run starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RpsimError::ConfigParse { .. }
                | RpsimError::ConfigMissing { .. }
                | RpsimError::ConfigInvalid { .. }
        )
    }
}

impl From<csv::Error> for RpsimError {
    fn from(err: csv::Error) -> Self {
        let reason = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(io) => RpsimError::Io(io),
            _ => RpsimError::DataFormat { reason },
        }
    }
}

impl From<&RpsimError> for std::process::ExitCode {
    fn from(err: &RpsimError) -> Self {
        let code: u8 = match err {
            RpsimError::Io(_) => 1,
            RpsimError::ConfigParse { .. }
            | RpsimError::ConfigMissing { .. }
            | RpsimError::ConfigInvalid { .. } => 2,
            RpsimError::DataFormat { .. } => 3,
            RpsimError::InsufficientHistory { .. } | RpsimError::ZeroVolatility { .. } => 4,
            RpsimError::DataGap { .. } | RpsimError::NoData { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_gap_message_names_asset_and_period() {
        let err = RpsimError::DataGap {
            asset: "TLT".into(),
            period: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert_eq!(err.to_string(), "missing return for held asset TLT on 2024-03-01");
    }

    #[test]
    fn insufficient_history_message() {
        let err = RpsimError::InsufficientHistory {
            asset: "SPY".into(),
            available: 3,
            required: 20,
        };
        assert_eq!(
            err.to_string(),
            "insufficient history for SPY: have 3 observations, need 20"
        );
    }

    #[test]
    fn configuration_family() {
        assert!(RpsimError::invalid("leverage", "max_leverage", "negative").is_configuration());
        assert!(RpsimError::missing("data", "returns_file").is_configuration());
        assert!(
            !RpsimError::ZeroVolatility {
                asset: "GLD".into()
            }
            .is_configuration()
        );
    }

    #[test]
    fn invalid_helper_fills_fields() {
        let err = RpsimError::invalid("costs", "cost_per_turnover", "must be non-negative");
        assert!(matches!(
            err,
            RpsimError::ConfigInvalid { ref section, ref key, .. }
                if section == "costs" && key == "cost_per_turnover"
        ));
    }
}
