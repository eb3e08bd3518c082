//! Configuration validation.
//!
//! Validates every config field before anything is loaded or run. Values
//! that are present but unparsable are reported as invalid rather than
//! silently replaced by their default.

use crate::domain::benchmark::parse_benchmark;
use crate::domain::error::RpsimError;
use crate::domain::universe::parse_assets;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_config(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    validate_data(config)?;
    validate_signal(config)?;
    validate_leverage(config)?;
    validate_rebalance(config)?;
    validate_costs(config)?;
    validate_engine(config)?;
    validate_benchmark(config)?;
    Ok(())
}

pub fn validate_sweep_config(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    validate_config(config)?;
    validate_sweep(config)
}

fn number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<f64>, RpsimError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => Err(RpsimError::invalid(section, key, format!("'{s}' is not a number"))),
        },
    }
}

fn integer(config: &dyn ConfigPort, section: &str, key: &str) -> Result<Option<i64>, RpsimError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| RpsimError::invalid(section, key, format!("'{s}' is not an integer"))),
    }
}

fn choice(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    allowed: &[&str],
) -> Result<Option<String>, RpsimError> {
    match config.get_string(section, key) {
        None => Ok(None),
        Some(s) => {
            let value = s.trim().to_lowercase();
            if allowed.contains(&value.as_str()) {
                Ok(Some(value))
            } else {
                Err(RpsimError::invalid(
                    section,
                    key,
                    format!("'{s}' must be one of {}", allowed.join(", ")),
                ))
            }
        }
    }
}

fn validate_data(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    match config.get_string("data", "returns_file") {
        Some(s) if !s.trim().is_empty() => {}
        _ => return Err(RpsimError::missing("data", "returns_file")),
    }
    choice(config, "data", "kind", &["returns", "prices"])?;
    if let Some(assets) = config.get_string("data", "assets") {
        parse_assets(&assets)?;
    }
    if let Some(ppy) = number(config, "data", "periods_per_year")? {
        if ppy <= 0.0 {
            return Err(RpsimError::invalid("data", "periods_per_year", "must be positive"));
        }
    }
    validate_dates(config)
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    let start = parse_date(config.get_string("data", "start_date").as_deref(), "start_date")?;
    let end = parse_date(config.get_string("data", "end_date").as_deref(), "end_date")?;
    if let (Some(start), Some(end)) = (start, end) {
        if start >= end {
            return Err(RpsimError::invalid(
                "data",
                "start_date",
                "start_date must be before end_date",
            ));
        }
    }
    Ok(())
}

/// Optional `YYYY-MM-DD` date from the `[data]` section.
pub fn parse_date(value: Option<&str>, field: &str) -> Result<Option<NaiveDate>, RpsimError> {
    match value {
        None => Ok(None),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|_| {
                RpsimError::invalid("data", field, format!("invalid {field} format, expected YYYY-MM-DD"))
            }),
    }
}

fn validate_signal(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    let window = integer(config, "signal", "vol_window")?.unwrap_or(60);
    if window < 2 {
        return Err(RpsimError::invalid("signal", "vol_window", "must be at least 2"));
    }
    if let Some(floor) = number(config, "signal", "vol_floor")? {
        if floor < 0.0 {
            return Err(RpsimError::invalid("signal", "vol_floor", "must be non-negative"));
        }
    }

    let rule = choice(config, "signal", "trend_rule", &["none", "price_above_ma", "ma_crossover"])?;
    match rule.as_deref() {
        Some("price_above_ma") => {
            if integer(config, "signal", "trend_window")?.unwrap_or(200) < 1 {
                return Err(RpsimError::invalid("signal", "trend_window", "must be at least 1"));
            }
        }
        Some("ma_crossover") => {
            let fast = integer(config, "signal", "trend_fast")?.unwrap_or(50);
            let slow = integer(config, "signal", "trend_slow")?.unwrap_or(200);
            if fast < 1 || fast >= slow {
                return Err(RpsimError::invalid(
                    "signal",
                    "trend_fast",
                    format!("fast window {fast} must be at least 1 and below slow window {slow}"),
                ));
            }
        }
        _ => {}
    }

    let warmup = choice(config, "signal", "warmup", &["hold_cash", "shorter_window", "fail"])?;
    if warmup.as_deref() == Some("shorter_window") {
        let min = integer(config, "signal", "min_window")?.unwrap_or(2);
        if min < 2 || min > window {
            return Err(RpsimError::invalid(
                "signal",
                "min_window",
                format!("must be between 2 and vol_window ({window})"),
            ));
        }
    }
    Ok(())
}

fn validate_bool(config: &dyn ConfigPort, section: &str, key: &str) -> Result<(), RpsimError> {
    choice(config, section, key, &["true", "false", "yes", "no", "1", "0"]).map(|_| ())
}

fn validate_leverage(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    validate_bool(config, "leverage", "enabled")?;
    if let Some(target) = number(config, "leverage", "target_vol")? {
        if target <= 0.0 {
            return Err(RpsimError::invalid("leverage", "target_vol", "must be positive"));
        }
    }
    let max = number(config, "leverage", "max_leverage")?.unwrap_or(2.0);
    if max < 0.0 {
        return Err(RpsimError::invalid("leverage", "max_leverage", "must be non-negative"));
    }
    let min = number(config, "leverage", "min_leverage")?.unwrap_or(0.0);
    if min < 0.0 || min > max {
        return Err(RpsimError::invalid(
            "leverage",
            "min_leverage",
            "must be between 0 and max_leverage",
        ));
    }
    choice(config, "leverage", "forecast_model", &["diagonal", "covariance"])?;
    let floor = number(config, "leverage", "forecast_floor")?.unwrap_or(0.0);
    if floor < 0.0 {
        return Err(RpsimError::invalid("leverage", "forecast_floor", "must be non-negative"));
    }
    if let Some(cap) = number(config, "leverage", "forecast_cap")? {
        if cap <= 0.0 || cap < floor {
            return Err(RpsimError::invalid(
                "leverage",
                "forecast_cap",
                "must be positive and not below forecast_floor",
            ));
        }
    }
    if let Some(cap) = number(config, "leverage", "gross_cap")? {
        if cap <= 0.0 {
            return Err(RpsimError::invalid("leverage", "gross_cap", "must be positive"));
        }
    }
    Ok(())
}

fn validate_rebalance(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    choice(config, "rebalance", "policy", &["calendar", "drift", "signal_change"])?;
    if let Some(cadence) = config.get_string("rebalance", "cadence") {
        cadence
            .parse::<crate::domain::period::Cadence>()
            .map_err(|e| RpsimError::invalid("rebalance", "cadence", e))?;
    }
    for key in ["deadband", "tolerance"] {
        if let Some(v) = number(config, "rebalance", key)? {
            if v < 0.0 {
                return Err(RpsimError::invalid("rebalance", key, "must be non-negative"));
            }
        }
    }
    choice(config, "rebalance", "metric", &["l1", "max_abs"])?;
    Ok(())
}

fn validate_costs(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    for key in ["cost_per_turnover", "financing_spread"] {
        if let Some(v) = number(config, "costs", key)? {
            if v < 0.0 {
                return Err(RpsimError::invalid("costs", key, "must be non-negative"));
            }
        }
    }
    number(config, "costs", "risk_free_rate")?;
    Ok(())
}

fn validate_engine(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    choice(config, "engine", "drift", &["float", "preserve_gross"])?;
    choice(config, "engine", "initial", &["cash", "first_target"])?;
    if let Some(floor) = number(config, "engine", "max_period_loss")? {
        if floor <= -1.0 || floor > 0.0 {
            return Err(RpsimError::invalid("engine", "max_period_loss", "must be in (-1, 0]"));
        }
    }
    Ok(())
}

fn validate_benchmark(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    if let Some(weights) = config.get_string("benchmark", "weights") {
        parse_benchmark(&weights)?;
    }
    Ok(())
}

fn validate_sweep(config: &dyn ConfigPort) -> Result<(), RpsimError> {
    let windows = config
        .get_list("sweep", "vol_windows")
        .ok_or_else(|| RpsimError::missing("sweep", "vol_windows"))?;
    for w in &windows {
        match w.parse::<usize>() {
            Ok(v) if v >= 2 => {}
            _ => {
                return Err(RpsimError::invalid(
                    "sweep",
                    "vol_windows",
                    format!("'{w}' is not a window of at least 2"),
                ));
            }
        }
    }
    for (key, min_exclusive) in [("target_vols", true), ("max_leverages", false)] {
        let values = config
            .get_list("sweep", key)
            .ok_or_else(|| RpsimError::missing("sweep", key))?;
        for v in &values {
            let parsed = v.parse::<f64>().ok().filter(|x| x.is_finite());
            let ok = match parsed {
                Some(x) if min_exclusive => x > 0.0,
                Some(x) => x >= 0.0,
                None => false,
            };
            if !ok {
                return Err(RpsimError::invalid("sweep", key, format!("'{v}' is out of range")));
            }
        }
    }
    validate_bool(config, "sweep", "parallel")
}
