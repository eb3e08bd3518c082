//! Core domain types and simulation logic.

pub mod error;
pub mod period;
pub mod panel;
pub mod volatility;
pub mod signal;
pub mod composer;
pub mod leverage;
pub mod rebalance;
pub mod cost;
pub mod portfolio;
pub mod backtest;
pub mod metrics;
pub mod benchmark;
pub mod universe;
pub mod sweep;
pub mod config_validation;
