//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::str::FromStr;

use crate::adapters::csv_adapter::{CsvAdapter, SeriesKind};
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{BacktestConfig, BacktestEngine, BacktestResult, InitialHoldings};
use crate::domain::benchmark::{benchmark_returns, parse_benchmark};
use crate::domain::config_validation::{parse_date, validate_config, validate_sweep_config};
use crate::domain::cost::CostConfig;
use crate::domain::error::RpsimError;
use crate::domain::leverage::{ForecastModel, LeverageConfig};
use crate::domain::metrics::Metrics;
use crate::domain::panel::ReturnPanel;
use crate::domain::period::Cadence;
use crate::domain::portfolio::DriftPolicy;
use crate::domain::rebalance::{DistanceMetric, RebalancePolicy};
use crate::domain::signal::{SignalConfig, TrendRule, WarmupPolicy};
use crate::domain::sweep::{ParamSweep, SweepGrid};
use crate::domain::universe::{parse_assets, validate_universe};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::{ReportPort, SummaryEntry};

#[derive(Parser, Debug)]
#[command(name = "rpsim", about = "Leveraged risk-parity portfolio simulator")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single simulation
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Per-period ledger CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Performance summary CSV
        #[arg(long)]
        summary: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Run the parameter grid from the [sweep] section
    Sweep {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show the assets and date range of the configured data
    Info {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            output,
            summary,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_simulation(&config, output.as_deref(), summary.as_deref())
            }
        }
        Command::Sweep { config, output } => run_sweep(&config, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config } => run_info(&config),
    }
}

fn fail(err: &RpsimError) -> ExitCode {
    eprintln!("error: {err}");
    ExitCode::from(err)
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = match e {
            RpsimError::Io(io) => RpsimError::ConfigParse {
                file: path.display().to_string(),
                reason: io.to_string(),
            },
            other => other,
        };
        fail(&err)
    })
}

fn get_usize(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, RpsimError> {
    let value = adapter.get_int(section, key, default as i64);
    usize::try_from(value).map_err(|_| RpsimError::invalid(section, key, "must be non-negative"))
}

fn get_optional_f64(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<f64>, RpsimError> {
    adapter
        .get_string(section, key)
        .map(|s| {
            s.parse::<f64>()
                .map_err(|_| RpsimError::invalid(section, key, format!("'{s}' is not a number")))
        })
        .transpose()
}

fn get_parsed<T>(adapter: &dyn ConfigPort, section: &str, key: &str, default: T) -> Result<T, RpsimError>
where
    T: FromStr<Err = String>,
{
    match adapter.get_string(section, key) {
        None => Ok(default),
        Some(s) => s.parse().map_err(|e: String| RpsimError::invalid(section, key, e)),
    }
}

pub fn build_signal_config(adapter: &dyn ConfigPort) -> Result<SignalConfig, RpsimError> {
    let defaults = SignalConfig::default();
    let vol_window = get_usize(adapter, "signal", "vol_window", defaults.vol_window)?;

    let trend = match adapter
        .get_string("signal", "trend_rule")
        .map(|s| s.to_lowercase())
        .as_deref()
    {
        None | Some("none") => None,
        Some("price_above_ma") => Some(TrendRule::PriceAboveMa {
            window: get_usize(adapter, "signal", "trend_window", 200)?,
        }),
        Some("ma_crossover") => Some(TrendRule::MaCrossover {
            fast: get_usize(adapter, "signal", "trend_fast", 50)?,
            slow: get_usize(adapter, "signal", "trend_slow", 200)?,
        }),
        Some(other) => {
            return Err(RpsimError::invalid(
                "signal",
                "trend_rule",
                format!("unknown trend rule '{other}'"),
            ));
        }
    };

    let warmup = match get_parsed(adapter, "signal", "warmup", defaults.warmup)? {
        WarmupPolicy::ShorterWindow { .. } => WarmupPolicy::ShorterWindow {
            min_window: get_usize(adapter, "signal", "min_window", 2)?,
        },
        other => other,
    };

    Ok(SignalConfig {
        vol_window,
        vol_floor: adapter.get_double("signal", "vol_floor", defaults.vol_floor),
        trend,
        warmup,
    })
}

pub fn build_leverage_config(adapter: &dyn ConfigPort) -> Result<LeverageConfig, RpsimError> {
    let d = LeverageConfig::default();
    Ok(LeverageConfig {
        enabled: adapter.get_bool("leverage", "enabled", d.enabled),
        target_vol: adapter.get_double("leverage", "target_vol", d.target_vol),
        max_leverage: adapter.get_double("leverage", "max_leverage", d.max_leverage),
        min_leverage: adapter.get_double("leverage", "min_leverage", d.min_leverage),
        forecast_model: get_parsed::<ForecastModel>(
            adapter,
            "leverage",
            "forecast_model",
            d.forecast_model,
        )?,
        forecast_floor: adapter.get_double("leverage", "forecast_floor", d.forecast_floor),
        forecast_cap: get_optional_f64(adapter, "leverage", "forecast_cap")?,
        gross_cap: get_optional_f64(adapter, "leverage", "gross_cap")?,
    })
}

pub fn build_rebalance_policy(adapter: &dyn ConfigPort) -> Result<RebalancePolicy, RpsimError> {
    let policy = adapter
        .get_string("rebalance", "policy")
        .map(|s| s.to_lowercase())
        .unwrap_or_else(|| "calendar".to_string());
    match policy.as_str() {
        "calendar" => Ok(RebalancePolicy::Calendar {
            cadence: get_parsed(adapter, "rebalance", "cadence", Cadence::Monthly)?,
            deadband: adapter.get_double("rebalance", "deadband", 0.0),
        }),
        "drift" => Ok(RebalancePolicy::Drift {
            tolerance: adapter.get_double("rebalance", "tolerance", 0.05),
            metric: get_parsed(adapter, "rebalance", "metric", DistanceMetric::L1)?,
        }),
        "signal_change" => Ok(RebalancePolicy::OnSignalChange),
        other => Err(RpsimError::invalid(
            "rebalance",
            "policy",
            format!("unknown rebalance policy '{other}'"),
        )),
    }
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, RpsimError> {
    let d = CostConfig::default();
    let config = BacktestConfig {
        signal: build_signal_config(adapter)?,
        leverage: build_leverage_config(adapter)?,
        rebalance: build_rebalance_policy(adapter)?,
        costs: CostConfig {
            cost_per_turnover: adapter.get_double("costs", "cost_per_turnover", d.cost_per_turnover),
            risk_free_rate: adapter.get_double("costs", "risk_free_rate", d.risk_free_rate),
            financing_spread: adapter.get_double("costs", "financing_spread", d.financing_spread),
        },
        drift: get_parsed(adapter, "engine", "drift", DriftPolicy::Float)?,
        initial: get_parsed(adapter, "engine", "initial", InitialHoldings::Cash)?,
        max_period_loss: get_optional_f64(adapter, "engine", "max_period_loss")?,
        periods_per_year: adapter.get_double("data", "periods_per_year", 252.0),
    };
    config.validate()?;
    Ok(config)
}

pub fn build_sweep_grid(adapter: &dyn ConfigPort) -> Result<SweepGrid, RpsimError> {
    fn list<T: FromStr>(adapter: &dyn ConfigPort, key: &str) -> Result<Vec<T>, RpsimError> {
        adapter
            .get_list("sweep", key)
            .ok_or_else(|| RpsimError::missing("sweep", key))?
            .iter()
            .map(|v| {
                v.parse::<T>()
                    .map_err(|_| RpsimError::invalid("sweep", key, format!("invalid value '{v}'")))
            })
            .collect()
    }

    Ok(SweepGrid {
        vol_windows: list(adapter, "vol_windows")?,
        target_vols: list(adapter, "target_vols")?,
        max_leverages: list(adapter, "max_leverages")?,
    })
}

/// Data file path; relative paths are taken from the config file's directory.
fn resolve_data_path(config_path: &Path, file: &str) -> PathBuf {
    let file = PathBuf::from(file);
    if file.is_absolute() {
        return file;
    }
    config_path
        .parent()
        .map(|dir| dir.join(&file))
        .unwrap_or(file)
}

fn build_data_adapter(adapter: &dyn ConfigPort, config_path: &Path) -> Result<CsvAdapter, RpsimError> {
    let file = adapter
        .get_string("data", "returns_file")
        .ok_or_else(|| RpsimError::missing("data", "returns_file"))?;
    let kind = get_parsed(adapter, "data", "kind", SeriesKind::Returns)?;
    Ok(CsvAdapter::new(resolve_data_path(config_path, &file), kind))
}

/// Load the panel and restrict it to the configured, usable universe.
pub fn load_universe_panel(
    adapter: &dyn ConfigPort,
    data: &dyn DataPort,
    config: &BacktestConfig,
) -> Result<ReturnPanel, RpsimError> {
    let start = parse_date(adapter.get_string("data", "start_date").as_deref(), "start_date")?;
    let end = parse_date(adapter.get_string("data", "end_date").as_deref(), "end_date")?;
    let panel = data.load_panel(start, end)?;

    let requested = match adapter.get_string("data", "assets") {
        Some(list) => parse_assets(&list)?,
        None => panel.assets().to_vec(),
    };
    let min_observations = match config.signal.warmup {
        WarmupPolicy::ShorterWindow { min_window } => min_window,
        _ => config.signal.vol_window,
    };
    let validated = validate_universe(&panel, &requested, min_observations)?;
    if !validated.skipped.is_empty() {
        eprintln!(
            "Simulating {} of {} assets",
            validated.panel.asset_count(),
            requested.len()
        );
    }
    Ok(validated.panel)
}

fn run_simulation(config_path: &Path, output: Option<&Path>, summary: Option<&Path>) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate config
    if let Err(e) = validate_config(&adapter) {
        return fail(&e);
    }

    // Stage 3: Build typed config
    let config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };

    // Stage 4: Load data and resolve universe
    let data = match build_data_adapter(&adapter, config_path) {
        Ok(d) => d,
        Err(e) => return fail(&e),
    };
    let panel = match load_universe_panel(&adapter, &data, &config) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    if panel.is_empty() {
        return fail(&RpsimError::NoData {
            asset: "all".to_string(),
        });
    }
    eprintln!(
        "Simulating {} assets over {} periods ({} to {})",
        panel.asset_count(),
        panel.len(),
        panel.dates()[0],
        panel.dates()[panel.len() - 1]
    );

    // Stage 5: Run the engine
    let periods_per_year = config.periods_per_year;
    let risk_free_rate = config.costs.risk_free_rate;
    let engine = match BacktestEngine::new(config, &panel) {
        Ok(e) => e,
        Err(e) => return fail(&e),
    };
    let result = match engine.run() {
        Ok(r) => r,
        Err(failure) => {
            eprintln!("error: {failure}");
            match &failure.last_completed {
                Some(last) => eprintln!(
                    "  last completed period: {} (equity {:.4})",
                    last.period, last.equity
                ),
                None => eprintln!("  no period completed"),
            }
            if let Some(path) = output {
                let partial = BacktestResult {
                    assets: panel.assets().to_vec(),
                    ledger: failure.ledger.clone(),
                };
                if let Err(e) = CsvReportAdapter.write_ledger(&partial, path) {
                    eprintln!("error: failed to write partial ledger: {e}");
                } else {
                    eprintln!("Partial ledger written to: {}", path.display());
                }
            }
            return ExitCode::from(&failure.source);
        }
    };

    // Stage 6: Compute metrics
    let metrics = Metrics::compute(&result.ledger, periods_per_year, risk_free_rate);
    let benchmark = match adapter.get_string("benchmark", "weights") {
        None => None,
        Some(spec) => match parse_benchmark(&spec).and_then(|w| benchmark_returns(&panel, &w)) {
            Ok(returns) => Some(Metrics::from_returns(&returns, periods_per_year, risk_free_rate)),
            Err(e) => {
                eprintln!("warning: benchmark omitted ({e})");
                None
            }
        },
    };

    // Stage 7: Print console summary to stderr
    print_summary("Strategy", &metrics);
    eprintln!("Avg Turnover:     {:.4}", metrics.avg_turnover);
    eprintln!("Avg Gross Exp.:   {:.2}x", metrics.avg_gross_exposure);
    eprintln!("Rebalances:       {}", metrics.rebalance_count);
    eprintln!("Trading Costs:    {:.4}%", metrics.total_transaction_cost * 100.0);
    eprintln!("Financing Costs:  {:.4}%", metrics.total_financing_cost * 100.0);
    if let Some(bench) = &benchmark {
        print_summary("Benchmark", bench);
    }

    // Stage 8: Write reports
    if let Some(path) = output {
        if let Err(e) = CsvReportAdapter.write_ledger(&result, path) {
            return fail(&e);
        }
        eprintln!("\nLedger written to: {}", path.display());
    }
    if let Some(path) = summary {
        let mut entries = vec![SummaryEntry {
            label: "strategy",
            metrics: &metrics,
        }];
        if let Some(bench) = &benchmark {
            entries.push(SummaryEntry {
                label: "benchmark",
                metrics: bench,
            });
        }
        if let Err(e) = CsvReportAdapter.write_summary(&entries, path) {
            return fail(&e);
        }
        eprintln!("Summary written to: {}", path.display());
    }

    ExitCode::SUCCESS
}

fn print_summary(title: &str, metrics: &Metrics) {
    eprintln!("\n=== {title} ===");
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("CAGR:             {:.2}%", metrics.cagr * 100.0);
    eprintln!("Volatility:       {:.2}%", metrics.volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Calmar Ratio:     {:.2}", metrics.calmar_ratio);
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_config(&adapter) {
        return fail(&e);
    }
    let config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => return fail(&e),
    };
    eprintln!("Config validated successfully");

    eprintln!("\nSignal:");
    eprintln!("  vol_window: {}", config.signal.vol_window);
    if config.signal.vol_floor > 0.0 {
        eprintln!("  vol_floor:  {}", config.signal.vol_floor);
    }
    match config.signal.trend {
        Some(rule) => eprintln!("  trend:      {rule}"),
        None => eprintln!("  trend:      none"),
    }
    eprintln!("  warmup:     {:?}", config.signal.warmup);

    eprintln!("\nLeverage:");
    if config.leverage.enabled {
        eprintln!(
            "  target_vol {} ({} forecast), leverage in [{}, {}]",
            config.leverage.target_vol,
            config.leverage.forecast_model,
            config.leverage.min_leverage,
            config.leverage.max_leverage
        );
    } else {
        eprintln!("  disabled (cap {})", config.leverage.max_leverage);
    }

    eprintln!("\nRebalance: {}", config.rebalance);
    eprintln!(
        "Costs: {} per turnover, financing {} + {}",
        config.costs.cost_per_turnover, config.costs.risk_free_rate, config.costs.financing_spread
    );
    eprintln!("Drift: {}", config.drift);

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let has_sweep = adapter.get_string("sweep", "vol_windows").is_some();
    let validated = if has_sweep {
        validate_sweep_config(&adapter)
    } else {
        validate_config(&adapter)
    };
    if let Err(e) = validated.and_then(|_| build_backtest_config(&adapter).map(|_| ())) {
        return fail(&e);
    }
    eprintln!("Config validated successfully");
    ExitCode::SUCCESS
}

fn run_sweep(config_path: &Path, output: Option<&Path>) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    if let Err(e) = validate_sweep_config(&adapter) {
        return fail(&e);
    }
    let (base, grid) = match build_backtest_config(&adapter)
        .and_then(|base| build_sweep_grid(&adapter).map(|grid| (base, grid)))
    {
        Ok(pair) => pair,
        Err(e) => return fail(&e),
    };

    // Stage 2: Load data
    let panel = match build_data_adapter(&adapter, config_path)
        .and_then(|data| load_universe_panel(&adapter, &data, &base))
    {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };

    // Stage 3: Run grid
    eprintln!(
        "Sweeping {} configurations over {} assets, {} periods",
        grid.size(),
        panel.asset_count(),
        panel.len()
    );
    let parallel = adapter.get_bool("sweep", "parallel", true);
    let rows = ParamSweep::new(&panel)
        .with_parallelism(parallel)
        .sweep(&grid, &base);

    // Stage 4: Print and write results
    eprintln!("\n=== Sweep Results ===");
    eprintln!(
        "{:>7} {:>8} {:>8} {:>10} {:>8} {:>8}",
        "window", "target", "cap", "return", "sharpe", "max_dd"
    );
    for row in &rows {
        match (row.total_return, row.sharpe_ratio, row.max_drawdown) {
            (Some(ret), Some(sharpe), Some(dd)) => eprintln!(
                "{:>7} {:>8.3} {:>8.2} {:>9.2}% {:>8.2} {:>7.1}%",
                row.vol_window,
                row.target_vol,
                row.max_leverage,
                ret * 100.0,
                sharpe,
                dd * 100.0
            ),
            _ => eprintln!(
                "{:>7} {:>8.3} {:>8.2}  failed: {}",
                row.vol_window, row.target_vol, row.max_leverage, row.error
            ),
        }
    }

    if let Some(path) = output {
        if let Err(e) = CsvReportAdapter.write_sweep(&rows, path) {
            return fail(&e);
        }
        eprintln!("\nSweep results written to: {}", path.display());
    }
    ExitCode::SUCCESS
}

fn run_info(config_path: &Path) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let panel = match build_data_adapter(&adapter, config_path).and_then(|d| d.load_panel(None, None)) {
        Ok(p) => p,
        Err(e) => return fail(&e),
    };
    if panel.is_empty() {
        eprintln!("No periods found");
        return ExitCode::SUCCESS;
    }
    eprintln!(
        "{} periods: {} to {}",
        panel.len(),
        panel.dates()[0],
        panel.dates()[panel.len() - 1]
    );
    for (i, asset) in panel.assets().iter().enumerate() {
        eprintln!("  {}: {} observations", asset, panel.observation_count(i));
    }
    ExitCode::SUCCESS
}
