//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use crate::adapters::cached_data_adapter::CachedDataPort;
use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_cache::MemoryCache;
use crate::domain::backtest::{BacktestConfig, CancelToken, CostModel, Rebalance};
use crate::domain::config_validation::{
    parse_date, validate_backtest_config, validate_data_config, validate_portfolio_config,
    validate_strategy_config,
};
use crate::domain::cross_section::Direction;
use crate::domain::error::{QuantError, Stage};
use crate::domain::pipeline::{self, Diagnostics, StrategyRun};
use crate::domain::portfolio::{PortfolioConfig, Selection, Weighting};
use crate::domain::price::PricePoint;
use crate::domain::series::PriceUniverse;
use crate::domain::strategy::{Strategy, StrategyKind};
use crate::domain::universe::{load_universe, parse_symbols, MIN_PRICE_BARS};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(
    name = "quantpipe",
    about = "Cross-sectional signal research and portfolio backtesting"
)]
pub struct Cli {
    /// Debug-level logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run one strategy end to end
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Output directory (overrides [output] directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Comma-separated symbols (overrides [backtest] symbols)
        #[arg(long)]
        symbols: Option<String>,
    },
    /// Run several strategies and blend them by Sharpe ratio
    Blend {
        #[arg(short, long)]
        config: PathBuf,
        /// Strategy INI files, each with a [strategy] section
        #[arg(short, long, value_delimiter = ',', required = true)]
        strategies: Vec<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration without loading data
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// List symbols available in the data source
    ListSymbols {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data range for symbol(s)
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Backtest {
            config,
            output,
            symbols,
        } => run_backtest(&config, output.as_deref(), symbols.as_deref()),
        Command::Blend {
            config,
            strategies,
            output,
        } => run_blend(&config, &strategies, output.as_deref()),
        Command::Validate { config } => run_validate(&config),
        Command::ListSymbols { config } => run_list_symbols(&config),
        Command::Info { config, symbol } => run_info(&config, symbol.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, QuantError> {
    eprintln!("Loading config from {}", path.display());
    FileConfigAdapter::from_file(path)
}

fn invalid(section: &str, key: &str, reason: &str) -> QuantError {
    QuantError::ConfigInvalid {
        section: section.into(),
        key: key.into(),
        reason: reason.into(),
    }
}

pub fn build_backtest_config(config: &dyn ConfigPort) -> Result<BacktestConfig, QuantError> {
    let start_date = parse_date(
        config.get_string("backtest", "start_date").as_deref(),
        "start_date",
    )?;
    let end_date = parse_date(
        config.get_string("backtest", "end_date").as_deref(),
        "end_date",
    )?;

    let rebalance = match config.get_string("backtest", "rebalance") {
        None => Rebalance::Daily,
        Some(s) => Rebalance::parse(&s)
            .ok_or_else(|| invalid("backtest", "rebalance", "expected daily or on_change"))?,
    };

    let cost_model = match config
        .get_string("backtest", "transaction_cost")
        .unwrap_or_else(|| "none".into())
        .trim()
        .to_lowercase()
        .as_str()
    {
        "none" => CostModel::None,
        "proportional" => CostModel::Proportional {
            rate: config.get_double("backtest", "cost_rate", 0.0),
        },
        _ => {
            return Err(invalid(
                "backtest",
                "transaction_cost",
                "expected none or proportional",
            ))
        }
    };

    Ok(BacktestConfig {
        start_date,
        end_date,
        initial_capital: config.get_double("backtest", "initial_capital", 100_000.0),
        rebalance,
        cost_model,
        renormalize_missing: config.get_bool("backtest", "renormalize_missing", false),
    })
}

pub fn build_strategy(config: &dyn ConfigPort) -> Result<Strategy, QuantError> {
    let kind_str = config
        .get_string("strategy", "kind")
        .ok_or_else(|| QuantError::ConfigMissing {
            section: "strategy".into(),
            key: "kind".into(),
        })?;
    let kind = StrategyKind::parse(&kind_str)
        .ok_or_else(|| invalid("strategy", "kind", "unknown strategy kind"))?;

    let name = config
        .get_string("strategy", "name")
        .unwrap_or_else(|| kind.to_string());
    let defaults = Strategy::with_defaults(&name, kind);

    let direction = match config.get_string("strategy", "direction") {
        None => defaults.direction,
        Some(s) => Direction::parse(&s)
            .ok_or_else(|| invalid("strategy", "direction", "expected momentum or mean_reversion"))?,
    };

    let usize_or = |key: &str, default: usize| -> usize {
        config.get_int("strategy", key, default as i64).max(0) as usize
    };

    Ok(Strategy {
        description: config
            .get_string("strategy", "description")
            .unwrap_or_default(),
        entry_window: usize_or("entry_window", defaults.entry_window),
        exit_window: usize_or("exit_window", defaults.exit_window),
        window: usize_or("window", defaults.window),
        direction,
        lower_percentile: config.get_double("strategy", "lower_percentile", defaults.lower_percentile),
        upper_percentile: config.get_double("strategy", "upper_percentile", defaults.upper_percentile),
        min_symbols: usize_or("min_symbols", defaults.min_symbols),
        ..defaults
    })
}

pub fn build_portfolio_config(config: &dyn ConfigPort) -> Result<PortfolioConfig, QuantError> {
    let defaults = PortfolioConfig::default();
    let k = config.get_int("portfolio", "k", 10).max(1) as usize;

    let selection = match config.get_string("portfolio", "selection") {
        None => Selection::FixedK(k),
        Some(s) => Selection::parse(&s, k)
            .ok_or_else(|| invalid("portfolio", "selection", "expected all, fixed_k or decile"))?,
    };
    let weighting = match config.get_string("portfolio", "weighting") {
        None => defaults.weighting,
        Some(s) => Weighting::parse(&s)
            .ok_or_else(|| invalid("portfolio", "weighting", "expected equal or rank_proportional"))?,
    };

    Ok(PortfolioConfig {
        selection,
        weighting,
        gross_exposure: config.get_double("portfolio", "gross_exposure", defaults.gross_exposure),
        long_only: config.get_bool("portfolio", "long_only", defaults.long_only),
    })
}

/// The configured price source, behind a TTL cache when `[data] cache_ttl_secs` > 0.
pub fn open_data_port(config: &dyn ConfigPort) -> Result<Box<dyn DataPort>, QuantError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".into())
        .trim()
        .to_lowercase();

    let port: Box<dyn DataPort> = match source.as_str() {
        "csv" => {
            let path = config
                .get_string("data", "path")
                .ok_or_else(|| QuantError::ConfigMissing {
                    section: "data".into(),
                    key: "path".into(),
                })?;
            Box::new(CsvAdapter::from_file(Path::new(&path))?)
        }
        #[cfg(feature = "sqlite")]
        "sqlite" => Box::new(crate::adapters::sqlite_adapter::SqliteAdapter::from_config(config)?),
        other => {
            return Err(invalid(
                "data",
                "source",
                &format!("source '{other}' is not available in this build"),
            ))
        }
    };

    let ttl = config.get_int("data", "cache_ttl_secs", 0);
    if ttl > 0 {
        let cache: MemoryCache<Vec<PricePoint>> = MemoryCache::new(Duration::from_secs(ttl as u64));
        return Ok(Box::new(CachedDataPort::new(port, cache)));
    }
    Ok(port)
}

/// Symbols from the override, then `[backtest] symbols`, then the whole source.
pub fn resolve_symbols(
    symbols_override: Option<&str>,
    config: &dyn ConfigPort,
    data_port: &dyn DataPort,
) -> Result<Vec<String>, QuantError> {
    if let Some(list) = symbols_override {
        return Ok(parse_symbols(list)?);
    }
    if let Some(list) = config.get_string("backtest", "symbols") {
        return Ok(parse_symbols(&list)?);
    }
    data_port.list_symbols()
}

fn validate_all(config: &dyn ConfigPort) -> Result<(), QuantError> {
    validate_data_config(config)?;
    validate_backtest_config(config)?;
    validate_portfolio_config(config)?;
    Ok(())
}

fn output_directory(output: Option<&Path>, config: &dyn ConfigPort) -> PathBuf {
    output.map(Path::to_path_buf).unwrap_or_else(|| {
        PathBuf::from(
            config
                .get_string("output", "directory")
                .unwrap_or_else(|| ".".into()),
        )
    })
}

/// Shared load stage of `backtest` and `blend`.
fn load_prices(
    config: &dyn ConfigPort,
    symbols_override: Option<&str>,
    backtest: &BacktestConfig,
) -> Result<(PriceUniverse, Diagnostics), QuantError> {
    let data_port = open_data_port(config).map_err(|e| e.at(Stage::Load))?;
    let symbols =
        resolve_symbols(symbols_override, config, &*data_port).map_err(|e| e.at(Stage::Load))?;
    if symbols.is_empty() {
        return Err(QuantError::NoData {
            symbol: "all".into(),
        }
        .at(Stage::Load));
    }

    let minimum = config
        .get_int("backtest", "min_bars", MIN_PRICE_BARS as i64)
        .max(2) as usize;
    eprintln!("Validating {} symbols...", symbols.len());
    let loaded = load_universe(
        &*data_port,
        &symbols,
        backtest.start_date,
        backtest.end_date,
        minimum,
    )
    .map_err(|e| e.at(Stage::Load))?;

    let diagnostics = Diagnostics::from_load(&loaded, data_port.dropped_rows());
    eprintln!(
        "Loaded {} of {} symbols, {} dates",
        loaded.universe.symbol_count(),
        symbols.len(),
        loaded.universe.timeline().len()
    );
    Ok((loaded.universe, diagnostics))
}

fn run_backtest(
    config_path: &Path,
    output: Option<&Path>,
    symbols_override: Option<&str>,
) -> Result<(), QuantError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;
    validate_strategy_config(&config)?;

    let strategy = build_strategy(&config)?;
    let backtest = build_backtest_config(&config)?;
    let portfolio = build_portfolio_config(&config)?;
    eprintln!("Strategy: {} ({})", strategy.name, strategy.kind);

    let (universe, base) = load_prices(&config, symbols_override, &backtest)?;

    eprintln!(
        "Running backtest: {} to {}",
        backtest.start_date, backtest.end_date
    );
    let run = pipeline::run_strategy(
        &universe,
        &strategy,
        &portfolio,
        &backtest,
        &base,
        &CancelToken::new(),
    )?;
    print_run_summary(&run);

    let directory = output_directory(output, &config);
    CsvReportAdapter
        .write_run(&run, &directory)
        .map_err(|e| e.at(Stage::Report))?;
    eprintln!("\nResults written to: {}", directory.display());
    Ok(())
}

fn run_blend(
    config_path: &Path,
    strategy_paths: &[PathBuf],
    output: Option<&Path>,
) -> Result<(), QuantError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;

    let mut strategies = Vec::with_capacity(strategy_paths.len());
    for path in strategy_paths {
        let file = load_config(path)?;
        validate_strategy_config(&file)?;
        strategies.push(build_strategy(&file)?);
    }

    let backtest = build_backtest_config(&config)?;
    let portfolio = build_portfolio_config(&config)?;
    let (universe, base) = load_prices(&config, None, &backtest)?;

    let cancel = CancelToken::new();
    let mut runs: Vec<StrategyRun> = Vec::with_capacity(strategies.len());
    for strategy in &strategies {
        eprintln!("\nRunning {} ({})", strategy.name, strategy.kind);
        let run = pipeline::run_strategy(&universe, strategy, &portfolio, &backtest, &base, &cancel)?;
        print_run_summary(&run);
        runs.push(run);
    }

    let directory = output_directory(output, &config);
    let reporter = CsvReportAdapter;
    for run in &runs {
        reporter
            .write_run(run, &directory)
            .map_err(|e| e.at(Stage::Report))?;
    }
    reporter
        .write_comparison(&runs, &directory)
        .map_err(|e| e.at(Stage::Report))?;

    match pipeline::blend_runs(&runs) {
        Some(blend) => {
            eprintln!("\n=== Sharpe-Weighted Blend ===");
            for w in &blend.weights {
                eprintln!(
                    "  {:<24} sharpe {:>6.2}  weight {:>6.2}%",
                    w.strategy, w.sharpe, w.weight_pct
                );
            }
            eprintln!("Expected (weighted average, not compounded):");
            eprintln!(
                "  Return {:.2}%  Sharpe {:.2}  Sortino {:.2}  Max DD {:.1}%",
                blend.expected.annualized_return * 100.0,
                blend.expected.sharpe,
                blend.expected.sortino,
                blend.expected.max_drawdown * 100.0
            );
            reporter
                .write_blend(&blend, &directory)
                .map_err(|e| e.at(Stage::Report))?;
        }
        None => {
            eprintln!("\nNo strategy has a positive Sharpe ratio; no blended allocation.");
        }
    }

    eprintln!("\nResults written to: {}", directory.display());
    Ok(())
}

pub fn print_run_summary(run: &StrategyRun) {
    let r = &run.report;
    eprintln!("\n=== {} ===", run.strategy.name);
    eprintln!("Total Return:     {:.2}%", r.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", r.annualized_return * 100.0);
    eprintln!("Volatility:       {:.2}%", r.annualized_volatility * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", r.sharpe);
    eprintln!("Sortino Ratio:    {:.2}", r.sortino);
    eprintln!("Max Drawdown:     {:.1}%", r.max_drawdown * 100.0);
    eprintln!("Win Rate:         {:.1}%", r.win_rate * 100.0);
    eprintln!("Trading Days:     {}", r.n_days);
    eprintln!("Final Value:      {:.2}", r.final_value);
    eprintln!(
        "Rebalances:       {} (cost paid {:.2})",
        run.simulation.rebalances, run.simulation.total_cost
    );

    if !run.yearly.is_empty() {
        eprintln!("\n--- By Year ---");
        for (year, y) in &run.yearly {
            eprintln!(
                "  {}:  {:>7.2}%  sharpe {:>5.2}  max dd {:>6.1}%",
                year,
                y.total_return * 100.0,
                y.sharpe,
                y.max_drawdown * 100.0
            );
        }
    }

    let degraded = run.diagnostics.summary_lines();
    if !degraded.is_empty() {
        eprintln!("\n--- Degraded Inputs ---");
        for line in degraded {
            eprintln!("  {line}");
        }
    }
}

fn run_validate(config_path: &Path) -> Result<(), QuantError> {
    let config = load_config(config_path)?;
    validate_all(&config)?;

    let backtest = build_backtest_config(&config)?;
    let portfolio = build_portfolio_config(&config)?;
    eprintln!("\nBacktest:");
    eprintln!("  window:    {} to {}", backtest.start_date, backtest.end_date);
    eprintln!("  capital:   {:.2}", backtest.initial_capital);
    eprintln!("  rebalance: {:?}", backtest.rebalance);
    eprintln!("  costs:     {:?}", backtest.cost_model);
    eprintln!("\nPortfolio:");
    eprintln!("  selection: {:?}", portfolio.selection);
    eprintln!("  weighting: {:?}", portfolio.weighting);
    eprintln!("  gross:     {}", portfolio.gross_exposure);
    eprintln!("  long only: {}", portfolio.long_only);

    if config.has_section("strategy") {
        validate_strategy_config(&config)?;
        let s = build_strategy(&config)?;
        eprintln!("\nStrategy: {} ({})", s.name, s.kind);
        match s.stat() {
            None => eprintln!("  channels:    {} / {}", s.entry_window, s.exit_window),
            Some(stat) => {
                eprintln!("  statistic:   {}", stat);
                eprintln!("  direction:   {:?}", s.direction);
                eprintln!(
                    "  percentiles: <= {} / > {}",
                    s.lower_percentile, s.upper_percentile
                );
                eprintln!("  min symbols: {}", s.min_symbols);
            }
        }
    }

    match config.get_string("backtest", "symbols") {
        Some(list) => eprintln!("\nUniverse: {}", parse_symbols(&list)?.join(", ")),
        None => eprintln!("\nUniverse: every symbol in the data source"),
    }

    eprintln!("\nConfiguration is valid.");
    Ok(())
}

fn run_list_symbols(config_path: &Path) -> Result<(), QuantError> {
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    let data_port = open_data_port(&config)?;

    let symbols = data_port.list_symbols()?;
    if symbols.is_empty() {
        eprintln!("No symbols found");
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    Ok(())
}

fn run_info(config_path: &Path, symbol: Option<&str>) -> Result<(), QuantError> {
    let config = load_config(config_path)?;
    validate_data_config(&config)?;
    let data_port = open_data_port(&config)?;
    let symbols = resolve_symbols(symbol, &config, &*data_port)?;

    for s in &symbols {
        match data_port.get_data_range(s)? {
            Some((first, last, count)) => println!("{}: {} bars, {} to {}", s, count, first, last),
            None => eprintln!("{}: no data found", s),
        }
    }
    if data_port.dropped_rows() > 0 {
        eprintln!("{} rows dropped (unparsable date)", data_port.dropped_rows());
    }
    Ok(())
}
