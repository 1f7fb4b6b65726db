//! Configuration validation.
//!
//! Validates every section before any data is loaded.

use crate::domain::backtest::Rebalance;
use crate::domain::cross_section::Direction;
use crate::domain::error::QuantError;
use crate::domain::portfolio::{Selection, Weighting};
use crate::domain::strategy::StrategyKind;
use crate::domain::universe::parse_symbols;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

pub fn validate_data_config(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let source = config
        .get_string("data", "source")
        .unwrap_or_else(|| "csv".to_string());
    if !matches!(source.trim().to_lowercase().as_str(), "csv" | "sqlite") {
        return Err(invalid("data", "source", "source must be csv or sqlite"));
    }
    require(config, "data", "path")?;
    if config.get_int("data", "pool_size", 4) < 1 {
        return Err(invalid("data", "pool_size", "pool_size must be at least 1"));
    }
    Ok(())
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), QuantError> {
    validate_initial_capital(config)?;
    validate_dates(config)?;
    validate_symbols(config)?;
    validate_rebalance(config)?;
    validate_transaction_cost(config)?;
    if config.get_int("backtest", "min_bars", 30) < 2 {
        return Err(invalid("backtest", "min_bars", "min_bars must be at least 2"));
    }
    Ok(())
}

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let kind = require(config, "strategy", "kind")?;
    let Some(kind) = StrategyKind::parse(&kind) else {
        return Err(invalid(
            "strategy",
            "kind",
            "kind must be breakout, kurtosis, volume_divergence, momentum or contrarian",
        ));
    };

    match kind {
        StrategyKind::Breakout => validate_breakout_windows(config)?,
        _ => validate_cross_section(config, kind)?,
    }
    Ok(())
}

pub fn validate_portfolio_config(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let k = config.get_int("portfolio", "k", 10);
    if k < 1 {
        return Err(invalid("portfolio", "k", "k must be at least 1"));
    }
    if config
        .get_string("portfolio", "selection")
        .is_some_and(|s| Selection::parse(&s, k as usize).is_none())
    {
        return Err(invalid(
            "portfolio",
            "selection",
            "selection must be all, fixed_k or decile",
        ));
    }
    if config
        .get_string("portfolio", "weighting")
        .is_some_and(|s| Weighting::parse(&s).is_none())
    {
        return Err(invalid(
            "portfolio",
            "weighting",
            "weighting must be equal or rank_proportional",
        ));
    }
    let gross = config.get_double("portfolio", "gross_exposure", 2.0);
    if !(gross > 0.0 && gross.is_finite()) {
        return Err(invalid(
            "portfolio",
            "gross_exposure",
            "gross_exposure must be positive",
        ));
    }
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> QuantError {
    QuantError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, QuantError> {
    match config.get_string(section, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(QuantError::ConfigMissing {
            section: section.to_string(),
            key: key.to_string(),
        }),
    }
}

fn validate_initial_capital(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let value = config.get_double("backtest", "initial_capital", 100_000.0);
    if value <= 0.0 || !value.is_finite() {
        return Err(invalid(
            "backtest",
            "initial_capital",
            "initial_capital must be positive",
        ));
    }
    Ok(())
}

fn validate_dates(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let start_str = config.get_string("backtest", "start_date");
    let end_str = config.get_string("backtest", "end_date");

    let start_date = parse_date(start_str.as_deref(), "start_date")?;
    let end_date = parse_date(end_str.as_deref(), "end_date")?;

    if start_date >= end_date {
        return Err(invalid(
            "backtest",
            "start_date",
            "start_date must be before end_date",
        ));
    }
    Ok(())
}

pub(crate) fn parse_date(value: Option<&str>, field: &str) -> Result<NaiveDate, QuantError> {
    match value {
        None => Err(QuantError::ConfigMissing {
            section: "backtest".to_string(),
            key: field.to_string(),
        }),
        Some(s) => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| {
            QuantError::ConfigInvalid {
                section: "backtest".to_string(),
                key: field.to_string(),
                reason: format!("invalid {} format, expected YYYY-MM-DD", field),
            }
        }),
    }
}

fn validate_symbols(config: &dyn ConfigPort) -> Result<(), QuantError> {
    // absent means every symbol in the data source
    if let Some(symbols) = config.get_string("backtest", "symbols") {
        parse_symbols(&symbols)?;
    }
    Ok(())
}

fn validate_rebalance(config: &dyn ConfigPort) -> Result<(), QuantError> {
    if config
        .get_string("backtest", "rebalance")
        .is_some_and(|s| Rebalance::parse(&s).is_none())
    {
        return Err(invalid(
            "backtest",
            "rebalance",
            "rebalance must be daily or on_change",
        ));
    }
    Ok(())
}

fn validate_transaction_cost(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let model = config
        .get_string("backtest", "transaction_cost")
        .unwrap_or_else(|| "none".to_string());
    let rate = config.get_double("backtest", "cost_rate", 0.0);
    if rate < 0.0 || !rate.is_finite() {
        return Err(invalid(
            "backtest",
            "cost_rate",
            "cost_rate must be non-negative",
        ));
    }
    match model.trim().to_lowercase().as_str() {
        "none" => Ok(()),
        "proportional" if rate > 0.0 => Ok(()),
        "proportional" => Err(invalid(
            "backtest",
            "cost_rate",
            "cost_rate must be positive for proportional costs",
        )),
        _ => Err(invalid(
            "backtest",
            "transaction_cost",
            "transaction_cost must be none or proportional",
        )),
    }
}

fn validate_breakout_windows(config: &dyn ConfigPort) -> Result<(), QuantError> {
    let entry = config.get_int("strategy", "entry_window", 50);
    let exit = config.get_int("strategy", "exit_window", 70);
    if entry < 1 {
        return Err(invalid(
            "strategy",
            "entry_window",
            "entry_window must be at least 1",
        ));
    }
    if exit <= entry {
        return Err(invalid(
            "strategy",
            "exit_window",
            "exit_window must exceed entry_window",
        ));
    }
    Ok(())
}

fn validate_cross_section(config: &dyn ConfigPort, kind: StrategyKind) -> Result<(), QuantError> {
    let window = config.get_int("strategy", "window", 30);
    let minimum_window = match kind {
        StrategyKind::Kurtosis => 4,
        StrategyKind::VolumeDivergence => 2,
        _ => 1,
    };
    if window < minimum_window {
        return Err(invalid(
            "strategy",
            "window",
            &format!("window must be at least {minimum_window} for {kind}"),
        ));
    }

    if config
        .get_string("strategy", "direction")
        .is_some_and(|s| Direction::parse(&s).is_none())
    {
        return Err(invalid(
            "strategy",
            "direction",
            "direction must be momentum or mean_reversion",
        ));
    }

    let lower = config.get_double("strategy", "lower_percentile", 20.0);
    let upper = config.get_double("strategy", "upper_percentile", 80.0);
    if !(lower > 0.0 && lower <= upper && upper < 100.0) {
        return Err(invalid(
            "strategy",
            "lower_percentile",
            "percentiles must satisfy 0 < lower <= upper < 100",
        ));
    }

    if config.get_int("strategy", "min_symbols", 5) < 2 {
        return Err(invalid(
            "strategy",
            "min_symbols",
            "min_symbols must be at least 2",
        ));
    }
    Ok(())
}
