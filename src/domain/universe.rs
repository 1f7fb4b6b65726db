//! Symbol universe: parsing symbol lists and loading validated price data.

use crate::domain::error::QuantError;
use crate::domain::price::PricePoint;
use crate::domain::series::PriceUniverse;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{info, warn};

pub const MIN_PRICE_BARS: usize = 30;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UniverseError {
    #[error("empty token in symbol list")]
    EmptyToken,

    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(String),
}

impl From<UniverseError> for QuantError {
    fn from(err: UniverseError) -> Self {
        QuantError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "symbols".to_string(),
            reason: err.to_string(),
        }
    }
}

pub fn parse_symbols(input: &str) -> Result<Vec<String>, UniverseError> {
    let mut symbols = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let symbol = trimmed.to_uppercase();
        if !seen.insert(symbol.clone()) {
            return Err(UniverseError::DuplicateSymbol(symbol));
        }
        symbols.push(symbol);
    }

    Ok(symbols)
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    InsufficientBars { bars: usize },
    Malformed { rows: usize },
}

pub struct LoadedUniverse {
    pub universe: PriceUniverse,
    pub skipped: Vec<SkippedSymbol>,
    /// Rows sharing a (symbol, date) key; the last one was kept.
    pub duplicate_rows: usize,
}

/// Fetch every symbol over the window and keep those with at least
/// `minimum` well-formed bars. Fails only when nothing survives.
pub fn load_universe(
    data_port: &dyn DataPort,
    symbols: &[String],
    start_date: NaiveDate,
    end_date: NaiveDate,
    minimum: usize,
) -> Result<LoadedUniverse, QuantError> {
    let mut points: Vec<PricePoint> = Vec::new();
    let mut skipped = Vec::new();
    let mut kept = 0;

    for symbol in symbols {
        let bars = match data_port.fetch_prices(symbol, start_date, end_date) {
            Ok(bars) => bars,
            Err(e) => {
                warn!(%symbol, error = %e, "skipping symbol");
                skipped.push(SkippedSymbol {
                    symbol: symbol.clone(),
                    reason: SkipReason::NoData,
                });
                continue;
            }
        };

        if bars.is_empty() {
            warn!(%symbol, "skipping symbol, no data in range");
            skipped.push(SkippedSymbol {
                symbol: symbol.clone(),
                reason: SkipReason::NoData,
            });
            continue;
        }

        let malformed = bars.iter().filter(|b| !b.is_well_formed()).count();
        if malformed > 0 {
            warn!(%symbol, rows = malformed, "skipping symbol, malformed bars");
            skipped.push(SkippedSymbol {
                symbol: symbol.clone(),
                reason: SkipReason::Malformed { rows: malformed },
            });
            continue;
        }

        if bars.len() < minimum {
            warn!(%symbol, bars = bars.len(), minimum, "skipping symbol, short history");
            skipped.push(SkippedSymbol {
                symbol: symbol.clone(),
                reason: SkipReason::InsufficientBars { bars: bars.len() },
            });
            continue;
        }

        kept += 1;
        points.extend(bars);
    }

    if kept == 0 {
        return Err(QuantError::InsufficientData {
            symbol: "all".to_string(),
            bars: 0,
            minimum,
        });
    }

    if !skipped.is_empty() {
        info!(kept, total = symbols.len(), "universe reduced by validation");
    }

    let (universe, duplicate_rows) = PriceUniverse::from_points(points);
    if duplicate_rows > 0 {
        warn!(duplicate_rows, "duplicate (symbol, date) rows collapsed");
    }

    Ok(LoadedUniverse {
        universe,
        skipped,
        duplicate_rows,
    })
}
