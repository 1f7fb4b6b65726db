//! Signals and the signal-strategy capability.
//!
//! A signal dated `t` is derived from data through `t`'s close and is meant to
//! be held over the return from `t` to the next trading date.

use crate::domain::series::PriceUniverse;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Position {
    Long,
    Short,
    Flat,
}

impl Position {
    /// +1 long, -1 short, 0 flat.
    pub fn sign(self) -> i8 {
        match self {
            Position::Long => 1,
            Position::Short => -1,
            Position::Flat => 0,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Position::Long => Position::Short,
            Position::Short => Position::Long,
            Position::Flat => Position::Flat,
        }
    }

    pub fn is_flat(self) -> bool {
        self == Position::Flat
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::Long => f.write_str("LONG"),
            Position::Short => f.write_str("SHORT"),
            Position::Flat => f.write_str("FLAT"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub date: NaiveDate,
    pub symbol: String,
    pub position: Position,
    /// Cross-sectional percentile (0, 100], when the strategy ranks.
    pub percentile: Option<f64>,
    /// Underlying statistic, kept for diagnostics.
    pub value: Option<f64>,
    /// Directional strength: higher is more bullish.
    pub score: f64,
}

impl Signal {
    pub fn flat(date: NaiveDate, symbol: &str) -> Self {
        Signal {
            date,
            symbol: symbol.to_string(),
            position: Position::Flat,
            percentile: None,
            value: None,
            score: 0.0,
        }
    }
}

/// Signals for every (date, symbol) a strategy saw, plus degradation counts.
#[derive(Debug, Clone, Default)]
pub struct SignalBook {
    /// Per date, sorted by symbol.
    pub by_date: BTreeMap<NaiveDate, Vec<Signal>>,
    /// (symbol, date) pairs forced flat because the window was not yet full.
    pub insufficient_history: usize,
    /// Statistic evaluations that hit a zero denominator.
    pub zero_variance: usize,
    /// Dates where too few symbols had a valid statistic to rank.
    pub empty_universe_dates: usize,
}

impl SignalBook {
    /// Build from unordered signals.
    pub fn from_signals(signals: impl IntoIterator<Item = Signal>) -> Self {
        let mut by_date: BTreeMap<NaiveDate, Vec<Signal>> = BTreeMap::new();
        for signal in signals {
            by_date.entry(signal.date).or_default().push(signal);
        }
        for day in by_date.values_mut() {
            day.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        }
        Self {
            by_date,
            ..Default::default()
        }
    }

    pub fn at(&self, date: NaiveDate) -> &[Signal] {
        self.by_date.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn position(&self, symbol: &str, date: NaiveDate) -> Option<Position> {
        self.at(date)
            .iter()
            .find(|s| s.symbol == symbol)
            .map(|s| s.position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Signal> {
        self.by_date.values().flatten()
    }

    pub fn len(&self) -> usize {
        self.by_date.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_date.is_empty()
    }

    /// Count of non-flat signals.
    pub fn active_count(&self) -> usize {
        self.iter().filter(|s| !s.position.is_flat()).count()
    }
}

/// Turns a price universe into a signal book.
pub trait SignalStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn generate(&self, universe: &PriceUniverse) -> SignalBook;
}
