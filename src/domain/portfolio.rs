//! Portfolio construction: one date's signals to a signed weight map.
//!
//! Each leg gets half the gross exposure (the whole of it for a long-only
//! book). An empty leg leaves its budget unallocated; it is never handed to
//! the other leg.

use crate::domain::signal::{Position, Signal, SignalBook};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Every LONG and SHORT signal.
    All,
    /// The k strongest longs and the k strongest shorts.
    FixedK(usize),
    /// Top decile of ranked scores long, bottom decile short.
    Decile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weighting {
    Equal,
    /// Proportional to rank within each leg, strongest signal heaviest.
    RankProportional,
}

impl Weighting {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "equal" => Some(Weighting::Equal),
            "rank_proportional" => Some(Weighting::RankProportional),
            _ => None,
        }
    }
}

impl Selection {
    pub fn parse(value: &str, k: usize) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "all" => Some(Selection::All),
            "fixed_k" => Some(Selection::FixedK(k)),
            "decile" => Some(Selection::Decile),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioConfig {
    pub selection: Selection,
    pub weighting: Weighting,
    pub gross_exposure: f64,
    pub long_only: bool,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        PortfolioConfig {
            selection: Selection::FixedK(10),
            weighting: Weighting::Equal,
            gross_exposure: 2.0,
            long_only: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSnapshot {
    pub date: NaiveDate,
    /// Non-zero weights only; absent symbols weigh 0.
    pub weights: BTreeMap<String, f64>,
    /// Gross exposure left unallocated because a leg was empty.
    pub unallocated: f64,
}

impl PortfolioSnapshot {
    pub fn empty(date: NaiveDate) -> Self {
        PortfolioSnapshot {
            date,
            weights: BTreeMap::new(),
            unallocated: 0.0,
        }
    }

    pub fn weight(&self, symbol: &str) -> f64 {
        self.weights.get(symbol).copied().unwrap_or(0.0)
    }

    /// Sum of absolute weights.
    pub fn gross(&self) -> f64 {
        self.weights.values().map(|w| w.abs()).sum()
    }

    pub fn long_exposure(&self) -> f64 {
        self.weights.values().filter(|w| **w > 0.0).sum()
    }

    pub fn short_exposure(&self) -> f64 {
        self.weights.values().filter(|w| **w < 0.0).sum()
    }

    /// Symbol to side (+1 / -1), ignoring magnitudes.
    pub fn sides(&self) -> BTreeMap<&str, i8> {
        self.weights
            .iter()
            .map(|(s, w)| (s.as_str(), if *w > 0.0 { 1 } else { -1 }))
            .collect()
    }
}

/// Descending by score, ties by symbol ascending.
fn by_score_desc(a: &&Signal, b: &&Signal) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.symbol.cmp(&b.symbol))
}

/// Ascending by score, ties by symbol ascending.
fn by_score_asc(a: &&Signal, b: &&Signal) -> Ordering {
    a.score
        .partial_cmp(&b.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.symbol.cmp(&b.symbol))
}

fn select<'a>(signals: &'a [Signal], selection: Selection) -> (Vec<&'a Signal>, Vec<&'a Signal>) {
    let mut longs: Vec<&Signal> = signals
        .iter()
        .filter(|s| s.position == Position::Long)
        .collect();
    let mut shorts: Vec<&Signal> = signals
        .iter()
        .filter(|s| s.position == Position::Short)
        .collect();
    longs.sort_by(by_score_desc);
    shorts.sort_by(by_score_asc);

    match selection {
        Selection::All => (longs, shorts),
        Selection::FixedK(k) => {
            longs.truncate(k);
            shorts.truncate(k);
            (longs, shorts)
        }
        Selection::Decile => {
            let mut ranked: Vec<&Signal> = signals
                .iter()
                .filter(|s| s.score.is_finite())
                .filter(|s| s.percentile.is_some() || !s.position.is_flat())
                .collect();
            ranked.sort_by(by_score_desc);
            let n = ranked.len();
            let m = n.div_ceil(10);
            let longs: Vec<&Signal> = ranked.iter().take(m).copied().collect();
            let short_count = m.min(n - longs.len());
            let shorts: Vec<&Signal> = ranked.iter().rev().take(short_count).copied().collect();
            (longs, shorts)
        }
    }
}

/// Rank strengths for a leg ordered strongest first: the strongest of n gets n,
/// the weakest 1. Equal scores share the mean of their ranks.
fn rank_strengths(leg: &[&Signal]) -> Vec<f64> {
    let n = leg.len();
    let mut strengths = vec![0.0; n];
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && leg[end].score == leg[start].score {
            end += 1;
        }
        let shared = (2 * n + 1 - start - end) as f64 / 2.0;
        for strength in &mut strengths[start..end] {
            *strength = shared;
        }
        start = end;
    }
    strengths
}

fn allocate(leg: &[&Signal], budget: f64, sign: f64, weighting: Weighting) -> Vec<(String, f64)> {
    if leg.is_empty() {
        return Vec::new();
    }
    let strengths = match weighting {
        Weighting::Equal => vec![1.0; leg.len()],
        Weighting::RankProportional => rank_strengths(leg),
    };
    let total: f64 = strengths.iter().sum();
    leg.iter()
        .zip(strengths)
        .map(|(s, strength)| (s.symbol.clone(), sign * budget * strength / total))
        .collect()
}

/// Build the snapshot for one date's signals.
pub fn construct(date: NaiveDate, signals: &[Signal], config: &PortfolioConfig) -> PortfolioSnapshot {
    let (longs, shorts) = select(signals, config.selection);
    let (long_budget, short_budget) = if config.long_only {
        (config.gross_exposure, 0.0)
    } else {
        (config.gross_exposure / 2.0, config.gross_exposure / 2.0)
    };

    let mut weights = BTreeMap::new();
    let mut unallocated = 0.0;

    if longs.is_empty() {
        unallocated += long_budget;
    }
    weights.extend(allocate(&longs, long_budget, 1.0, config.weighting));

    if !config.long_only {
        if shorts.is_empty() {
            unallocated += short_budget;
        }
        weights.extend(allocate(&shorts, short_budget, -1.0, config.weighting));
    }

    weights.retain(|_, w| *w != 0.0);

    PortfolioSnapshot {
        date,
        weights,
        unallocated,
    }
}

/// Snapshot for every date of a signal book.
pub fn construct_all(
    book: &SignalBook,
    config: &PortfolioConfig,
) -> BTreeMap<NaiveDate, PortfolioSnapshot> {
    book.by_date
        .iter()
        .map(|(date, signals)| (*date, construct(*date, signals, config)))
        .collect()
}
