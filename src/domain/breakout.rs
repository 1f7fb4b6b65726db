//! Channel breakout with entry/exit hysteresis.
//!
//! Entry uses the `entry_window` channel, exit the wider `exit_window`
//! channel, both taken over closes strictly before the current bar.
//! There is no direct LONG to SHORT flip; every reversal passes through FLAT.

use crate::domain::rolling::{self, StatKind};
use crate::domain::series::{PriceUniverse, SymbolSeries};
use crate::domain::signal::{Position, Signal, SignalBook, SignalStrategy};
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct Breakout {
    pub name: String,
    pub entry_window: usize,
    pub exit_window: usize,
}

impl Breakout {
    pub fn new(entry_window: usize, exit_window: usize) -> Self {
        Breakout {
            name: format!("breakout_{}_{}", entry_window, exit_window),
            entry_window,
            exit_window,
        }
    }

    /// Channel levels available to the transition function on one bar.
    fn step(
        state: Position,
        close: f64,
        entry: Option<(f64, f64)>,
        exit: Option<(f64, f64)>,
    ) -> Position {
        match state {
            Position::Flat => match entry {
                Some((high, _)) if close > high => Position::Long,
                Some((_, low)) if close < low => Position::Short,
                _ => Position::Flat,
            },
            Position::Long => match exit {
                Some((_, low)) if close < low => Position::Flat,
                _ => Position::Long,
            },
            Position::Short => match exit {
                Some((high, _)) if close > high => Position::Flat,
                _ => Position::Short,
            },
        }
    }

    /// Run the state machine over one symbol. Returns its signals and the
    /// number of bars that lacked a full entry channel.
    pub fn run_symbol(&self, series: &SymbolSeries) -> (Vec<Signal>, usize) {
        let entry_high = rolling::compute(series, StatKind::RollingMax(self.entry_window));
        let entry_low = rolling::compute(series, StatKind::RollingMin(self.entry_window));
        let exit_high = rolling::compute(series, StatKind::RollingMax(self.exit_window));
        let exit_low = rolling::compute(series, StatKind::RollingMin(self.exit_window));

        let mut state = Position::Flat;
        let mut insufficient = 0;
        let mut signals = Vec::with_capacity(series.len());

        for (i, point) in series.points.iter().enumerate() {
            let entry = entry_high.value_at(i).zip(entry_low.value_at(i));
            let exit = exit_high.value_at(i).zip(exit_low.value_at(i));
            if entry.is_none() {
                insufficient += 1;
            }
            state = Self::step(state, point.close, entry, exit);
            signals.push(Signal {
                date: point.date,
                symbol: series.symbol.clone(),
                position: state,
                percentile: None,
                value: Some(point.close),
                score: state.sign() as f64,
            });
        }

        (signals, insufficient)
    }
}

impl SignalStrategy for Breakout {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, universe: &PriceUniverse) -> SignalBook {
        let per_symbol: Vec<(Vec<Signal>, usize)> = universe
            .series
            .par_iter()
            .map(|(_, series)| self.run_symbol(series))
            .collect();

        let insufficient_history = per_symbol.iter().map(|(_, n)| n).sum();
        let mut book = SignalBook::from_signals(per_symbol.into_iter().flat_map(|(s, _)| s));
        book.insufficient_history = insufficient_history;
        book
    }
}
