//! Cross-sectional percentile strategies.
//!
//! Each symbol gets a rolling statistic per date. On every date the symbols
//! with a valid statistic are ranked into percentiles and the two tails are
//! bucketed LONG / SHORT according to the [`Direction`].

use crate::domain::rolling::{self, RollingSeries, StatKind};
use crate::domain::series::PriceUniverse;
use crate::domain::signal::{Position, Signal, SignalBook, SignalStrategy};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Highest statistic long, lowest short.
    Momentum,
    /// Lowest statistic long, highest short.
    MeanReversion,
}

impl Direction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "momentum" => Some(Direction::Momentum),
            "mean_reversion" | "mean-reversion" => Some(Direction::MeanReversion),
            _ => None,
        }
    }

    fn orient(self, value: f64) -> f64 {
        match self {
            Direction::Momentum => value,
            Direction::MeanReversion => -value,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CrossSectional {
    pub name: String,
    pub stat: StatKind,
    pub direction: Direction,
    /// Percentiles at or below this fall in the low bucket.
    pub lower_percentile: f64,
    /// Percentiles above this fall in the high bucket.
    pub upper_percentile: f64,
    /// Fewer valid symbols than this on a date and everything is flat.
    pub min_symbols: usize,
}

/// Rank observations ascending by value, ties by symbol, into (0, 100] percentiles.
pub fn percentile_ranks(observations: &[(String, f64)]) -> Vec<(String, f64, f64)> {
    let mut sorted: Vec<&(String, f64)> = observations.iter().collect();
    sorted.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    let n = sorted.len() as f64;
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, (symbol, value))| (symbol.clone(), *value, 100.0 * (i + 1) as f64 / n))
        .collect()
}

impl CrossSectional {
    /// Bucket one date's cross-section. Observations must hold only valid
    /// statistics; below `min_symbols` every symbol is flat.
    pub fn classify(&self, date: NaiveDate, observations: &[(String, f64)]) -> Vec<Signal> {
        if observations.len() < self.min_symbols.max(1) {
            return observations
                .iter()
                .map(|(symbol, value)| Signal {
                    value: Some(*value),
                    ..Signal::flat(date, symbol)
                })
                .collect();
        }

        percentile_ranks(observations)
            .into_iter()
            .map(|(symbol, value, percentile)| {
                let bucket = if percentile <= self.lower_percentile {
                    Position::Short
                } else if percentile > self.upper_percentile {
                    Position::Long
                } else {
                    Position::Flat
                };
                let position = match self.direction {
                    Direction::Momentum => bucket,
                    Direction::MeanReversion => bucket.opposite(),
                };
                Signal {
                    date,
                    symbol,
                    position,
                    percentile: Some(percentile),
                    value: Some(value),
                    score: self.direction.orient(value),
                }
            })
            .collect()
    }
}

impl SignalStrategy for CrossSectional {
    fn name(&self) -> &str {
        &self.name
    }

    fn generate(&self, universe: &PriceUniverse) -> SignalBook {
        let stats: BTreeMap<&str, RollingSeries> = universe
            .series
            .par_iter()
            .map(|(symbol, series)| (symbol.as_str(), rolling::compute(series, self.stat)))
            .collect();

        let mut signals = Vec::new();
        let mut insufficient_history = 0;
        let mut empty_universe_dates = 0;

        for date in universe.timeline() {
            let mut observations = Vec::new();
            for (symbol, series) in &universe.series {
                let Some(idx) = series.index_of(date) else {
                    continue;
                };
                match stats.get(symbol.as_str()).and_then(|s| s.value_at(idx)) {
                    Some(value) => observations.push((symbol.clone(), value)),
                    None => {
                        insufficient_history += 1;
                        signals.push(Signal::flat(date, symbol));
                    }
                }
            }

            if observations.is_empty() {
                continue;
            }
            if observations.len() < self.min_symbols {
                empty_universe_dates += 1;
                debug!(
                    %date,
                    valid = observations.len(),
                    minimum = self.min_symbols,
                    "cross-section too thin, all flat"
                );
            }
            signals.extend(self.classify(date, &observations));
        }

        let mut book = SignalBook::from_signals(signals);
        book.insufficient_history = insufficient_history;
        book.zero_variance = stats.values().map(|s| s.zero_variance).sum();
        book.empty_universe_dates = empty_universe_dates;
        book
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PricePoint;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
    }

    fn strategy(direction: Direction) -> CrossSectional {
        CrossSectional {
            name: "kurtosis".into(),
            stat: StatKind::Kurtosis(30),
            direction,
            lower_percentile: 20.0,
            upper_percentile: 80.0,
            min_symbols: 5,
        }
    }

    fn kurtosis_cross_section() -> Vec<(String, f64)> {
        vec![
            ("CCC".into(), 2.5),
            ("AAA".into(), 0.5),
            ("EEE".into(), 4.5),
            ("BBB".into(), 1.5),
            ("DDD".into(), 3.5),
        ]
    }

    fn sign_of(signals: &[Signal], symbol: &str) -> i8 {
        signals
            .iter()
            .find(|s| s.symbol == symbol)
            .map(|s| s.position.sign())
            .unwrap()
    }

    #[test]
    fn percentiles_are_ordered_with_symbol_tie_break() {
        let ranks = percentile_ranks(&[
            ("BBB".into(), 1.0),
            ("AAA".into(), 1.0),
            ("CCC".into(), 0.0),
            ("DDD".into(), 2.0),
        ]);
        let order: Vec<_> = ranks.iter().map(|(s, _, p)| (s.as_str(), *p)).collect();
        assert_eq!(
            order,
            vec![("CCC", 25.0), ("AAA", 50.0), ("BBB", 75.0), ("DDD", 100.0)]
        );
    }

    #[test]
    fn momentum_longs_highest_and_shorts_lowest() {
        let signals = strategy(Direction::Momentum).classify(date(), &kurtosis_cross_section());
        assert_eq!(sign_of(&signals, "EEE"), 1);
        assert_eq!(sign_of(&signals, "AAA"), -1);
        assert_eq!(sign_of(&signals, "CCC"), 0);
    }

    #[test]
    fn mean_reversion_is_exact_mirror_of_momentum() {
        let data = kurtosis_cross_section();
        let momentum = strategy(Direction::Momentum).classify(date(), &data);
        let reversion = strategy(Direction::MeanReversion).classify(date(), &data);

        assert_eq!(sign_of(&reversion, "AAA"), 1);
        assert_eq!(sign_of(&reversion, "EEE"), -1);
        for s in momentum.iter().filter(|s| !s.position.is_flat()) {
            assert_eq!(s.position.sign(), -sign_of(&reversion, &s.symbol));
        }
    }

    #[test]
    fn score_is_oriented_by_direction() {
        let data = kurtosis_cross_section();
        let reversion = strategy(Direction::MeanReversion).classify(date(), &data);
        let aaa = reversion.iter().find(|s| s.symbol == "AAA").unwrap();
        assert!((aaa.score - (-0.5)).abs() < f64::EPSILON);
        assert_eq!(aaa.percentile, Some(20.0));
    }

    #[test]
    fn too_few_symbols_is_all_flat() {
        let data = kurtosis_cross_section()[..4].to_vec();
        let signals = strategy(Direction::Momentum).classify(date(), &data);
        assert_eq!(signals.len(), 4);
        assert!(signals.iter().all(|s| s.position.is_flat()));
    }

    #[test]
    fn thresholds_apply_to_percentiles_not_counts() {
        // n = 7: percentiles 14.3 .. 100, so 20/80 buckets one short and two longs
        let observations: Vec<(String, f64)> = (0..7)
            .map(|i| (format!("S{i}"), i as f64))
            .collect();
        let signals = strategy(Direction::Momentum).classify(date(), &observations);
        let shorts: Vec<&str> = signals
            .iter()
            .filter(|s| s.position == Position::Short)
            .map(|s| s.symbol.as_str())
            .collect();
        let longs: Vec<&str> = signals
            .iter()
            .filter(|s| s.position == Position::Long)
            .map(|s| s.symbol.as_str())
            .collect();
        assert_eq!(shorts, vec!["S0"]);
        assert_eq!(longs, vec!["S5", "S6"]);
    }

    #[test]
    fn direction_parse() {
        assert_eq!(Direction::parse("Momentum"), Some(Direction::Momentum));
        assert_eq!(Direction::parse("mean_reversion"), Some(Direction::MeanReversion));
        assert_eq!(Direction::parse("sideways"), None);
    }

    fn universe(paths: &[(&str, Vec<f64>)]) -> PriceUniverse {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = paths
            .iter()
            .flat_map(|(symbol, closes)| {
                closes.iter().enumerate().map(move |(i, &close)| PricePoint {
                    date: start + chrono::Duration::days(i as i64),
                    symbol: symbol.to_string(),
                    open: close,
                    high: close,
                    low: close,
                    close,
                    volume: 1000.0,
                })
            })
            .collect();
        PriceUniverse::from_points(points).0
    }

    #[test]
    fn generate_flat_during_warmup_and_ranks_after() {
        let trend = |rate: f64| (0..6).map(|i| 100.0 * (1.0 + rate).powi(i)).collect::<Vec<_>>();
        let u = universe(&[
            ("AAA", trend(-0.02)),
            ("BBB", trend(-0.01)),
            ("CCC", trend(0.0)),
            ("DDD", trend(0.01)),
            ("EEE", trend(0.02)),
        ]);
        let s = CrossSectional {
            name: "momentum".into(),
            stat: StatKind::TrailingReturn(2),
            direction: Direction::Momentum,
            lower_percentile: 20.0,
            upper_percentile: 80.0,
            min_symbols: 5,
        };
        let book = s.generate(&u);
        // first three dates lack a 2-bar trailing return for all five symbols
        assert_eq!(book.insufficient_history, 15);
        let last = *book.by_date.keys().last().unwrap();
        assert_eq!(book.position("EEE", last), Some(Position::Long));
        assert_eq!(book.position("AAA", last), Some(Position::Short));
        assert_eq!(book.position("CCC", last), Some(Position::Flat));
        assert_eq!(book.empty_universe_dates, 0);
    }

    #[test]
    fn generate_counts_thin_dates() {
        let u = universe(&[("AAA", vec![1.0, 2.0, 3.0, 4.0]), ("BBB", vec![4.0, 3.0, 2.0, 1.0])]);
        let s = CrossSectional {
            name: "momentum".into(),
            stat: StatKind::TrailingReturn(1),
            direction: Direction::Momentum,
            lower_percentile: 20.0,
            upper_percentile: 80.0,
            min_symbols: 5,
        };
        let book = s.generate(&u);
        assert_eq!(book.empty_universe_dates, 2);
        assert_eq!(book.active_count(), 0);
    }
}
