//! Strategy definitions and their signal generators.

use crate::domain::breakout::Breakout;
use crate::domain::cross_section::{CrossSectional, Direction};
use crate::domain::rolling::StatKind;
use crate::domain::signal::SignalStrategy;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Breakout,
    Kurtosis,
    VolumeDivergence,
    Momentum,
    Contrarian,
}

impl StrategyKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "breakout" => Some(StrategyKind::Breakout),
            "kurtosis" => Some(StrategyKind::Kurtosis),
            "volume_divergence" => Some(StrategyKind::VolumeDivergence),
            "momentum" => Some(StrategyKind::Momentum),
            "contrarian" => Some(StrategyKind::Contrarian),
            _ => None,
        }
    }

    /// Bucket orientation used when the config does not name one.
    pub fn default_direction(self) -> Direction {
        match self {
            StrategyKind::Kurtosis | StrategyKind::Contrarian => Direction::MeanReversion,
            StrategyKind::Breakout | StrategyKind::VolumeDivergence | StrategyKind::Momentum => {
                Direction::Momentum
            }
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyKind::Breakout => "breakout",
            StrategyKind::Kurtosis => "kurtosis",
            StrategyKind::VolumeDivergence => "volume_divergence",
            StrategyKind::Momentum => "momentum",
            StrategyKind::Contrarian => "contrarian",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    pub name: String,
    pub description: String,
    pub kind: StrategyKind,
    pub entry_window: usize,
    pub exit_window: usize,
    pub window: usize,
    pub direction: Direction,
    pub lower_percentile: f64,
    pub upper_percentile: f64,
    pub min_symbols: usize,
}

impl Strategy {
    /// Defaults for `kind`: 50/70 breakout channels, 30-bar statistics,
    /// 20/80 percentile bands, at least 5 ranked symbols.
    pub fn with_defaults(name: &str, kind: StrategyKind) -> Self {
        Strategy {
            name: name.to_string(),
            description: String::new(),
            kind,
            entry_window: 50,
            exit_window: 70,
            window: 30,
            direction: kind.default_direction(),
            lower_percentile: 20.0,
            upper_percentile: 80.0,
            min_symbols: 5,
        }
    }

    /// The statistic ranked by a cross-sectional kind.
    pub fn stat(&self) -> Option<StatKind> {
        match self.kind {
            StrategyKind::Breakout => None,
            StrategyKind::Kurtosis => Some(StatKind::Kurtosis(self.window)),
            StrategyKind::VolumeDivergence => Some(StatKind::VolumeDivergence(self.window)),
            StrategyKind::Momentum | StrategyKind::Contrarian => {
                Some(StatKind::TrailingReturn(self.window))
            }
        }
    }

    pub fn signal_strategy(&self) -> Box<dyn SignalStrategy> {
        match self.stat() {
            None => Box::new(Breakout {
                name: self.name.clone(),
                ..Breakout::new(self.entry_window, self.exit_window)
            }),
            Some(stat) => Box::new(CrossSectional {
                name: self.name.clone(),
                stat,
                direction: self.direction,
                lower_percentile: self.lower_percentile,
                upper_percentile: self.upper_percentile,
                min_symbols: self.min_symbols,
            }),
        }
    }
}
