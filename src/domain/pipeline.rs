//! End-to-end strategy run: signals, portfolio, simulation, metrics.
//!
//! A failed stage surfaces as [`QuantError::StageFailed`] naming the stage.
//! Degraded conditions never fail the run; they are tallied in
//! [`Diagnostics`] and reported alongside the results.

use crate::domain::backtest::{self, BacktestConfig, CancelToken, SimulationResult};
use crate::domain::blend::{self, Blend, StrategyReport};
use crate::domain::error::{QuantError, Stage};
use crate::domain::metrics::{self, PerformanceReport};
use crate::domain::portfolio::{self, PortfolioConfig, PortfolioSnapshot};
use crate::domain::series::PriceUniverse;
use crate::domain::signal::SignalBook;
use crate::domain::strategy::Strategy;
use crate::domain::universe::{LoadedUniverse, SkippedSymbol};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Counts of everything that degraded a run without failing it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub dropped_rows: usize,
    pub duplicate_rows: usize,
    pub insufficient_history: usize,
    pub zero_variance: usize,
    pub empty_universe_dates: usize,
    pub missing_returns: usize,
    pub skipped_symbols: Vec<SkippedSymbol>,
}

impl Diagnostics {
    /// Load-stage counts; per-strategy counts start at zero.
    pub fn from_load(loaded: &LoadedUniverse, dropped_rows: usize) -> Self {
        Diagnostics {
            dropped_rows,
            duplicate_rows: loaded.duplicate_rows,
            skipped_symbols: loaded.skipped.clone(),
            ..Default::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.dropped_rows > 0
            || self.duplicate_rows > 0
            || self.insufficient_history > 0
            || self.zero_variance > 0
            || self.empty_universe_dates > 0
            || self.missing_returns > 0
            || !self.skipped_symbols.is_empty()
    }

    /// Human-readable lines for each non-zero count.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        let counts = [
            (self.dropped_rows, "rows dropped (unparsable date)"),
            (self.duplicate_rows, "duplicate rows collapsed"),
            (self.insufficient_history, "symbol-dates flat for short history"),
            (self.zero_variance, "zero-variance statistic evaluations"),
            (self.empty_universe_dates, "dates with too few symbols to rank"),
            (self.missing_returns, "held symbol-days without a return"),
            (self.skipped_symbols.len(), "symbols skipped"),
        ];
        for (count, label) in counts {
            if count > 0 {
                lines.push(format!("{count} {label}"));
            }
        }
        lines
    }
}

#[derive(Debug, Clone)]
pub struct StrategyRun {
    pub strategy: Strategy,
    pub signals: SignalBook,
    pub snapshots: BTreeMap<NaiveDate, PortfolioSnapshot>,
    pub simulation: SimulationResult,
    pub report: PerformanceReport,
    pub yearly: BTreeMap<i32, PerformanceReport>,
    pub diagnostics: Diagnostics,
}

impl StrategyRun {
    pub fn strategy_report(&self) -> StrategyReport {
        StrategyReport {
            name: self.strategy.name.clone(),
            description: self.strategy.description.clone(),
            report: self.report.clone(),
        }
    }
}

fn check_cancel(cancel: &CancelToken, stage: Stage) -> Result<(), QuantError> {
    if cancel.is_cancelled() {
        return Err(QuantError::Cancelled { stage });
    }
    Ok(())
}

/// Run one strategy over a loaded universe.
///
/// `base` carries the load-stage counts into the run's diagnostics.
pub fn run_strategy(
    universe: &PriceUniverse,
    strategy: &Strategy,
    portfolio_config: &PortfolioConfig,
    backtest_config: &BacktestConfig,
    base: &Diagnostics,
    cancel: &CancelToken,
) -> Result<StrategyRun, QuantError> {
    check_cancel(cancel, Stage::Signals)?;
    let generator = strategy.signal_strategy();
    let signals = generator.generate(universe);
    info!(
        strategy = %strategy.name,
        dates = signals.by_date.len(),
        active = signals.active_count(),
        "signals generated"
    );

    check_cancel(cancel, Stage::Portfolio)?;
    let snapshots = portfolio::construct_all(&signals, portfolio_config);

    check_cancel(cancel, Stage::Backtest)?;
    let timeline: Vec<NaiveDate> = universe
        .timeline()
        .into_iter()
        .filter(|d| *d >= backtest_config.start_date && *d <= backtest_config.end_date)
        .collect();
    if timeline.is_empty() {
        return Err(QuantError::NoData {
            symbol: "all".to_string(),
        }
        .at(Stage::Backtest));
    }
    let returns = universe.daily_returns();
    let simulation = backtest::simulate(&timeline, &snapshots, &returns, backtest_config, cancel)
        .map_err(|e| e.at(Stage::Backtest))?;

    check_cancel(cancel, Stage::Analyze)?;
    let report = metrics::analyze(&simulation.curve);
    let yearly = metrics::analyze_by_year(&simulation.curve);

    let diagnostics = Diagnostics {
        insufficient_history: signals.insufficient_history,
        zero_variance: signals.zero_variance,
        empty_universe_dates: signals.empty_universe_dates,
        missing_returns: simulation.missing_returns,
        ..base.clone()
    };
    if diagnostics.is_degraded() {
        warn!(strategy = %strategy.name, "run completed with degraded inputs");
    }

    Ok(StrategyRun {
        strategy: strategy.clone(),
        signals,
        snapshots,
        simulation,
        report,
        yearly,
        diagnostics,
    })
}

/// Blend finished runs by Sharpe ratio. `None` when no run has a positive Sharpe.
pub fn blend_runs(runs: &[StrategyRun]) -> Option<Blend> {
    let reports: Vec<StrategyReport> = runs.iter().map(StrategyRun::strategy_report).collect();
    let blended = blend::blend(&reports);
    if blended.is_none() {
        warn!(strategies = runs.len(), "no strategy with positive Sharpe, nothing to blend");
    }
    blended
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{CostModel, Rebalance};
    use crate::domain::price::PricePoint;
    use crate::domain::strategy::StrategyKind;
    use crate::domain::universe::SkipReason;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn universe() -> PriceUniverse {
        let rates: [(&str, f64); 5] = [("AAA", -0.01), ("BBB", 0.0), ("CCC", 0.005), ("DDD", 0.01), ("EEE", 0.02)];
        let points = rates
            .iter()
            .flat_map(|(symbol, rate)| {
                (0..20).map(move |i| {
                    let close = 100.0 * (1.0 + rate).powi(i as i32);
                    PricePoint {
                        date: d(1 + i),
                        symbol: symbol.to_string(),
                        open: close,
                        high: close,
                        low: close,
                        close,
                        volume: 1_000.0,
                    }
                })
            })
            .collect();
        PriceUniverse::from_points(points).0
    }

    fn backtest_config() -> BacktestConfig {
        BacktestConfig {
            start_date: d(1),
            end_date: d(31),
            initial_capital: 100_000.0,
            rebalance: Rebalance::Daily,
            cost_model: CostModel::None,
            renormalize_missing: false,
        }
    }

    fn momentum() -> Strategy {
        Strategy {
            window: 3,
            ..Strategy::with_defaults("mom", StrategyKind::Momentum)
        }
    }

    fn portfolio_config() -> PortfolioConfig {
        PortfolioConfig {
            selection: portfolio::Selection::All,
            ..Default::default()
        }
    }

    #[test]
    fn momentum_run_profits_from_trending_cross_section() {
        let run = run_strategy(
            &universe(),
            &momentum(),
            &portfolio_config(),
            &backtest_config(),
            &Diagnostics::default(),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(run.simulation.curve.len(), 20);
        assert!(run.report.total_return > 0.0);
        assert_eq!(run.report.n_days, 19);
        assert_eq!(run.diagnostics.insufficient_history, 5 * 4);
        assert_eq!(run.diagnostics.missing_returns, 0);
        for snapshot in run.snapshots.values().filter(|s| !s.weights.is_empty()) {
            assert!((snapshot.gross() - 2.0).abs() < 1e-9);
            assert!((snapshot.long_exposure() + snapshot.short_exposure()).abs() < 1e-9);
        }
    }

    #[test]
    fn cancelled_run_returns_no_result() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = run_strategy(
            &universe(),
            &momentum(),
            &portfolio_config(),
            &backtest_config(),
            &Diagnostics::default(),
            &cancel,
        )
        .unwrap_err();
        assert!(matches!(err, QuantError::Cancelled { stage: Stage::Signals }));
    }

    #[test]
    fn window_outside_data_fails_at_backtest_stage() {
        let config = BacktestConfig {
            start_date: NaiveDate::from_ymd_opt(2030, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2030, 12, 31).unwrap(),
            ..backtest_config()
        };
        let err = run_strategy(
            &universe(),
            &momentum(),
            &portfolio_config(),
            &config,
            &Diagnostics::default(),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, QuantError::StageFailed { stage: Stage::Backtest, .. }));
    }

    #[test]
    fn load_counts_carry_into_run_diagnostics() {
        let base = Diagnostics {
            dropped_rows: 3,
            skipped_symbols: vec![SkippedSymbol {
                symbol: "ZZZ".into(),
                reason: SkipReason::NoData,
            }],
            ..Default::default()
        };
        let run = run_strategy(
            &universe(),
            &momentum(),
            &portfolio_config(),
            &backtest_config(),
            &base,
            &CancelToken::new(),
        )
        .unwrap();
        assert_eq!(run.diagnostics.dropped_rows, 3);
        assert_eq!(run.diagnostics.skipped_symbols.len(), 1);
        assert!(run.diagnostics.is_degraded());
        let lines = run.diagnostics.summary_lines();
        assert!(lines.iter().any(|l| l == "3 rows dropped (unparsable date)"));
        assert!(lines.iter().any(|l| l == "1 symbols skipped"));
    }

    #[test]
    fn blend_of_losing_runs_is_none() {
        let mut run = run_strategy(
            &universe(),
            &momentum(),
            &portfolio_config(),
            &backtest_config(),
            &Diagnostics::default(),
            &CancelToken::new(),
        )
        .unwrap();
        run.report.sharpe = -1.0;
        assert!(blend_runs(&[run]).is_none());
    }
}
