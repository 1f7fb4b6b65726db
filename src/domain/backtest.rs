//! Daily equity simulation over a weight-snapshot sequence.
//!
//! Weights decided at date `t` earn the returns realized at the next timeline
//! date: `value[t+1] = value[t] * (1 + sum(w_t[s] * r_{t+1}[s]))`. The
//! simulator is the only stateful stage; it walks the timeline in order.

use crate::domain::error::{QuantError, Stage};
use crate::domain::portfolio::PortfolioSnapshot;
use crate::domain::series::ReturnTable;
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rebalance {
    /// Replace weights with every new snapshot.
    Daily,
    /// Replace weights only when the set of (symbol, side) changes.
    OnChange,
}

impl Rebalance {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "daily" => Some(Rebalance::Daily),
            "on_change" => Some(Rebalance::OnChange),
            _ => None,
        }
    }
}

/// Trading-cost switch. `None` means turnover is free, stated explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostModel {
    None,
    /// Fraction of turnover (sum of absolute weight changes) paid per rebalance.
    Proportional { rate: f64 },
}

impl CostModel {
    pub fn cost(&self, turnover: f64) -> f64 {
        match *self {
            CostModel::None => 0.0,
            CostModel::Proportional { rate } => rate * turnover,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BacktestConfig {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub initial_capital: f64,
    pub rebalance: Rebalance,
    pub cost_model: CostModel,
    /// Scale a leg's surviving weights up when some of its symbols lack a return.
    pub renormalize_missing: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub value: f64,
}

/// Portfolio value per date, strictly increasing in date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EquityCurve {
    pub points: Vec<EquityPoint>,
}

impl EquityCurve {
    pub fn from_values(dates: &[NaiveDate], values: &[f64]) -> Self {
        EquityCurve {
            points: dates
                .iter()
                .zip(values)
                .map(|(&date, &value)| EquityPoint { date, value })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.value).collect()
    }

    /// `value[t] / value[t-1] - 1`; a non-positive prior value yields 0.
    pub fn daily_returns(&self) -> Vec<f64> {
        self.points
            .windows(2)
            .map(|w| {
                if w[0].value > 0.0 {
                    w[1].value / w[0].value - 1.0
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// Calendar-year slices, in year order.
    pub fn by_year(&self) -> BTreeMap<i32, EquityCurve> {
        let mut years: BTreeMap<i32, EquityCurve> = BTreeMap::new();
        for point in &self.points {
            years
                .entry(point.date.year())
                .or_default()
                .points
                .push(point.clone());
        }
        years
    }

    pub fn as_map(&self) -> BTreeMap<NaiveDate, f64> {
        self.points.iter().map(|p| (p.date, p.value)).collect()
    }
}

/// Cooperative cancellation flag, polled once per simulated date.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub curve: EquityCurve,
    /// Turnover on each rebalance date.
    pub turnover: BTreeMap<NaiveDate, f64>,
    /// Currency paid in trading costs.
    pub total_cost: f64,
    pub rebalances: usize,
    /// (symbol, date) pairs held without a realized return.
    pub missing_returns: usize,
}

fn sides(weights: &BTreeMap<String, f64>) -> BTreeMap<&str, i8> {
    weights
        .iter()
        .map(|(s, w)| (s.as_str(), if *w > 0.0 { 1 } else { -1 }))
        .collect()
}

fn turnover(old: &BTreeMap<String, f64>, new: &BTreeMap<String, f64>) -> f64 {
    let changed: f64 = new
        .iter()
        .map(|(s, w)| (w - old.get(s).copied().unwrap_or(0.0)).abs())
        .sum();
    let closed: f64 = old
        .iter()
        .filter(|(s, _)| !new.contains_key(*s))
        .map(|(_, w)| w.abs())
        .sum();
    changed + closed
}

/// Portfolio return for one day, and how many held symbols had no return.
fn day_return(
    weights: &BTreeMap<String, f64>,
    returns: &ReturnTable,
    date: NaiveDate,
    renormalize_missing: bool,
) -> (f64, usize) {
    let mut missing = 0;
    // (leg total |w|, leg present |w|, leg contribution)
    let mut legs = [(0.0, 0.0, 0.0); 2];

    for (symbol, &w) in weights {
        let leg = &mut legs[usize::from(w < 0.0)];
        leg.0 += w.abs();
        match returns.get(symbol).and_then(|r| r.get(&date)) {
            Some(&r) if r.is_finite() => {
                leg.1 += w.abs();
                leg.2 += w * r;
            }
            _ => missing += 1,
        }
    }

    let total: f64 = legs
        .iter()
        .map(|&(gross, present, contribution)| {
            if renormalize_missing && present > 0.0 {
                contribution * gross / present
            } else {
                contribution
            }
        })
        .sum();
    (total, missing)
}

/// Replay `snapshots` over `timeline`. The first curve point is the initial
/// capital on the first date. Cancellation discards everything computed so far.
pub fn simulate(
    timeline: &[NaiveDate],
    snapshots: &BTreeMap<NaiveDate, PortfolioSnapshot>,
    returns: &ReturnTable,
    config: &BacktestConfig,
    cancel: &CancelToken,
) -> Result<SimulationResult, QuantError> {
    if timeline.is_empty() {
        return Err(QuantError::NoData {
            symbol: "timeline".into(),
        });
    }

    let mut value = config.initial_capital;
    let mut current: BTreeMap<String, f64> = BTreeMap::new();
    let mut points = Vec::with_capacity(timeline.len());
    let mut turnover_log = BTreeMap::new();
    let mut total_cost = 0.0;
    let mut rebalances = 0;
    let mut missing_returns = 0;

    for (i, &date) in timeline.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(QuantError::Cancelled {
                stage: Stage::Backtest,
            });
        }

        if i > 0 && !current.is_empty() {
            let (r, missing) = day_return(&current, returns, date, config.renormalize_missing);
            missing_returns += missing;
            value *= 1.0 + r;
        }
        points.push(EquityPoint { date, value });

        // weights chosen on the final date would never earn a return
        if i + 1 == timeline.len() {
            break;
        }
        let Some(snapshot) = snapshots.get(&date) else {
            continue;
        };
        let replace = match config.rebalance {
            Rebalance::Daily => snapshot.weights != current,
            Rebalance::OnChange => snapshot.sides() != sides(&current),
        };
        if !replace {
            continue;
        }

        let traded = turnover(&current, &snapshot.weights);
        let cost_fraction = config.cost_model.cost(traded);
        total_cost += value * cost_fraction;
        value *= 1.0 - cost_fraction;
        turnover_log.insert(date, traded);
        rebalances += 1;
        current = snapshot.weights.clone();
        debug!(%date, turnover = traded, holdings = current.len(), "rebalanced");
    }

    Ok(SimulationResult {
        curve: EquityCurve { points },
        turnover: turnover_log,
        total_cost,
        rebalances,
        missing_returns,
    })
}
