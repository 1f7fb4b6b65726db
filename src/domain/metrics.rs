//! Performance metrics over an equity curve.
//!
//! Zero denominators resolve to 0; no metric is ever NaN or infinite.

use crate::domain::backtest::EquityCurve;
use crate::domain::rolling::sample_stdev;
use chrono::NaiveDate;
use std::collections::BTreeMap;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe: f64,
    pub sortino: f64,
    /// Non-positive fraction of the running peak.
    pub max_drawdown: f64,
    pub win_rate: f64,
    /// Number of daily returns.
    pub n_days: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub final_value: f64,
}

fn finite_or_zero(x: f64) -> f64 {
    if x.is_finite() { x } else { 0.0 }
}

/// Summary metrics for the whole curve.
pub fn analyze(curve: &EquityCurve) -> PerformanceReport {
    let values = curve.values();
    let returns = curve.daily_returns();
    let n_days = returns.len();

    let mut report = PerformanceReport {
        n_days,
        start: curve.points.first().map(|p| p.date),
        end: curve.points.last().map(|p| p.date),
        final_value: values.last().copied().unwrap_or(0.0),
        ..Default::default()
    };
    if n_days == 0 {
        return report;
    }

    let first = values[0];
    let last = values[values.len() - 1];
    report.total_return = if first > 0.0 { last / first - 1.0 } else { 0.0 };
    report.annualized_return = finite_or_zero(
        (1.0 + report.total_return).powf(TRADING_DAYS_PER_YEAR / n_days as f64) - 1.0,
    );

    report.annualized_volatility = sample_stdev(&returns) * TRADING_DAYS_PER_YEAR.sqrt();
    report.sharpe = if report.annualized_volatility > 0.0 {
        finite_or_zero(report.annualized_return / report.annualized_volatility)
    } else {
        0.0
    };

    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_deviation = sample_stdev(&downside) * TRADING_DAYS_PER_YEAR.sqrt();
    report.sortino = if downside_deviation > 0.0 {
        finite_or_zero(report.annualized_return / downside_deviation)
    } else {
        0.0
    };

    report.max_drawdown = max_drawdown(&values);
    report.win_rate = returns.iter().filter(|r| **r > 0.0).count() as f64 / n_days as f64;
    report
}

/// The same metrics per calendar year, annualized on each year's own day
/// count. Years with fewer than two points are skipped.
pub fn analyze_by_year(curve: &EquityCurve) -> BTreeMap<i32, PerformanceReport> {
    curve
        .by_year()
        .into_iter()
        .filter(|(_, slice)| slice.len() >= 2)
        .map(|(year, slice)| (year, analyze(&slice)))
        .collect()
}

/// min over t of (v[t] - peak[t]) / peak[t].
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in values {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.min((v - peak) / peak);
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_curve(values: &[f64]) -> EquityCurve {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let dates: Vec<NaiveDate> = (0..values.len())
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect();
        EquityCurve::from_values(&dates, values)
    }

    #[test]
    fn drawdown_scenario() {
        let report = analyze(&make_curve(&[10_000.0, 9_000.0, 9_500.0, 11_000.0]));
        assert_relative_eq!(report.max_drawdown, -0.10, epsilon = 1e-12);
        assert_relative_eq!(report.total_return, 0.10, epsilon = 1e-12);
        assert_relative_eq!(report.win_rate, 2.0 / 3.0, epsilon = 1e-12);
        assert_eq!(report.n_days, 3);
        assert_relative_eq!(report.final_value, 11_000.0);
    }

    #[test]
    fn flat_series_is_all_zero_not_nan() {
        let report = analyze(&make_curve(&[10_000.0; 30]));
        assert_eq!(report.annualized_volatility, 0.0);
        assert_eq!(report.sharpe, 0.0);
        assert_eq!(report.sortino, 0.0);
        assert_eq!(report.win_rate, 0.0);
        assert_eq!(report.max_drawdown, 0.0);
        assert_eq!(report.total_return, 0.0);
        assert_eq!(report.annualized_return, 0.0);
    }

    #[test]
    fn annualized_return_compounds_over_day_count() {
        // 126 daily returns doubling the curve is a 300% annual rate
        let mut values = vec![100.0];
        let daily = 2.0_f64.powf(1.0 / 126.0);
        for _ in 0..126 {
            let last = *values.last().unwrap();
            values.push(last * daily);
        }
        let report = analyze(&make_curve(&values));
        assert_relative_eq!(report.total_return, 1.0, epsilon = 1e-9);
        assert_relative_eq!(report.annualized_return, 3.0, epsilon = 1e-9);
    }

    #[test]
    fn sharpe_is_return_over_volatility() {
        let report = analyze(&make_curve(&[100.0, 101.0, 100.5, 102.0, 101.0, 103.0]));
        let returns = make_curve(&[100.0, 101.0, 100.5, 102.0, 101.0, 103.0]).daily_returns();
        let vol = sample_stdev(&returns) * 252.0_f64.sqrt();
        assert_relative_eq!(report.annualized_volatility, vol, epsilon = 1e-12);
        assert_relative_eq!(report.sharpe, report.annualized_return / vol, epsilon = 1e-12);
        assert!(report.sortino > report.sharpe);
    }

    #[test]
    fn sortino_zero_without_enough_negative_days() {
        let report = analyze(&make_curve(&[100.0, 101.0, 102.0, 103.0]));
        assert_eq!(report.sortino, 0.0);
        assert!(report.sharpe > 0.0);
        assert_eq!(report.win_rate, 1.0);
    }

    #[test]
    fn single_point_curve_is_empty_report() {
        let report = analyze(&make_curve(&[100.0]));
        assert_eq!(report.n_days, 0);
        assert_eq!(report.total_return, 0.0);
        assert_eq!(report.final_value, 100.0);
    }

    #[test]
    fn max_drawdown_takes_deepest_trough() {
        let dd = max_drawdown(&[100.0, 110.0, 90.0, 95.0, 80.0, 100.0]);
        assert_relative_eq!(dd, (80.0 - 110.0) / 110.0, epsilon = 1e-12);
        assert_eq!(max_drawdown(&[]), 0.0);
    }

    #[test]
    fn yearly_breakdown_skips_short_years() {
        let dates = vec![
            NaiveDate::from_ymd_opt(2022, 12, 30).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 3).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 4).unwrap(),
            NaiveDate::from_ymd_opt(2023, 1, 5).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
        ];
        let curve = EquityCurve::from_values(&dates, &[100.0, 100.0, 110.0, 99.0, 99.0, 99.0]);
        let years = analyze_by_year(&curve);
        assert_eq!(years.keys().copied().collect::<Vec<_>>(), vec![2023, 2024]);
        assert_relative_eq!(years[&2023].total_return, -0.01, epsilon = 1e-12);
        assert_relative_eq!(years[&2023].max_drawdown, -0.10, epsilon = 1e-12);
        assert_eq!(years[&2023].n_days, 2);
        assert_eq!(years[&2024].sharpe, 0.0);
    }
}
