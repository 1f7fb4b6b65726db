//! CSV artefact writer.
//!
//! Per run: `<strategy>_equity.csv`, `<strategy>_signals.csv` and
//! `<strategy>_yearly.csv`. Across runs: `equity_comparison.csv` and
//! `weights.csv`.

use crate::domain::blend::Blend;
use crate::domain::error::QuantError;
use crate::domain::pipeline::StrategyRun;
use crate::domain::series::align_as_of;
use crate::ports::report_port::ReportPort;
use chrono::NaiveDate;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Default, Clone, Copy)]
pub struct CsvReportAdapter;

/// File-name-safe form of a strategy name.
pub fn slug(name: &str) -> String {
    let s: String = name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if s.is_empty() { "strategy".to_string() } else { s }
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}

fn prepare(directory: &Path, file: &str) -> Result<PathBuf, QuantError> {
    fs::create_dir_all(directory)?;
    Ok(directory.join(file))
}

impl CsvReportAdapter {
    fn write_equity(run: &StrategyRun, path: &Path) -> Result<(), QuantError> {
        let mut w = csv::Writer::from_path(path)?;
        w.write_record(["date", "portfolio_value"])?;
        for p in &run.simulation.curve.points {
            w.write_record([p.date.to_string(), format!("{:.6}", p.value)])?;
        }
        w.flush()?;
        Ok(())
    }

    fn write_signals(run: &StrategyRun, path: &Path) -> Result<(), QuantError> {
        let mut w = csv::Writer::from_path(path)?;
        w.write_record(["date", "symbol", "position", "percentile", "value"])?;
        for s in run.signals.iter() {
            w.write_record([
                s.date.to_string(),
                s.symbol.clone(),
                s.position.sign().to_string(),
                fmt_opt(s.percentile),
                fmt_opt(s.value),
            ])?;
        }
        w.flush()?;
        Ok(())
    }

    fn write_yearly(run: &StrategyRun, path: &Path) -> Result<(), QuantError> {
        let mut w = csv::Writer::from_path(path)?;
        w.write_record([
            "year",
            "total_return",
            "annualized_return",
            "annualized_volatility",
            "sharpe_ratio",
            "sortino_ratio",
            "max_drawdown",
            "win_rate",
            "n_days",
        ])?;
        let rows = run
            .yearly
            .iter()
            .map(|(year, r)| (year.to_string(), r))
            .chain(std::iter::once(("all".to_string(), &run.report)));
        for (label, r) in rows {
            w.write_record([
                label,
                format!("{:.6}", r.total_return),
                format!("{:.6}", r.annualized_return),
                format!("{:.6}", r.annualized_volatility),
                format!("{:.6}", r.sharpe),
                format!("{:.6}", r.sortino),
                format!("{:.6}", r.max_drawdown),
                format!("{:.6}", r.win_rate),
                r.n_days.to_string(),
            ])?;
        }
        w.flush()?;
        Ok(())
    }
}

impl ReportPort for CsvReportAdapter {
    fn write_run(&self, run: &StrategyRun, directory: &Path) -> Result<(), QuantError> {
        let name = slug(&run.strategy.name);
        Self::write_equity(run, &prepare(directory, &format!("{name}_equity.csv"))?)?;
        Self::write_signals(run, &prepare(directory, &format!("{name}_signals.csv"))?)?;
        Self::write_yearly(run, &prepare(directory, &format!("{name}_yearly.csv"))?)?;
        info!(strategy = %run.strategy.name, directory = %directory.display(), "run artefacts written");
        Ok(())
    }

    fn write_comparison(&self, runs: &[StrategyRun], directory: &Path) -> Result<(), QuantError> {
        let axis: Vec<NaiveDate> = runs
            .iter()
            .flat_map(|r| r.simulation.curve.points.iter().map(|p| p.date))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let columns: Vec<(String, _)> = runs
            .iter()
            .map(|r| (r.strategy.name.clone(), r.simulation.curve.as_map()))
            .collect();

        let mut w = csv::Writer::from_path(prepare(directory, "equity_comparison.csv")?)?;
        w.write_record(["date", "portfolio_value", "strategy"])?;
        for (date, row) in align_as_of(&axis, &columns) {
            for ((name, _), value) in columns.iter().zip(row) {
                if let Some(v) = value {
                    w.write_record([date.to_string(), format!("{v:.6}"), name.clone()])?;
                }
            }
        }
        w.flush()?;
        Ok(())
    }

    fn write_blend(&self, blend: &Blend, directory: &Path) -> Result<(), QuantError> {
        let mut w = csv::Writer::from_path(prepare(directory, "weights.csv")?)?;
        w.write_record(["strategy", "description", "sharpe_ratio", "weight", "weight_pct"])?;
        for bw in &blend.weights {
            w.write_record([
                bw.strategy.clone(),
                bw.description.clone(),
                format!("{:.6}", bw.sharpe),
                format!("{:.10}", bw.weight),
                format!("{:.4}", bw.weight_pct),
            ])?;
        }
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backtest::{EquityCurve, SimulationResult};
    use crate::domain::blend::{blend, StrategyReport};
    use crate::domain::metrics::{self, PerformanceReport};
    use crate::domain::pipeline::Diagnostics;
    use crate::domain::signal::{Position, Signal, SignalBook};
    use crate::domain::strategy::{Strategy, StrategyKind};
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn run(name: &str, dates: &[NaiveDate], values: &[f64]) -> StrategyRun {
        let curve = EquityCurve::from_values(dates, values);
        let signals = SignalBook::from_signals(vec![
            Signal {
                date: dates[0],
                symbol: "AAA".into(),
                position: Position::Long,
                percentile: Some(100.0),
                value: Some(1.5),
                score: 1.5,
            },
            Signal::flat(dates[0], "BBB"),
        ]);
        StrategyRun {
            strategy: Strategy::with_defaults(name, StrategyKind::Momentum),
            signals,
            snapshots: BTreeMap::new(),
            report: metrics::analyze(&curve),
            yearly: metrics::analyze_by_year(&curve),
            simulation: SimulationResult {
                curve,
                turnover: BTreeMap::new(),
                total_cost: 0.0,
                rebalances: 0,
                missing_returns: 0,
            },
            diagnostics: Diagnostics::default(),
        }
    }

    #[test]
    fn slug_replaces_unsafe_characters() {
        assert_eq!(slug("Kurtosis Reversal/v2"), "kurtosis_reversal_v2");
        assert_eq!(slug("  "), "strategy");
    }

    #[test]
    fn write_run_produces_three_tables() {
        let dir = TempDir::new().unwrap();
        let r = run("Mom 30", &[d(2), d(3), d(4)], &[100.0, 101.0, 99.0]);
        CsvReportAdapter.write_run(&r, dir.path()).unwrap();

        let equity = fs::read_to_string(dir.path().join("mom_30_equity.csv")).unwrap();
        let lines: Vec<&str> = equity.lines().collect();
        assert_eq!(lines[0], "date,portfolio_value");
        assert_eq!(lines[1], "2024-01-02,100.000000");
        assert_eq!(lines.len(), 4);

        let signals = fs::read_to_string(dir.path().join("mom_30_signals.csv")).unwrap();
        assert!(signals.contains("2024-01-02,AAA,1,100.000000,1.500000"));
        assert!(signals.contains("2024-01-02,BBB,0,,"));

        let yearly = fs::read_to_string(dir.path().join("mom_30_yearly.csv")).unwrap();
        assert!(yearly.lines().any(|l| l.starts_with("2024,")));
        assert!(yearly.lines().any(|l| l.starts_with("all,")));
    }

    #[test]
    fn comparison_aligns_curves_as_of() {
        let dir = TempDir::new().unwrap();
        let a = run("a", &[d(2), d(3), d(5)], &[100.0, 101.0, 102.0]);
        let b = run("b", &[d(3), d(4)], &[200.0, 210.0]);
        CsvReportAdapter
            .write_comparison(&[a, b], dir.path())
            .unwrap();
        let text = fs::read_to_string(dir.path().join("equity_comparison.csv")).unwrap();
        // "a" has no point on the 4th and carries the 3rd forward
        assert!(text.contains("2024-01-04,101.000000,a"));
        assert!(text.contains("2024-01-05,210.000000,b"));
        // "b" starts on the 3rd
        assert!(!text.contains("2024-01-02,200.000000,b"));
    }

    #[test]
    fn weights_table_sums_to_one() {
        let dir = TempDir::new().unwrap();
        let reports: Vec<StrategyReport> = [("a", 0.5), ("b", -0.2), ("c", 0.3)]
            .iter()
            .map(|(n, s)| StrategyReport {
                name: n.to_string(),
                description: format!("{n} desc"),
                report: PerformanceReport {
                    sharpe: *s,
                    ..Default::default()
                },
            })
            .collect();
        let blend = blend(&reports).unwrap();
        CsvReportAdapter.write_blend(&blend, dir.path()).unwrap();

        let mut rdr = csv::Reader::from_path(dir.path().join("weights.csv")).unwrap();
        let headers = rdr.headers().unwrap().clone();
        assert_eq!(
            headers.iter().collect::<Vec<_>>(),
            vec!["strategy", "description", "sharpe_ratio", "weight", "weight_pct"]
        );
        let total: f64 = rdr
            .records()
            .map(|r| r.unwrap()[3].parse::<f64>().unwrap())
            .sum();
        assert!((total - 1.0).abs() < 1e-6);
    }
}
