//! Sharpe-weighted strategy blending.

use crate::domain::metrics::PerformanceReport;

/// A finished strategy run as seen by the blender.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyReport {
    pub name: String,
    pub description: String,
    pub report: PerformanceReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlendWeight {
    pub strategy: String,
    pub description: String,
    pub sharpe: f64,
    pub weight: f64,
    pub weight_pct: f64,
}

/// Weighted averages of the included strategies' own metrics.
///
/// This is a linear approximation. It treats the strategies as
/// independent and ignores the compounding of the combined book, so it is
/// not the performance a blended portfolio would actually realize.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlendedMetrics {
    pub annualized_return: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Blend {
    /// One entry per input, in input order; excluded strategies weigh 0.
    pub weights: Vec<BlendWeight>,
    pub expected: BlendedMetrics,
}

impl Blend {
    pub fn weight_of(&self, strategy: &str) -> Option<f64> {
        self.weights
            .iter()
            .find(|w| w.strategy == strategy)
            .map(|w| w.weight)
    }

    pub fn included(&self) -> impl Iterator<Item = &BlendWeight> {
        self.weights.iter().filter(|w| w.weight > 0.0)
    }
}

/// Allocate in proportion to positive Sharpe ratios.
///
/// Returns `None` when no strategy has a Sharpe above zero; there is no
/// blended portfolio to build in that case.
pub fn blend(reports: &[StrategyReport]) -> Option<Blend> {
    let total: f64 = reports
        .iter()
        .map(|r| r.report.sharpe)
        .filter(|s| *s > 0.0)
        .sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }

    let weights: Vec<BlendWeight> = reports
        .iter()
        .map(|r| {
            let sharpe = r.report.sharpe;
            let weight = if sharpe > 0.0 { sharpe / total } else { 0.0 };
            BlendWeight {
                strategy: r.name.clone(),
                description: r.description.clone(),
                sharpe,
                weight,
                weight_pct: weight * 100.0,
            }
        })
        .collect();

    let mut expected = BlendedMetrics::default();
    for (r, w) in reports.iter().zip(&weights) {
        expected.annualized_return += w.weight * r.report.annualized_return;
        expected.sharpe += w.weight * r.report.sharpe;
        expected.sortino += w.weight * r.report.sortino;
        expected.max_drawdown += w.weight * r.report.max_drawdown;
    }

    Some(Blend { weights, expected })
}
