//! Causal rolling statistics.
//!
//! Every statistic at bar `i` is computed over a trailing window that ends at
//! bar `i - 1`; the current bar's close never enters its own window. Where a
//! statistic also needs "today" (RVOL, volume divergence) only bar `i`'s own
//! volume or return is combined with the trailing window. Bars without enough
//! history are marked invalid.

use crate::domain::series::SymbolSeries;
use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatKind {
    /// Highest close of the previous n bars.
    RollingMax(usize),
    /// Lowest close of the previous n bars.
    RollingMin(usize),
    /// Average daily volume of the previous n bars.
    Adv(usize),
    /// Today's volume over ADV(n).
    Rvol(usize),
    /// Bias-corrected excess kurtosis of the previous n daily returns.
    Kurtosis(usize),
    /// Volume z-score against the previous n bars, signed by today's return.
    VolumeDivergence(usize),
    /// Return over the n bars ending at the previous close.
    TrailingReturn(usize),
}

impl StatKind {
    /// Bars needed before the first valid value.
    pub fn warmup(&self) -> usize {
        match *self {
            StatKind::RollingMax(n)
            | StatKind::RollingMin(n)
            | StatKind::Adv(n)
            | StatKind::Rvol(n)
            | StatKind::VolumeDivergence(n) => n,
            StatKind::Kurtosis(n) | StatKind::TrailingReturn(n) => n + 1,
        }
    }
}

impl fmt::Display for StatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatKind::RollingMax(n) => write!(f, "MAX({})", n),
            StatKind::RollingMin(n) => write!(f, "MIN({})", n),
            StatKind::Adv(n) => write!(f, "ADV({})", n),
            StatKind::Rvol(n) => write!(f, "RVOL({})", n),
            StatKind::Kurtosis(n) => write!(f, "KURTOSIS({})", n),
            StatKind::VolumeDivergence(n) => write!(f, "VOLDIV({})", n),
            StatKind::TrailingReturn(n) => write!(f, "RETURN({})", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatPoint {
    pub date: NaiveDate,
    pub valid: bool,
    pub value: f64,
}

#[derive(Debug, Clone)]
pub struct RollingSeries {
    pub kind: StatKind,
    pub values: Vec<StatPoint>,
    /// Valid points whose denominator was zero and fell back to 0.
    pub zero_variance: usize,
}

impl RollingSeries {
    pub fn value_at(&self, index: usize) -> Option<f64> {
        self.values
            .get(index)
            .filter(|p| p.valid)
            .map(|p| p.value)
    }
}

/// Compute `kind` for every bar of `series`.
pub fn compute(series: &SymbolSeries, kind: StatKind) -> RollingSeries {
    let closes = series.closes();
    let volumes = series.volumes();
    let mut zero_variance = 0;

    let raw: Vec<Option<f64>> = match kind {
        StatKind::RollingMax(n) => trailing(&closes, n, |w| {
            w.iter().copied().fold(f64::NEG_INFINITY, f64::max)
        }),
        StatKind::RollingMin(n) => trailing(&closes, n, |w| {
            w.iter().copied().fold(f64::INFINITY, f64::min)
        }),
        StatKind::Adv(n) => trailing(&volumes, n, mean),
        StatKind::Rvol(n) => {
            let adv = trailing(&volumes, n, mean);
            adv.iter()
                .zip(&volumes)
                .map(|(adv, &v)| {
                    adv.map(|a| {
                        if a > 0.0 {
                            v / a
                        } else {
                            zero_variance += 1;
                            0.0
                        }
                    })
                })
                .collect()
        }
        StatKind::Kurtosis(n) => {
            let returns = simple_returns(&closes);
            (0..closes.len())
                .map(|i| {
                    if n < 4 || i < n + 1 {
                        return None;
                    }
                    // returns[j] is the return realized on bar j + 1
                    let window = &returns[i - n - 1..i - 1];
                    match kurtosis_excess(window) {
                        Some(k) => Some(k),
                        None => {
                            zero_variance += 1;
                            Some(0.0)
                        }
                    }
                })
                .collect()
        }
        StatKind::VolumeDivergence(n) => {
            let means = trailing(&volumes, n, mean);
            let stdevs = trailing(&volumes, n, sample_stdev);
            (0..closes.len())
                .map(|i| {
                    let (m, s) = (means[i]?, stdevs[i]?);
                    if n < 2 || i == 0 {
                        return None;
                    }
                    if s <= 0.0 {
                        zero_variance += 1;
                        return Some(0.0);
                    }
                    let direction = (closes[i] - closes[i - 1]).signum();
                    let direction = if closes[i] == closes[i - 1] { 0.0 } else { direction };
                    Some((volumes[i] - m) / s * direction)
                })
                .collect()
        }
        StatKind::TrailingReturn(n) => (0..closes.len())
            .map(|i| {
                if n == 0 || i < n + 1 {
                    return None;
                }
                let base = closes[i - 1 - n];
                (base > 0.0).then(|| closes[i - 1] / base - 1.0)
            })
            .collect(),
    };

    let values = series
        .points
        .iter()
        .zip(raw)
        .map(|(p, v)| StatPoint {
            date: p.date,
            valid: v.is_some_and(f64::is_finite),
            value: v.filter(|x| x.is_finite()).unwrap_or(0.0),
        })
        .collect();

    RollingSeries {
        kind,
        values,
        zero_variance,
    }
}

/// Apply `f` to the `n` values strictly before each index.
fn trailing(values: &[f64], n: usize, f: impl Fn(&[f64]) -> f64) -> Vec<Option<f64>> {
    (0..values.len())
        .map(|i| (n > 0 && i >= n).then(|| f(&values[i - n..i])))
        .collect()
}

fn simple_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator); 0 with fewer than two values.
pub fn sample_stdev(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}

/// Bias-corrected excess kurtosis. `None` when the window has zero variance
/// or fewer than four values.
pub fn kurtosis_excess(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 4 {
        return None;
    }
    let nf = n as f64;
    let m = mean(values);
    let m2 = values.iter().map(|x| (x - m).powi(2)).sum::<f64>();
    if m2 <= f64::EPSILON * f64::EPSILON {
        return None;
    }
    let m4 = values.iter().map(|x| (x - m).powi(4)).sum::<f64>();
    let g = nf * (nf + 1.0) * m4 / ((nf - 1.0) * (nf - 2.0) * (nf - 3.0) * (m2 / (nf - 1.0)).powi(2));
    let correction = 3.0 * (nf - 1.0).powi(2) / ((nf - 2.0) * (nf - 3.0));
    Some(g - correction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::price::PricePoint;

    fn make_series(closes: &[f64], volumes: &[f64]) -> SymbolSeries {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let points = closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (&close, &volume))| PricePoint {
                date: start + chrono::Duration::days(i as i64),
                symbol: "TEST".into(),
                open: close,
                high: close,
                low: close,
                close,
                volume,
            })
            .collect();
        SymbolSeries::new("TEST".into(), points).0
    }

    fn closes_only(closes: &[f64]) -> SymbolSeries {
        make_series(closes, &vec![1000.0; closes.len()])
    }

    #[test]
    fn rolling_max_excludes_current_bar() {
        let s = closes_only(&[1.0, 3.0, 2.0, 10.0, 4.0]);
        let r = compute(&s, StatKind::RollingMax(2));
        assert!(!r.values[0].valid);
        assert!(!r.values[1].valid);
        assert_eq!(r.value_at(2), Some(3.0));
        // bar 3 closes at 10 but its window is bars 1..=2
        assert_eq!(r.value_at(3), Some(3.0));
        assert_eq!(r.value_at(4), Some(10.0));
    }

    #[test]
    fn rolling_min_warmup_and_values() {
        let s = closes_only(&[5.0, 4.0, 6.0, 1.0]);
        let r = compute(&s, StatKind::RollingMin(3));
        assert_eq!(r.value_at(2), None);
        assert_eq!(r.value_at(3), Some(4.0));
    }

    #[test]
    fn adv_and_rvol() {
        let s = make_series(&[1.0; 4], &[100.0, 200.0, 300.0, 500.0]);
        let adv = compute(&s, StatKind::Adv(2));
        assert_eq!(adv.value_at(3), Some(250.0));
        let rvol = compute(&s, StatKind::Rvol(2));
        assert_eq!(rvol.value_at(3), Some(2.0));
    }

    #[test]
    fn rvol_zero_adv_falls_back_to_zero() {
        let s = make_series(&[1.0; 3], &[0.0, 0.0, 50.0]);
        let rvol = compute(&s, StatKind::Rvol(2));
        assert_eq!(rvol.value_at(2), Some(0.0));
        assert_eq!(rvol.zero_variance, 1);
    }

    #[test]
    fn trailing_return_uses_previous_close() {
        let s = closes_only(&[100.0, 110.0, 121.0, 500.0]);
        let r = compute(&s, StatKind::TrailingReturn(2));
        assert_eq!(r.value_at(2), None);
        let v = r.value_at(3).unwrap();
        assert!((v - 0.21).abs() < 1e-12);
    }

    #[test]
    fn kurtosis_matches_known_value() {
        // pd.Series([1, 2, 3, 4, 10]).kurt() == 3.152
        let k = kurtosis_excess(&[1.0, 2.0, 3.0, 4.0, 10.0]).unwrap();
        assert!((k - 3.152).abs() < 1e-9);
    }

    #[test]
    fn kurtosis_zero_variance_is_none() {
        assert!(kurtosis_excess(&[0.01; 6]).is_none());
        assert!(kurtosis_excess(&[0.01, 0.02]).is_none());
    }

    #[test]
    fn kurtosis_series_flat_prices_counts_zero_variance() {
        let s = closes_only(&[100.0; 10]);
        let r = compute(&s, StatKind::Kurtosis(5));
        assert!(!r.values[5].valid);
        assert_eq!(r.value_at(6), Some(0.0));
        assert_eq!(r.zero_variance, 4);
    }

    #[test]
    fn volume_divergence_signed_by_return() {
        let s = make_series(
            &[10.0, 10.0, 10.0, 11.0, 10.0],
            &[100.0, 200.0, 300.0, 400.0, 400.0],
        );
        let r = compute(&s, StatKind::VolumeDivergence(3));
        // window 100,200,300: mean 200, stdev 100, up day
        assert!((r.value_at(3).unwrap() - 2.0).abs() < 1e-12);
        // window 200,300,400: mean 300, stdev 100, down day
        assert!((r.value_at(4).unwrap() - (-1.0)).abs() < 1e-12);
    }

    #[test]
    fn sample_stdev_known_value() {
        let v = sample_stdev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((v - (32.0_f64 / 7.0).sqrt()).abs() < 1e-12);
        assert_eq!(sample_stdev(&[1.0]), 0.0);
    }

    #[test]
    fn stat_kind_display() {
        assert_eq!(StatKind::Kurtosis(30).to_string(), "KURTOSIS(30)");
        assert_eq!(StatKind::RollingMax(50).to_string(), "MAX(50)");
    }
}
