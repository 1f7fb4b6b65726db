//! Per-symbol price series and the unified date axis.

use crate::domain::price::PricePoint;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Realized close-to-close returns, keyed by symbol then by the date the return is realized.
pub type ReturnTable = BTreeMap<String, BTreeMap<NaiveDate, f64>>;

#[derive(Debug, Clone)]
pub struct SymbolSeries {
    pub symbol: String,
    pub points: Vec<PricePoint>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl SymbolSeries {
    /// Sorts by date; a repeated date keeps the last row seen.
    /// Returns the series and how many duplicate rows were discarded.
    pub fn new(symbol: String, mut points: Vec<PricePoint>) -> (Self, usize) {
        points.sort_by_key(|p| p.date);
        let before = points.len();
        let mut deduped: Vec<PricePoint> = Vec::with_capacity(before);
        for point in points {
            match deduped.last_mut() {
                Some(last) if last.date == point.date => *last = point,
                _ => deduped.push(point),
            }
        }
        let duplicates = before - deduped.len();
        let date_index = deduped
            .iter()
            .enumerate()
            .map(|(i, p)| (p.date, i))
            .collect();
        (
            Self {
                symbol,
                points: deduped,
                date_index,
            },
            duplicates,
        )
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, date: NaiveDate) -> Option<&PricePoint> {
        self.date_index.get(&date).map(|&i| &self.points[i])
    }

    pub fn index_of(&self, date: NaiveDate) -> Option<usize> {
        self.date_index.get(&date).copied()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.volume).collect()
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.points.iter().map(|p| p.date).collect()
    }

    /// Last close at or before `date`.
    pub fn close_as_of(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.points.partition_point(|p| p.date <= date);
        idx.checked_sub(1).map(|i| self.points[i].close)
    }

    /// Close-to-close returns keyed by the later bar's date. The first bar has none.
    pub fn daily_returns(&self) -> BTreeMap<NaiveDate, f64> {
        self.points
            .windows(2)
            .filter(|w| w[0].close > 0.0)
            .map(|w| (w[1].date, w[1].close / w[0].close - 1.0))
            .collect()
    }
}

/// The full cross-section of symbol series entering the pipeline.
#[derive(Debug, Clone, Default)]
pub struct PriceUniverse {
    pub series: BTreeMap<String, SymbolSeries>,
}

impl PriceUniverse {
    /// Groups raw rows by symbol. Returns the universe and the duplicate-row count.
    pub fn from_points(points: Vec<PricePoint>) -> (Self, usize) {
        let mut grouped: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();
        for point in points {
            grouped.entry(point.symbol.clone()).or_default().push(point);
        }
        let mut duplicates = 0;
        let series = grouped
            .into_iter()
            .map(|(symbol, pts)| {
                let (s, dups) = SymbolSeries::new(symbol.clone(), pts);
                duplicates += dups;
                (symbol, s)
            })
            .collect();
        (Self { series }, duplicates)
    }

    pub fn symbol_count(&self) -> usize {
        self.series.len()
    }

    pub fn symbols(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolSeries> {
        self.series.get(symbol)
    }

    pub fn timeline(&self) -> Vec<NaiveDate> {
        build_unified_timeline(self.series.values())
    }

    pub fn daily_returns(&self) -> ReturnTable {
        self.series
            .iter()
            .map(|(symbol, s)| (symbol.clone(), s.daily_returns()))
            .collect()
    }

    /// A copy holding only rows dated on or before `date`.
    pub fn truncated(&self, date: NaiveDate) -> Self {
        let series = self
            .series
            .iter()
            .map(|(symbol, s)| {
                let kept: Vec<PricePoint> =
                    s.points.iter().filter(|p| p.date <= date).cloned().collect();
                (symbol.clone(), SymbolSeries::new(symbol.clone(), kept).0)
            })
            .filter(|(_, s)| !s.is_empty())
            .collect();
        Self { series }
    }
}

pub fn build_unified_timeline<'a>(
    series: impl IntoIterator<Item = &'a SymbolSeries>,
) -> Vec<NaiveDate> {
    let unique: BTreeSet<NaiveDate> = series
        .into_iter()
        .flat_map(|s| s.points.iter().map(|p| p.date))
        .collect();
    unique.into_iter().collect()
}

/// Last known value at or before `date`.
pub fn as_of<T: Copy>(values: &BTreeMap<NaiveDate, T>, date: NaiveDate) -> Option<T> {
    values.range(..=date).next_back().map(|(_, v)| *v)
}

/// As-of join of several labelled series onto `axis`. Dates before a series'
/// first observation yield `None` for that series.
pub fn align_as_of(
    axis: &[NaiveDate],
    columns: &[(String, BTreeMap<NaiveDate, f64>)],
) -> Vec<(NaiveDate, Vec<Option<f64>>)> {
    axis.iter()
        .map(|&date| {
            let row = columns.iter().map(|(_, col)| as_of(col, date)).collect();
            (date, row)
        })
        .collect()
}
