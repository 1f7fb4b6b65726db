//! Daily OHLCV price record.

use chrono::NaiveDate;

/// One daily bar for one symbol. `(date, symbol)` is the record key.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub symbol: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PricePoint {
    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// close > 0 and volume >= 0, both finite.
    pub fn is_well_formed(&self) -> bool {
        self.close.is_finite() && self.close > 0.0 && self.volume.is_finite() && self.volume >= 0.0
    }

    /// Ordering key: symbol first, then date, both ascending.
    pub fn sort_key(&self) -> (&str, NaiveDate) {
        (self.symbol.as_str(), self.date)
    }
}

/// Sort rows by (symbol, date) ascending.
pub fn sort_points(points: &mut [PricePoint]) {
    points.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
}
