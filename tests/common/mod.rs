#![allow(dead_code)]

use chrono::NaiveDate;
use quantpipe::domain::backtest::{BacktestConfig, CostModel, Rebalance};
use quantpipe::domain::error::QuantError;
pub use quantpipe::domain::price::PricePoint;
use quantpipe::domain::series::PriceUniverse;
use quantpipe::ports::data_port::DataPort;
use std::collections::HashMap;

pub struct MockDataPort {
    pub data: HashMap<String, Vec<PricePoint>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<PricePoint>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, QuantError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(QuantError::Database {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= start_date && b.date <= end_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError> {
        match self.data.get(symbol) {
            Some(bars) if !bars.is_empty() => {
                let min = bars.iter().map(|b| b.date).min().unwrap();
                let max = bars.iter().map(|b| b.date).max().unwrap();
                Ok(Some((min, max, bars.len())))
            }
            _ => Ok(None),
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(symbol: &str, date: NaiveDate, close: f64, volume: f64) -> PricePoint {
    PricePoint {
        date,
        symbol: symbol.to_string(),
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume,
    }
}

/// Consecutive calendar days from `start`, one bar per close.
pub fn bars_from_closes(symbol: &str, start: NaiveDate, closes: &[f64]) -> Vec<PricePoint> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| make_bar(symbol, start + chrono::Duration::days(i as i64), c, 1_000.0))
        .collect()
}

/// Deterministic wobbling path: drift plus two incommensurate sine terms.
pub fn wobbly_closes(n: usize, start_price: f64, drift: f64, phase: f64) -> Vec<f64> {
    (0..n)
        .map(|i| {
            let t = i as f64;
            let shock = 0.015 * (t * 0.7 + phase).sin() + 0.01 * (t * 1.9 + 2.0 * phase).cos();
            start_price * (1.0 + drift).powf(t) * (1.0 + shock)
        })
        .collect()
}

/// Volumes that spike every `period` bars.
pub fn spiky_volumes(n: usize, period: usize, phase: usize) -> Vec<f64> {
    (0..n)
        .map(|i| if (i + phase) % period == 0 { 5_000.0 } else { 1_000.0 + (i % 7) as f64 * 50.0 })
        .collect()
}

/// Eight symbols with distinct drifts over `n` days starting 2023-01-02.
pub fn sample_bars(n: usize) -> Vec<(String, Vec<PricePoint>)> {
    let start = date(2023, 1, 2);
    (0..8)
        .map(|k| {
            let symbol = format!("S{k:02}");
            let drift = (k as f64 - 3.5) * 0.0008;
            let closes = wobbly_closes(n, 50.0 + k as f64 * 10.0, drift, k as f64 * 0.9);
            let volumes = spiky_volumes(n, 5 + k, k);
            let bars: Vec<PricePoint> = closes
                .iter()
                .zip(&volumes)
                .enumerate()
                .map(|(i, (&c, &v))| make_bar(&symbol, start + chrono::Duration::days(i as i64), c, v))
                .collect();
            (symbol, bars)
        })
        .collect()
}

pub fn sample_port(n: usize) -> MockDataPort {
    sample_bars(n)
        .into_iter()
        .fold(MockDataPort::new(), |port, (s, bars)| port.with_bars(&s, bars))
}

pub fn sample_universe(n: usize) -> PriceUniverse {
    let points = sample_bars(n).into_iter().flat_map(|(_, b)| b).collect();
    PriceUniverse::from_points(points).0
}

pub fn sample_config() -> BacktestConfig {
    BacktestConfig {
        start_date: date(2023, 1, 1),
        end_date: date(2025, 12, 31),
        initial_capital: 100_000.0,
        rebalance: Rebalance::Daily,
        cost_model: CostModel::None,
        renormalize_missing: false,
    }
}
