//! Long-format CSV price table adapter.
//!
//! One file, one row per (date, symbol), columns addressed by header name:
//! `date,symbol,open,high,low,close,volume` in any order, case-insensitive.

use crate::domain::error::QuantError;
use crate::domain::price::{sort_points, PricePoint};
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

const REQUIRED_COLUMNS: [&str; 7] = ["date", "symbol", "open", "high", "low", "close", "volume"];

pub struct CsvAdapter {
    by_symbol: BTreeMap<String, Vec<PricePoint>>,
    dropped_rows: usize,
}

struct ColumnMap {
    idx: [usize; 7],
}

impl ColumnMap {
    fn from_headers(headers: &csv::StringRecord, source: &str) -> Result<Self, QuantError> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_lowercase()).collect();
        let mut idx = [0; 7];
        for (slot, column) in idx.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = names
                .iter()
                .position(|n| n == column)
                .ok_or_else(|| QuantError::MissingData {
                    source_name: source.to_string(),
                    column: column.to_string(),
                })?;
        }
        Ok(Self { idx })
    }

    fn field<'r>(&self, record: &'r csv::StringRecord, column: usize) -> &'r str {
        record.get(self.idx[column]).unwrap_or("").trim()
    }
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
fn parse_date(value: &str) -> Option<NaiveDate> {
    let day = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn parse_number(value: &str, column: &str, line: u64) -> Result<f64, QuantError> {
    value.parse::<f64>().map_err(|e| QuantError::Database {
        reason: format!("invalid {} value '{}' on line {}: {}", column, value, line, e),
    })
}

impl CsvAdapter {
    pub fn from_file(path: &Path) -> Result<Self, QuantError> {
        let file = std::fs::File::open(path).map_err(|e| QuantError::Database {
            reason: format!("failed to read {}: {}", path.display(), e),
        })?;
        Self::from_reader(file, &path.display().to_string())
    }

    pub fn from_reader(reader: impl Read, source: &str) -> Result<Self, QuantError> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let columns = ColumnMap::from_headers(rdr.headers()?, source)?;

        let mut points = Vec::new();
        let mut dropped_rows = 0;

        for result in rdr.records() {
            let record = result?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);

            let Some(date) = parse_date(columns.field(&record, 0)) else {
                dropped_rows += 1;
                continue;
            };
            let symbol = columns.field(&record, 1).to_uppercase();
            if symbol.is_empty() {
                return Err(QuantError::Database {
                    reason: format!("empty symbol on line {}", line),
                });
            }

            points.push(PricePoint {
                date,
                symbol,
                open: parse_number(columns.field(&record, 2), "open", line)?,
                high: parse_number(columns.field(&record, 3), "high", line)?,
                low: parse_number(columns.field(&record, 4), "low", line)?,
                close: parse_number(columns.field(&record, 5), "close", line)?,
                volume: parse_number(columns.field(&record, 6), "volume", line)?,
            });
        }

        if dropped_rows > 0 {
            warn!(source, dropped_rows, "rows with unparsable dates dropped");
        }

        sort_points(&mut points);
        let mut by_symbol: BTreeMap<String, Vec<PricePoint>> = BTreeMap::new();
        for point in points {
            by_symbol.entry(point.symbol.clone()).or_default().push(point);
        }
        info!(source, symbols = by_symbol.len(), "price table loaded");

        Ok(Self {
            by_symbol,
            dropped_rows,
        })
    }
}

impl DataPort for CsvAdapter {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, QuantError> {
        let bars = self
            .by_symbol
            .get(&symbol.to_uppercase())
            .ok_or_else(|| QuantError::NoData {
                symbol: symbol.to_string(),
            })?;
        Ok(bars
            .iter()
            .filter(|b| b.date >= start_date && b.date <= end_date)
            .cloned()
            .collect())
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantError> {
        Ok(self.by_symbol.keys().cloned().collect())
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError> {
        Ok(self
            .by_symbol
            .get(&symbol.to_uppercase())
            .and_then(|bars| match (bars.first(), bars.last()) {
                (Some(first), Some(last)) => Some((first.date, last.date, bars.len())),
                _ => None,
            }))
    }

    fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }
}
