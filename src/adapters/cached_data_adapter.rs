//! Caching decorator for any [`DataPort`].

use crate::domain::error::QuantError;
use crate::domain::price::PricePoint;
use crate::ports::cache_port::CachePort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use tracing::debug;

const PRICES: &str = "prices";

/// Serves repeated `fetch_prices` calls for the same (symbol, window) from a cache.
pub struct CachedDataPort<D, C> {
    inner: D,
    cache: C,
}

impl<D, C> CachedDataPort<D, C>
where
    D: DataPort,
    C: CachePort<Vec<PricePoint>>,
{
    pub fn new(inner: D, cache: C) -> Self {
        Self { inner, cache }
    }

    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Drop cached windows for one symbol, or all symbols with `None`.
    pub fn refresh(&self, symbol: Option<&str>) {
        match symbol {
            Some(s) => self.cache.invalidate_category(&category(s)),
            None => {
                if let Ok(symbols) = self.inner.list_symbols() {
                    for s in symbols {
                        self.cache.invalidate_category(&category(&s));
                    }
                }
            }
        }
    }
}

fn category(symbol: &str) -> String {
    format!("{PRICES}:{}", symbol.to_uppercase())
}

fn window_key(start_date: NaiveDate, end_date: NaiveDate) -> String {
    format!("{start_date}..{end_date}")
}

impl<D, C> DataPort for CachedDataPort<D, C>
where
    D: DataPort,
    C: CachePort<Vec<PricePoint>>,
{
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, QuantError> {
        let category = category(symbol);
        let key = window_key(start_date, end_date);
        if let Some((bars, age)) = self.cache.get(&category, &key) {
            debug!(%symbol, age_ms = age.as_millis() as u64, "price cache hit");
            return Ok(bars);
        }
        let bars = self.inner.fetch_prices(symbol, start_date, end_date)?;
        self.cache.put(&category, &key, bars.clone());
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantError> {
        self.inner.list_symbols()
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError> {
        self.inner.get_data_range(symbol)
    }

    fn dropped_rows(&self) -> usize {
        self.inner.dropped_rows()
    }
}
