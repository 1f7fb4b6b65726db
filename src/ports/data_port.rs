//! Price data access port.

use crate::domain::error::QuantError;
use crate::domain::price::PricePoint;
use chrono::NaiveDate;

pub trait DataPort {
    /// Bars for `symbol` with `start_date <= date <= end_date`, ascending by date.
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, QuantError>;

    fn list_symbols(&self) -> Result<Vec<String>, QuantError>;

    /// First date, last date and bar count, or `None` for an unknown symbol.
    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError>;

    /// Rows discarded while loading because their date did not parse.
    fn dropped_rows(&self) -> usize {
        0
    }
}

impl<T: DataPort + ?Sized> DataPort for Box<T> {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, QuantError> {
        (**self).fetch_prices(symbol, start_date, end_date)
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantError> {
        (**self).list_symbols()
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError> {
        (**self).get_data_range(symbol)
    }

    fn dropped_rows(&self) -> usize {
        (**self).dropped_rows()
    }
}
