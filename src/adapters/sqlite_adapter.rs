//! SQLite price store.

use crate::domain::error::QuantError;
use crate::domain::price::PricePoint;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, warn};

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Symbols are stored and matched upper-case. Rows whose stored date does not
/// parse are skipped on fetch and counted.
pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
    dropped_rows: AtomicUsize,
}

fn pool_err(e: r2d2::Error) -> QuantError {
    QuantError::Database {
        reason: e.to_string(),
    }
}

fn query_err(e: rusqlite::Error) -> QuantError {
    QuantError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn parse_stored_date(value: &str) -> Result<NaiveDate, QuantError> {
    NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| QuantError::DatabaseQuery {
        reason: format!("stored date '{}' is invalid: {}", value, e),
    })
}

impl SqliteAdapter {
    /// Open the database named by `[data] path` with a pool of `[data] pool_size`.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, QuantError> {
        let db_path = config
            .get_string("data", "path")
            .ok_or_else(|| QuantError::ConfigMissing {
                section: "data".into(),
                key: "path".into(),
            })?;
        let pool_size = config.get_int("data", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_err)?;
        Ok(Self::with_pool(pool))
    }

    fn with_pool(pool: Pool<SqliteConnectionManager>) -> Self {
        Self {
            pool,
            dropped_rows: AtomicUsize::new(0),
        }
    }

    pub fn in_memory() -> Result<Self, QuantError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager).map_err(pool_err)?;
        Ok(Self::with_pool(pool))
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, QuantError> {
        self.pool.get().map_err(pool_err)
    }

    pub fn initialize_schema(&self) -> Result<(), QuantError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS prices (
                    symbol TEXT NOT NULL,
                    date TEXT NOT NULL,
                    open REAL NOT NULL,
                    high REAL NOT NULL,
                    low REAL NOT NULL,
                    close REAL NOT NULL,
                    volume REAL NOT NULL,
                    PRIMARY KEY (symbol, date)
                );
                CREATE INDEX IF NOT EXISTS idx_prices_date ON prices(date);",
            )
            .map_err(query_err)
    }

    /// Upsert bars; a later row for the same (symbol, date) replaces the earlier one.
    pub fn insert_prices(&self, points: &[PricePoint]) -> Result<(), QuantError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO prices (symbol, date, open, high, low, close, volume)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                )
                .map_err(query_err)?;
            for p in points {
                stmt.execute(params![
                    p.symbol.to_uppercase(),
                    p.date.format(DATE_FORMAT).to_string(),
                    p.open,
                    p.high,
                    p.low,
                    p.close,
                    p.volume
                ])
                .map_err(query_err)?;
            }
        }
        tx.commit().map_err(query_err)?;
        debug!(rows = points.len(), "prices inserted");
        Ok(())
    }
}

impl DataPort for SqliteAdapter {
    fn fetch_prices(
        &self,
        symbol: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PricePoint>, QuantError> {
        let symbol = symbol.to_uppercase();
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT date, open, high, low, close, volume
                 FROM prices
                 WHERE UPPER(symbol) = ?1 AND date >= ?2 AND date <= ?3
                 ORDER BY date ASC",
            )
            .map_err(query_err)?;

        let rows = stmt
            .query_map(
                params![
                    symbol,
                    start_date.format(DATE_FORMAT).to_string(),
                    end_date.format(DATE_FORMAT).to_string()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, f64>(1)?,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                    ))
                },
            )
            .map_err(query_err)?;

        let mut points = Vec::new();
        let mut dropped = 0;
        for row in rows {
            let (date, open, high, low, close, volume) = row.map_err(query_err)?;
            let Ok(date) = NaiveDate::parse_from_str(&date, DATE_FORMAT) else {
                dropped += 1;
                continue;
            };
            points.push(PricePoint {
                date,
                symbol: symbol.clone(),
                open,
                high,
                low,
                close,
                volume,
            });
        }
        if dropped > 0 {
            warn!(%symbol, dropped, "rows with unparsable dates dropped");
            self.dropped_rows.fetch_add(dropped, Ordering::Relaxed);
        }
        Ok(points)
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT DISTINCT UPPER(symbol) AS s FROM prices ORDER BY s")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<Vec<String>, _>>().map_err(query_err)
    }

    fn get_data_range(
        &self,
        symbol: &str,
    ) -> Result<Option<(NaiveDate, NaiveDate, usize)>, QuantError> {
        let (min, max, count): (Option<String>, Option<String>, i64) = self
            .conn()?
            .query_row(
                "SELECT MIN(date), MAX(date), COUNT(*) FROM prices WHERE UPPER(symbol) = ?1",
                params![symbol.to_uppercase()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .map_err(query_err)?;

        match (min, max) {
            (Some(min), Some(max)) if count > 0 => Ok(Some((
                parse_stored_date(&min)?,
                parse_stored_date(&max)?,
                count as usize,
            ))),
            _ => Ok(None),
        }
    }

    fn dropped_rows(&self) -> usize {
        self.dropped_rows.load(Ordering::Relaxed)
    }
}
