//! Database models for stored observations and index records.

use chrono::NaiveDate;
use diesel::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;

use capindex_core::errors::Result;
use capindex_core::index::IndexPerformanceRecord;
use capindex_core::market_data::MarketDataRecord;

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_decimal(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap_or_default()
}

fn parse_date(value: &str) -> Result<NaiveDate> {
    Ok(NaiveDate::parse_from_str(value, DATE_FORMAT)?)
}

/// Row of the `market_data` table. Numbers are kept as TEXT to preserve decimals.
#[derive(Queryable, Identifiable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(primary_key(date, symbol))]
#[diesel(table_name = crate::schema::market_data)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct MarketDataDB {
    pub date: String,
    pub symbol: String,
    pub price: String,
    pub market_cap: String,
    pub volume: String,
}

impl From<&MarketDataRecord> for MarketDataDB {
    fn from(record: &MarketDataRecord) -> Self {
        Self {
            date: record.date.format(DATE_FORMAT).to_string(),
            symbol: record.symbol.clone(),
            price: record.price.to_string(),
            market_cap: record.market_cap.to_string(),
            volume: record.volume.to_string(),
        }
    }
}

impl TryFrom<MarketDataDB> for MarketDataRecord {
    type Error = capindex_core::Error;

    fn try_from(row: MarketDataDB) -> Result<Self> {
        Ok(Self {
            date: parse_date(&row.date)?,
            symbol: row.symbol,
            price: parse_decimal(&row.price),
            market_cap: parse_decimal(&row.market_cap),
            volume: parse_decimal(&row.volume),
        })
    }
}

#[derive(Queryable, Identifiable, Selectable, Insertable, AsChangeset, Debug, Clone)]
#[diesel(primary_key(date))]
#[diesel(table_name = crate::schema::index_performance)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct IndexPerformanceDB {
    pub date: String,
    pub daily_return: String,
    pub cumulative_return: String,
    pub total_market_cap: String,
}

impl From<&IndexPerformanceRecord> for IndexPerformanceDB {
    fn from(record: &IndexPerformanceRecord) -> Self {
        Self {
            date: record.date.format(DATE_FORMAT).to_string(),
            daily_return: record.daily_return.to_string(),
            cumulative_return: record.cumulative_return.to_string(),
            total_market_cap: record.total_market_cap.to_string(),
        }
    }
}

impl TryFrom<IndexPerformanceDB> for IndexPerformanceRecord {
    type Error = capindex_core::Error;

    fn try_from(row: IndexPerformanceDB) -> Result<Self> {
        Ok(Self {
            date: parse_date(&row.date)?,
            daily_return: parse_decimal(&row.daily_return),
            cumulative_return: parse_decimal(&row.cumulative_return),
            total_market_cap: parse_decimal(&row.total_market_cap),
        })
    }
}

/// Formats a date the way it is stored.
pub(crate) fn date_key(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}
