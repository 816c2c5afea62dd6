use async_trait::async_trait;
use chrono::NaiveDate;
use diesel::dsl::max;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::sqlite::SqliteConnection;
use log::debug;
use std::sync::Arc;

use super::model::{date_key, IndexPerformanceDB, MarketDataDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::{IntoCore, StorageError};
use crate::schema::index_performance::dsl as index_dsl;
use crate::schema::market_data::dsl as market_data_dsl;
use capindex_core::index::IndexPerformanceRecord;
use capindex_core::market_data::{MarketDataRecord, MarketDataStore};
use capindex_core::Result;
use capindex_market_data::DateRange;

// SQLite caps bound parameters per statement; five columns per row keeps
// each chunk well under the limit.
const INSERT_CHUNK_SIZE: usize = 1_000;

pub struct MarketDataRepository {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl MarketDataRepository {
    pub fn new(pool: Arc<Pool<ConnectionManager<SqliteConnection>>>, writer: WriteHandle) -> Self {
        Self { pool, writer }
    }
}

// =============================================================================
// MarketDataStore Implementation
// =============================================================================

#[async_trait]
impl MarketDataStore for MarketDataRepository {
    // =========================================================================
    // Mutations
    // =========================================================================

    async fn upsert_observations(&self, records: Vec<MarketDataRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let db_rows: Vec<MarketDataDB> = records.iter().map(MarketDataDB::from).collect();

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let mut total_upserted = 0;
                for chunk in db_rows.chunks(INSERT_CHUNK_SIZE) {
                    total_upserted += diesel::replace_into(market_data_dsl::market_data)
                        .values(chunk)
                        .execute(conn)
                        .map_err(StorageError::QueryFailed)?;
                }
                debug!("Upserted {} market data rows", total_upserted);
                Ok(total_upserted)
            })
            .await
    }

    async fn save_index_performance(&self, records: Vec<IndexPerformanceRecord>) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let db_rows: Vec<IndexPerformanceDB> =
            records.iter().map(IndexPerformanceDB::from).collect();

        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let mut total_saved = 0;
                for chunk in db_rows.chunks(INSERT_CHUNK_SIZE) {
                    total_saved += diesel::replace_into(index_dsl::index_performance)
                        .values(chunk)
                        .execute(conn)
                        .map_err(StorageError::QueryFailed)?;
                }
                Ok(total_saved)
            })
            .await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    fn observations_in_range(
        &self,
        range: &DateRange,
        symbols: Option<&[String]>,
    ) -> Result<Vec<MarketDataRecord>> {
        let mut conn = get_connection(&self.pool)?;

        let mut query = market_data_dsl::market_data
            .filter(market_data_dsl::date.ge(date_key(range.start)))
            .filter(market_data_dsl::date.le(date_key(range.end)))
            .into_boxed();

        if let Some(symbols) = symbols {
            query = query.filter(market_data_dsl::symbol.eq_any(symbols.to_vec()));
        }

        query
            .order((market_data_dsl::date.asc(), market_data_dsl::symbol.asc()))
            .select(MarketDataDB::as_select())
            .load::<MarketDataDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(MarketDataRecord::try_from)
            .collect()
    }

    fn top_companies(&self, date: NaiveDate, limit: i64) -> Result<Vec<MarketDataRecord>> {
        let mut conn = get_connection(&self.pool)?;

        let rows = market_data_dsl::market_data
            .filter(market_data_dsl::date.eq(date_key(date)))
            .select(MarketDataDB::as_select())
            .load::<MarketDataDB>(&mut conn)
            .into_core()?;

        // Caps are TEXT, so ordering happens on the parsed decimals.
        let mut records = rows
            .into_iter()
            .map(MarketDataRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| {
            b.market_cap
                .cmp(&a.market_cap)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        records.truncate(usize::try_from(limit.max(0)).unwrap_or(0));
        Ok(records)
    }

    fn latest_date(&self) -> Result<Option<NaiveDate>> {
        let mut conn = get_connection(&self.pool)?;

        let latest: Option<String> = market_data_dsl::market_data
            .select(max(market_data_dsl::date))
            .first::<Option<String>>(&mut conn)
            .into_core()?;

        latest
            .map(|d| -> Result<NaiveDate> { Ok(NaiveDate::parse_from_str(&d, "%Y-%m-%d")?) })
            .transpose()
    }

    fn index_performance(&self, range: &DateRange) -> Result<Vec<IndexPerformanceRecord>> {
        let mut conn = get_connection(&self.pool)?;

        index_dsl::index_performance
            .filter(index_dsl::date.ge(date_key(range.start)))
            .filter(index_dsl::date.le(date_key(range.end)))
            .order(index_dsl::date.asc())
            .select(IndexPerformanceDB::as_select())
            .load::<IndexPerformanceDB>(&mut conn)
            .into_core()?
            .into_iter()
            .map(IndexPerformanceRecord::try_from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_pool, init, run_migrations, spawn_writer};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn record(day: u32, symbol: &str, price: Decimal, cap: Decimal) -> MarketDataRecord {
        MarketDataRecord {
            date: d(day),
            symbol: symbol.to_string(),
            price,
            market_cap: cap,
            volume: dec!(1000),
        }
    }

    fn setup() -> (TempDir, MarketDataRepository) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = init(dir.path().to_str().unwrap()).unwrap();
        let pool = create_pool(&db_path).unwrap();
        run_migrations(&pool).unwrap();
        let writer = spawn_writer(pool.as_ref().clone());
        (dir, MarketDataRepository::new(pool, writer))
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_key() {
        let (_dir, repo) = setup();

        let first = vec![
            record(2, "AAPL", dec!(185), dec!(2900000000000)),
            record(2, "MSFT", dec!(370), dec!(2750000000000)),
        ];
        assert_eq!(repo.upsert_observations(first.clone()).await.unwrap(), 2);
        repo.upsert_observations(first).await.unwrap();

        let revised = vec![record(2, "AAPL", dec!(186.5), dec!(2910000000000))];
        repo.upsert_observations(revised).await.unwrap();

        let range = DateRange::new(d(1), d(31)).unwrap();
        let rows = repo.observations_in_range(&range, None).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].symbol, "AAPL");
        assert_eq!(rows[0].price, dec!(186.5));
    }

    #[tokio::test]
    async fn test_empty_upsert_is_a_no_op() {
        let (_dir, repo) = setup();
        assert_eq!(repo.upsert_observations(Vec::new()).await.unwrap(), 0);
        assert_eq!(repo.latest_date().unwrap(), None);
    }

    #[tokio::test]
    async fn test_range_and_symbol_filters() {
        let (_dir, repo) = setup();
        repo.upsert_observations(vec![
            record(2, "AAPL", dec!(185), dec!(100)),
            record(3, "AAPL", dec!(184), dec!(100)),
            record(3, "MSFT", dec!(371), dec!(90)),
            record(10, "AAPL", dec!(190), dec!(100)),
        ])
        .await
        .unwrap();

        let range = DateRange::new(d(3), d(9)).unwrap();
        let all = repo.observations_in_range(&range, None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|r| r.date == d(3)));

        let only = vec!["MSFT".to_string()];
        let msft = repo.observations_in_range(&range, Some(&only)).unwrap();
        assert_eq!(msft.len(), 1);
        assert_eq!(msft[0].symbol, "MSFT");

        assert_eq!(repo.latest_date().unwrap(), Some(d(10)));
    }

    #[tokio::test]
    async fn test_top_companies_orders_by_numeric_cap() {
        let (_dir, repo) = setup();
        // Lexicographic order on TEXT would put "900..." above "1000...".
        repo.upsert_observations(vec![
            record(5, "SMALL", dec!(10), dec!(900000000)),
            record(5, "BIG", dec!(10), dec!(1000000000000)),
            record(5, "MID", dec!(10), dec!(50000000000)),
            record(6, "OTHER", dec!(10), dec!(5000000000000)),
        ])
        .await
        .unwrap();

        let top = repo.top_companies(d(5), 2).unwrap();
        let symbols: Vec<&str> = top.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["BIG", "MID"]);

        assert!(repo.top_companies(d(5), 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_index_performance_round_trip() {
        let (_dir, repo) = setup();
        let records = vec![
            IndexPerformanceRecord {
                date: d(2),
                daily_return: Decimal::ZERO,
                cumulative_return: Decimal::ZERO,
                total_market_cap: dec!(5650000000000),
            },
            IndexPerformanceRecord {
                date: d(3),
                daily_return: dec!(0.012345678901),
                cumulative_return: dec!(0.012345678901),
                total_market_cap: dec!(5700000000000),
            },
        ];
        assert_eq!(repo.save_index_performance(records.clone()).await.unwrap(), 2);

        let range = DateRange::new(d(1), d(31)).unwrap();
        assert_eq!(repo.index_performance(&range).unwrap(), records);

        let narrow = DateRange::new(d(3), d(3)).unwrap();
        assert_eq!(repo.index_performance(&narrow).unwrap().len(), 1);
    }
}
