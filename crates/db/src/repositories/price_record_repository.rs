use crate::error::DbError;
use crate::models::{NewPriceRecord, PriceRecord, PriceRecordRow};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct PriceRecordRepository {
    pool: SqlitePool,
}

impl PriceRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn insert(&self, record: &NewPriceRecord) -> Result<i64, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO crypto_prices (symbol, price, timestamp, source)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&record.symbol)
        .bind(record.price)
        .bind(record.timestamp.timestamp())
        .bind(&record.source)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn find_all(&self) -> Result<Vec<PriceRecord>, DbError> {
        let rows: Vec<PriceRecordRow> = sqlx::query_as(
            r#"
            SELECT id, symbol, price, timestamp, source
            FROM crypto_prices
            ORDER BY id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_domain()).collect())
    }

    pub async fn count_by_symbol(&self, symbol: &str) -> Result<i64, DbError> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crypto_prices WHERE symbol = ?")
            .bind(symbol)
            .fetch_one(&self.pool)
            .await?;

        Ok(count.0)
    }

    /// Delete rows whose symbol equals `symbol` exactly; returns the number removed.
    pub async fn delete_by_symbol(&self, symbol: &str) -> Result<u64, DbError> {
        let result = sqlx::query("DELETE FROM crypto_prices WHERE symbol = ?")
            .bind(symbol)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
