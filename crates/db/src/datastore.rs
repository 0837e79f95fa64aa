use async_trait::async_trait;
use idp_core::datastore::is_valid_symbol;
use idp_core::{DataStoreError, OperationalDataStore};
use sqlx::SqlitePool;
use tracing::info;

use crate::repositories::PriceRecordRepository;

/// Direct access to the worker's datastore, used from inside the worker's
/// execution context (`idp purge-records`).
#[derive(Clone)]
pub struct SqliteDataStore {
    repo: PriceRecordRepository,
}

impl SqliteDataStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            repo: PriceRecordRepository::new(pool),
        }
    }
}

#[async_trait]
impl OperationalDataStore for SqliteDataStore {
    async fn delete_records(&self, symbol: &str) -> Result<u64, DataStoreError> {
        if !is_valid_symbol(symbol) {
            return Err(DataStoreError::InvalidSymbol(symbol.to_string()));
        }

        let deleted = self
            .repo
            .delete_by_symbol(symbol)
            .await
            .map_err(|e| DataStoreError::Backend(e.to_string()))?;

        info!(symbol, deleted, "Deleted {} records for {}", deleted, symbol);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewPriceRecord;
    use crate::open;

    #[tokio::test]
    async fn test_cleanup_removes_only_matching_symbol() {
        let pool = open("sqlite::memory:").await.unwrap();
        let repo = PriceRecordRepository::new(pool.clone());
        for (symbol, price) in [("BTC", 1.0), ("ETH", 2.0), ("ETH", 3.0)] {
            repo.insert(&NewPriceRecord::new(symbol, price, "test"))
                .await
                .unwrap();
        }

        let store = SqliteDataStore::new(pool);
        let removed = store.delete_records("ETH").await.unwrap();
        assert_eq!(removed, 2);

        let remaining = repo.find_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].symbol, "BTC");
        assert_eq!(remaining[0].price, 1.0);
    }

    #[tokio::test]
    async fn test_rejects_invalid_symbol() {
        let pool = open("sqlite::memory:").await.unwrap();
        let store = SqliteDataStore::new(pool);

        let err = store.delete_records("ETH' OR '1'='1").await.unwrap_err();
        assert!(matches!(err, DataStoreError::InvalidSymbol(_)));
    }
}
