use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataStoreError {
    #[error("Refusing deletion for invalid symbol '{0}'")]
    InvalidSymbol(String),

    #[error("Datastore unavailable: {0}")]
    Unavailable(String),

    #[error("Datastore backend error: {0}")]
    Backend(String),
}

/// The ingestion worker's small operational datastore.
///
/// The orchestrator never reaches into the worker's storage itself; each
/// implementation dispatches a deletion scoped to exactly one symbol.
#[async_trait]
pub trait OperationalDataStore: Send + Sync {
    /// Delete every record whose symbol equals `symbol`, returning how many were removed.
    async fn delete_records(&self, symbol: &str) -> Result<u64, DataStoreError>;
}

/// Whether `symbol` is safe to embed in a scoped deletion request.
pub fn is_valid_symbol(symbol: &str) -> bool {
    (2..=10).contains(&symbol.len()) && symbol.chars().all(|c| c.is_ascii_alphanumeric())
}
