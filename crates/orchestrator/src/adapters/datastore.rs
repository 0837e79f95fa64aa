use async_trait::async_trait;
use idp_core::datastore::is_valid_symbol;
use idp_core::{DataStoreError, OperationalDataStore};
use std::sync::Arc;
use tracing::info;

use crate::collaborators::ClusterClient;
use crate::config::DataStoreConfig;

/// Deletes records through the ingestion worker's own pod.
///
/// The deletion runs inside the worker's container against its SQLite file;
/// the orchestrator never mounts or opens that file itself.
pub struct IngestorDataStore {
    cluster: Arc<dyn ClusterClient>,
    config: DataStoreConfig,
}

impl IngestorDataStore {
    pub fn new(cluster: Arc<dyn ClusterClient>, config: DataStoreConfig) -> Self {
        Self { cluster, config }
    }

}

/// Run by the worker's interpreter as `python3 -c DELETE_SCRIPT <db> <symbol>`.
const DELETE_SCRIPT: &str = "import sqlite3, sys
conn = sqlite3.connect(sys.argv[1])
cur = conn.execute('DELETE FROM crypto_prices WHERE symbol = ?', (sys.argv[2],))
conn.commit()
print(cur.rowcount)";

#[async_trait]
impl OperationalDataStore for IngestorDataStore {
    async fn delete_records(&self, symbol: &str) -> Result<u64, DataStoreError> {
        if !is_valid_symbol(symbol) {
            return Err(DataStoreError::InvalidSymbol(symbol.to_string()));
        }

        let pod = self
            .cluster
            .find_pod(&self.config.namespace, &self.config.selector)
            .await
            .map_err(|e| DataStoreError::Unavailable(e.to_string()))?;
        let Some(pod) = pod else {
            info!(selector = %self.config.selector, "No ingestion worker running, skipping record cleanup");
            return Ok(0);
        };

        let command = vec![
            self.config.python.clone(),
            "-c".to_string(),
            DELETE_SCRIPT.to_string(),
            self.config.database_path.clone(),
            symbol.to_string(),
        ];
        let result = self
            .cluster
            .exec(&self.config.namespace, &pod, &command)
            .await
            .map_err(|e| DataStoreError::Unavailable(e.to_string()))?;

        if !result.success() {
            return Err(DataStoreError::Backend(result.stderr.trim().to_string()));
        }

        let last_line = result
            .stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .last()
            .unwrap_or_default();
        let removed = last_line.parse::<u64>().map_err(|_| {
            DataStoreError::Backend(format!("unexpected deletion output: {:?}", result.stdout))
        })?;

        info!(symbol = %symbol, pod = %pod, removed, "Operational records deleted");
        Ok(removed)
    }
}
