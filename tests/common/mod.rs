// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use wallet_ledger::application::{BalanceEngine, EngineConfig, RetryPolicy};
use wallet_ledger::storage::SqliteLedgerStore;

/// Helper to create an engine over a temporary SQLite database
pub async fn test_engine() -> Result<(BalanceEngine, TempDir)> {
    test_engine_with(EngineConfig {
        operation_timeout: Duration::from_secs(30),
        retry: RetryPolicy::new(10, Duration::from_millis(5)),
    })
    .await
}

pub async fn test_engine_with(config: EngineConfig) -> Result<(BalanceEngine, TempDir)> {
    let temp_dir = TempDir::new()?;
    let url = format!("sqlite:{}", temp_dir.path().join("test.db").display());
    let store = SqliteLedgerStore::init(&url, 8, Duration::from_secs(10)).await?;
    Ok((BalanceEngine::new(Arc::new(store), config), temp_dir))
}
