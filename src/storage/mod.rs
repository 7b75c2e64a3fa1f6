mod postgres;
mod sqlite;
mod store;

use std::sync::Arc;

pub use postgres::*;
pub use sqlite::*;
pub use store::*;

use crate::config::Settings;

/// SQL migration for the SQLite schema
pub const MIGRATION_SQLITE_001: &str = include_str!("migrations/sqlite/001_initial.sql");

/// SQL migration for the Postgres schema
pub const MIGRATION_POSTGRES_001: &str = include_str!("migrations/postgres/001_initial.sql");

/// Open the store named by `settings.database_url` and bring its schema up to date.
///
/// `postgres://` and `postgresql://` URLs select [`PostgresLedgerStore`];
/// everything else is handed to SQLite.
pub async fn connect(settings: &Settings) -> Result<Arc<dyn LedgerStore>, StoreError> {
    let url = settings.database_url.as_str();
    let max_connections = settings.max_db_connections;
    let acquire_timeout = settings.acquire_timeout();

    let store: Arc<dyn LedgerStore> = if is_postgres_url(url) {
        Arc::new(PostgresLedgerStore::init(url, max_connections, acquire_timeout).await?)
    } else {
        Arc::new(SqliteLedgerStore::init(url, max_connections, acquire_timeout).await?)
    };

    tracing::info!(backend = backend_name(url), "ledger store ready");
    Ok(store)
}

fn is_postgres_url(url: &str) -> bool {
    url.starts_with("postgres://") || url.starts_with("postgresql://")
}

fn backend_name(url: &str) -> &'static str {
    if is_postgres_url(url) {
        "postgres"
    } else {
        "sqlite"
    }
}
