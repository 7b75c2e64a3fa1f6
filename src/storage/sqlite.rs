use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

use crate::domain::{AccountId, Cents, LedgerEntry, OperationKind};

use super::{LedgerStore, LedgerTransaction, StoreError, MIGRATION_SQLITE_001};

/// SQLite-backed ledger store.
///
/// SQLite serializes writers at the database level, so every transaction starts
/// by claiming the writer lock. Waiting for it happens inside SQLite's busy
/// handler; a transaction never has to upgrade a stale read snapshot.
///
/// The busy wait shares the pool's `acquire_timeout`: a writer that cannot get
/// the lock within it fails with [`StoreError::Unavailable`].
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    pool: SqlitePool,
}

impl SqliteLedgerStore {
    /// Create a new store with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database, creating the file if it doesn't exist.
    ///
    /// `acquire_timeout` bounds both the wait for a pooled connection and the
    /// wait for the writer lock.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| StoreError::from_sqlx("parse_url", e))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(acquire_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::from_sqlx("connect", e))?;

        Ok(Self::new(pool))
    }

    /// Connect and run migrations.
    pub async fn init(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let store = Self::connect(database_url, max_connections, acquire_timeout).await?;
        store.migrate().await?;
        Ok(store)
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry, StoreError> {
        let id_str: String = row.get("id");
        let wallet_id_str: String = row.get("wallet_id");
        let kind_str: String = row.get("operation_type");
        let recorded_at_str: String = row.get("recorded_at");

        Ok(LedgerEntry {
            id: parse_uuid(&id_str, "entry id")?,
            account_id: parse_uuid(&wallet_id_str, "wallet id")?,
            kind: OperationKind::from_str(&kind_str)
                .ok_or_else(|| StoreError::Corrupt(format!("invalid operation type: {kind_str}")))?,
            amount: row.get("amount"),
            balance_after: row.get("balance_after"),
            recorded_at: DateTime::parse_from_rfc3339(&recorded_at_str)
                .map_err(|e| StoreError::Corrupt(format!("invalid recorded_at: {e}")))?
                .with_timezone(&Utc),
        })
    }
}

fn parse_uuid(s: &str, what: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(s).map_err(|e| StoreError::Corrupt(format!("invalid {what} '{s}': {e}")))
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::query(MIGRATION_SQLITE_001)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("migrate_001", e))?;
        Ok(())
    }

    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::from_sqlx("begin", e))?;

        // A write as the first statement takes the writer lock up front.
        sqlx::query("UPDATE writer_lock SET claimed_at = ? WHERE id = 1")
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx("claim_writer", e))?;

        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn fetch_balance(&self, id: AccountId) -> Result<Option<Cents>, StoreError> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::from_sqlx("fetch_balance", e))?;

        Ok(row.map(|r| r.get("balance")))
    }

    async fn list_entries(&self, id: AccountId) -> Result<Vec<LedgerEntry>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, wallet_id, operation_type, amount, balance_after, recorded_at
            FROM ledger_entries
            WHERE wallet_id = ?
            ORDER BY seq
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("list_entries", e))?;

        rows.iter().map(Self::row_to_entry).collect()
    }
}

/// An open SQLite transaction holding the writer lock.
pub struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl LedgerTransaction for SqliteTransaction {
    async fn account_exists(&mut self, id: AccountId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM wallets WHERE id = ?) AS present")
            .bind(id.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("account_exists", e))?;

        Ok(row.get::<i64, _>("present") != 0)
    }

    async fn create_account(
        &mut self,
        id: AccountId,
        initial_balance: Cents,
    ) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO wallets (id, balance, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(initial_balance)
        .bind(&now)
        .bind(&now)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("create_account", e))?;
        Ok(())
    }

    async fn read_balance_for_update(&mut self, id: AccountId) -> Result<Cents, StoreError> {
        // The writer lock claimed in `begin` already excludes every other writer.
        let row = sqlx::query("SELECT balance FROM wallets WHERE id = ?")
            .bind(id.to_string())
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("read_balance_for_update", e))?;

        Ok(row.get("balance"))
    }

    async fn update_balance(
        &mut self,
        id: AccountId,
        new_balance: Cents,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE wallets SET balance = ?, updated_at = ? WHERE id = ?")
            .bind(new_balance)
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("update_balance", e))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Database {
                operation: "update_balance".to_string(),
                message: format!("wallet {id} not found"),
            });
        }
        Ok(())
    }

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ledger_entries
                (id, wallet_id, operation_type, amount, balance_after, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.account_id.to_string())
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&mut *self.tx)
        .await
        .map_err(|e| StoreError::from_sqlx("append_entry", e))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| StoreError::from_sqlx("commit", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| StoreError::from_sqlx("rollback", e))
    }
}
