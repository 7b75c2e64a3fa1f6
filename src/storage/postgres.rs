//! PostgreSQL-backed ledger store.
//!
//! Transactions run at `SERIALIZABLE` isolation and take a row lock with
//! `SELECT ... FOR UPDATE`, so operations on the same wallet queue behind each
//! other while operations on different wallets proceed in parallel.
//! Serialization failures (`40001`), deadlocks (`40P01`) and duplicate wallet
//! inserts (`23505`) surface as [`StoreError::Conflict`].

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Executor, PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use crate::domain::{AccountId, Cents, LedgerEntry, OperationKind};

use super::{LedgerStore, LedgerTransaction, StoreError, MIGRATION_POSTGRES_001};

#[derive(Debug, Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to Postgres and verify the connection with a ping.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::from_sqlx("connect", e))?;

        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|e| StoreError::from_sqlx("ping", e))?;

        Ok(Self::new(pool))
    }

    pub async fn init(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let store = Self::connect(database_url, max_connections, acquire_timeout).await?;
        store.migrate().await?;
        Ok(store)
    }

    fn row_to_entry(row: &PgRow) -> Result<LedgerEntry, StoreError> {
        let kind_str: String = row
            .try_get("operation_type")
            .map_err(|e| StoreError::from_sqlx("decode_entry", e))?;
        let decode = |e| StoreError::from_sqlx("decode_entry", e);

        Ok(LedgerEntry {
            id: row.try_get::<Uuid, _>("id").map_err(decode)?,
            account_id: row.try_get::<Uuid, _>("wallet_id").map_err(decode)?,
            kind: OperationKind::from_str(&kind_str)
                .ok_or_else(|| StoreError::Corrupt(format!("invalid operation type: {kind_str}")))?,
            amount: row.try_get("amount").map_err(decode)?,
            balance_after: row.try_get("balance_after").map_err(decode)?,
            recorded_at: row.try_get::<DateTime<Utc>, _>("recorded_at").map_err(decode)?,
        })
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn migrate(&self) -> Result<(), StoreError> {
        // Plain-text execution runs the whole script through the simple query protocol.
        self.pool
            .execute(MIGRATION_POSTGRES_001)
            .await
            .map_err(|e| StoreError::from_sqlx("migrate_001", e))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::from_sqlx("begin", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_sqlx("set_isolation", e))?;

        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn fetch_balance(&self, id: AccountId) -> Result<Option<Cents>, StoreError> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE id = $1")
            .bind(id)
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
            WHERE wallet_id = $1
            ORDER BY seq ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx("list_entries", e))?;

        rows.iter().map(Self::row_to_entry).collect()
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTransaction for PostgresTransaction {
    async fn account_exists(&mut self, id: AccountId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM wallets WHERE id = $1) AS present")
            .bind(id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("account_exists", e))?;

        Ok(row.get::<bool, _>("present"))
    }

    async fn create_account(
        &mut self,
        id: AccountId,
        initial_balance: Cents,
    ) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO wallets (id, balance) VALUES ($1, $2)")
            .bind(id)
            .bind(initial_balance)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| StoreError::from_sqlx("create_account", e))?;
        Ok(())
    }

    async fn read_balance_for_update(&mut self, id: AccountId) -> Result<Cents, StoreError> {
        let row = sqlx::query("SELECT balance FROM wallets WHERE id = $1 FOR UPDATE")
            .bind(id)
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
        let result =
            sqlx::query("UPDATE wallets SET balance = $1, updated_at = NOW() WHERE id = $2")
                .bind(new_balance)
                .bind(id)
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
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(entry.account_id)
        .bind(entry.kind.as_str())
        .bind(entry.amount)
        .bind(entry.balance_after)
        .bind(entry.recorded_at)
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
