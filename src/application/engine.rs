use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Instant, timeout_at};
use tracing::{debug, instrument, warn};

use crate::domain::{
    AccountId, Cents, IntegrityReport, LedgerEntry, Operation, build_integrity_report,
};
use crate::storage::{LedgerStore, LedgerTransaction};

use super::{AccountLocks, AppError, RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on one call up to the point its commit is issued, including
    /// lock waits and retries.
    pub operation_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

/// Applies balance operations as single serializable units of work.
///
/// Each [`apply_operation`](Self::apply_operation) call runs
/// ensure-exists → locking read → validate → update → append → commit inside
/// one store transaction. Either all of it commits or nothing does.
#[derive(Clone)]
pub struct BalanceEngine {
    store: Arc<dyn LedgerStore>,
    locks: AccountLocks,
    config: EngineConfig,
}

impl BalanceEngine {
    pub fn new(store: Arc<dyn LedgerStore>, config: EngineConfig) -> Self {
        Self {
            store,
            locks: AccountLocks::new(),
            config,
        }
    }

    /// Apply an operation under the engine's default deadline.
    pub async fn apply_operation(&self, operation: &Operation) -> Result<LedgerEntry, AppError> {
        self.apply_operation_within(operation, self.config.operation_timeout)
            .await
    }

    /// Apply an operation, giving up if it cannot reach its commit within `deadline`.
    ///
    /// The deadline covers the account lock, retries and the transaction body.
    /// When it fires there, the open transaction is dropped and rolls back, and
    /// the caller gets [`AppError::Timeout`]. A commit that has been issued is
    /// always awaited to completion, so a durable change is never reported as
    /// timed out.
    #[instrument(
        skip(self, operation),
        fields(
            account_id = %operation.account_id(),
            kind = %operation.kind(),
            amount = operation.amount()
        ),
        err
    )]
    pub async fn apply_operation_within(
        &self,
        operation: &Operation,
        deadline: Duration,
    ) -> Result<LedgerEntry, AppError> {
        let expires_at = Instant::now() + deadline;

        let _guard = timeout_at(expires_at, self.locks.lock(operation.account_id()))
            .await
            .map_err(|_| AppError::Timeout(deadline))?;
        let policy = self.config.retry;
        let mut attempt = 1;

        loop {
            let prepared = timeout_at(expires_at, self.prepare(operation))
                .await
                .map_err(|_| AppError::Timeout(deadline))?;

            let result = match prepared {
                Ok((tx, entry)) => tx.commit().await.map(|()| entry).map_err(AppError::from),
                Err(err) => Err(err),
            };

            match result {
                Ok(entry) => {
                    debug!(
                        entry_id = %entry.id,
                        balance = entry.balance_after,
                        attempt,
                        "committed"
                    );
                    return Ok(entry);
                }
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(attempt, ?delay, "serialization conflict, retrying");
                    timeout_at(expires_at, tokio::time::sleep(delay))
                        .await
                        .map_err(|_| AppError::Timeout(deadline))?;
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    warn!(attempt, "serialization conflict, giving up");
                    return Err(AppError::SerializationConflict { attempts: attempt });
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Open a transaction and run everything up to the commit.
    ///
    /// On success the transaction is handed back still open. On failure it has
    /// already been rolled back.
    async fn prepare(
        &self,
        operation: &Operation,
    ) -> Result<(Box<dyn LedgerTransaction>, LedgerEntry), AppError> {
        let mut tx = self.store.begin().await?;

        match Self::run_in_transaction(tx.as_mut(), operation).await {
            Ok(entry) => Ok((tx, entry)),
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn run_in_transaction(
        tx: &mut dyn LedgerTransaction,
        operation: &Operation,
    ) -> Result<LedgerEntry, AppError> {
        let account_id = operation.account_id();

        Self::ensure_account(tx, account_id).await?;

        let balance = tx.read_balance_for_update(account_id).await?;
        let new_balance = operation
            .next_balance(balance)
            .map_err(|e| AppError::from_balance_error(account_id, e))?;

        tx.update_balance(account_id, new_balance).await?;

        let entry = LedgerEntry::record(operation, new_balance);
        tx.append_entry(&entry).await?;

        Ok(entry)
    }

    /// Create the account with a zero balance if this is its first reference.
    ///
    /// Runs inside the operation's transaction. If a concurrent transaction
    /// creates the same account first, the insert fails as a conflict and the
    /// retry sees the existing row.
    async fn ensure_account(
        tx: &mut dyn LedgerTransaction,
        account_id: AccountId,
    ) -> Result<(), AppError> {
        if tx.account_exists(account_id).await? {
            return Ok(());
        }
        tx.create_account(account_id, 0).await?;
        debug!(%account_id, "created wallet");
        Ok(())
    }

    /// Read the current balance. Never creates the account.
    #[instrument(skip(self), err)]
    pub async fn get_balance(&self, account_id: AccountId) -> Result<Cents, AppError> {
        let deadline = self.config.operation_timeout;
        let balance = tokio::time::timeout(deadline, self.store.fetch_balance(account_id))
            .await
            .map_err(|_| AppError::Timeout(deadline))??;

        balance.ok_or(AppError::AccountNotFound(account_id))
    }

    /// Compare an account's stored balance with the replay of its ledger.
    ///
    /// Holds the account lock so no local operation lands between the two reads.
    #[instrument(skip(self), err)]
    pub async fn verify_account(&self, account_id: AccountId) -> Result<IntegrityReport, AppError> {
        let _guard = self.locks.lock(account_id).await;

        let balance = self
            .store
            .fetch_balance(account_id)
            .await?
            .ok_or(AppError::AccountNotFound(account_id))?;
        let entries = self.store.list_entries(account_id).await?;

        Ok(build_integrity_report(account_id, balance, &entries))
    }
}
