use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{AccountId, Cents, LedgerEntry};

/// Ledger store operation error.
///
/// These are infrastructure errors only; business rules (insufficient funds and
/// friends) live in the application layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The transaction lost a race with a concurrent one (serialization failure,
    /// deadlock, stale snapshot or a duplicate account insert). Nothing was
    /// persisted; re-running the same unit of work is safe.
    #[error("serialization conflict in {operation}: {message}")]
    Conflict { operation: String, message: String },

    /// The store could not be reached in time: pool exhausted or closed, writer
    /// lock still busy after the busy timeout, I/O failure.
    #[error("store unavailable in {operation}: {message}")]
    Unavailable { operation: String, message: String },

    #[error("database error in {operation}: {message}")]
    Database { operation: String, message: String },

    /// A stored row could not be decoded into a domain value.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Classify a driver error for the given store operation.
    ///
    /// | Driver error | Code | StoreError |
    /// |---|---|---|
    /// | unique violation | any backend | `Conflict` |
    /// | SQLite stale snapshot / locked | `517` / primary code `6` | `Conflict` |
    /// | SQLite busy after the busy timeout | primary code `5` | `Unavailable` |
    /// | Postgres serialization failure / deadlock | `40001` / `40P01` | `Conflict` |
    /// | Postgres connection exception | `08xxx` | `Unavailable` |
    /// | Postgres shutdown / too many connections | `57P0x` / `53300` | `Unavailable` |
    /// | pool timed out / closed, I/O, TLS, protocol | n/a | `Unavailable` |
    /// | row decode failures | n/a | `Corrupt` |
    /// | anything else | n/a | `Database` |
    pub fn from_sqlx(operation: &str, err: sqlx::Error) -> Self {
        let operation = operation.to_string();
        match err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                if db_err.is_unique_violation() {
                    return StoreError::Conflict { operation, message };
                }
                let code = db_err.code().map(|c| c.into_owned()).unwrap_or_default();
                if is_conflict_code(&code) {
                    StoreError::Conflict { operation, message }
                } else if is_unavailable_code(&code) {
                    StoreError::Unavailable { operation, message }
                } else {
                    StoreError::Database {
                        operation,
                        message: format!("{message} (code {code})"),
                    }
                }
            }
            sqlx::Error::PoolTimedOut => StoreError::Unavailable {
                operation,
                message: "timed out waiting for a pooled connection".to_string(),
            },
            sqlx::Error::PoolClosed => StoreError::Unavailable {
                operation,
                message: "connection pool closed".to_string(),
            },
            sqlx::Error::Io(e) => StoreError::Unavailable {
                operation,
                message: e.to_string(),
            },
            e @ (sqlx::Error::Tls(_) | sqlx::Error::Protocol(_)) => StoreError::Unavailable {
                operation,
                message: e.to_string(),
            },
            e @ (sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)) => {
                StoreError::Corrupt(format!("{operation}: {e}"))
            }
            other => StoreError::Database {
                operation,
                message: other.to_string(),
            },
        }
    }
}

const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;
const SQLITE_BUSY_SNAPSHOT: i32 = 517;

/// SQLite reports extended result codes; the low byte is the primary code.
/// Postgres SQLSTATEs are always five characters.
fn sqlite_code(code: &str) -> Option<i32> {
    if code.len() >= 5 {
        return None;
    }
    code.parse().ok()
}

fn is_conflict_code(code: &str) -> bool {
    if matches!(code, "40001" | "40P01") {
        return true;
    }
    match sqlite_code(code) {
        Some(n) => n == SQLITE_BUSY_SNAPSHOT || n & 0xff == SQLITE_LOCKED,
        None => false,
    }
}

fn is_unavailable_code(code: &str) -> bool {
    if code.starts_with("08") || code.starts_with("57P0") || code == "53300" {
        return true;
    }
    // The busy handler has already waited out its timeout.
    match sqlite_code(code) {
        Some(n) => n & 0xff == SQLITE_BUSY && n != SQLITE_BUSY_SNAPSHOT,
        None => false,
    }
}

/// Durable per-account balances plus an append-only ledger.
///
/// Implementations must run every [`LedgerTransaction`] at serializable
/// isolation and guarantee all-or-nothing commits.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create the schema if it does not exist yet.
    async fn migrate(&self) -> Result<(), StoreError>;

    /// Start a serializable unit of work.
    async fn begin(&self) -> Result<Box<dyn LedgerTransaction>, StoreError>;

    /// Read an account's balance outside of any write transaction.
    async fn fetch_balance(&self, id: AccountId) -> Result<Option<Cents>, StoreError>;

    /// All ledger entries of an account, in commit order.
    async fn list_entries(&self, id: AccountId) -> Result<Vec<LedgerEntry>, StoreError>;
}

/// One open serializable transaction.
///
/// Dropping a transaction without calling [`commit`](Self::commit) or
/// [`rollback`](Self::rollback) rolls it back.
#[async_trait]
pub trait LedgerTransaction: Send {
    async fn account_exists(&mut self, id: AccountId) -> Result<bool, StoreError>;

    /// Insert a new account row. Fails with [`StoreError::Conflict`] if the row
    /// already exists.
    async fn create_account(
        &mut self,
        id: AccountId,
        initial_balance: Cents,
    ) -> Result<(), StoreError>;

    /// Read the balance and hold an exclusive lock on the account until the
    /// transaction ends.
    async fn read_balance_for_update(&mut self, id: AccountId) -> Result<Cents, StoreError>;

    async fn update_balance(
        &mut self,
        id: AccountId,
        new_balance: Cents,
    ) -> Result<(), StoreError>;

    async fn append_entry(&mut self, entry: &LedgerEntry) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}
