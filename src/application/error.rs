use std::time::Duration;

use thiserror::Error;

use crate::domain::{AccountId, BalanceError, Cents, OperationError};
use crate::storage::StoreError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    #[error("Insufficient funds in wallet {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Cents,
        requested: Cents,
    },

    #[error("Invalid operation type: {0}")]
    InvalidOperationKind(String),

    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(Cents),

    #[error("Balance overflow in wallet {0}")]
    BalanceOverflow(AccountId),

    #[error("Wallet not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Serialization conflict after {attempts} attempt(s)")]
    SerializationConflict { attempts: u32 },

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),
}

impl AppError {
    pub(crate) fn from_balance_error(account: AccountId, err: BalanceError) -> Self {
        match err {
            BalanceError::InsufficientFunds { balance, requested } => AppError::InsufficientFunds {
                account,
                balance,
                requested,
            },
            BalanceError::Overflow { .. } => AppError::BalanceOverflow(account),
        }
    }

    /// Only contention is worth retrying; nothing was persisted in that case.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::SerializationConflict { .. })
    }

    /// Business-rule and input errors, as opposed to infrastructure failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InsufficientFunds { .. }
                | AppError::InvalidOperationKind(_)
                | AppError::InvalidAmount(_)
                | AppError::BalanceOverflow(_)
                | AppError::AccountNotFound(_)
        )
    }
}

impl From<OperationError> for AppError {
    fn from(err: OperationError) -> Self {
        match err {
            OperationError::InvalidKind(kind) => AppError::InvalidOperationKind(kind),
            OperationError::InvalidAmount(amount) => AppError::InvalidAmount(amount),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict { .. } => AppError::SerializationConflict { attempts: 1 },
            other => AppError::StoreUnavailable(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_store_conflict_maps_to_retryable() {
        let err: AppError = StoreError::Conflict {
            operation: "commit".into(),
            message: "could not serialize access".into(),
        }
        .into();
        assert!(err.is_retryable());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_store_outage_is_not_retryable() {
        let err: AppError = StoreError::Unavailable {
            operation: "begin".into(),
            message: "pool timed out".into(),
        }
        .into();
        assert!(matches!(err, AppError::StoreUnavailable(_)));
        assert!(!err.is_retryable());
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_business_errors_are_client_errors() {
        let err = AppError::from_balance_error(
            Uuid::new_v4(),
            BalanceError::InsufficientFunds {
                balance: 10,
                requested: 20,
            },
        );
        assert!(err.is_client_error());
        assert!(!err.is_retryable());

        let err: AppError = OperationError::InvalidKind("REFUND".into()).into();
        assert_eq!(err, AppError::InvalidOperationKind("REFUND".into()));
    }
}
