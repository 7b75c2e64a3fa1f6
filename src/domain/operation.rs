use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{AccountId, Cents};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Deposit,
    Withdraw,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Deposit => "DEPOSIT",
            OperationKind::Withdraw => "WITHDRAW",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "DEPOSIT" => Some(OperationKind::Deposit),
            "WITHDRAW" => Some(OperationKind::Withdraw),
            _ => None,
        }
    }

    /// Signed effect of an amount of this kind on a balance.
    pub fn signed(&self, amount: Cents) -> Cents {
        match self {
            OperationKind::Deposit => amount,
            OperationKind::Withdraw => -amount,
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why an operation could not be constructed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    #[error("invalid operation type: {0}")]
    InvalidKind(String),

    #[error("amount must be positive, got {0}")]
    InvalidAmount(Cents),
}

/// Why an operation cannot be applied to the current balance.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BalanceError {
    #[error("insufficient funds: balance {balance}, requested {requested}")]
    InsufficientFunds { balance: Cents, requested: Cents },

    #[error("balance overflow: {balance} + {amount}")]
    Overflow { balance: Cents, amount: Cents },
}

/// An intent to mutate one account's balance.
///
/// Operations can only be built with a strictly positive amount, so the
/// engine never has to re-validate the magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Operation {
    account_id: AccountId,
    kind: OperationKind,
    amount: Cents,
}

impl Operation {
    pub fn new(
        account_id: AccountId,
        kind: OperationKind,
        amount: Cents,
    ) -> Result<Self, OperationError> {
        if amount <= 0 {
            return Err(OperationError::InvalidAmount(amount));
        }
        Ok(Self {
            account_id,
            kind,
            amount,
        })
    }

    pub fn deposit(account_id: AccountId, amount: Cents) -> Result<Self, OperationError> {
        Self::new(account_id, OperationKind::Deposit, amount)
    }

    pub fn withdraw(account_id: AccountId, amount: Cents) -> Result<Self, OperationError> {
        Self::new(account_id, OperationKind::Withdraw, amount)
    }

    /// Build an operation from its wire representation (`"DEPOSIT"` / `"WITHDRAW"`).
    pub fn parse(account_id: AccountId, kind: &str, amount: Cents) -> Result<Self, OperationError> {
        let kind = OperationKind::from_str(kind)
            .ok_or_else(|| OperationError::InvalidKind(kind.to_string()))?;
        Self::new(account_id, kind, amount)
    }

    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn amount(&self) -> Cents {
        self.amount
    }

    /// Compute the balance that results from applying this operation.
    pub fn next_balance(&self, balance: Cents) -> Result<Cents, BalanceError> {
        match self.kind {
            OperationKind::Deposit => {
                balance
                    .checked_add(self.amount)
                    .ok_or(BalanceError::Overflow {
                        balance,
                        amount: self.amount,
                    })
            }
            OperationKind::Withdraw => {
                if self.amount > balance {
                    return Err(BalanceError::InsufficientFunds {
                        balance,
                        requested: self.amount,
                    });
                }
                Ok(balance - self.amount)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    #[test]
    fn test_kind_parsing_is_case_insensitive() {
        assert_eq!(OperationKind::from_str("DEPOSIT"), Some(OperationKind::Deposit));
        assert_eq!(OperationKind::from_str("withdraw"), Some(OperationKind::Withdraw));
        assert_eq!(OperationKind::from_str(" Deposit "), Some(OperationKind::Deposit));
        assert_eq!(OperationKind::from_str("TRANSFER"), None);
    }

    #[test]
    fn test_rejects_non_positive_amounts() {
        let id = Uuid::new_v4();
        assert_eq!(
            Operation::deposit(id, 0),
            Err(OperationError::InvalidAmount(0))
        );
        assert_eq!(
            Operation::withdraw(id, -5),
            Err(OperationError::InvalidAmount(-5))
        );
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        let result = Operation::parse(Uuid::new_v4(), "REFUND", 10);
        assert_eq!(result, Err(OperationError::InvalidKind("REFUND".into())));
    }

    #[test]
    fn test_deposit_adds_to_balance() {
        let op = Operation::deposit(Uuid::new_v4(), 250).unwrap();
        assert_eq!(op.next_balance(0), Ok(250));
        assert_eq!(op.next_balance(1000), Ok(1250));
    }

    #[test]
    fn test_deposit_overflow_is_rejected() {
        let op = Operation::deposit(Uuid::new_v4(), 1).unwrap();
        assert!(matches!(
            op.next_balance(i64::MAX),
            Err(BalanceError::Overflow { .. })
        ));
    }

    #[test]
    fn test_withdraw_can_drain_to_zero() {
        let op = Operation::withdraw(Uuid::new_v4(), 500).unwrap();
        assert_eq!(op.next_balance(500), Ok(0));
    }

    #[test]
    fn test_withdraw_more_than_balance_fails() {
        let op = Operation::withdraw(Uuid::new_v4(), 600).unwrap();
        assert_eq!(
            op.next_balance(500),
            Err(BalanceError::InsufficientFunds {
                balance: 500,
                requested: 600
            })
        );
    }

    #[test]
    fn test_signed_amounts() {
        assert_eq!(OperationKind::Deposit.signed(40), 40);
        assert_eq!(OperationKind::Withdraw.signed(40), -40);
    }
}
