use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Cents, LedgerEntry, OperationKind};

/// Body of `POST /api/v1/wallet`.
///
/// `operation_type` stays a string so an unknown kind is reported as an
/// invalid operation type rather than a generic JSON error.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletOperationRequest {
    pub wallet_id: Uuid,
    pub operation_type: String,
    pub amount: Cents,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletOperationResponse {
    pub entry_id: Uuid,
    pub wallet_id: Uuid,
    pub operation_type: OperationKind,
    pub amount: Cents,
    pub balance: Cents,
    pub recorded_at: DateTime<Utc>,
}

impl From<LedgerEntry> for WalletOperationResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            entry_id: entry.id,
            wallet_id: entry.account_id,
            operation_type: entry.kind,
            amount: entry.amount,
            balance: entry.balance_after,
            recorded_at: entry.recorded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBalanceResponse {
    pub balance: Cents,
}
