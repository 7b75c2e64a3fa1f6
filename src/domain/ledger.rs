use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Cents, Operation, OperationKind};

pub type EntryId = Uuid;

/// An append-only record of one committed operation.
/// Entries are written in the same transaction as the balance change they describe
/// and are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub account_id: AccountId,
    pub kind: OperationKind,
    /// Always positive; the sign comes from `kind`.
    pub amount: Cents,
    /// Account balance right after this entry was applied.
    pub balance_after: Cents,
    /// Server-assigned commit time.
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn record(operation: &Operation, balance_after: Cents) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id: operation.account_id(),
            kind: operation.kind(),
            amount: operation.amount(),
            balance_after,
            recorded_at: Utc::now(),
        }
    }

    pub fn signed_amount(&self) -> Cents {
        self.kind.signed(self.amount)
    }
}

/// Result of checking an account's stored balance against its ledger.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub account_id: AccountId,
    pub stored_balance: Cents,
    pub replayed_balance: Cents,
    pub entry_count: usize,
    pub issues: Vec<String>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Compare the stored balance with the ledger, entries in commit order.
pub fn build_integrity_report(
    account_id: AccountId,
    stored_balance: Cents,
    entries: &[LedgerEntry],
) -> IntegrityReport {
    let mut issues = Vec::new();
    let mut running: Cents = 0;

    for entry in entries {
        if entry.account_id != account_id {
            issues.push(format!("entry {} belongs to account {}", entry.id, entry.account_id));
            continue;
        }
        if entry.amount <= 0 {
            issues.push(format!("entry {} has non-positive amount {}", entry.id, entry.amount));
        }
        running += entry.signed_amount();
        if running < 0 {
            issues.push(format!("balance went negative ({}) at entry {}", running, entry.id));
        }
        if entry.balance_after != running {
            issues.push(format!(
                "entry {} records balance {} but replay gives {}",
                entry.id, entry.balance_after, running
            ));
        }
    }

    if running != stored_balance {
        issues.push(format!(
            "stored balance {} differs from ledger sum {}",
            stored_balance, running
        ));
    }

    IntegrityReport {
        account_id,
        stored_balance,
        replayed_balance: running,
        entry_count: entries.len(),
        issues,
    }
}
