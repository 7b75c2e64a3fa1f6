use uuid::Uuid;

/// Wallet identifier. Accounts come into existence on the first operation
/// that references them and are never deleted.
pub type AccountId = Uuid;

/// Money is represented as an integer number of the currency's smallest unit.
pub type Cents = i64;
