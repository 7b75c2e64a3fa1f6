mod account;
mod ledger;
mod operation;

pub use account::*;
pub use ledger::*;
pub use operation::*;
