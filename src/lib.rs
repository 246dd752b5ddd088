//! Proportional revenue-distribution ledgers.
//!
//! Accounts hold a stake in a shared pool and every revenue injection is
//! attributed to them in proportion to the stake they held when it arrived.
//! Two strategies implement the same contract:
//!
//! * [`ledger::NaiveLedger`] walks every account on each injection, O(n).
//! * [`ledger::IndexedLedger`] advances a single global accumulator on each
//!   injection, O(1), and materializes an account's revenue lazily the next
//!   time its stake changes.
//!
//! The [`script`] module replays scripted operation sequences through either
//! strategy so their outcomes can be compared.

pub mod ledger;
pub mod script;

pub use ledger::{
    AccountId, Amount, IndexedLedger, LedgerError, LedgerSnapshot, NaiveLedger, RevenueLedger,
    SharedLedger, Stake, Strategy,
};
pub use script::{Operation, ReplayReport, Script, ScriptError};
