use serde::Serialize;
use thiserror::Error;

use super::{AccountId, Amount, Stake};

/// Rejection reasons shared by every ledger strategy.
///
/// A rejected call never mutates the ledger, so every variant describes a
/// precondition that failed against the state as it was before the call.
#[derive(Clone, Debug, Error, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerError {
    /// `change_share` was called with a zero delta.
    #[error("share change must be non-zero")]
    ZeroDelta,

    /// The resulting total stake would be negative or non-finite.
    #[error("total stake {current} cannot absorb change {delta}")]
    StakeOverflow { current: Stake, delta: Stake },

    /// The resulting stake of a single account would be negative.
    #[error("account {account} holds {stake}, cannot apply change {delta}")]
    NegativeAccountStake {
        account: AccountId,
        stake: Stake,
        delta: Stake,
    },

    /// An initial stake was zero, negative or non-finite.
    #[error("initial stake {stake} for account {account} must be positive")]
    InvalidInitialStake { account: AccountId, stake: Stake },

    /// Revenue injections must be strictly positive and finite.
    #[error("revenue amount {amount} must be positive")]
    NonPositiveAmount { amount: Amount },

    /// Revenue cannot be attributed while nobody holds stake.
    #[error("no stake in the pool to receive revenue {amount}")]
    EmptyPool { amount: Amount },
}

impl LedgerError {
    /// Stable snake_case identifier, matching the serialized `kind` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerError::ZeroDelta => "zero_delta",
            LedgerError::StakeOverflow { .. } => "stake_overflow",
            LedgerError::NegativeAccountStake { .. } => "negative_account_stake",
            LedgerError::InvalidInitialStake { .. } => "invalid_initial_stake",
            LedgerError::NonPositiveAmount { .. } => "non_positive_amount",
            LedgerError::EmptyPool { .. } => "empty_pool",
        }
    }
}
