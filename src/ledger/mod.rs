//! Ledger strategies and the contract they share.
//!
//! Both strategies validate every input against the current state before any
//! field is written, so a call either commits completely or returns a
//! [`LedgerError`] and leaves the ledger untouched.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

mod error;
mod indexed;
mod naive;
mod shared;
mod snapshot;

#[cfg(test)]
mod props;

pub use error::LedgerError;
pub use indexed::{Checkpoint, IndexedLedger, INCR_PER_REV_INIT, INDEX_INIT};
pub use naive::NaiveLedger;
pub use shared::SharedLedger;
pub use snapshot::{AccountSnapshot, LedgerSnapshot};

pub type AccountId = String;
pub type Stake = f64;
pub type Amount = f64;

/// The public surface exposed by every strategy.
///
/// Accounts that were never touched read back as zero stake and zero revenue.
pub trait RevenueLedger {
    fn strategy(&self) -> Strategy;

    /// Add `delta` (which may be negative) to the stake of `dest`, creating the
    /// account on first touch.
    fn change_share(&mut self, dest: &str, delta: Stake) -> Result<(), LedgerError>;

    /// Attribute `amount` to the current stakeholders in proportion to their stake.
    fn add_revenue(&mut self, amount: Amount) -> Result<(), LedgerError>;

    fn total_stake(&self) -> Stake;

    fn stake_of(&self, account: &str) -> Stake;

    /// Revenue already materialized for `account`.
    fn settled_revenue(&self, account: &str) -> Amount;

    /// Materialized revenue plus anything earned but not yet checkpointed.
    fn projected_revenue(&self, account: &str) -> Amount {
        self.settled_revenue(account)
    }

    /// Every stored account id, sorted.
    fn accounts(&self) -> Vec<AccountId>;

    fn snapshot(&self) -> LedgerSnapshot;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Walk every account on each revenue injection.
    Naive,
    /// Advance a global accumulator and checkpoint accounts lazily.
    Indexed,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Naive => "naive",
            Strategy::Indexed => "indexed",
        }
    }

    /// Construct a ledger of this strategy from an initial stake mapping.
    pub fn build(
        self,
        initial: BTreeMap<AccountId, Stake>,
    ) -> Result<Box<dyn RevenueLedger + Send>, LedgerError> {
        Ok(match self {
            Strategy::Naive => Box::new(NaiveLedger::new(initial)?),
            Strategy::Indexed => Box::new(IndexedLedger::new(initial)?),
        })
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check an initial stake mapping and return its total.
pub(crate) fn validate_initial(initial: &BTreeMap<AccountId, Stake>) -> Result<Stake, LedgerError> {
    let mut total: Stake = 0.0;
    for (account, &stake) in initial {
        if !(stake.is_finite() && stake > 0.0) {
            return Err(LedgerError::InvalidInitialStake {
                account: account.clone(),
                stake,
            });
        }
        total += stake;
    }
    if !total.is_finite() {
        return Err(LedgerError::StakeOverflow {
            current: 0.0,
            delta: total,
        });
    }
    Ok(total)
}

pub(crate) fn check_delta(delta: Stake) -> Result<(), LedgerError> {
    if delta == 0.0 {
        return Err(LedgerError::ZeroDelta);
    }
    Ok(())
}

/// Total stake after applying `delta`; must stay finite and non-negative.
pub(crate) fn next_total_stake(current: Stake, delta: Stake) -> Result<Stake, LedgerError> {
    let next = current + delta;
    if !(next.is_finite() && next >= 0.0) {
        return Err(LedgerError::StakeOverflow { current, delta });
    }
    Ok(next)
}

pub(crate) fn next_account_stake(
    account: &str,
    stake: Stake,
    delta: Stake,
) -> Result<Stake, LedgerError> {
    let next = stake + delta;
    if !(next >= 0.0) {
        return Err(LedgerError::NegativeAccountStake {
            account: account.to_owned(),
            stake,
            delta,
        });
    }
    Ok(next)
}

/// A validated `change_share`, ready to be committed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct StakeChange {
    pub stake: Stake,
    pub total_stake: Stake,
    pub staked_accounts: usize,
}

/// Validate `delta` for an account holding `stake`: zero delta first, then the
/// pool total, then the account itself.
///
/// `staked_accounts` counts accounts with positive stake. Once the last of them
/// withdraws, the total is exactly zero rather than whatever rounding leftover
/// the running sum carries.
pub(crate) fn plan_stake_change(
    account: &str,
    stake: Stake,
    delta: Stake,
    total_stake: Stake,
    staked_accounts: usize,
) -> Result<StakeChange, LedgerError> {
    check_delta(delta)?;
    let next = stake + delta;
    let staked_after = match (stake > 0.0, next > 0.0) {
        (false, true) => staked_accounts + 1,
        (true, false) => staked_accounts.saturating_sub(1),
        _ => staked_accounts,
    };
    let total_stake = if staked_after == 0 && next >= 0.0 {
        0.0
    } else {
        next_total_stake(total_stake, delta)?
    };
    let stake = next_account_stake(account, stake, delta)?;
    Ok(StakeChange {
        stake,
        total_stake,
        staked_accounts: staked_after,
    })
}

/// Revenue must be positive and finite, and there must be stake to receive it.
pub(crate) fn check_revenue(
    total_stake: Stake,
    staked_accounts: usize,
    amount: Amount,
) -> Result<(), LedgerError> {
    if !(amount.is_finite() && amount > 0.0) {
        return Err(LedgerError::NonPositiveAmount { amount });
    }
    if staked_accounts == 0 || total_stake <= 0.0 {
        return Err(LedgerError::EmptyPool { amount });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn stakes(entries: &[(&str, Stake)]) -> BTreeMap<AccountId, Stake> {
    entries
        .iter()
        .map(|(account, stake)| (account.to_string(), *stake))
        .collect()
}
