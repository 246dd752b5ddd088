//! O(1) revenue distribution through a lazily evaluated accumulator.
//!
//! The ledger keeps a global `index` that grows by `increment_per_revenue * amount`
//! on every injection. The increment factor is rescaled by `old / new` whenever
//! the total stake changes, so `increment_per_revenue * total_stake` stays
//! constant while the pool is non-empty. An account that last checkpointed under
//! `(index0, increment0, total0)` therefore earned
//!
//! ```text
//! (index - index0) * stake / (increment0 * total0)
//! ```
//!
//! since then, no matter how many other accounts joined or left in between.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{
    check_revenue, plan_stake_change, validate_initial,
    AccountId, AccountSnapshot, Amount, LedgerError, LedgerSnapshot, RevenueLedger, Stake,
    Strategy,
};

/// Starting value of the global accumulator.
pub const INDEX_INIT: f64 = 1_000_000.0;
/// Increment factor of a pool that was empty (or fresh) when it last resized.
pub const INCR_PER_REV_INIT: f64 = 10_000.0;

/// Global state captured by an account at its last touch.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_total_stake: Stake,
    pub last_increment_per_revenue: f64,
    pub last_index: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct IndexedAccount {
    stake: Stake,
    checkpoint: Checkpoint,
    accumulated_revenue: Amount,
}

impl IndexedAccount {
    /// Revenue earned since the checkpoint, given the current global index.
    fn pending(&self, index: f64) -> Amount {
        if self.stake > 0.0 {
            // divided first: stake * increment overflows near f64::MAX
            (index - self.checkpoint.last_index) * (self.stake / self.checkpoint.last_total_stake)
                / self.checkpoint.last_increment_per_revenue
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug)]
pub struct IndexedLedger {
    accounts: HashMap<AccountId, IndexedAccount>,
    total_stake: Stake,
    staked_accounts: usize,
    increment_per_revenue: f64,
    index: f64,
}

impl Default for IndexedLedger {
    fn default() -> Self {
        Self {
            accounts: HashMap::new(),
            total_stake: 0.0,
            staked_accounts: 0,
            increment_per_revenue: INCR_PER_REV_INIT,
            index: INDEX_INIT,
        }
    }
}

impl IndexedLedger {
    pub fn new(initial: BTreeMap<AccountId, Stake>) -> Result<Self, LedgerError> {
        let mut ledger = Self {
            total_stake: validate_initial(&initial)?,
            staked_accounts: initial.len(),
            ..Self::default()
        };
        // Accounts snapshot the globals only once the total is final.
        let checkpoint = ledger.checkpoint();
        ledger.accounts = initial
            .into_iter()
            .map(|(account, stake)| {
                (
                    account,
                    IndexedAccount {
                        stake,
                        checkpoint,
                        accumulated_revenue: 0.0,
                    },
                )
            })
            .collect();
        Ok(ledger)
    }

    pub fn index(&self) -> f64 {
        self.index
    }

    pub fn increment_per_revenue(&self) -> f64 {
        self.increment_per_revenue
    }

    /// Revenue `account` has earned since its last checkpoint. Read-only.
    pub fn pending_revenue(&self, account: &str) -> Amount {
        self.accounts
            .get(account)
            .map_or(0.0, |a| a.pending(self.index))
    }

    pub fn checkpoint_of(&self, account: &str) -> Option<Checkpoint> {
        self.accounts.get(account).map(|a| a.checkpoint)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            last_total_stake: self.total_stake,
            last_increment_per_revenue: self.increment_per_revenue,
            last_index: self.index,
        }
    }

    fn rescale(&mut self, old_total: Stake, new_total: Stake) {
        if new_total == 0.0 {
            self.increment_per_revenue = INCR_PER_REV_INIT;
        } else if old_total != 0.0 {
            self.increment_per_revenue *= old_total / new_total;
        }
    }
}

impl RevenueLedger for IndexedLedger {
    fn strategy(&self) -> Strategy {
        Strategy::Indexed
    }

    fn change_share(&mut self, dest: &str, delta: Stake) -> Result<(), LedgerError> {
        let old_total = self.total_stake;
        let mut account = self
            .accounts
            .get(dest)
            .copied()
            .unwrap_or_else(|| IndexedAccount {
                stake: 0.0,
                checkpoint: self.checkpoint(),
                accumulated_revenue: 0.0,
            });
        let change =
            plan_stake_change(dest, account.stake, delta, old_total, self.staked_accounts)?;
        let (stake, new_total) = (change.stake, change.total_stake);

        let earned = account.pending(self.index);
        if earned != 0.0 {
            trace!(account = dest, earned, "checkpoint materialized");
        }
        account.accumulated_revenue += earned;

        self.rescale(old_total, new_total);
        self.total_stake = new_total;
        self.staked_accounts = change.staked_accounts;

        account.stake = stake;
        account.checkpoint = self.checkpoint();
        self.accounts.insert(dest.to_owned(), account);

        debug!(
            account = dest,
            delta,
            stake,
            total_stake = new_total,
            increment_per_revenue = self.increment_per_revenue,
            "share changed"
        );
        Ok(())
    }

    fn add_revenue(&mut self, amount: Amount) -> Result<(), LedgerError> {
        check_revenue(self.total_stake, self.staked_accounts, amount)?;
        self.index += self.increment_per_revenue * amount;
        debug!(amount, index = self.index, "revenue indexed");
        Ok(())
    }

    fn total_stake(&self) -> Stake {
        self.total_stake
    }

    fn stake_of(&self, account: &str) -> Stake {
        self.accounts.get(account).map_or(0.0, |a| a.stake)
    }

    fn settled_revenue(&self, account: &str) -> Amount {
        self.accounts
            .get(account)
            .map_or(0.0, |a| a.accumulated_revenue)
    }

    fn projected_revenue(&self, account: &str) -> Amount {
        self.accounts
            .get(account)
            .map_or(0.0, |a| a.accumulated_revenue + a.pending(self.index))
    }

    fn accounts(&self) -> Vec<AccountId> {
        let mut ids: Vec<AccountId> = self.accounts.keys().cloned().collect();
        ids.sort();
        ids
    }

    fn snapshot(&self) -> LedgerSnapshot {
        let accounts = self
            .accounts
            .iter()
            .map(|(id, account)| {
                (
                    id.clone(),
                    AccountSnapshot {
                        stake: account.stake,
                        settled_revenue: account.accumulated_revenue,
                        projected_revenue: account.accumulated_revenue
                            + account.pending(self.index),
                        checkpoint: Some(account.checkpoint),
                    },
                )
            })
            .collect();
        let globals = BTreeMap::from([
            ("increment_per_revenue".to_string(), self.increment_per_revenue),
            ("index".to_string(), self.index),
        ]);
        LedgerSnapshot {
            strategy: Strategy::Indexed,
            total_stake: self.total_stake,
            globals,
            accounts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::stakes;
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    /// Materialize pending revenue without changing the final stake.
    fn touch(ledger: &mut IndexedLedger, account: &str) {
        ledger.change_share(account, 1.0).unwrap();
        ledger.change_share(account, -1.0).unwrap();
    }

    #[test]
    fn equal_stakes_split_revenue_after_checkpoint() {
        let mut ledger = IndexedLedger::new(stakes(&[("alice", 1.0), ("bob", 1.0)])).unwrap();
        ledger.add_revenue(100.0).unwrap();
        assert_eq!(ledger.settled_revenue("alice"), 0.0);
        assert_close(ledger.pending_revenue("alice"), 50.0);

        touch(&mut ledger, "alice");
        touch(&mut ledger, "bob");
        assert_close(ledger.settled_revenue("alice"), 50.0);
        assert_close(ledger.settled_revenue("bob"), 50.0);
        assert_close(ledger.pending_revenue("alice"), 0.0);
    }

    #[test]
    fn unequal_stakes_split_proportionally() {
        let mut ledger = IndexedLedger::new(stakes(&[("alice", 3.0), ("bob", 1.0)])).unwrap();
        ledger.add_revenue(100.0).unwrap();
        touch(&mut ledger, "alice");
        touch(&mut ledger, "bob");
        assert_close(ledger.settled_revenue("alice"), 75.0);
        assert_close(ledger.settled_revenue("bob"), 25.0);
    }

    #[test]
    fn late_joiner_only_earns_after_joining() {
        let mut ledger = IndexedLedger::new(stakes(&[("alice", 1.0)])).unwrap();
        ledger.add_revenue(100.0).unwrap();
        ledger.change_share("bob", 1.0).unwrap();
        assert_close(ledger.increment_per_revenue(), INCR_PER_REV_INIT / 2.0);
        ledger.add_revenue(100.0).unwrap();

        assert_close(ledger.projected_revenue("alice"), 150.0);
        assert_close(ledger.projected_revenue("bob"), 50.0);
    }

    #[test]
    fn fresh_account_on_empty_ledger() {
        let mut ledger = IndexedLedger::default();
        ledger.change_share("carol", 50.0).unwrap();
        assert_eq!(ledger.stake_of("carol"), 50.0);
        assert_eq!(ledger.total_stake(), 50.0);
        assert_eq!(ledger.settled_revenue("carol"), 0.0);
        // growing from an empty pool keeps the factor
        assert_eq!(ledger.increment_per_revenue(), INCR_PER_REV_INIT);

        ledger.add_revenue(100.0).unwrap();
        assert_close(ledger.projected_revenue("carol"), 100.0);
    }

    #[test]
    fn emptying_the_pool_resets_the_factor() {
        let mut ledger = IndexedLedger::new(stakes(&[("alice", 4.0)])).unwrap();
        ledger.change_share("alice", 4.0).unwrap();
        assert_close(ledger.increment_per_revenue(), INCR_PER_REV_INIT / 2.0);
        ledger.add_revenue(10.0).unwrap();
        ledger.change_share("alice", -8.0).unwrap();
        assert_eq!(ledger.increment_per_revenue(), INCR_PER_REV_INIT);
        assert_close(ledger.settled_revenue("alice"), 10.0);

        ledger.change_share("bob", 2.0).unwrap();
        ledger.add_revenue(6.0).unwrap();
        assert_close(ledger.projected_revenue("bob"), 6.0);
        assert_close(ledger.projected_revenue("alice"), 10.0);
    }

    #[test]
    fn checkpoint_refreshes_to_post_update_globals() {
        let mut ledger = IndexedLedger::new(stakes(&[("alice", 2.0)])).unwrap();
        ledger.add_revenue(7.0).unwrap();
        ledger.change_share("bob", 6.0).unwrap();
        let checkpoint = ledger.checkpoint_of("bob").unwrap();
        assert_eq!(checkpoint.last_total_stake, 8.0);
        assert_eq!(checkpoint.last_index, ledger.index());
        assert_eq!(
            checkpoint.last_increment_per_revenue,
            ledger.increment_per_revenue()
        );
    }

    #[test]
    fn add_revenue_touches_only_the_index() {
        let mut ledger = IndexedLedger::new(stakes(&[("alice", 1.0), ("bob", 3.0)])).unwrap();
        let before = ledger.snapshot();
        ledger.add_revenue(25.0).unwrap();
        let after = ledger.snapshot();
        assert_eq!(
            after.globals["index"],
            INDEX_INIT + INCR_PER_REV_INIT * 25.0
        );
        for (id, row) in &after.accounts {
            assert_eq!(row.checkpoint, before.accounts[id].checkpoint);
            assert_eq!(row.settled_revenue, 0.0);
        }
    }

    #[test]
    fn rejected_calls_leave_state_untouched() {
        let mut ledger = IndexedLedger::new(stakes(&[("alice", 1.0), ("bob", 1.0)])).unwrap();
        ledger.add_revenue(10.0).unwrap();
        let before = ledger.snapshot().fingerprint();

        assert_eq!(ledger.change_share("alice", 0.0), Err(LedgerError::ZeroDelta));
        assert!(ledger.change_share("alice", -1.5).is_err());
        assert!(ledger.change_share("carol", -0.5).is_err());
        assert!(ledger.change_share("alice", f64::INFINITY).is_err());
        assert!(ledger.add_revenue(0.0).is_err());
        assert!(ledger.add_revenue(-5.0).is_err());

        assert_eq!(ledger.snapshot().fingerprint(), before);
        assert!(ledger.checkpoint_of("carol").is_none());
    }

    #[test]
    fn withdrawing_fractional_stakes_resets_the_factor() {
        let mut ledger = IndexedLedger::new(stakes(&[("alice", 0.1), ("bob", 0.2)])).unwrap();
        ledger.add_revenue(3.0).unwrap();
        ledger.change_share("alice", -0.1).unwrap();
        ledger.change_share("bob", -0.2).unwrap();
        assert_eq!(ledger.total_stake(), 0.0);
        assert_eq!(ledger.increment_per_revenue(), INCR_PER_REV_INIT);
        assert_eq!(
            ledger.add_revenue(50.0),
            Err(LedgerError::EmptyPool { amount: 50.0 })
        );

        ledger.change_share("dave", 2.0).unwrap();
        ledger.add_revenue(10.0).unwrap();
        touch(&mut ledger, "dave");
        assert_close(ledger.settled_revenue("dave"), 10.0);
        assert_close(ledger.snapshot().total_settled_revenue(), 13.0);
    }
}
