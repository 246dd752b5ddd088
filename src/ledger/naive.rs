use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{
    check_revenue, plan_stake_change, validate_initial,
    AccountId, AccountSnapshot, Amount, LedgerError, LedgerSnapshot, RevenueLedger, Stake,
    Strategy,
};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct NaiveAccount {
    stake: Stake,
    revenue: Amount,
}

/// Reference strategy: every injection walks the full account set.
#[derive(Clone, Debug, Default)]
pub struct NaiveLedger {
    accounts: HashMap<AccountId, NaiveAccount>,
    total_stake: Stake,
    staked_accounts: usize,
}

impl NaiveLedger {
    pub fn new(initial: BTreeMap<AccountId, Stake>) -> Result<Self, LedgerError> {
        let total_stake = validate_initial(&initial)?;
        let staked_accounts = initial.len();
        let accounts = initial
            .into_iter()
            .map(|(account, stake)| {
                (
                    account,
                    NaiveAccount {
                        stake,
                        revenue: 0.0,
                    },
                )
            })
            .collect();
        Ok(Self {
            accounts,
            total_stake,
            staked_accounts,
        })
    }
}

impl RevenueLedger for NaiveLedger {
    fn strategy(&self) -> Strategy {
        Strategy::Naive
    }

    fn change_share(&mut self, dest: &str, delta: Stake) -> Result<(), LedgerError> {
        let change = plan_stake_change(
            dest,
            self.stake_of(dest),
            delta,
            self.total_stake,
            self.staked_accounts,
        )?;
        let (stake, total_stake) = (change.stake, change.total_stake);

        self.total_stake = total_stake;
        self.staked_accounts = change.staked_accounts;
        match self.accounts.get_mut(dest) {
            Some(account) => account.stake = stake,
            None => {
                self.accounts.insert(
                    dest.to_owned(),
                    NaiveAccount {
                        stake,
                        revenue: 0.0,
                    },
                );
            }
        }
        debug!(account = dest, delta, stake, total_stake, "share changed");
        Ok(())
    }

    fn add_revenue(&mut self, amount: Amount) -> Result<(), LedgerError> {
        check_revenue(self.total_stake, self.staked_accounts, amount)?;
        let total_stake = self.total_stake;
        for account in self.accounts.values_mut() {
            account.revenue += (account.stake / total_stake) * amount;
        }
        debug!(amount, accounts = self.accounts.len(), "revenue distributed");
        Ok(())
    }

    fn total_stake(&self) -> Stake {
        self.total_stake
    }

    fn stake_of(&self, account: &str) -> Stake {
        self.accounts.get(account).map_or(0.0, |a| a.stake)
    }

    fn settled_revenue(&self, account: &str) -> Amount {
        self.accounts.get(account).map_or(0.0, |a| a.revenue)
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
                        settled_revenue: account.revenue,
                        projected_revenue: account.revenue,
                        checkpoint: None,
                    },
                )
            })
            .collect();
        LedgerSnapshot {
            strategy: Strategy::Naive,
            total_stake: self.total_stake,
            globals: BTreeMap::new(),
            accounts,
        }
    }
}
