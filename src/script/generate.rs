//! Seeded random scripts for exercising both strategies side by side.
//!
//! By default stakes are whole units, so every stake sum is exact. In
//! fractional mode stakes and partial withdrawals are drawn in hundredths, and
//! the pool total carries rounding leftovers. Revenue amounts are always
//! rounded to cents. Candidate operations are checked against a mirror ledger
//! so the generator knows which accounts hold stake and whether the pool is
//! empty.

use std::collections::BTreeMap;

use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::{Operation, Script};
use crate::ledger::{AccountId, Amount, IndexedLedger, RevenueLedger, Stake};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    /// Size of the account universe operations draw from.
    pub accounts: usize,
    /// How many of those accounts start with stake.
    pub initial_accounts: usize,
    pub operations: usize,
    pub seed: u64,
    pub max_stake: u64,
    pub max_revenue: Amount,
    /// Fraction of operations that are deliberately invalid.
    pub invalid_ratio: f64,
    /// Draw stakes in hundredths instead of whole units.
    #[serde(default)]
    pub fractional: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            accounts: 16,
            initial_accounts: 8,
            operations: 200,
            seed: 0,
            max_stake: 1_000,
            max_revenue: 1_000.0,
            invalid_ratio: 0.05,
            fractional: false,
        }
    }
}

pub fn account_id(n: usize) -> AccountId {
    format!("acct-{n:04}")
}

pub fn generate(config: &GeneratorConfig) -> Script {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let stakes = StakeDraw {
        max_stake: config.max_stake.max(1),
        fractional: config.fractional,
    };
    let ids: Vec<AccountId> = (0..config.accounts.max(1)).map(account_id).collect();

    let initial: BTreeMap<AccountId, Stake> = ids
        .iter()
        .take(config.initial_accounts)
        .map(|id| (id.clone(), stakes.draw(&mut rng)))
        .collect();
    let mut mirror = IndexedLedger::new(initial.clone()).unwrap_or_default();

    let invalid_ratio = if config.invalid_ratio.is_finite() {
        config.invalid_ratio.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mut operations = Vec::with_capacity(config.operations);
    for _ in 0..config.operations {
        let id = &ids[rng.gen_range(0..ids.len())];
        let stake = mirror.stake_of(id);
        let operation = if rng.gen_bool(invalid_ratio) {
            invalid_operation(&mut rng, id, stake, &stakes)
        } else {
            let roll: f64 = rng.gen();
            if roll < 0.4 && mirror.total_stake() > 0.0 {
                Operation::AddRevenue {
                    amount: draw_revenue(&mut rng, config.max_revenue),
                }
            } else if stake > 0.0 && roll >= 0.85 {
                Operation::ChangeShare {
                    dest: id.clone(),
                    delta: -stake,
                }
            } else if let Some(amount) = (roll >= 0.65)
                .then(|| stakes.partial(&mut rng, stake))
                .flatten()
            {
                Operation::ChangeShare {
                    dest: id.clone(),
                    delta: -amount,
                }
            } else {
                Operation::ChangeShare {
                    dest: id.clone(),
                    delta: stakes.draw(&mut rng),
                }
            }
        };
        if let Err(error) = operation.apply(&mut mirror) {
            trace!(?operation, %error, "generated rejected operation");
        }
        operations.push(operation);
    }

    Script {
        initial,
        operations,
    }
}

fn invalid_operation(rng: &mut StdRng, id: &AccountId, stake: Stake, stakes: &StakeDraw) -> Operation {
    match rng.gen_range(0..3) {
        0 => Operation::ChangeShare {
            dest: id.clone(),
            delta: 0.0,
        },
        1 => Operation::ChangeShare {
            dest: id.clone(),
            delta: -(stake + stakes.draw(rng)),
        },
        _ => Operation::AddRevenue {
            amount: -(rng.gen_range(0..100) as f64),
        },
    }
}

struct StakeDraw {
    max_stake: u64,
    fractional: bool,
}

impl StakeDraw {
    fn draw(&self, rng: &mut StdRng) -> Stake {
        if self.fractional {
            rng.gen_range(1..=self.max_stake.saturating_mul(100)) as f64 / 100.0
        } else {
            rng.gen_range(1..=self.max_stake) as f64
        }
    }

    /// A withdrawal that leaves the account with part of `stake`, if one fits.
    fn partial(&self, rng: &mut StdRng, stake: Stake) -> Option<Stake> {
        if self.fractional {
            // at least 5% stays behind, so the account never ends on a leftover
            let hundredths = (stake * rng.gen_range(0.05..0.95) * 100.0).floor();
            (hundredths >= 1.0).then(|| hundredths / 100.0)
        } else if stake >= 2.0 {
            Some(rng.gen_range(1..stake as u64) as f64)
        } else {
            None
        }
    }
}

fn draw_revenue(rng: &mut StdRng, max_revenue: Amount) -> Amount {
    let cents = (max_revenue.max(0.01) * 100.0).floor() as u64;
    rng.gen_range(1..=cents.max(1)) as f64 / 100.0
}
