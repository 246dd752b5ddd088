use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ledger::{AccountId, Amount, LedgerError, RevenueLedger, Stake, Strategy};

pub mod generate;

pub use generate::{generate, GeneratorConfig};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Operation {
    ChangeShare { dest: AccountId, delta: Stake },
    AddRevenue { amount: Amount },
}

impl Operation {
    pub fn apply<L: RevenueLedger + ?Sized>(&self, ledger: &mut L) -> Result<(), LedgerError> {
        match self {
            Operation::ChangeShare { dest, delta } => ledger.change_share(dest, *delta),
            Operation::AddRevenue { amount } => ledger.add_revenue(*amount),
        }
    }
}

/// An initial stake mapping followed by the operations to run against it.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Script {
    #[serde(default)]
    pub initial: BTreeMap<AccountId, Stake>,
    #[serde(default)]
    pub operations: Vec<Operation>,
}

impl Script {
    pub fn from_json(json: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let json = fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, ScriptError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build a fresh ledger and replay every operation through it.
    pub fn run(
        &self,
        strategy: Strategy,
    ) -> Result<(Box<dyn RevenueLedger + Send>, ReplayReport), ScriptError> {
        let mut ledger = strategy.build(self.initial.clone())?;
        let report = replay(&mut *ledger, &self.operations);
        Ok((ledger, report))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read script {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed script: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Rejection {
    /// Zero-based position of the operation in the script.
    pub step: usize,
    pub operation: Operation,
    pub error: LedgerError,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct ReplayReport {
    pub applied: usize,
    pub rejected: Vec<Rejection>,
    /// Sum of every accepted revenue injection.
    pub injected: Amount,
}

/// Apply `operations` in order. A rejected operation is recorded and skipped;
/// the ledger is left as it was before that operation.
pub fn replay<L: RevenueLedger + ?Sized>(ledger: &mut L, operations: &[Operation]) -> ReplayReport {
    let mut report = ReplayReport::default();
    for (step, operation) in operations.iter().enumerate() {
        match operation.apply(&mut *ledger) {
            Ok(()) => {
                report.applied += 1;
                if let Operation::AddRevenue { amount } = operation {
                    report.injected += amount;
                }
            }
            Err(error) => {
                debug!(step, %error, "operation rejected");
                report.rejected.push(Rejection {
                    step,
                    operation: operation.clone(),
                    error,
                });
            }
        }
    }
    report
}

/// Force a checkpoint on every account holding stake, leaving stakes as they were.
///
/// Each account adds and then removes its own stake. Doubling and halving are
/// exact in binary floating point, so the account ends with precisely the stake
/// it started with. When doubling would overflow the pool total, the stake is
/// removed first and then restored.
pub fn settle<L: RevenueLedger + ?Sized>(ledger: &mut L) -> Result<usize, LedgerError> {
    let mut settled = 0;
    for account in ledger.accounts() {
        let stake = ledger.stake_of(&account);
        if stake > 0.0 {
            if (ledger.total_stake() + stake).is_finite() {
                ledger.change_share(&account, stake)?;
                ledger.change_share(&account, -stake)?;
            } else {
                ledger.change_share(&account, -stake)?;
                ledger.change_share(&account, stake)?;
            }
            settled += 1;
        }
    }
    Ok(settled)
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Divergence {
    pub account: AccountId,
    pub left: Amount,
    pub right: Amount,
}

impl Divergence {
    pub fn difference(&self) -> Amount {
        (self.left - self.right).abs()
    }
}

/// Settled revenue of two ledgers checked against each other and against the
/// revenue injected into them.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Comparison {
    pub left: Strategy,
    pub right: Strategy,
    pub injected: Amount,
    /// Absolute bound derived from the relative tolerance and `injected`.
    pub bound: Amount,
    pub left_total: Amount,
    pub right_total: Amount,
    pub divergences: Vec<Divergence>,
}

impl Comparison {
    pub fn conserves(&self) -> bool {
        (self.left_total - self.injected).abs() <= self.bound
            && (self.right_total - self.injected).abs() <= self.bound
    }

    pub fn is_consistent(&self) -> bool {
        self.divergences.is_empty() && self.conserves()
    }
}

/// `tolerance` is relative to the injected total (or to 1 for tiny totals).
pub fn compare<A, B>(left: &A, right: &B, injected: Amount, tolerance: f64) -> Comparison
where
    A: RevenueLedger + ?Sized,
    B: RevenueLedger + ?Sized,
{
    let bound = tolerance * injected.abs().max(1.0);
    let accounts: BTreeSet<AccountId> = left
        .accounts()
        .into_iter()
        .chain(right.accounts())
        .collect();

    let mut comparison = Comparison {
        left: left.strategy(),
        right: right.strategy(),
        injected,
        bound,
        left_total: 0.0,
        right_total: 0.0,
        divergences: Vec::new(),
    };
    for account in accounts {
        let l = left.settled_revenue(&account);
        let r = right.settled_revenue(&account);
        comparison.left_total += l;
        comparison.right_total += r;
        if (l - r).abs() > bound {
            comparison.divergences.push(Divergence {
                account,
                left: l,
                right: r,
            });
        }
    }
    comparison
}
