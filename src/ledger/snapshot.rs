use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{AccountId, Amount, Checkpoint, Stake, Strategy};

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct AccountSnapshot {
    pub stake: Stake,
    pub settled_revenue: Amount,
    pub projected_revenue: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
}

/// Point-in-time copy of a ledger, sorted by account id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct LedgerSnapshot {
    pub strategy: Strategy,
    pub total_stake: Stake,
    /// Strategy specific scalars (`index`, `increment_per_revenue`).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub globals: BTreeMap<String, f64>,
    pub accounts: BTreeMap<AccountId, AccountSnapshot>,
}

impl LedgerSnapshot {
    pub fn total_settled_revenue(&self) -> Amount {
        self.accounts.values().map(|a| a.settled_revenue).sum()
    }

    pub fn total_projected_revenue(&self) -> Amount {
        self.accounts.values().map(|a| a.projected_revenue).sum()
    }

    /// Merkle root over the exact bit patterns of every stored field.
    ///
    /// Two snapshots share a fingerprint only if the ledgers are bit-for-bit
    /// identical, which is what a rejected call must guarantee.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut leaves: Vec<[u8; 32]> = Vec::with_capacity(self.accounts.len() + 1);

        let mut hasher = Sha256::new();
        hasher.update(b"globals");
        hasher.update(self.strategy.name().as_bytes());
        hasher.update(self.total_stake.to_bits().to_le_bytes());
        for (name, value) in &self.globals {
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name.as_bytes());
            hasher.update(value.to_bits().to_le_bytes());
        }
        leaves.push(hasher.finalize().into());

        for (account, row) in &self.accounts {
            let mut hasher = Sha256::new();
            hasher.update(b"acct");
            hasher.update((account.len() as u64).to_le_bytes());
            hasher.update(account.as_bytes());
            hasher.update(row.stake.to_bits().to_le_bytes());
            hasher.update(row.settled_revenue.to_bits().to_le_bytes());
            if let Some(checkpoint) = &row.checkpoint {
                hasher.update(checkpoint.last_total_stake.to_bits().to_le_bytes());
                hasher.update(checkpoint.last_increment_per_revenue.to_bits().to_le_bytes());
                hasher.update(checkpoint.last_index.to_bits().to_le_bytes());
            }
            leaves.push(hasher.finalize().into());
        }
        build_merkle(leaves)
    }

    pub fn fingerprint_hex(&self) -> String {
        hex::encode(self.fingerprint())
    }
}

fn build_merkle(mut leaves: Vec<[u8; 32]>) -> [u8; 32] {
    while leaves.len() > 1 {
        let mut next = Vec::with_capacity((leaves.len() + 1) / 2);
        for chunk in leaves.chunks(2) {
            let mut hasher = Sha256::new();
            hasher.update(b"node");
            hasher.update(chunk[0]);
            hasher.update(chunk.get(1).unwrap_or(&chunk[0]));
            next.push(hasher.finalize().into());
        }
        leaves = next;
    }
    leaves[0]
}
