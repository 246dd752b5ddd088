use std::sync::Arc;

use parking_lot::Mutex;

use super::{Amount, LedgerError, LedgerSnapshot, RevenueLedger, Stake};

/// Cloneable handle that serializes whole ledger calls behind one lock.
///
/// `total_stake`, `index` and `increment_per_revenue` move together, so the
/// lock covers the entire ledger rather than individual accounts.
pub struct SharedLedger<L> {
    inner: Arc<Mutex<L>>,
}

impl<L> Clone for SharedLedger<L> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<L: RevenueLedger> SharedLedger<L> {
    pub fn new(ledger: L) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    pub fn change_share(&self, dest: &str, delta: Stake) -> Result<(), LedgerError> {
        self.inner.lock().change_share(dest, delta)
    }

    pub fn add_revenue(&self, amount: Amount) -> Result<(), LedgerError> {
        self.inner.lock().add_revenue(amount)
    }

    /// Run `f` against the ledger while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&mut L) -> R) -> R {
        let mut guard = self.inner.lock();
        f(&mut *guard)
    }

    pub fn snapshot(&self) -> LedgerSnapshot {
        self.inner.lock().snapshot()
    }

    /// Recover the ledger once every other handle has been dropped.
    pub fn into_inner(self) -> Result<L, Self> {
        Arc::try_unwrap(self.inner)
            .map(Mutex::into_inner)
            .map_err(|inner| Self { inner })
    }
}
