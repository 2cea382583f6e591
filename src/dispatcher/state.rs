//! The running flag: idle/active gate for the single worker loop.
//!
//! The flag is one atomic word, `(epoch << 1) | active`. Every dispatch
//! bumps the epoch, so a worker holding a stale observation can never CAS
//! the flag back to idle after an item was pushed behind its back.

use std::sync::atomic::{AtomicU64, Ordering};

const ACTIVE_BIT: u64 = 1;

/// A snapshot of the flag word, used as the compare token for a later CAS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Observed(u64);

impl Observed {
    pub(crate) fn is_active(self) -> bool {
        self.0 & ACTIVE_BIT == ACTIVE_BIT
    }

    fn epoch(self) -> u64 {
        self.0 >> 1
    }

    fn activated(self) -> u64 {
        (self.epoch().wrapping_add(1) << 1) | ACTIVE_BIT
    }

    fn idled(self) -> u64 {
        self.0 & !ACTIVE_BIT
    }
}

#[derive(Debug, Default)]
pub(crate) struct RunningFlag {
    word: AtomicU64,
}

impl RunningFlag {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn observe(&self) -> Observed {
        Observed(self.word.load(Ordering::Acquire))
    }

    pub(crate) fn is_active(&self) -> bool {
        self.observe().is_active()
    }

    /// Publish a dispatch: move the flag to active under a fresh epoch.
    ///
    /// `observed` is the value read before the item was pushed. A failed CAS
    /// retries from the value that beat it, so exactly one epoch bump lands
    /// after the push. Returns `true` when the replaced value was idle, i.e.
    /// the caller owns starting the worker loop.
    pub(crate) fn activate(&self, mut observed: Observed) -> bool {
        loop {
            match self.word.compare_exchange_weak(
                observed.0,
                observed.activated(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return !observed.is_active(),
                Err(actual) => observed = Observed(actual),
            }
        }
    }

    /// Hand control back to idle, but only if nothing was dispatched since
    /// `token` was observed. Only the worker loop calls this.
    pub(crate) fn release(&self, token: Observed) -> bool {
        self.word
            .compare_exchange(token.0, token.idled(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Drop to idle for a worker loop that was started but never ran.
    /// Keeps the epoch, so a stale release token still fails.
    pub(crate) fn abandon(&self) {
        self.word.fetch_and(!ACTIVE_BIT, Ordering::AcqRel);
    }
}
