// ── Atomic live-count counter ──
//
// Non-negative counter shared between concurrent writers.

use std::sync::atomic::{AtomicU64, Ordering};

/// A non-negative counter safe to bump from many threads.
///
/// Decrementing at zero saturates instead of wrapping.
#[derive(Debug, Default)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::AcqRel);
    }

    pub fn dec(&self) {
        // `fetch_update` only fails when the closure returns `None`,
        // i.e. the counter is already at zero.
        let _ = self
            .value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_sub(1));
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }
}
