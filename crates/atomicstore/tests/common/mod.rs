// Shared helpers for atomicstore integration tests.

#![allow(dead_code)]

use std::thread;
use std::time::{Duration, Instant};

use atomicstore::Store;
use tracing_subscriber::EnvFilter;

/// Route store logs to the test harness. Set `RUST_LOG=atomicstore=trace`
/// to see them.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Spin until `count` waits are registered on `store`.
pub fn await_waiters<V>(store: &Store<V>, count: usize)
where
    V: Clone + Send + Sync + 'static,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while store.waiter_count() < count {
        assert!(
            Instant::now() < deadline,
            "timed out waiting for {count} waiters (have {})",
            store.waiter_count()
        );
        thread::sleep(Duration::from_millis(1));
    }
}
