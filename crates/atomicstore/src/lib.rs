//! Thread-safe in-memory key/value storage with live counts, change
//! notification, and concurrent batches.
//!
//! - **[`Store`]** — `DashMap`-backed mapping from `String` keys to any
//!   cloneable value, with an exact live count. In *lockable* mode every
//!   write, its count update and its callback run under one store-wide
//!   mutex, and observers can block on
//!   [`wait_for_data_change()`](Store::wait_for_data_change) (or await
//!   [`changed()`](Store::changed)) until someone calls
//!   [`notify_did_change()`](Store::notify_did_change) or their
//!   `CancellationToken` fires.
//!
//! - **[`Batch`]** — Queues inserts, unique inserts and removals, then runs
//!   them all concurrently in [`execute()`](Batch::execute). Per-operation
//!   callbacks are suppressed; the store's batch callbacks receive the
//!   aggregated created / updated / deleted sets once each.
//!
//! - **[`AtomicCounter`]** — The non-negative counter behind
//!   [`Store::len`].
//!
//! ```
//! use atomicstore::Store;
//!
//! let store = Store::new(true);
//! assert_eq!(store.insert("k", "v1"), ("v1", false));
//! assert_eq!(store.insert("k", "v2"), ("v2", true));
//!
//! let batch = store.batch();
//! batch.insert_unique("a", "x");
//! batch.remove("k");
//! let report = batch.execute();
//! assert_eq!(report.created.len(), 1);
//! assert_eq!(store.len(), 1);
//! ```

pub mod batch;
pub mod config;
pub mod counter;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use batch::{Batch, BatchReport};
pub use config::StoreConfig;
pub use counter::AtomicCounter;
pub use store::{KeyValues, Store, WaitOutcome};

// Callers need the token type to wait on a store.
pub use tokio_util::sync::CancellationToken;
