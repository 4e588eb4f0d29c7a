// ── Concurrent key/value store ──
//
// `DashMap` storage with an exact live count, optional store-wide write
// lock, change notification, and per-operation callbacks.

mod handlers;
mod notify;

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::batch::Batch;
use crate::config::StoreConfig;
use crate::counter::AtomicCounter;

pub(crate) use handlers::{BatchHook, EntryHook};
pub use handlers::KeyValues;
pub use notify::WaitOutcome;

use handlers::Handlers;
use notify::ChangeNotifier;

static NEXT_STORE_ID: AtomicU64 = AtomicU64::new(1);

/// How a write treats a key that is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum InsertMode {
    Overwrite,
    Unique,
}

/// Whether a write fires the per-operation callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Callbacks,
    Silent,
}

/// A thread-safe in-memory key/value store.
///
/// Keys are strings; values are any cloneable `V`. The store keeps an
/// exact live count next to the map and can optionally run in *lockable*
/// mode, where one store-wide mutex serializes every write together with
/// its count update and callback, and observers can block until
/// [`notify_did_change`](Self::notify_did_change) is called.
///
/// Reads never take the write lock. A reader may observe a write before
/// [`len`](Self::len) reflects it.
///
/// # Callbacks
///
/// Per-operation callbacks run on the writing thread, while the write lock
/// is held. A callback must not mutate the store that invoked it: such a
/// call panics, the panic is caught at the callback boundary and logged,
/// and the outer write completes. Callbacks may read the store.
///
/// ```
/// use atomicstore::Store;
///
/// let store = Store::new(true);
/// store.on_insert(|key, _: &u32| panic!("rejecting {key}"));
///
/// // The panic stays inside the callback; the write still lands.
/// assert_eq!(store.insert("a", 1), (1, false));
/// assert_eq!(store.len(), 1);
/// ```
///
/// Both the re-entrancy check and callback containment rely on unwinding.
/// In a binary built with `panic = "abort"`, a re-entrant write or a
/// panicking callback (or a panicking `Clone` inside a batch job) aborts
/// the process instead.
pub struct Store<V> {
    id: u64,
    label: String,
    entries: DashMap<String, V>,
    count: AtomicCounter,
    write_lock: Option<Mutex<()>>,
    notifier: Option<ChangeNotifier>,
    handlers: Handlers<V>,
}

impl<V> Store<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Create a store. `lockable` enables the write lock and notifications.
    pub fn new(lockable: bool) -> Self {
        Self::with_config(StoreConfig::new(lockable))
    }

    pub fn with_config(config: StoreConfig) -> Self {
        let id = NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed);
        let (write_lock, notifier) = if config.lockable {
            (Some(Mutex::new(())), Some(ChangeNotifier::new()))
        } else {
            (None, None)
        };

        debug!(store = %config.label, lockable = config.lockable, "store created");
        let handlers = Handlers::new(id, config.label.as_str());

        Self {
            id,
            label: config.label,
            entries: DashMap::new(),
            count: AtomicCounter::new(),
            write_lock,
            notifier,
            handlers,
        }
    }

    pub fn is_lockable(&self) -> bool {
        self.notifier.is_some()
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    // ── Writes ───────────────────────────────────────────────────────

    /// Write `value` at `key`, overwriting any previous value.
    ///
    /// Returns the stored value and whether the key existed before. Fires
    /// the update callback for an existing key, the insert callback otherwise.
    pub fn insert(&self, key: impl Into<String>, value: V) -> (V, bool) {
        self.write(key.into(), value, InsertMode::Overwrite, Dispatch::Callbacks)
    }

    /// Write `value` at `key` only if the key is absent.
    ///
    /// For an existing key, returns the current value and `true` without
    /// firing any callback.
    pub fn insert_unique(&self, key: impl Into<String>, value: V) -> (V, bool) {
        self.write(key.into(), value, InsertMode::Unique, Dispatch::Callbacks)
    }

    /// Delete `key`. Returns `false` if it was not present.
    pub fn remove(&self, key: &str) -> bool {
        self.delete(key, Dispatch::Callbacks).is_some()
    }

    /// Remove every key, one at a time, then publish one change notification.
    ///
    /// Each removal goes through [`remove`](Self::remove) and fires the
    /// remove callback. Keys inserted concurrently may survive.
    pub fn flush(&self) {
        let keys = self.key_set();
        let mut removed = 0usize;
        for key in &keys {
            if self.remove(key) {
                removed += 1;
            }
        }
        debug!(store = %self.label, removed, "store flushed");
        self.notify_did_change();
    }

    /// Shared write path. `Dispatch::Silent` is used by batches.
    pub(crate) fn write(
        &self,
        key: String,
        value: V,
        mode: InsertMode,
        dispatch: Dispatch,
    ) -> (V, bool) {
        self.assert_not_reentrant("insert");
        let _guard = self.lock();

        let (key, stored, existed) = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let key = occupied.key().clone();
                match mode {
                    InsertMode::Unique => (key, occupied.get().clone(), true),
                    InsertMode::Overwrite => {
                        occupied.insert(value.clone());
                        (key, value, true)
                    }
                }
            }
            Entry::Vacant(vacant) => {
                let key = vacant.key().clone();
                vacant.insert(value.clone());
                self.count.inc();
                (key, value, false)
            }
        };
        trace!(
            store = %self.label,
            %key,
            existed,
            unique = (mode == InsertMode::Unique),
            "insert"
        );

        if dispatch == Dispatch::Callbacks {
            match (existed, mode) {
                (false, _) => self.handlers.fire_entry(EntryHook::Insert, &key, &stored),
                (true, InsertMode::Overwrite) => {
                    self.handlers.fire_entry(EntryHook::Update, &key, &stored);
                }
                (true, InsertMode::Unique) => {}
            }
        }

        (stored, existed)
    }

    /// Shared delete path. Returns the removed value.
    pub(crate) fn delete(&self, key: &str, dispatch: Dispatch) -> Option<V> {
        self.assert_not_reentrant("remove");
        let _guard = self.lock();

        let removed = self.entries.remove(key).map(|(_, value)| value);
        if let Some(value) = &removed {
            self.count.dec();
            trace!(store = %self.label, %key, "remove");
            if dispatch == Dispatch::Callbacks {
                self.handlers.fire_entry(EntryHook::Remove, key, value);
            }
        }
        removed
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|r| r.value().clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Point-in-time set of keys. Not atomic against concurrent writes.
    pub fn key_set(&self) -> HashSet<String> {
        self.entries.iter().map(|r| r.key().clone()).collect()
    }

    pub fn len(&self) -> u64 {
        self.count.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ── Batches ──────────────────────────────────────────────────────

    /// Start a batch of concurrent mutations against this store.
    pub fn batch(&self) -> Batch<'_, V> {
        Batch::new(self)
    }

    // ── Change notification ──────────────────────────────────────────

    /// Wake every thread or task currently waiting for a change.
    /// No-op on a non-lockable store.
    pub fn notify_did_change(&self) {
        if let Some(notifier) = &self.notifier {
            notifier.notify();
        }
    }

    /// Block the calling thread until the next change notification or
    /// until `cancel` fires.
    ///
    /// Returns immediately with [`WaitOutcome::Unlockable`] on a
    /// non-lockable store. Wakeups are store-wide; re-check whatever
    /// condition you are waiting for. From async code use
    /// [`changed`](Self::changed) instead.
    pub fn wait_for_data_change(&self, cancel: &CancellationToken) -> WaitOutcome {
        match &self.notifier {
            Some(notifier) => futures::executor::block_on(notifier.wait(cancel)),
            None => WaitOutcome::Unlockable,
        }
    }

    /// Async counterpart of [`wait_for_data_change`](Self::wait_for_data_change).
    ///
    /// The wait starts when this method is called, not when the future is
    /// first polled.
    pub fn changed(&self, cancel: &CancellationToken) -> impl Future<Output = WaitOutcome> + Send {
        let pending = self.notifier.as_ref().map(|notifier| notifier.wait(cancel));
        async move {
            match pending {
                Some(wait) => wait.await,
                None => WaitOutcome::Unlockable,
            }
        }
    }

    /// Number of notifications published so far, or `None` when the store
    /// is not lockable.
    pub fn change_version(&self) -> Option<u64> {
        self.notifier.as_ref().map(ChangeNotifier::version)
    }

    /// Number of waits currently in progress.
    pub fn waiter_count(&self) -> usize {
        self.notifier.as_ref().map_or(0, ChangeNotifier::waiter_count)
    }

    // ── Callback registration ────────────────────────────────────────

    pub fn on_insert(&self, handler: impl Fn(&str, &V) + Send + Sync + 'static) {
        self.handlers.set_entry(EntryHook::Insert, Box::new(handler));
    }

    pub fn on_update(&self, handler: impl Fn(&str, &V) + Send + Sync + 'static) {
        self.handlers.set_entry(EntryHook::Update, Box::new(handler));
    }

    pub fn on_remove(&self, handler: impl Fn(&str, &V) + Send + Sync + 'static) {
        self.handlers.set_entry(EntryHook::Remove, Box::new(handler));
    }

    pub fn on_batch_insert(&self, handler: impl Fn(&KeyValues<V>) + Send + Sync + 'static) {
        self.handlers.set_batch(BatchHook::Insert, Box::new(handler));
    }

    pub fn on_batch_update(&self, handler: impl Fn(&KeyValues<V>) + Send + Sync + 'static) {
        self.handlers.set_batch(BatchHook::Update, Box::new(handler));
    }

    pub fn on_batch_remove(&self, handler: impl Fn(&KeyValues<V>) + Send + Sync + 'static) {
        self.handlers.set_batch(BatchHook::Remove, Box::new(handler));
    }

    pub(crate) fn fire_batch(&self, hook: BatchHook, entries: &KeyValues<V>) {
        self.handlers.fire_batch(hook, entries);
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.write_lock
            .as_ref()
            .map(|lock| lock.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Writes from inside this store's own callbacks would deadlock on the
    /// write lock; fail loudly instead.
    pub(crate) fn assert_not_reentrant(&self, op: &'static str) {
        if handlers::is_dispatching(self.id) {
            error!(store = %self.label, op, "store mutated from its own callback");
            panic!("store `{}` mutated from its own callback ({op})", self.label);
        }
    }
}

impl<V> fmt::Debug for Store<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("label", &self.label)
            .field("len", &self.count.get())
            .field("lockable", &self.notifier.is_some())
            .finish_non_exhaustive()
    }
}

impl<V> Default for Store<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::with_config(StoreConfig::default())
    }
}
