// ── Callback registry ──
//
// Six optional hooks, swapped atomically so registration never blocks
// writers. Every invocation is wrapped in a dispatch guard that catches
// panics and marks the store as busy on the current thread.

use std::cell::RefCell;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tracing::error;

/// Key → value pairs handed to the batch callbacks.
pub type KeyValues<V> = HashMap<String, V>;

/// Single-entry callback: receives the key and the affected value.
pub(crate) type EntryHandler<V> = Box<dyn Fn(&str, &V) + Send + Sync>;

/// Batch callback: receives every key touched by one outcome class.
pub(crate) type BatchHandler<V> = Box<dyn Fn(&KeyValues<V>) + Send + Sync>;

thread_local! {
    /// Ids of stores currently running a callback on this thread.
    static DISPATCHING: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Per-operation hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EntryHook {
    Insert,
    Update,
    Remove,
}

/// Aggregated hooks fired once per batch execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BatchHook {
    Insert,
    Update,
    Remove,
}

impl EntryHook {
    fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }
}

impl BatchHook {
    fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "batch_insert",
            Self::Update => "batch_update",
            Self::Remove => "batch_remove",
        }
    }
}

pub(crate) struct Handlers<V> {
    store_id: u64,
    label: String,
    on_insert: ArcSwapOption<EntryHandler<V>>,
    on_update: ArcSwapOption<EntryHandler<V>>,
    on_remove: ArcSwapOption<EntryHandler<V>>,
    on_batch_insert: ArcSwapOption<BatchHandler<V>>,
    on_batch_update: ArcSwapOption<BatchHandler<V>>,
    on_batch_remove: ArcSwapOption<BatchHandler<V>>,
}

impl<V> Handlers<V> {
    pub(crate) fn new(store_id: u64, label: impl Into<String>) -> Self {
        Self {
            store_id,
            label: label.into(),
            on_insert: ArcSwapOption::empty(),
            on_update: ArcSwapOption::empty(),
            on_remove: ArcSwapOption::empty(),
            on_batch_insert: ArcSwapOption::empty(),
            on_batch_update: ArcSwapOption::empty(),
            on_batch_remove: ArcSwapOption::empty(),
        }
    }

    fn entry_slot(&self, hook: EntryHook) -> &ArcSwapOption<EntryHandler<V>> {
        match hook {
            EntryHook::Insert => &self.on_insert,
            EntryHook::Update => &self.on_update,
            EntryHook::Remove => &self.on_remove,
        }
    }

    fn batch_slot(&self, hook: BatchHook) -> &ArcSwapOption<BatchHandler<V>> {
        match hook {
            BatchHook::Insert => &self.on_batch_insert,
            BatchHook::Update => &self.on_batch_update,
            BatchHook::Remove => &self.on_batch_remove,
        }
    }

    // ── Registration ─────────────────────────────────────────────────

    pub(crate) fn set_entry(&self, hook: EntryHook, handler: EntryHandler<V>) {
        self.entry_slot(hook).store(Some(Arc::new(handler)));
    }

    pub(crate) fn set_batch(&self, hook: BatchHook, handler: BatchHandler<V>) {
        self.batch_slot(hook).store(Some(Arc::new(handler)));
    }

    // ── Dispatch ─────────────────────────────────────────────────────

    pub(crate) fn fire_entry(&self, hook: EntryHook, key: &str, value: &V) {
        if let Some(handler) = self.entry_slot(hook).load_full() {
            self.dispatch(hook.as_str(), || handler(key, value));
        }
    }

    /// Fire a batch hook. Empty sets are skipped.
    pub(crate) fn fire_batch(&self, hook: BatchHook, entries: &KeyValues<V>) {
        if entries.is_empty() {
            return;
        }
        if let Some(handler) = self.batch_slot(hook).load_full() {
            self.dispatch(hook.as_str(), || handler(entries));
        }
    }

    /// Run a callback with this store marked as dispatching on the
    /// current thread. Panics stop here and are logged.
    fn dispatch(&self, hook: &'static str, f: impl FnOnce()) {
        DISPATCHING.with(|ids| ids.borrow_mut().push(self.store_id));
        let outcome = panic::catch_unwind(AssertUnwindSafe(f));
        DISPATCHING.with(|ids| {
            ids.borrow_mut().pop();
        });

        if let Err(payload) = outcome {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<non-string panic payload>".into());
            error!(store = %self.label, hook, %reason, "store callback panicked");
        }
    }
}

/// Whether the current thread is inside a callback of the given store.
pub(crate) fn is_dispatching(store_id: u64) -> bool {
    DISPATCHING.with(|ids| ids.borrow().contains(&store_id))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn unset_hooks_are_silent() {
        let handlers: Handlers<u32> = Handlers::new(1, "test");
        handlers.fire_entry(EntryHook::Insert, "k", &1);
        handlers.fire_batch(BatchHook::Insert, &KeyValues::from([("k".into(), 1)]));
    }

    #[test]
    fn later_registration_replaces_earlier() {
        let handlers: Handlers<u32> = Handlers::new(1, "test");
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));

        let hits = Arc::clone(&first);
        handlers.set_entry(
            EntryHook::Update,
            Box::new(move |_: &str, _: &u32| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let hits = Arc::clone(&second);
        handlers.set_entry(
            EntryHook::Update,
            Box::new(move |_: &str, _: &u32| {
                hits.fetch_add(1, Ordering::SeqCst);
            }),
        );

        handlers.fire_entry(EntryHook::Update, "k", &7);
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn empty_batch_does_not_fire() {
        let handlers: Handlers<u32> = Handlers::new(1, "test");
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        handlers.set_batch(
            BatchHook::Remove,
            Box::new(move |_: &KeyValues<u32>| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        handlers.fire_batch(BatchHook::Remove, &KeyValues::new());
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_hook_is_contained() {
        let handlers: Handlers<u32> = Handlers::new(9, "test");
        handlers.set_entry(EntryHook::Remove, Box::new(|_: &str, _: &u32| panic!("boom")));

        handlers.fire_entry(EntryHook::Remove, "k", &1);
        assert!(!is_dispatching(9));
    }

    #[test]
    fn dispatch_marks_only_its_own_store() {
        let handlers: Handlers<u32> = Handlers::new(3, "test");
        let seen = Arc::new(AtomicUsize::new(0));
        let flags = Arc::clone(&seen);
        handlers.set_entry(
            EntryHook::Insert,
            Box::new(move |_: &str, _: &u32| {
                if is_dispatching(3) && !is_dispatching(4) {
                    flags.fetch_add(1, Ordering::SeqCst);
                }
            }),
        );

        handlers.fire_entry(EntryHook::Insert, "k", &1);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
