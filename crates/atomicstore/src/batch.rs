// ── Concurrent mutation batches ──
//
// Jobs queue up under a batch-local lock, then a bounded set of scoped
// worker threads drains them. Per-operation callbacks are suppressed; the
// store's batch callbacks fire once per outcome class after every worker
// joins.

use std::fmt;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::vec;

use tracing::{debug, warn};

use crate::store::{BatchHook, Dispatch, InsertMode, KeyValues, Store};

/// A queued mutation.
enum Job<V> {
    Insert { key: String, value: V },
    InsertUnique { key: String, value: V },
    Remove { key: String },
}

/// What a single job did, as observed by that job.
enum Outcome<V> {
    Created(String, V),
    Updated(String, V),
    Deleted(String, V),
    Unchanged,
}

impl<V> Job<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn key(&self) -> &str {
        match self {
            Self::Insert { key, .. } | Self::InsertUnique { key, .. } | Self::Remove { key } => key,
        }
    }

    fn run(self, store: &Store<V>) -> Outcome<V> {
        match self {
            Self::Insert { key, value } => {
                match store.write(key.clone(), value, InsertMode::Overwrite, Dispatch::Silent) {
                    (stored, true) => Outcome::Updated(key, stored),
                    (stored, false) => Outcome::Created(key, stored),
                }
            }
            Self::InsertUnique { key, value } => {
                match store.write(key.clone(), value, InsertMode::Unique, Dispatch::Silent) {
                    (_, true) => Outcome::Unchanged,
                    (stored, false) => Outcome::Created(key, stored),
                }
            }
            Self::Remove { key } => store
                .delete(&key, Dispatch::Silent)
                .map_or(Outcome::Unchanged, |removed| Outcome::Deleted(key, removed)),
        }
    }
}

/// Aggregated results of one [`Batch::execute`] call.
///
/// Each job is classified by what it observed itself, so when two jobs in
/// a batch touch the same key the key can show up in both `created` and
/// `updated`, and which value wins in each set depends on scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport<V> {
    /// Keys that were absent when their insert committed.
    pub created: KeyValues<V>,
    /// Keys overwritten by a plain insert.
    pub updated: KeyValues<V>,
    /// Keys that a remove actually deleted, with the removed value.
    pub deleted: KeyValues<V>,
}

impl<V> BatchReport<V> {
    /// `true` when the batch changed nothing.
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    fn record(&mut self, outcome: Outcome<V>) {
        match outcome {
            Outcome::Created(key, value) => {
                self.created.insert(key, value);
            }
            Outcome::Updated(key, value) => {
                self.updated.insert(key, value);
            }
            Outcome::Deleted(key, value) => {
                self.deleted.insert(key, value);
            }
            Outcome::Unchanged => {}
        }
    }
}

impl<V> Default for BatchReport<V> {
    fn default() -> Self {
        Self {
            created: KeyValues::new(),
            updated: KeyValues::new(),
            deleted: KeyValues::new(),
        }
    }
}

/// A set of mutations applied concurrently against one store.
///
/// Obtained from [`Store::batch`]. Producers may queue jobs from several
/// threads; [`execute`](Self::execute) consumes the batch, so nothing can
/// be queued once it has run.
///
/// Jobs run in no particular order. Two jobs on the same key race under
/// the store's write lock and the last to commit decides the final value.
pub struct Batch<'s, V> {
    store: &'s Store<V>,
    jobs: Mutex<Vec<Job<V>>>,
}

impl<'s, V> Batch<'s, V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(store: &'s Store<V>) -> Self {
        Self {
            store,
            jobs: Mutex::new(Vec::new()),
        }
    }

    /// Queue an overwriting insert.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.push(Job::Insert {
            key: key.into(),
            value,
        });
    }

    /// Queue an insert that only applies if the key is absent.
    pub fn insert_unique(&self, key: impl Into<String>, value: V) {
        self.push(Job::InsertUnique {
            key: key.into(),
            value,
        });
    }

    /// Queue a removal.
    pub fn remove(&self, key: impl Into<String>) {
        self.push(Job::Remove { key: key.into() });
    }

    /// Number of queued jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every queued job concurrently and wait for all of them, then
    /// fire the store's batch callbacks.
    ///
    /// Jobs are pulled from a shared queue by up to
    /// [`available_parallelism`](thread::available_parallelism) workers, the
    /// calling thread included, so batch size never dictates thread count.
    /// A job that panics is logged and left out of the report; the rest
    /// still run.
    ///
    /// Each non-empty outcome set is delivered exactly once: created to the
    /// batch-insert callback, updated to batch-update, deleted to
    /// batch-remove. The same sets are returned.
    pub fn execute(self) -> BatchReport<V> {
        let store = self.store;
        store.assert_not_reentrant("batch");

        let jobs = self
            .jobs
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        let helpers = worker_count(jobs.len()).saturating_sub(1);
        debug!(store = %store.label(), jobs = jobs.len(), helpers, "executing batch");

        let queue = Mutex::new(jobs.into_iter());
        let mut report = BatchReport::default();
        thread::scope(|scope| {
            let mut workers = Vec::with_capacity(helpers);
            for n in 0..helpers {
                let spawned = thread::Builder::new()
                    .name(format!("atomicstore-batch-{n}"))
                    .spawn_scoped(scope, || drain(&queue, store));
                match spawned {
                    Ok(worker) => workers.push(worker),
                    Err(err) => {
                        warn!(store = %store.label(), error = %err, "could not start batch worker");
                        break;
                    }
                }
            }

            // The caller drains too, so the batch finishes even with no helpers.
            for outcome in drain(&queue, store) {
                report.record(outcome);
            }
            for worker in workers {
                let Ok(outcomes) = worker.join() else {
                    warn!(store = %store.label(), "batch worker panicked");
                    continue;
                };
                for outcome in outcomes {
                    report.record(outcome);
                }
            }
        });

        store.fire_batch(BatchHook::Insert, &report.created);
        store.fire_batch(BatchHook::Update, &report.updated);
        store.fire_batch(BatchHook::Remove, &report.deleted);

        debug!(
            store = %store.label(),
            created = report.created.len(),
            updated = report.updated.len(),
            deleted = report.deleted.len(),
            "batch applied"
        );

        report
    }

    fn push(&self, job: Job<V>) {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job);
    }
}

/// Threads that work on one batch, caller included.
fn worker_count(jobs: usize) -> usize {
    thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .min(jobs)
}

/// Pull jobs off the shared queue until it is empty.
fn drain<V>(queue: &Mutex<vec::IntoIter<Job<V>>>, store: &Store<V>) -> Vec<Outcome<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let mut outcomes = Vec::new();
    loop {
        // The queue guard must drop before the job runs.
        let next = queue.lock().unwrap_or_else(PoisonError::into_inner).next();
        let Some(job) = next else {
            return outcomes;
        };
        let key = job.key().to_owned();
        match panic::catch_unwind(AssertUnwindSafe(|| job.run(store))) {
            Ok(outcome) => outcomes.push(outcome),
            Err(_) => warn!(store = %store.label(), %key, "batch job panicked; job skipped"),
        }
    }
}

impl<V> fmt::Debug for Batch<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queued = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        f.debug_struct("Batch")
            .field("store", &self.store.label())
            .field("queued", &queued)
            .finish()
    }
}
