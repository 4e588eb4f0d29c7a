// ── Store-wide change notification ──
//
// A version counter published through a `watch` channel. Notifying bumps
// the version; waiting subscribes (marking the current version as seen)
// and races the next bump against a cancellation token.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Why a wait for a data change returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A change notification was published while waiting.
    Changed,
    /// The cancellation token fired first (or was already cancelled).
    Cancelled,
    /// The store was built without notification support; nothing to wait on.
    Unlockable,
}

pub(crate) struct ChangeNotifier {
    version: watch::Sender<u64>,
}

impl ChangeNotifier {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        Self { version }
    }

    /// Wake every current waiter.
    pub(crate) fn notify(&self) {
        // `send_modify` updates unconditionally, even with zero receivers.
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn waiter_count(&self) -> usize {
        self.version.receiver_count()
    }

    /// Start a wait. Notifications published before this call are not seen.
    ///
    /// Subscribing happens eagerly so that a notify racing with the first
    /// poll of the returned future is still observed.
    pub(crate) fn wait(&self, cancel: &CancellationToken) -> impl Future<Output = WaitOutcome> + Send {
        let mut receiver = self.version.subscribe();
        async move {
            tokio::select! {
                biased;
                () = cancel.cancelled() => WaitOutcome::Cancelled,
                // The sender lives as long as the store, and the store
                // outlives every borrowed wait.
                _ = receiver.changed() => WaitOutcome::Changed,
            }
        }
    }
}
