// ── Store construction settings ──
//
// Describes *how* a store behaves. Never touches disk: the
// `atomicstore-config` crate loads files and hands one of these in.

/// Settings for a single [`Store`](crate::Store).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Enables the store-wide write lock and change notification.
    pub lockable: bool,
    /// Name attached to every log line emitted by the store.
    pub label: String,
}

impl StoreConfig {
    pub fn new(lockable: bool) -> Self {
        Self {
            lockable,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lockable: true,
            label: "default".into(),
        }
    }
}
