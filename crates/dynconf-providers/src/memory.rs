//! In-memory provider.

use async_trait::async_trait;
use dynconf_common::Snapshot;
use dynconf_config::{Provider, ProviderError};
use parking_lot::Mutex;

/// A provider whose contents are set by the caller.
///
/// Useful in tests and demos. Every fetch returns the current contents unless
/// a failure has been queued with [`fail_next`](MemoryProvider::fail_next).
#[derive(Debug)]
pub struct MemoryProvider {
    initial: Snapshot,
    current: Mutex<Snapshot>,
    pending_failure: Mutex<Option<String>>,
}

impl MemoryProvider {
    /// Starts with `initial` as both the captured and the current contents.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: Mutex::new(initial.clone()),
            initial,
            pending_failure: Mutex::new(None),
        }
    }

    /// Replaces what later fetches return.
    pub fn set(&self, snapshot: Snapshot) {
        *self.current.lock() = snapshot;
    }

    /// Sets a single key in the current contents.
    pub fn set_value(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut current = self.current.lock();
        *current = std::mem::take(&mut *current).with(key, value);
    }

    /// Makes the next fetch fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        *self.pending_failure.lock() = Some(message.into());
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new(Snapshot::new())
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    fn config(&self) -> Result<Snapshot, ProviderError> {
        Ok(self.initial.clone())
    }

    async fn fetch_config(&self) -> Result<Snapshot, ProviderError> {
        if let Some(message) = self.pending_failure.lock().take() {
            return Err(ProviderError::Other(message));
        }
        Ok(self.current.lock().clone())
    }
}
