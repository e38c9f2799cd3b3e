//! The snapshot store: latest raw reading, lock-free for readers.

use arc_swap::ArcSwap;
use dynconf_common::Snapshot;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Holds the most recent snapshot.
///
/// Readers get an `Arc` to the current snapshot without taking a lock.
/// Writers are serialized and only replace the snapshot when its content
/// changed.
pub struct SnapshotStore {
    current: ArcSwap<Snapshot>,
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl SnapshotStore {
    /// Creates a store holding `initial` at generation zero.
    pub fn new(initial: Snapshot) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            writer: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Gets the current snapshot.
    pub fn read(&self) -> Arc<Snapshot> {
        self.current.load_full()
    }

    /// Replaces the snapshot with `next` unless both are equal.
    ///
    /// Returns `true` when the store changed.
    pub fn swap(&self, next: Snapshot) -> bool {
        let _writer = self.writer.lock();
        if **self.current.load() == next {
            return false;
        }
        self.current.store(Arc::new(next));
        self.generation.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Number of effective swaps since construction.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new(Snapshot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynconf_common::test_utils::snapshot_fixtures;

    #[test]
    fn test_swap_only_on_change() {
        let store = SnapshotStore::new(snapshot_fixtures::initial_pair());
        assert_eq!(store.generation(), 0);

        assert!(!store.swap(snapshot_fixtures::initial_pair()));
        assert_eq!(store.generation(), 0);

        assert!(store.swap(snapshot_fixtures::updated_pair()));
        assert_eq!(store.generation(), 1);
        assert_eq!(*store.read(), snapshot_fixtures::updated_pair());

        assert!(!store.swap(snapshot_fixtures::updated_pair()));
        assert_eq!(store.generation(), 1);
    }

    #[test]
    fn test_readers_keep_their_snapshot() {
        let store = SnapshotStore::new(snapshot_fixtures::initial_pair());
        let before = store.read();
        store.swap(snapshot_fixtures::updated_pair());

        assert_eq!(before.get("TEST1"), Some("abc"));
        assert_eq!(store.read().get("TEST1"), Some("abc1"));
    }

    #[test]
    fn test_concurrent_readers_see_whole_snapshots() {
        let store = Arc::new(SnapshotStore::new(snapshot_fixtures::initial_pair()));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..1_000 {
                        let snapshot = store.read();
                        let first = snapshot.get("TEST1").unwrap();
                        let second = snapshot.get("TEST2").unwrap();
                        // both keys always come from the same generation
                        assert_eq!(first.ends_with('1'), second.ends_with('1'));
                    }
                })
            })
            .collect();

        for i in 0..200 {
            if i % 2 == 0 {
                store.swap(snapshot_fixtures::updated_pair());
            } else {
                store.swap(snapshot_fixtures::initial_pair());
            }
        }

        for reader in readers {
            reader.join().unwrap();
        }
        assert_eq!(store.generation(), 200);
    }
}
