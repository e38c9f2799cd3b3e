//! Core data types shared by providers, the snapshot store and binders.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// An immutable point-in-time reading of a flat key/value configuration source.
///
/// Two snapshots are equal when they hold exactly the same set of key/value
/// pairs; insertion order is irrelevant. A snapshot is never edited after it
/// has been handed out: newer readings replace it wholesale.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    entries: HashMap<String, String>,
}

impl Snapshot {
    /// Creates an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the raw value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns true when `key` is present, even with an empty value.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Number of keys in the snapshot.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the snapshot holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over all key/value pairs in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Returns a copy of this snapshot extended with one more pair.
    ///
    /// Mostly useful for building fixtures.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Layers `overlay` on top of `self`: keys present in both take the
    /// overlay's value.
    #[must_use]
    pub fn overlaid_with(&self, overlay: &Self) -> Self {
        let mut entries = self.entries.clone();
        entries.extend(
            overlay
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        Self { entries }
    }

    /// Keys that were added, removed or changed between `self` and `newer`,
    /// sorted for stable output.
    pub fn changed_keys(&self, newer: &Self) -> Vec<String> {
        let mut changed = BTreeSet::new();
        for (key, value) in &newer.entries {
            if self.entries.get(key) != Some(value) {
                changed.insert(key.clone());
            }
        }
        for key in self.entries.keys() {
            if !newer.entries.contains_key(key) {
                changed.insert(key.clone());
            }
        }
        changed.into_iter().collect()
    }

    /// Consumes the snapshot and returns the underlying map.
    pub fn into_inner(self) -> HashMap<String, String> {
        self.entries
    }
}

// Values may carry secrets, so only keys are printed.
impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: BTreeSet<&str> = self.entries.keys().map(String::as_str).collect();
        f.debug_struct("Snapshot").field("keys", &keys).finish()
    }
}

impl From<HashMap<String, String>> for Snapshot {
    fn from(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }
}

impl<K, V> FromIterator<(K, V)> for Snapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for Snapshot
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
