//! Registry of live configuration values.
//!
//! Entries live in an arena (`Vec` of slots plus a key→index map) that only
//! grows; a key keeps its index when it is re-registered.
//! Each slot owns its reconstruction recipe and the last value that bound and
//! validated successfully. Values are replaced as whole `Arc`s, so a reader
//! holds either the previous or the next value and never a mix.

use crate::binder::Binder;
use crate::error::{BindError, ManagerError, RefreshError};
use crate::store::SnapshotStore;
use dynconf_common::Snapshot;
use parking_lot::{Mutex, RwLock};
use std::any::{type_name, Any};
use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use tracing::{debug, info};

/// Opaque identifier of one configuration consumer slot.
///
/// The registry never looks inside a key; callers choose keys and are
/// responsible for their uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConfigKey(Arc<str>);

impl ConfigKey {
    /// Creates a key from any string.
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// The key derived from a type's name, used for one-slot-per-type
    /// registrations.
    pub fn of<T: ?Sized>() -> Self {
        Self::new(type_name::<T>())
    }

    /// The key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for ConfigKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ConfigKey {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

impl From<String> for ConfigKey {
    fn from(key: String) -> Self {
        Self(Arc::from(key))
    }
}

impl From<&ConfigKey> for ConfigKey {
    fn from(key: &ConfigKey) -> Self {
        key.clone()
    }
}

/// Builds a fresh, bound and validated `T` from a snapshot.
trait Rebuild<T>: Send + Sync {
    fn rebuild(&self, snapshot: &Snapshot) -> Result<T, BindError>;
}

struct Recipe<F, B> {
    factory: F,
    binder: B,
}

impl<T, F, B> Rebuild<T> for Recipe<F, B>
where
    F: Fn() -> T + Send + Sync,
    B: Binder<T>,
{
    fn rebuild(&self, snapshot: &Snapshot) -> Result<T, BindError> {
        crate::binder::bind_new(&self.factory, &self.binder, snapshot)
    }
}

struct Registrant<T> {
    recipe: Arc<dyn Rebuild<T>>,
    current: Arc<T>,
}

/// One registry entry, typed.
struct Slot<T> {
    key: ConfigKey,
    // Serializes writers of this slot: a registration and a refresh never
    // interleave their read-recipe/write-value steps.
    gate: Mutex<()>,
    state: RwLock<Registrant<T>>,
}

impl<T> Slot<T> {
    fn new(key: ConfigKey, registrant: Registrant<T>) -> Self {
        Self {
            key,
            gate: Mutex::new(()),
            state: RwLock::new(registrant),
        }
    }

    fn current(&self) -> Arc<T> {
        Arc::clone(&self.state.read().current)
    }
}

/// Type-erased view of a [`Slot`] so the arena can hold any target type.
trait ErasedSlot: Send + Sync {
    fn key(&self) -> &ConfigKey;
    fn type_name(&self) -> &'static str;
    fn refresh(&self, snapshot: &Snapshot) -> Result<(), BindError>;
    fn current_any(&self) -> Arc<dyn Any + Send + Sync>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Send + Sync + 'static> ErasedSlot for Slot<T> {
    fn key(&self) -> &ConfigKey {
        &self.key
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }

    fn refresh(&self, snapshot: &Snapshot) -> Result<(), BindError> {
        let _gate = self.gate.lock();
        let recipe = Arc::clone(&self.state.read().recipe);
        let next = recipe.rebuild(snapshot)?;
        self.state.write().current = Arc::new(next);
        Ok(())
    }

    fn current_any(&self) -> Arc<dyn Any + Send + Sync> {
        self.current()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[derive(Default)]
struct Arena {
    index: HashMap<ConfigKey, usize>,
    slots: Vec<Arc<dyn ErasedSlot>>,
}

impl Arena {
    fn find<Q>(&self, key: &Q) -> Option<&Arc<dyn ErasedSlot>>
    where
        ConfigKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).map(|&i| &self.slots[i])
    }

    fn publish<T: Send + Sync + 'static>(
        &mut self,
        key: ConfigKey,
        recipe: Arc<dyn Rebuild<T>>,
        value: T,
    ) -> ConfigHandle<T> {
        let registrant = Registrant {
            recipe,
            current: Arc::new(value),
        };

        let Some(index) = self.index.get(&key).copied() else {
            let slot = Arc::new(Slot::new(key.clone(), registrant));
            self.slots.push(Arc::clone(&slot) as Arc<dyn ErasedSlot>);
            self.index.insert(key.clone(), self.slots.len() - 1);
            info!(key = %key, target = type_name::<T>(), "Registered configuration");
            return ConfigHandle { slot };
        };

        let previous = Arc::clone(&self.slots[index]);
        match previous.into_any().downcast::<Slot<T>>() {
            Ok(slot) => {
                {
                    let _gate = slot.gate.lock();
                    *slot.state.write() = registrant;
                }
                debug!(key = %key, "Re-registered configuration");
                ConfigHandle { slot }
            }
            Err(_) => {
                let replaced = self.slots[index].type_name();
                let slot = Arc::new(Slot::new(key.clone(), registrant));
                self.slots[index] = Arc::clone(&slot) as Arc<dyn ErasedSlot>;
                info!(
                    key = %key,
                    target = type_name::<T>(),
                    replaced,
                    "Re-registered configuration with a new target type"
                );
                ConfigHandle { slot }
            }
        }
    }
}

/// Typed read handle to one registered key.
///
/// A handle stays valid for the life of the registry and always yields the
/// latest value published for its key, including values installed by a later
/// re-registration of the same key with the same type.
pub struct ConfigHandle<T> {
    slot: Arc<Slot<T>>,
}

impl<T> ConfigHandle<T> {
    /// Current value of the key. Never blocks on I/O.
    pub fn get(&self) -> Arc<T> {
        self.slot.current()
    }

    /// The key this handle reads.
    pub fn key(&self) -> &ConfigKey {
        &self.slot.key
    }
}

impl<T> Clone for ConfigHandle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> fmt::Debug for ConfigHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigHandle")
            .field("key", &self.slot.key)
            .field("type", &type_name::<T>())
            .finish()
    }
}

/// Outcome of [`Registry::refresh_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    /// Keys whose value was replaced.
    pub updated: usize,
    /// Keys that kept their previous value because rebinding failed.
    pub failed: usize,
}

/// Maps keys to their live configuration values.
#[derive(Default)]
pub struct Registry {
    arena: RwLock<Arena>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a value with `factory`, binds it against the store's current
    /// snapshot and, on success, publishes it under `key`.
    ///
    /// Re-registering a key replaces its recipe and value together; on failure
    /// the previous registration, if any, is left untouched. The last
    /// registration wins even when it changes the target type: handles issued
    /// for the old type keep their last value and stop receiving refreshes.
    ///
    /// The binder runs without any registry lock held and may read from the
    /// registry.
    pub fn register<T, F, B>(
        &self,
        key: ConfigKey,
        factory: F,
        binder: B,
        store: &SnapshotStore,
    ) -> Result<ConfigHandle<T>, ManagerError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
        B: Binder<T> + 'static,
    {
        let recipe: Arc<dyn Rebuild<T>> = Arc::new(Recipe { factory, binder });

        loop {
            let generation = store.generation();
            let snapshot = store.read();
            let value = recipe
                .rebuild(&snapshot)
                .map_err(|source| ManagerError::Registration {
                    key: key.clone(),
                    source,
                })?;

            // Publishing under the arena lock orders this registration against
            // a concurrent refresh: either the refresh sees the new slot, or the
            // generation moved and the value is bound again.
            let mut arena = self.arena.write();
            if store.generation() != generation {
                debug!(key = %key, "Snapshot changed during registration, binding again");
                continue;
            }
            return Ok(arena.publish(key, recipe, value));
        }
    }

    /// Current value of `key` as `T`.
    ///
    /// Returns `None` if the key was never registered or holds another type.
    pub fn get<T, Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
        ConfigKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.get_any(key)?.downcast::<T>().ok()
    }

    /// Current value of `key` without a type.
    pub fn get_any<Q>(&self, key: &Q) -> Option<Arc<dyn Any + Send + Sync>>
    where
        ConfigKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let arena = self.arena.read();
        arena.find(key).map(|slot| slot.current_any())
    }

    /// Typed handle for an already registered key.
    pub fn handle<T, Q>(&self, key: &Q) -> Option<ConfigHandle<T>>
    where
        T: Send + Sync + 'static,
        ConfigKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let slot = Arc::clone(self.arena.read().find(key)?);
        let slot = slot.into_any().downcast::<Slot<T>>().ok()?;
        Some(ConfigHandle { slot })
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> Vec<ConfigKey> {
        self.arena
            .read()
            .slots
            .iter()
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.arena.read().slots.len()
    }

    /// Returns true when nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rebuilds every registered key from `snapshot`.
    ///
    /// A key that fails to bind keeps its previous value; its error is passed
    /// to `on_error` and the remaining keys are still processed.
    pub fn refresh_all(
        &self,
        snapshot: &Snapshot,
        mut on_error: impl FnMut(RefreshError),
    ) -> RefreshSummary {
        let slots: Vec<Arc<dyn ErasedSlot>> = self.arena.read().slots.clone();

        let mut summary = RefreshSummary::default();
        for slot in slots {
            match slot.refresh(snapshot) {
                Ok(()) => summary.updated += 1,
                Err(source) => {
                    summary.failed += 1;
                    on_error(RefreshError::Bind {
                        key: slot.key().clone(),
                        source,
                    });
                }
            }
        }
        summary
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("keys", &self.keys())
            .finish()
    }
}
