//! The public facade: construct, register, get, start, close.

use crate::binder::{BindConfig, Binder, FieldBinder};
use crate::error::ManagerError;
use crate::options::ManagerOptions;
use crate::provider::Provider;
use crate::refresher::{Refresher, TickOutcome};
use crate::registry::{ConfigHandle, ConfigKey, Registry};
use crate::store::SnapshotStore;
use dynconf_common::Snapshot;
use parking_lot::RwLock;
use std::any::Any;
use std::borrow::Borrow;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Lifecycle of a [`Manager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Constructed; registrations are accepted, nothing is polling.
    Created,
    /// The refresher is running.
    Started,
    /// Terminal. The refresher is stopped and registrations are refused.
    Closed,
}

enum Lifecycle {
    Created,
    Started(JoinHandle<()>),
    Closed,
}

impl Lifecycle {
    const fn state(&self) -> ManagerState {
        match self {
            Self::Created => ManagerState::Created,
            Self::Started(_) => ManagerState::Started,
            Self::Closed => ManagerState::Closed,
        }
    }
}

/// Keeps typed configuration values in sync with a [`Provider`].
///
/// `register_config` and `get_config` never perform I/O and may be called
/// from any thread. After [`start`](Manager::start), a background task polls
/// the provider every `fetch_interval` and republishes every registered value
/// when the snapshot changes. A value that no longer binds keeps its last good
/// state and the error goes to the configured [`ErrorSink`](crate::ErrorSink).
///
/// ```no_run
/// # use dynconf_config::{Manager, ManagerOptions, Provider};
/// # async fn run(provider: impl Provider + 'static) -> Result<(), Box<dyn std::error::Error>> {
/// let manager = Manager::new(provider, ManagerOptions::default())?;
/// manager.start()?;
/// // ...
/// manager.close()?;
/// # Ok(())
/// # }
/// ```
pub struct Manager {
    store: Arc<SnapshotStore>,
    registry: Arc<Registry>,
    refresher: Arc<Refresher>,
    fetch_interval: Duration,
    shutdown: CancellationToken,
    // Registrations hold this shared so `close` waits for them; the
    // transitions take it exclusively.
    lifecycle: RwLock<Lifecycle>,
}

impl Manager {
    /// Reads the provider's initial snapshot and builds a manager around it.
    ///
    /// Fails with [`ManagerError::Init`] when the initial read fails and with
    /// [`ManagerError::InvalidOptions`] for unusable options.
    pub fn new<P: Provider + 'static>(provider: P, options: ManagerOptions) -> Result<Self, ManagerError> {
        Self::with_provider(Arc::new(provider), options)
    }

    /// Like [`new`](Manager::new) for an already shared provider.
    pub fn with_provider(provider: Arc<dyn Provider>, options: ManagerOptions) -> Result<Self, ManagerError> {
        options.validate()?;

        let initial = provider.config().map_err(ManagerError::Init)?;
        debug!(keys = initial.len(), "Loaded initial configuration snapshot");

        let store = Arc::new(SnapshotStore::new(initial));
        let registry = Arc::new(Registry::new());
        let shutdown = CancellationToken::new();
        let refresher = Arc::new(Refresher::new(
            provider,
            Arc::clone(&store),
            Arc::clone(&registry),
            options.fetch_timeout,
            options.error_sink,
            shutdown.clone(),
        ));

        Ok(Self {
            store,
            registry,
            refresher,
            fetch_interval: options.fetch_interval,
            shutdown,
            lifecycle: RwLock::new(Lifecycle::Created),
        })
    }

    /// Registers `key` with a factory for its zero value and binds it against
    /// the current snapshot.
    ///
    /// On error the key stays unregistered, or keeps its previous
    /// registration when this was a re-registration.
    pub fn register_config<T, F>(&self, key: impl Into<ConfigKey>, factory: F) -> Result<ConfigHandle<T>, ManagerError>
    where
        T: BindConfig,
        F: Fn() -> T + Send + Sync + 'static,
    {
        self.register_with_binder(key, factory, FieldBinder)
    }

    /// Registers `key` using `T::default` as the factory.
    pub fn register_default<T>(&self, key: impl Into<ConfigKey>) -> Result<ConfigHandle<T>, ManagerError>
    where
        T: BindConfig + Default,
    {
        self.register_config(key, T::default)
    }

    /// Registers `key` with a custom [`Binder`] strategy.
    ///
    /// [`close`](Manager::close) waits for a registration already in progress,
    /// so the binder may read from the manager but must not close it.
    pub fn register_with_binder<T, F, B>(
        &self,
        key: impl Into<ConfigKey>,
        factory: F,
        binder: B,
    ) -> Result<ConfigHandle<T>, ManagerError>
    where
        T: Send + Sync + 'static,
        F: Fn() -> T + Send + Sync + 'static,
        B: Binder<T> + 'static,
    {
        let lifecycle = self.lifecycle.read_recursive();
        if matches!(*lifecycle, Lifecycle::Closed) {
            return Err(ManagerError::Closed);
        }
        self.registry.register(key.into(), factory, binder, &self.store)
    }

    /// Current value registered under `key`, or `None` when the key was never
    /// registered successfully or holds a different type.
    pub fn get_config<T, Q>(&self, key: &Q) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
        ConfigKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.registry.get(key)
    }

    /// Current value registered under `key`, untyped.
    pub fn get_any<Q>(&self, key: &Q) -> Option<Arc<dyn Any + Send + Sync>>
    where
        ConfigKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.registry.get_any(key)
    }

    /// Typed handle for an already registered key.
    pub fn handle<T, Q>(&self, key: &Q) -> Option<ConfigHandle<T>>
    where
        T: Send + Sync + 'static,
        ConfigKey: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.registry.handle(key)
    }

    /// Keys registered so far, in registration order.
    pub fn registered_keys(&self) -> Vec<ConfigKey> {
        self.registry.keys()
    }

    /// The raw snapshot values are currently bound from.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.store.read()
    }

    /// How many times the snapshot has changed since construction.
    pub fn generation(&self) -> u64 {
        self.store.generation()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ManagerState {
        self.lifecycle.read_recursive().state()
    }

    /// Launches the background refresher on the current Tokio runtime.
    ///
    /// Fails with [`ManagerError::NoRuntime`] outside a runtime, leaving the
    /// manager in [`ManagerState::Created`].
    pub fn start(&self) -> Result<(), ManagerError> {
        let mut lifecycle = self.lifecycle.write();
        match *lifecycle {
            Lifecycle::Created => {}
            Lifecycle::Started(_) => return Err(ManagerError::AlreadyStarted),
            Lifecycle::Closed => return Err(ManagerError::Closed),
        }

        let runtime = Handle::try_current().map_err(|_| ManagerError::NoRuntime)?;
        let task = Arc::clone(&self.refresher).spawn(&runtime, self.fetch_interval);
        *lifecycle = Lifecycle::Started(task);
        info!(interval = ?self.fetch_interval, "Dynamic configuration manager started");
        Ok(())
    }

    /// Runs one refresh cycle immediately, outside the timer.
    ///
    /// Fails with [`ManagerError::Closed`] when the manager was closed before
    /// the fetch could start.
    pub async fn refresh_now(&self) -> Result<TickOutcome, ManagerError> {
        self.refresher.tick().await.ok_or(ManagerError::Closed)
    }

    /// Stops the refresher. No fetch starts after this returns; a fetch that
    /// is already running completes under its own timeout.
    ///
    /// Closing twice returns [`ManagerError::AlreadyClosed`].
    pub fn close(&self) -> Result<(), ManagerError> {
        let mut lifecycle = self.lifecycle.write();
        match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
            // The task exits on its own once it observes the token.
            Lifecycle::Created | Lifecycle::Started(_) => self.shutdown.cancel(),
            Lifecycle::Closed => return Err(ManagerError::AlreadyClosed),
        }
        info!("Dynamic configuration manager closed");
        Ok(())
    }

    /// Closes the manager and waits for the refresher task to finish.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        let task = {
            let mut lifecycle = self.lifecycle.write();
            let task = match std::mem::replace(&mut *lifecycle, Lifecycle::Closed) {
                Lifecycle::Created => None,
                Lifecycle::Started(task) => Some(task),
                Lifecycle::Closed => return Err(ManagerError::AlreadyClosed),
            };
            self.shutdown.cancel();
            task
        };
        if let Some(task) = task {
            // A panicked refresher has nothing left to stop.
            let _ = task.await;
        }
        info!("Dynamic configuration manager shut down");
        Ok(())
    }
}

impl Drop for Manager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("state", &self.state())
            .field("fetch_interval", &self.fetch_interval)
            .field("generation", &self.generation())
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
