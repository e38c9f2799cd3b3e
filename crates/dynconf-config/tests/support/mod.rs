//! Shared fixtures for dynconf-config integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use dynconf_config::{
    BindConfig, BindError, Provider, ProviderError, Snapshot, SnapshotReader, Validate,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Provider whose next fetch result is set by the test.
pub struct ScriptedProvider {
    initial: Snapshot,
    next: Mutex<Result<Snapshot, String>>,
    fetch_delay: Mutex<Option<Duration>>,
    fetches: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(initial: Snapshot) -> Arc<Self> {
        Arc::new(Self {
            next: Mutex::new(Ok(initial.clone())),
            initial,
            fetch_delay: Mutex::new(None),
            fetches: AtomicUsize::new(0),
        })
    }

    pub fn set_next(&self, snapshot: Snapshot) {
        *self.next.lock() = Ok(snapshot);
    }

    pub fn fail_next(&self, message: &str) {
        *self.next.lock() = Err(message.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn config(&self) -> Result<Snapshot, ProviderError> {
        Ok(self.initial.clone())
    }

    async fn fetch_config(&self) -> Result<Snapshot, ProviderError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.next.lock().clone().map_err(ProviderError::Other)
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Validate)]
pub struct Config1 {
    #[validate(length(min = 3))]
    pub test: String,
}

impl BindConfig for Config1 {
    fn bind(&mut self, reader: &SnapshotReader<'_>) -> Result<(), BindError> {
        self.test = reader.required("TEST1")?;
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Validate)]
pub struct Config2 {
    pub test: String,
}

impl BindConfig for Config2 {
    fn bind(&mut self, reader: &SnapshotReader<'_>) -> Result<(), BindError> {
        self.test = reader.required("TEST2")?;
        Ok(())
    }
}

/// Counts how many times a factory produced a fresh value.
#[derive(Clone, Default)]
pub struct BuildCounter(Arc<AtomicUsize>);

impl BuildCounter {
    pub fn factory(&self) -> impl Fn() -> Config1 + Send + Sync + 'static {
        let count = Arc::clone(&self.0);
        move || {
            count.fetch_add(1, Ordering::SeqCst);
            Config1::default()
        }
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}
