//! The `watch` command: keep a set of keys bound and report when they change.

use anyhow::{Context, Result};
use dynconf_common::Snapshot;
use dynconf_config::{BindError, ConfigHandle, FnBinder, Manager, RefreshError};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// Values of the watched keys at one point in time.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct WatchedKeys {
    /// Key to value, sorted by key.
    pub values: BTreeMap<String, String>,
}

impl WatchedKeys {
    /// Keys whose value differs between `self` and `newer`.
    pub fn changed<'a>(&'a self, newer: &'a Self) -> impl Iterator<Item = &'a str> + 'a {
        newer
            .values
            .iter()
            .filter(move |(k, v)| self.values.get(*k) != Some(*v))
            .map(|(k, _)| k.as_str())
    }
}

/// Binds every key in `keys` as required.
pub fn bind_keys(target: &mut WatchedKeys, snapshot: &Snapshot, keys: &[String]) -> Result<(), BindError> {
    for key in keys {
        let value = snapshot.get(key).ok_or_else(|| BindError::Missing { key: key.clone() })?;
        target.values.insert(key.clone(), value.to_string());
    }
    Ok(())
}

/// Registers the watched keys under `watched`.
pub fn register(manager: &Manager, keys: Vec<String>) -> Result<ConfigHandle<WatchedKeys>> {
    let keys = Arc::new(keys);
    let binder = FnBinder::new(move |target: &mut WatchedKeys, snapshot: &Snapshot| {
        bind_keys(target, snapshot, &keys)
    });
    manager
        .register_with_binder("watched", WatchedKeys::default, binder)
        .context("Watched keys are not all present in the source")
}

/// Polls `handle` every `poll` until `shutdown` resolves, printing changes.
pub async fn run<S>(
    handle: ConfigHandle<WatchedKeys>,
    mut errors: mpsc::Receiver<RefreshError>,
    poll: Duration,
    shutdown: S,
) -> Result<usize>
where
    S: std::future::Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut last = handle.get();
    print_values(&last);

    let mut changes = 0;
    let mut ticker = tokio::time::interval(poll);
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            Some(e) = errors.recv() => {
                error!(error = %e, "Refresh failed");
            }
            _ = ticker.tick() => {
                let current = handle.get();
                if Arc::ptr_eq(&current, &last) {
                    continue;
                }
                for key in last.changed(&current) {
                    println!("{key}={}", current.values[key]);
                }
                changes += 1;
                info!(changes, "Watched keys changed");
                last = current;
            }
        }
    }
    if changes == 0 {
        warn!("No changes observed");
    }
    Ok(changes)
}

fn print_values(keys: &WatchedKeys) {
    for (key, value) in &keys.values {
        println!("{key}={value}");
    }
}
