//! Manager construction options.

use crate::binder::SnapshotReader;
use crate::defaults::{
    DEFAULT_ERROR_CHANNEL_CAPACITY, DEFAULT_FETCH_INTERVAL, DEFAULT_FETCH_TIMEOUT,
    FETCH_INTERVAL_KEY, FETCH_TIMEOUT_KEY,
};
use crate::error::{BindError, ManagerError, RefreshError};
use crate::sink::ErrorSink;
use dynconf_common::Snapshot;
use std::time::Duration;
use tokio::sync::mpsc;

/// Options recognized by [`Manager::new`](crate::Manager::new).
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Poll cadence of the refresher.
    pub fetch_interval: Duration,
    /// Bound on a single fetch.
    pub fetch_timeout: Duration,
    /// Receives every background error.
    pub error_sink: Option<ErrorSink>,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            error_sink: None,
        }
    }
}

impl ManagerOptions {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `DYNCONF_FETCH_INTERVAL` and `DYNCONF_FETCH_TIMEOUT` from a
    /// snapshot, keeping defaults for absent keys.
    pub fn from_snapshot(snapshot: &Snapshot) -> Result<Self, BindError> {
        let reader = SnapshotReader::new(snapshot);
        Ok(Self {
            fetch_interval: reader.or(FETCH_INTERVAL_KEY, DEFAULT_FETCH_INTERVAL)?,
            fetch_timeout: reader.or(FETCH_TIMEOUT_KEY, DEFAULT_FETCH_TIMEOUT)?,
            error_sink: None,
        })
    }

    /// Sets the poll cadence.
    #[must_use]
    pub fn with_fetch_interval(mut self, interval: Duration) -> Self {
        self.fetch_interval = interval;
        self
    }

    /// Sets the per-fetch timeout.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Sets the error sink.
    #[must_use]
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = Some(sink);
        self
    }

    /// Installs a callback sink. The callback runs on the refresher task and
    /// must not block.
    #[must_use]
    pub fn with_error_callback<F>(self, callback: F) -> Self
    where
        F: Fn(&RefreshError) + Send + Sync + 'static,
    {
        self.with_error_sink(ErrorSink::from_fn(callback))
    }

    /// Installs a channel sink with the default capacity and returns its
    /// receiving end.
    pub fn with_error_channel(self) -> (Self, mpsc::Receiver<RefreshError>) {
        let (sink, rx) = ErrorSink::channel(DEFAULT_ERROR_CHANNEL_CAPACITY);
        (self.with_error_sink(sink), rx)
    }

    /// Checks that both durations are usable.
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.fetch_interval.is_zero() {
            return Err(ManagerError::InvalidOptions(
                "fetch interval must be greater than zero".to_string(),
            ));
        }
        if self.fetch_timeout.is_zero() {
            return Err(ManagerError::InvalidOptions(
                "fetch timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
