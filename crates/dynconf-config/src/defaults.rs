//! Default values for manager options.

use std::time::Duration;

/// How often the refresher polls the provider.
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound for a single fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Capacity used by [`ErrorSink::channel`](crate::ErrorSink::channel) when
/// the manager builds the sink itself.
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 64;

/// Snapshot key read by [`ManagerOptions::from_snapshot`](crate::ManagerOptions::from_snapshot)
/// for the poll interval.
pub const FETCH_INTERVAL_KEY: &str = "DYNCONF_FETCH_INTERVAL";

/// Snapshot key read by [`ManagerOptions::from_snapshot`](crate::ManagerOptions::from_snapshot)
/// for the fetch timeout.
pub const FETCH_TIMEOUT_KEY: &str = "DYNCONF_FETCH_TIMEOUT";
