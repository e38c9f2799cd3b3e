//! Test utilities and shared fixtures for the dynconf workspace.
//!
//! Available to other crates through the `testing` feature.

use crate::Snapshot;
use std::sync::Once;

#[cfg(feature = "tracing-subscriber")]
use tracing_subscriber::{fmt, EnvFilter};

/// Initialize test logging once per test run.
static INIT: Once = Once::new();

/// Initialize logging for tests. Safe to call from every test.
#[cfg(feature = "tracing-subscriber")]
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        let _ = fmt().with_test_writer().with_env_filter(filter).try_init();
    });
}

/// No-op version when tracing-subscriber is not available
#[cfg(not(feature = "tracing-subscriber"))]
pub fn init_test_logging() {
    INIT.call_once(|| {});
}

/// Builds a snapshot from borrowed pairs.
pub fn snapshot_of(pairs: &[(&str, &str)]) -> Snapshot {
    pairs.iter().copied().collect()
}

/// Snapshot fixtures reused across crates.
pub mod snapshot_fixtures {
    use super::snapshot_of;
    use crate::Snapshot;

    /// The initial two-key reading used by end-to-end refresh tests.
    pub fn initial_pair() -> Snapshot {
        snapshot_of(&[("TEST1", "abc"), ("TEST2", "def")])
    }

    /// The follow-up reading where both keys changed.
    pub fn updated_pair() -> Snapshot {
        snapshot_of(&[("TEST1", "abc1"), ("TEST2", "def1")])
    }

    /// A realistic service configuration.
    pub fn service_settings() -> Snapshot {
        snapshot_of(&[
            ("SERVICE_NAME", "billing"),
            ("SERVICE_PORT", "8080"),
            ("SERVICE_DEBUG", "false"),
            ("SERVICE_TIMEOUT", "30s"),
            ("SERVICE_TAGS", "eu, primary"),
        ])
    }

    /// Contents of a dotenv file matching [`service_settings`].
    pub fn service_dotenv() -> &'static str {
        concat!(
            "# service settings\n",
            "SERVICE_NAME=billing\n",
            "SERVICE_PORT=8080\n",
            "SERVICE_DEBUG=false\n",
            "SERVICE_TIMEOUT=\"30s\"\n",
            "SERVICE_TAGS='eu, primary'\n",
        )
    }
}
