//! Process environment provider.

use async_trait::async_trait;
use dynconf_common::Snapshot;
use dynconf_config::{Provider, ProviderError};
use tracing::debug;

/// Reads the process environment.
///
/// Variables whose name or value is not valid Unicode are skipped.
#[derive(Debug, Clone)]
pub struct EnvProvider {
    prefix: Option<String>,
    initial: Snapshot,
}

impl EnvProvider {
    /// Captures the whole environment.
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Captures only variables starting with `prefix`. Keys keep the prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self::build(Some(prefix.into()))
    }

    fn build(prefix: Option<String>) -> Self {
        let initial = read_env(prefix.as_deref());
        debug!(keys = initial.len(), prefix = ?prefix, "Captured process environment");
        Self { prefix, initial }
    }
}

impl Default for EnvProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for EnvProvider {
    fn config(&self) -> Result<Snapshot, ProviderError> {
        Ok(self.initial.clone())
    }

    async fn fetch_config(&self) -> Result<Snapshot, ProviderError> {
        Ok(read_env(self.prefix.as_deref()))
    }
}

pub(crate) fn read_env(prefix: Option<&str>) -> Snapshot {
    std::env::vars_os()
        .filter_map(|(k, v)| Some((k.into_string().ok()?, v.into_string().ok()?)))
        .filter(|(k, _)| prefix.map_or(true, |p| k.starts_with(p)))
        .collect()
}
