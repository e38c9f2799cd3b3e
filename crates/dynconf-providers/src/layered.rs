//! Environment overlaid with an optional dotenv file.

use crate::dotenv::read_dotenv;
use crate::env::read_env;
use async_trait::async_trait;
use dynconf_common::Snapshot;
use dynconf_config::{Provider, ProviderError};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The process environment with a `.env` file layered on top.
///
/// Keys present in the file win over the environment. A missing file is
/// treated as empty, both at construction and on later fetches, so the file
/// can be created or removed while the process runs. A malformed file is
/// still an error.
#[derive(Debug, Clone)]
pub struct LayeredProvider {
    dotenv_path: Option<PathBuf>,
    initial: Snapshot,
}

impl LayeredProvider {
    /// Environment only.
    pub fn env_only() -> Self {
        Self {
            dotenv_path: None,
            initial: read_env(None),
        }
    }

    /// Environment overlaid with the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let path = path.into();
        let initial = read_layers(Some(&path))?;
        debug!(path = %path.display(), keys = initial.len(), "Loaded layered configuration");
        Ok(Self {
            dotenv_path: Some(path),
            initial,
        })
    }

    /// The overlay file, if any.
    pub fn dotenv_path(&self) -> Option<&Path> {
        self.dotenv_path.as_deref()
    }
}

#[async_trait]
impl Provider for LayeredProvider {
    fn config(&self) -> Result<Snapshot, ProviderError> {
        Ok(self.initial.clone())
    }

    async fn fetch_config(&self) -> Result<Snapshot, ProviderError> {
        let path = self.dotenv_path.clone();
        tokio::task::spawn_blocking(move || read_layers(path.as_deref()))
            .await
            .map_err(|e| ProviderError::Other(format!("layered reader task failed: {e}")))?
    }
}

fn read_layers(path: Option<&Path>) -> Result<Snapshot, ProviderError> {
    let env = read_env(None);
    let Some(path) = path else {
        return Ok(env);
    };

    match read_dotenv(path) {
        Ok(file) => Ok(env.overlaid_with(&file)),
        Err(ProviderError::NotFound(_)) => {
            warn!(path = %path.display(), "Dotenv file not found, using environment only");
            Ok(env)
        }
        Err(e) => Err(e),
    }
}
