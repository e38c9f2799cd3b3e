//! `.env` file provider.
//!
//! Parsing is done by `dotenvy`, so quoting, comments, `export` prefixes and
//! `${VAR}` substitution follow its rules. Nothing is written into the process
//! environment.

use async_trait::async_trait;
use dynconf_common::Snapshot;
use dynconf_config::{Provider, ProviderError};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads key/value pairs from a dotenv file on every fetch.
#[derive(Debug, Clone)]
pub struct DotenvProvider {
    path: PathBuf,
    initial: Snapshot,
}

impl DotenvProvider {
    /// Parses `path` once to capture the initial snapshot.
    ///
    /// Fails with [`ProviderError::NotFound`] when the file does not exist and
    /// with [`ProviderError::Parse`] when a line is malformed.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, ProviderError> {
        let path = path.into();
        let initial = read_dotenv(&path)?;
        debug!(path = %path.display(), keys = initial.len(), "Loaded dotenv file");
        Ok(Self { path, initial })
    }

    /// The file this provider reads.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Provider for DotenvProvider {
    fn config(&self) -> Result<Snapshot, ProviderError> {
        Ok(self.initial.clone())
    }

    async fn fetch_config(&self) -> Result<Snapshot, ProviderError> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || read_dotenv(&path))
            .await
            .map_err(|e| ProviderError::Other(format!("dotenv reader task failed: {e}")))?
    }
}

pub(crate) fn read_dotenv(path: &Path) -> Result<Snapshot, ProviderError> {
    let iter = dotenvy::from_path_iter(path).map_err(|e| map_dotenv_error(path, e))?;

    let mut snapshot = Snapshot::new();
    for item in iter {
        let (key, value) = item.map_err(|e| map_dotenv_error(path, e))?;
        snapshot = snapshot.with(key, value);
    }
    Ok(snapshot)
}

fn map_dotenv_error(path: &Path, error: dotenvy::Error) -> ProviderError {
    match error {
        dotenvy::Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
            ProviderError::NotFound(path.display().to_string())
        }
        dotenvy::Error::Io(e) => ProviderError::Io(e),
        dotenvy::Error::LineParse(line, index) => ProviderError::Parse {
            source_name: path.display().to_string(),
            message: format!("invalid line at offset {index}: {line}"),
        },
        other => ProviderError::Parse {
            source_name: path.display().to_string(),
            message: other.to_string(),
        },
    }
}
