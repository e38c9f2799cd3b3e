//! The provider seam: where raw snapshots come from.

use crate::error::ProviderError;
use async_trait::async_trait;
use dynconf_common::Snapshot;
use std::sync::Arc;

/// A source of flat key/value configuration.
///
/// Implementations capture one reading when they are constructed and serve it
/// from [`config`](Provider::config); [`fetch_config`](Provider::fetch_config)
/// reads the backend again. Both may be called concurrently.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The snapshot read when the provider was constructed. Each call returns
    /// an independent copy.
    fn config(&self) -> Result<Snapshot, ProviderError>;

    /// Reads the backend now.
    async fn fetch_config(&self) -> Result<Snapshot, ProviderError>;
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Arc<P> {
    fn config(&self) -> Result<Snapshot, ProviderError> {
        (**self).config()
    }

    async fn fetch_config(&self) -> Result<Snapshot, ProviderError> {
        (**self).fetch_config().await
    }
}

#[async_trait]
impl<P: Provider + ?Sized> Provider for Box<P> {
    fn config(&self) -> Result<Snapshot, ProviderError> {
        (**self).config()
    }

    async fn fetch_config(&self) -> Result<Snapshot, ProviderError> {
        (**self).fetch_config().await
    }
}
