//! Error types for the configuration manager.

use crate::registry::ConfigKey;
use std::time::Duration;

/// Errors raised by a [`Provider`](crate::Provider) backend.
#[derive(thiserror::Error, Debug)]
pub enum ProviderError {
    /// The configured source does not exist.
    #[error("configuration source not found: {0}")]
    NotFound(String),

    /// I/O error while reading the source.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The source exists but could not be parsed.
    #[error("failed to parse {source_name}: {message}")]
    Parse {
        /// Human-readable name of the source, usually a path.
        source_name: String,
        /// Parser message.
        message: String,
    },

    /// A remote backend failed or rejected a request.
    #[error("remote source error: {message}")]
    Remote {
        /// HTTP status, when the server answered.
        status: Option<u16>,
        /// What went wrong.
        message: String,
    },

    /// Any other backend failure.
    #[error("provider error: {0}")]
    Other(String),
}

/// Errors raised while binding a snapshot onto a typed configuration.
#[derive(thiserror::Error, Debug)]
pub enum BindError {
    /// A required key is absent from the snapshot.
    #[error("required key `{key}` is not set")]
    Missing {
        /// The missing key.
        key: String,
    },

    /// A value could not be converted to the field's type.
    #[error("key `{key}`: expected {expected}: {message}")]
    Parse {
        /// The key whose value failed to convert.
        key: String,
        /// Name of the target type.
        expected: &'static str,
        /// Conversion error message.
        message: String,
    },

    /// Struct-level validation rejected the bound value.
    #[error("validation failed: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

/// Errors surfaced by the [`Manager`](crate::Manager) facade.
#[derive(thiserror::Error, Debug)]
pub enum ManagerError {
    /// The provider's initial snapshot could not be read.
    #[error("initial configuration read failed: {0}")]
    Init(#[source] ProviderError),

    /// Binding or validation failed while registering a key.
    #[error("registering `{key}` failed: {source}")]
    Registration {
        /// The key being registered.
        key: ConfigKey,
        /// Why the bind failed.
        #[source]
        source: BindError,
    },

    /// Manager options are unusable.
    #[error("invalid manager options: {0}")]
    InvalidOptions(String),

    /// `start` was called more than once.
    #[error("manager already started")]
    AlreadyStarted,

    /// `close` was called more than once.
    #[error("manager already closed")]
    AlreadyClosed,

    /// The manager is closed and no longer accepts work.
    #[error("manager is closed")]
    Closed,

    /// `start` was called outside a Tokio runtime.
    #[error("no Tokio runtime available to run the refresher")]
    NoRuntime,
}

/// Errors produced in the background and delivered through the
/// [`ErrorSink`](crate::ErrorSink).
#[derive(thiserror::Error, Debug)]
pub enum RefreshError {
    /// The periodic fetch failed.
    #[error("fetching configuration failed: {0}")]
    Fetch(#[source] ProviderError),

    /// The periodic fetch did not finish within the fetch timeout.
    #[error("fetching configuration timed out after {0:?}")]
    Timeout(Duration),

    /// A registered key could not be rebuilt from the new snapshot; its
    /// previous value is kept.
    #[error("rebinding `{key}` failed: {source}")]
    Bind {
        /// The key that kept its previous value.
        key: ConfigKey,
        /// Why the rebuild failed.
        #[source]
        source: BindError,
    },
}

/// Errors from one-shot loading.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    /// The provider's snapshot could not be read.
    #[error("reading configuration failed: {0}")]
    Provider(#[from] ProviderError),

    /// The snapshot could not be bound onto the target type.
    #[error("binding configuration failed: {0}")]
    Bind(#[from] BindError),
}
