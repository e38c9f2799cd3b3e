//! # dynconf config
//!
//! Dynamic configuration manager.
//!
//! A [`Manager`] reads a flat key/value [`Snapshot`] from a [`Provider`],
//! binds it onto typed, validated configuration structs registered by
//! independent consumers, and keeps those values current by polling the
//! provider in the background.
//!
//! ```text
//! Provider ──fetch──▶ SnapshotStore ──(changed?)──▶ Registry::refresh_all
//!                                                     │ per key: factory → Binder → validate
//!                                                     ▼
//!                          consumers ◀── get_config / ConfigHandle::get
//! ```
//!
//! - Reads never block on I/O and never observe a half-built value.
//! - A key that stops validating keeps its last good value; the error goes to
//!   the [`ErrorSink`].
//! - Identical consecutive snapshots trigger no rebuild.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod binder;
pub mod defaults;
pub mod error;
pub mod loader;
pub mod manager;
pub mod options;
pub mod provider;
mod refresher;
pub mod registry;
pub mod sink;
pub mod store;

pub use binder::{bind_new, BindConfig, Binder, FieldBinder, FnBinder, FromValue, SnapshotReader};
pub use error::{BindError, LoadError, ManagerError, ProviderError, RefreshError};
pub use loader::{load_config, load_dynamic_config};
pub use manager::{Manager, ManagerState};
pub use options::ManagerOptions;
pub use provider::Provider;
pub use refresher::TickOutcome;
pub use registry::{ConfigHandle, ConfigKey, RefreshSummary, Registry};
pub use sink::ErrorSink;
pub use store::SnapshotStore;

pub use dynconf_common::Snapshot;
pub use validator::Validate;
