//! One-shot and per-type convenience loaders.

use crate::binder::{bind_new, BindConfig, FieldBinder};
use crate::error::{LoadError, ManagerError};
use crate::manager::Manager;
use crate::provider::Provider;
use crate::registry::{ConfigHandle, ConfigKey};

/// Binds the provider's initial snapshot into a `T` once. Nothing is watched.
pub fn load_config<T, P>(provider: &P) -> Result<T, LoadError>
where
    T: BindConfig + Default,
    P: Provider + ?Sized,
{
    let snapshot = provider.config()?;
    Ok(bind_new(T::default, &FieldBinder, &snapshot)?)
}

/// Registers `T` under a key derived from its type name and returns a handle
/// that always yields the latest value.
pub fn load_dynamic_config<T>(manager: &Manager) -> Result<ConfigHandle<T>, ManagerError>
where
    T: BindConfig + Default,
{
    manager.register_default::<T>(ConfigKey::of::<T>())
}
