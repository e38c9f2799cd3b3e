//! Binding flat snapshots onto typed configuration structs.
//!
//! A target type describes its own field mapping by implementing
//! [`BindConfig`], reading keys through a [`SnapshotReader`], and declares its
//! validation rules with `#[derive(validator::Validate)]`:
//!
//! ```
//! use dynconf_config::{BindConfig, BindError, SnapshotReader};
//! use std::time::Duration;
//! use validator::Validate;
//!
//! #[derive(Debug, Default, Validate)]
//! struct HttpSettings {
//!     #[validate(length(min = 1))]
//!     host: String,
//!     #[validate(range(min = 1))]
//!     port: u16,
//!     timeout: Duration,
//! }
//!
//! impl BindConfig for HttpSettings {
//!     fn bind(&mut self, reader: &SnapshotReader<'_>) -> Result<(), BindError> {
//!         self.host = reader.required("HTTP_HOST")?;
//!         self.port = reader.or("HTTP_PORT", 8080)?;
//!         self.timeout = reader.or("HTTP_TIMEOUT", Duration::from_secs(30))?;
//!         Ok(())
//!     }
//! }
//! ```
//!
//! The [`Binder`] trait is the strategy the registry stores per entry;
//! [`FieldBinder`] drives `BindConfig` + `Validate`, and [`FnBinder`] lets a
//! caller plug in any other mapping.

use crate::error::BindError;
use dynconf_common::{parse_duration, parse_flag, HexString, Snapshot};
use std::marker::PhantomData;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

/// Conversion from a raw snapshot value into a field type.
pub trait FromValue: Sized {
    /// Name used in error messages.
    const EXPECTED: &'static str;

    /// Converts the raw string, returning a human-readable message on failure.
    fn from_value(raw: &str) -> Result<Self, String>;
}

macro_rules! from_str_value {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const EXPECTED: &'static str = $name;

                fn from_value(raw: &str) -> Result<Self, String> {
                    raw.trim().parse::<$ty>().map_err(|e| e.to_string())
                }
            }
        )*
    };
}

from_str_value! {
    u8 => "an unsigned integer",
    u16 => "an unsigned integer",
    u32 => "an unsigned integer",
    u64 => "an unsigned integer",
    usize => "an unsigned integer",
    i8 => "an integer",
    i16 => "an integer",
    i32 => "an integer",
    i64 => "an integer",
    isize => "an integer",
    f32 => "a number",
    f64 => "a number",
    IpAddr => "an IP address",
    SocketAddr => "a socket address",
}

impl FromValue for String {
    const EXPECTED: &'static str = "a string";

    fn from_value(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }
}

impl FromValue for PathBuf {
    const EXPECTED: &'static str = "a path";

    fn from_value(raw: &str) -> Result<Self, String> {
        Ok(Self::from(raw))
    }
}

impl FromValue for bool {
    const EXPECTED: &'static str = "a boolean";

    fn from_value(raw: &str) -> Result<Self, String> {
        parse_flag(raw).ok_or_else(|| format!("{raw:?} is not true/false, 1/0, yes/no or on/off"))
    }
}

impl FromValue for Duration {
    const EXPECTED: &'static str = "a duration";

    fn from_value(raw: &str) -> Result<Self, String> {
        parse_duration(raw).map_err(|e| e.to_string())
    }
}

impl FromValue for HexString {
    const EXPECTED: &'static str = "a hex string";

    fn from_value(raw: &str) -> Result<Self, String> {
        raw.trim().parse().map_err(|e: dynconf_common::HexError| e.to_string())
    }
}

/// Comma-separated lists. Items are trimmed; empty items are skipped.
impl<T: FromValue> FromValue for Vec<T> {
    const EXPECTED: &'static str = "a comma-separated list";

    fn from_value(raw: &str) -> Result<Self, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| T::from_value(item).map_err(|e| format!("item {item:?}: {e}")))
            .collect()
    }
}

/// Typed, read-only view over a snapshot used while binding.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotReader<'a> {
    snapshot: &'a Snapshot,
}

impl<'a> SnapshotReader<'a> {
    /// Wraps a snapshot.
    pub const fn new(snapshot: &'a Snapshot) -> Self {
        Self { snapshot }
    }

    /// The underlying snapshot.
    pub const fn snapshot(&self) -> &'a Snapshot {
        self.snapshot
    }

    /// Raw value of `key`, if present.
    pub fn raw(&self, key: &str) -> Option<&'a str> {
        self.snapshot.get(key)
    }

    /// Converts `key` if it is present.
    pub fn optional<T: FromValue>(&self, key: &str) -> Result<Option<T>, BindError> {
        self.raw(key)
            .map(|raw| {
                T::from_value(raw).map_err(|message| BindError::Parse {
                    key: key.to_string(),
                    expected: T::EXPECTED,
                    message,
                })
            })
            .transpose()
    }

    /// Converts `key`, failing with [`BindError::Missing`] when it is absent.
    pub fn required<T: FromValue>(&self, key: &str) -> Result<T, BindError> {
        self.optional(key)?.ok_or_else(|| BindError::Missing {
            key: key.to_string(),
        })
    }

    /// Converts `key`, falling back to `default` when it is absent.
    pub fn or<T: FromValue>(&self, key: &str, default: T) -> Result<T, BindError> {
        Ok(self.optional(key)?.unwrap_or(default))
    }
}

/// A configuration type that knows how to read itself from a snapshot.
///
/// `bind` is called on a freshly built zero value; validation runs afterwards
/// through the type's [`Validate`] implementation.
pub trait BindConfig: Validate + Send + Sync + 'static {
    /// Copies values from `reader` onto `self`.
    fn bind(&mut self, reader: &SnapshotReader<'_>) -> Result<(), BindError>;
}

/// Strategy that fills a target value from a snapshot and validates it.
///
/// On error the target must be discarded by the caller.
pub trait Binder<T>: Send + Sync {
    /// Binds `snapshot` onto `target`.
    fn bind(&self, target: &mut T, snapshot: &Snapshot) -> Result<(), BindError>;
}

/// The default binder: [`BindConfig::bind`] followed by [`Validate::validate`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldBinder;

impl<T: BindConfig> Binder<T> for FieldBinder {
    fn bind(&self, target: &mut T, snapshot: &Snapshot) -> Result<(), BindError> {
        target.bind(&SnapshotReader::new(snapshot))?;
        target.validate()?;
        Ok(())
    }
}

/// Adapts a closure into a [`Binder`].
pub struct FnBinder<T, F> {
    bind: F,
    _target: PhantomData<fn(&mut T)>,
}

impl<T, F> FnBinder<T, F>
where
    F: Fn(&mut T, &Snapshot) -> Result<(), BindError> + Send + Sync,
{
    /// Wraps `bind`.
    pub const fn new(bind: F) -> Self {
        Self {
            bind,
            _target: PhantomData,
        }
    }
}

impl<T, F> Binder<T> for FnBinder<T, F>
where
    F: Fn(&mut T, &Snapshot) -> Result<(), BindError> + Send + Sync,
{
    fn bind(&self, target: &mut T, snapshot: &Snapshot) -> Result<(), BindError> {
        (self.bind)(target, snapshot)
    }
}

/// Builds a value from `factory` and binds `snapshot` onto it.
pub fn bind_new<T, B>(factory: impl FnOnce() -> T, binder: &B, snapshot: &Snapshot) -> Result<T, BindError>
where
    B: Binder<T> + ?Sized,
{
    let mut target = factory();
    binder.bind(&mut target, snapshot)?;
    Ok(target)
}
