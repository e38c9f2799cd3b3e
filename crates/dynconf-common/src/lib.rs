//! # dynconf common
//!
//! Shared types, codecs and utilities for the dynconf workspace.
//!
//! This crate provides the foundational [`Snapshot`] type every provider
//! produces and every binder consumes, along with the [`HexString`] codec and
//! the value parsers used when binding flat string values onto typed fields.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod hexstring;
pub mod types;
pub mod utils;

#[cfg(any(test, feature = "testing"))]
pub mod test_utils;

pub use hexstring::*;
pub use types::*;
pub use utils::*;
