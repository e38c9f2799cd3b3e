//! # dynconf providers
//!
//! Ready-made [`Provider`](dynconf_config::Provider) backends:
//!
//! - [`EnvProvider`]: the process environment
//! - [`DotenvProvider`]: a `.env` file
//! - [`LayeredProvider`]: the environment overlaid with an optional `.env` file
//! - [`InfisicalProvider`]: a project environment in an Infisical secret store
//! - [`MemoryProvider`]: an in-memory source driven by the caller

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod dotenv;
pub mod env;
pub mod infisical;
pub mod layered;
pub mod memory;

pub use dotenv::DotenvProvider;
pub use env::EnvProvider;
pub use infisical::{InfisicalAuth, InfisicalConfig, InfisicalProvider};
pub use layered::LayeredProvider;
pub use memory::MemoryProvider;
