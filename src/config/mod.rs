//! Configuration module for assetpipe
//!
//! Provides the typed settings, the local override file format, and the
//! right-biased merge between them.

pub mod loader;
pub mod schema;

pub use loader::{load_settings, CliOverrides, ConfigError, LoadedSettings};
pub use schema::*;
