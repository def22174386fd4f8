//! Configuration module for mapc
//!
//! Provides types, parsing, and discovery for `mapc.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{default_config, load_config, ConfigError};
pub use schema::*;
