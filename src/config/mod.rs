//! Configuration module for assetflow
//!
//! Provides types and parsing for `assetflow.toml` project configuration,
//! plus the path resolver that turns the base directories into per-asset
//! directory triples.

pub mod loader;
pub mod paths;
pub mod schema;

pub use loader::{default_config, load_config, ConfigError, CONFIG_FILENAME};
pub use paths::{AssetPaths, PathTriple};
pub use schema::*;
