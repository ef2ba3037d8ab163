// src/config/mod.rs

//! Configuration loading and validation for queuewarden.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like ports and binary names (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, resolve_config};
pub use model::{
    ConfigFile, EnvSection, LauncherSection, LoggingSection, PathsSection, QueueSection,
    RawConfigFile, RedisSection,
};
