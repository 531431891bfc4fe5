//! Configuration for slipstream.
//!
//! Runtime-tunable settings persisted to disk as RON, with CLI overrides
//! via clap and hot-reload detection. Every knob the library crates need
//! arrives through these structs — there is no environment-derived
//! module-level configuration anywhere in the workspace.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, DebugConfig, NetworkConfig, SmoothingConfig, SpatialConfig, SyncConfig};
pub use error::ConfigError;
