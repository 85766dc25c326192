//! Domain-level building blocks shared by the watcher library, the CLI and the
//! HTTP control surface.
//!
//! Everything here is transport-agnostic: address validation, the signature
//! model handed to listeners, environment-driven configuration and the
//! telemetry bootstrap used by every binary.

pub mod config;
pub mod model;
pub mod services;

pub use config::{ApiConfig, ConfigError, WatcherConfig};
pub use model::*;
