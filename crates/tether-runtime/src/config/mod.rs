//! Configuration module for the tether runtime.
//!
//! Layered loading of logging and transport settings, plus validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanEventConfig, TetherConfig,
    TransportConfig,
};
pub use validation::validate_config;
