//! # Configuration
//!
//! Initializer configuration loaded from environment variables.

pub mod initializer;

pub use initializer::{ConfigError, InitializerConfig, LogFormat};
