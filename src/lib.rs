//! Vault Initializer Library
//!
//! Bootstraps the JWT secret bundle in a HashiCorp Vault KV v2 mount: connect
//! with retry, read the bundle, write it if absent or incomplete.
//!
//! ## Quick Start
//!
//! ```rust
//! use vault_initializer::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod server;
