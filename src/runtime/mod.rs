//! # Runtime
//!
//! Process lifecycle for the `serve` command:
//!
//! - `initialization`: crypto provider, logging, metrics, HTTP server, startup invocation
//! - `scheduler`: periodic timer trigger
//! - `signals`: SIGINT/SIGTERM handling

pub mod initialization;
pub mod scheduler;
pub mod signals;
