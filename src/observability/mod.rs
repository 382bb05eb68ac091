//! # Observability
//!
//! - `logging`: tracing subscriber setup (JSON or text)
//! - `metrics`: Prometheus metrics collection

pub mod logging;
pub mod metrics;
