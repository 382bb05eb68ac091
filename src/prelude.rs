//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ```rust
//! use vault_initializer::prelude::*;
//! ```

// Store abstraction
pub use crate::provider::vault::{VaultConnector, VaultKv2Client, VaultTlsConfig};
pub use crate::provider::{
    SecretData, SecretStore, StoreConnector, StoreEndpoint, StoreError, VersionedSecret,
};

// Retry loops
pub use crate::controller::backoff::{RetryPolicy, RetryStop};
pub use crate::controller::connector::{ConnectError, Connected, Connector};
pub use crate::controller::reconciler::{
    ReconcileError, ReconcileOutcome, ReconcileReport, ReconcileState, Reconciler, SecretBundle,
    SecretTarget,
};

// Invocations
pub use crate::controller::invocation::{
    Initializer, InvocationError, InvocationOutcome, InvocationReport, TriggerSource,
};

// Config types
pub use crate::config::{ConfigError, InitializerConfig, LogFormat};
