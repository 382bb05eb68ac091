//! # Constants
//!
//! Shared constants used throughout the initializer.
//!
//! These values represent reasonable defaults and can be overridden via
//! environment variables where applicable (see [`crate::config`]).

/// KV v2 mount point holding the bundle
pub const SECRET_MOUNT: &str = "secret";

/// Path of the bundle under [`SECRET_MOUNT`]
pub const SECRET_PATH: &str = "jwt";

/// Bundle key holding the JWT signing key material
pub const KEY_SECRET: &str = "secret";

/// Bundle key holding the JWT issuer identity
pub const KEY_ISSUER: &str = "issuer";

/// Bundle key holding the internal API key
pub const KEY_INTERNAL_API_KEY: &str = "internalApiKey";

/// Fixed internal API key written into every bundle. Not configurable.
pub const INTERNAL_API_KEY: &str = "ThySevenSecretInternalApiKey";

/// Default fixed delay between retry attempts (seconds)
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 5;

/// Default per-invocation timeout (seconds), below the timer period
pub const DEFAULT_INVOCATION_TIMEOUT_SECS: u64 = 240;

/// Default timer period (seconds), every 5 minutes
pub const DEFAULT_SCHEDULE_INTERVAL_SECS: u64 = 300;

/// Default timeout for a single Vault HTTP request (seconds)
pub const DEFAULT_VAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default HTTP server port for the trigger endpoint, metrics and probes
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default tracing filter when `RUST_LOG` is not set
pub const DEFAULT_LOG_FILTER: &str = "vault_initializer=info,tower_http=info";

/// Environment variable names
pub mod env {
    pub const VAULT_ADDR: &str = "VAULT_ADDR";
    pub const VAULT_TOKEN: &str = "VAULT_SECRET";
    pub const VAULT_NAMESPACE: &str = "VAULT_NAMESPACE";
    pub const VAULT_SKIP_TLS_VERIFY: &str = "VAULT_SKIP_TLS_VERIFY";
    pub const VAULT_CACERT: &str = "VAULT_CACERT";
    pub const VAULT_REQUEST_TIMEOUT_SECS: &str = "VAULT_REQUEST_TIMEOUT_SECS";
    pub const JWT_SECRET: &str = "JWTSecret";
    pub const JWT_ISSUER: &str = "JWTIssuer";
    pub const RETRY_INTERVAL_SECS: &str = "RETRY_INTERVAL_SECS";
    pub const RETRY_MAX_ATTEMPTS: &str = "RETRY_MAX_ATTEMPTS";
    pub const INVOCATION_TIMEOUT_SECS: &str = "INVOCATION_TIMEOUT_SECS";
    pub const SCHEDULE_INTERVAL_SECS: &str = "SCHEDULE_INTERVAL_SECS";
    pub const FAIL_FAST_ON_INVALID_ENDPOINT: &str = "FAIL_FAST_ON_INVALID_ENDPOINT";
    pub const HTTP_PORT: &str = "HTTP_PORT";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
}
