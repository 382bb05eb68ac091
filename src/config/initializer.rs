//! # Initializer Configuration
//!
//! Settings loaded from environment variables, with defaults from
//! [`crate::constants`].

use crate::constants::{self, env};
use crate::controller::backoff::RetryPolicy;
use crate::controller::reconciler::{ReconcileError, SecretBundle, SecretTarget};
use crate::provider::vault::VaultTlsConfig;
use crate::provider::StoreEndpoint;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required environment variable {0} is not set")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to read CA certificate {path}: {source}")]
    CaCert {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid secret bundle: {0}")]
    Bundle(#[from] ReconcileError),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Text,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "text" | "pretty" | "plain" => Ok(LogFormat::Text),
            other => Err(format!("expected 'json' or 'text', got '{other}'")),
        }
    }
}

/// Initializer-level configuration
#[derive(Debug, Clone)]
pub struct InitializerConfig {
    /// Store address and credentials. The address may be empty when it is
    /// only ever supplied through the HTTP trigger.
    pub endpoint: StoreEndpoint,
    /// Bundle written when the secret is missing
    pub desired: SecretBundle,
    /// Mount/path of the bundle
    pub target: SecretTarget,
    /// TLS settings for Vault connections
    pub tls: VaultTlsConfig,
    /// Timeout for a single Vault request
    pub request_timeout: Duration,
    /// Backoff between connector and reconciler attempts
    pub retry: RetryPolicy,
    /// Upper bound on one invocation; `None` lets it retry indefinitely
    pub invocation_timeout: Option<Duration>,
    /// Timer trigger period
    pub schedule_interval: Duration,
    /// Treat an empty/malformed store address as fatal instead of retrying
    pub fail_fast_on_invalid_endpoint: bool,
    /// Port of the HTTP trigger, metrics and probe server
    pub http_port: u16,
    pub log_format: LogFormat,
}

impl InitializerConfig {
    /// Configuration with defaults for everything but the endpoint and bundle
    #[must_use]
    pub fn new(endpoint: StoreEndpoint, desired: SecretBundle) -> Self {
        Self {
            endpoint,
            desired,
            target: SecretTarget::default(),
            tls: VaultTlsConfig::default(),
            request_timeout: Duration::from_secs(constants::DEFAULT_VAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            invocation_timeout: Some(Duration::from_secs(
                constants::DEFAULT_INVOCATION_TIMEOUT_SECS,
            )),
            schedule_interval: Duration::from_secs(constants::DEFAULT_SCHEDULE_INTERVAL_SECS),
            fail_fast_on_invalid_endpoint: false,
            http_port: constants::DEFAULT_HTTP_PORT,
            log_format: LogFormat::default(),
        }
    }

    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    /// Missing required variables (`VAULT_SECRET`, `JWTSecret`, `JWTIssuer`),
    /// unparsable values, or an unreadable `VAULT_CACERT`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    ///
    /// # Errors
    /// See [`InitializerConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let token = vars.required(env::VAULT_TOKEN)?;
        let endpoint = StoreEndpoint::new(vars.string(env::VAULT_ADDR).unwrap_or_default(), token)
            .with_namespace(vars.string(env::VAULT_NAMESPACE));

        let desired = SecretBundle::new(
            vars.required(env::JWT_SECRET)?,
            vars.required(env::JWT_ISSUER)?,
        )?;

        let ca_cert_pem = match vars.string(env::VAULT_CACERT) {
            Some(path) => {
                let path = PathBuf::from(path);
                Some(std::fs::read(&path).map_err(|source| ConfigError::CaCert { path, source })?)
            }
            None => None,
        };

        let retry = RetryPolicy::fixed(Duration::from_secs(vars.parsed(
            env::RETRY_INTERVAL_SECS,
            constants::DEFAULT_RETRY_INTERVAL_SECS,
        )?))
        .with_max_attempts(vars.parsed_opt::<u32>(env::RETRY_MAX_ATTEMPTS)?);

        let invocation_timeout_secs = vars.parsed(
            env::INVOCATION_TIMEOUT_SECS,
            constants::DEFAULT_INVOCATION_TIMEOUT_SECS,
        )?;

        let schedule_interval_secs = vars.parsed(
            env::SCHEDULE_INTERVAL_SECS,
            constants::DEFAULT_SCHEDULE_INTERVAL_SECS,
        )?;
        if schedule_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                name: env::SCHEDULE_INTERVAL_SECS,
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            endpoint,
            desired,
            target: SecretTarget::default(),
            tls: VaultTlsConfig {
                skip_verify: vars.bool(env::VAULT_SKIP_TLS_VERIFY, false),
                ca_cert_pem,
            },
            request_timeout: Duration::from_secs(vars.parsed(
                env::VAULT_REQUEST_TIMEOUT_SECS,
                constants::DEFAULT_VAULT_REQUEST_TIMEOUT_SECS,
            )?),
            retry,
            invocation_timeout: (invocation_timeout_secs > 0)
                .then(|| Duration::from_secs(invocation_timeout_secs)),
            schedule_interval: Duration::from_secs(schedule_interval_secs),
            fail_fast_on_invalid_endpoint: vars.bool(env::FAIL_FAST_ON_INVALID_ENDPOINT, false),
            http_port: vars.parsed(env::HTTP_PORT, constants::DEFAULT_HTTP_PORT)?,
            log_format: vars.parsed(env::LOG_FORMAT, LogFormat::default())?,
        })
    }
}

/// Typed access to a variable source. Blank values count as unset.
struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.string(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed_opt<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|value| {
                let parsed = value.trim().parse::<T>();
                parsed.map_err(|e| ConfigError::Invalid {
                    name: key,
                    reason: e.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        Ok(self.parsed_opt(key)?.unwrap_or(default))
    }

    fn bool(&self, key: &str, default: bool) -> bool {
        self.string(key)
            .map(|v| {
                let v_lower = v.trim().to_lowercase();
                v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
            })
            .unwrap_or(default)
    }
}
