//! # Provider Modules
//!
//! Abstract interface for the remote secrets store, and its Vault KV v2
//! implementation.
//!
//! The reconciler only ever talks to a [`SecretStore`]; a [`StoreConnector`]
//! produces one from a [`StoreEndpoint`]. Tests substitute in-memory
//! implementations of both.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod vault;

/// Key/value payload of a KV v2 secret. Values may be `null`.
pub type SecretData = BTreeMap<String, Value>;

/// Address and credentials of the secrets store
///
/// Immutable for the lifetime of an invocation. The token never appears in
/// `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreEndpoint {
    pub address: String,
    pub token: String,
    /// Vault Enterprise namespace, sent as `X-Vault-Namespace` when set
    pub namespace: Option<String>,
}

impl std::fmt::Debug for StoreEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreEndpoint")
            .field("address", &self.address)
            .field("token", &"***")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl StoreEndpoint {
    #[must_use]
    pub fn new(address: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            namespace: None,
        }
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace.filter(|ns| !ns.trim().is_empty());
        self
    }

    /// Same endpoint pointed at a different address
    #[must_use]
    pub fn with_address(&self, address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn has_address(&self) -> bool {
        !self.address.trim().is_empty()
    }
}

/// A secret as read from the store
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedSecret {
    pub data: SecretData,
    /// KV v2 metadata version of the data that was read
    pub version: u64,
}

/// Errors returned by store operations
///
/// "Not found" is not an error: reads return `Ok(None)` for a missing secret.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Endpoint is unusable before any request is made (empty or malformed address)
    #[error("invalid store endpoint: {0}")]
    InvalidEndpoint(String),

    /// Request never produced a response (DNS, refused connection, TLS, timeout)
    #[error("network error communicating with the store: {0}")]
    Network(#[source] reqwest::Error),

    /// Token rejected or lacks permission
    #[error("store authentication failed (status {0}), check token permissions")]
    Unauthorized(u16),

    /// Store is sealed, uninitialized or otherwise unavailable
    #[error("store unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    /// Check-and-set write rejected because the current version differs
    #[error("check-and-set version mismatch writing {0}")]
    CasMismatch(String),

    /// Any other non-success response
    #[error("store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// Response body could not be understood
    #[error("unexpected store response: {0}")]
    InvalidResponse(String),

    /// Client construction failed
    #[error("failed to build store client: {0}")]
    Client(String),
}

impl StoreError {
    /// Whether the error means the endpoint configuration itself is unusable
    #[must_use]
    pub fn is_invalid_endpoint(&self) -> bool {
        matches!(self, StoreError::InvalidEndpoint(_))
    }
}

/// Provider trait for the secrets store
///
/// Addressed by (mount point, path), following the KV v2 API.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Read the latest version of a secret. Returns `Ok(None)` if it does not exist.
    async fn read_secret(&self, mount: &str, path: &str)
        -> Result<Option<VersionedSecret>, StoreError>;

    /// Write a new version of a secret and return the version number created.
    ///
    /// With `cas = Some(v)` the write only succeeds if the current version is
    /// `v` (`0` meaning "must not exist"); otherwise [`StoreError::CasMismatch`].
    async fn write_secret(
        &self,
        mount: &str,
        path: &str,
        data: &SecretData,
        cas: Option<u64>,
    ) -> Result<u64, StoreError>;
}

/// Builds authenticated [`SecretStore`] clients
#[async_trait]
pub trait StoreConnector: Send + Sync {
    type Store: SecretStore;

    /// Make a single attempt at producing a verified, authenticated client
    async fn try_connect(&self, endpoint: &StoreEndpoint) -> Result<Self::Store, StoreError>;
}
