//! # Vault KV v2 Provider
//!
//! Native REST implementation of [`SecretStore`] for HashiCorp Vault's KV v2
//! secrets engine. Uses reqwest (rustls) for HTTP.
//!
//! - read: `GET /v1/{mount}/data/{path}`
//! - write: `POST /v1/{mount}/data/{path}` with `options.cas`
//! - connect probe: `GET /v1/auth/token/lookup-self`
//!
//! References:
//! - [KV v2 API](https://developer.hashicorp.com/vault/api-docs/secret/kv/kv-v2)
//! - [Token lookup-self](https://developer.hashicorp.com/vault/api-docs/auth/token#lookup-a-token-self)

use crate::provider::{StoreConnector, StoreEndpoint, StoreError};
use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use std::time::Duration;
use tracing::{debug, warn};

mod operations;
mod requests;
mod responses;

use responses::{TokenLookupResponse, VaultErrorResponse};

/// TLS settings for connections to Vault
///
/// Certificate validation is on unless `skip_verify` is explicitly set.
#[derive(Clone, Default)]
pub struct VaultTlsConfig {
    /// Accept any server certificate. Insecure; intended for cluster bring-up
    /// against self-signed Vault deployments only.
    pub skip_verify: bool,
    /// Additional PEM-encoded root certificate to trust
    pub ca_cert_pem: Option<Vec<u8>>,
}

impl std::fmt::Debug for VaultTlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultTlsConfig")
            .field("skip_verify", &self.skip_verify)
            .field("ca_cert_pem", &self.ca_cert_pem.as_ref().map(Vec::len))
            .finish()
    }
}

/// Vault KV v2 REST client
pub struct VaultKv2Client {
    http_client: reqwest::Client,
    base_url: Url,
    token: String,
    namespace: Option<String>,
}

impl std::fmt::Debug for VaultKv2Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultKv2Client")
            .field("base_url", &self.base_url.as_str())
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

/// Parse and check a store address. Only `http` and `https` are accepted.
pub fn parse_address(address: &str) -> Result<Url, StoreError> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(StoreError::InvalidEndpoint("store address is empty".to_string()));
    }
    let url = Url::parse(trimmed)
        .map_err(|e| StoreError::InvalidEndpoint(format!("'{trimmed}': {e}")))?;
    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(StoreError::InvalidEndpoint(format!(
                "'{trimmed}': unsupported scheme '{other}'"
            )))
        }
    }
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(StoreError::InvalidEndpoint(format!("'{trimmed}': missing host")));
    }
    Ok(url)
}

impl VaultKv2Client {
    fn user_agent() -> String {
        format!("vault-initializer/{}", env!("CARGO_PKG_VERSION"))
    }

    /// Build a client for `endpoint`. No request is made.
    ///
    /// # Errors
    /// Returns [`StoreError::InvalidEndpoint`] for an empty or malformed address
    /// and [`StoreError::Client`] if the HTTP client cannot be built.
    pub fn new(
        endpoint: &StoreEndpoint,
        tls: &VaultTlsConfig,
        request_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let base_url = parse_address(&endpoint.address)?;

        let mut builder = reqwest::Client::builder()
            .user_agent(Self::user_agent())
            .timeout(request_timeout);

        if tls.skip_verify {
            warn!(
                vault.address = %base_url,
                "TLS certificate validation is DISABLED for Vault connections \
                 (VAULT_SKIP_TLS_VERIFY=true)"
            );
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(pem) = &tls.ca_cert_pem {
            let certs = reqwest::Certificate::from_pem_bundle(pem)
                .map_err(|e| StoreError::Client(format!("invalid CA certificate: {e}")))?;
            if certs.is_empty() {
                return Err(StoreError::Client(
                    "invalid CA certificate: no PEM certificate found".to_string(),
                ));
            }
            for cert in certs {
                builder = builder.add_root_certificate(cert);
            }
        }

        let http_client = builder
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url,
            token: endpoint.token.clone(),
            namespace: endpoint.namespace.clone(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// `{base}/v1/{segments...}`, each segment percent-encoded
    fn api_url(&self, segments: &[&str]) -> Result<Url, StoreError> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|()| {
                StoreError::InvalidEndpoint(format!("'{}' cannot be a base URL", self.base_url))
            })?;
            path.pop_if_empty().push("v1");
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        Ok(url)
    }

    /// `{base}/v1/{mount}/data/{path}`
    fn kv_data_url(&self, mount: &str, path: &str) -> Result<Url, StoreError> {
        self.api_url(&[mount, "data", path])
    }

    /// Build HTTP request with authentication headers
    fn make_request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let mut request = self
            .http_client
            .request(method, url)
            .header("X-Vault-Token", &self.token)
            .header("Accept", "application/json");
        if let Some(namespace) = &self.namespace {
            request = request.header("X-Vault-Namespace", namespace);
        }
        request
    }

    /// Verify the store is reachable and the token is accepted
    ///
    /// # Errors
    /// Any network failure or non-success status.
    pub async fn verify_token(&self) -> Result<(), StoreError> {
        let url = self.api_url(&["auth", "token", "lookup-self"])?;
        let response = self
            .make_request(Method::GET, url)
            .send()
            .await
            .map_err(StoreError::Network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_error_status(status, &body, "auth/token/lookup-self"));
        }

        match response.json::<TokenLookupResponse>().await {
            Ok(lookup) => debug!(
                token.display_name = lookup.data.display_name.as_deref().unwrap_or("unknown"),
                token.ttl = lookup.data.ttl.unwrap_or_default(),
                "Vault token verified"
            ),
            Err(e) => debug!("Vault token verified (lookup body not parsed: {})", e),
        }
        Ok(())
    }
}

/// Map a non-success Vault response to a [`StoreError`]
fn map_error_status(status: StatusCode, body: &str, target: &str) -> StoreError {
    let message = serde_json::from_str::<VaultErrorResponse>(body)
        .ok()
        .filter(|e| !e.errors.is_empty())
        .map_or_else(|| body.trim().to_string(), |e| e.errors.join("; "));

    match status.as_u16() {
        401 | 403 => StoreError::Unauthorized(status.as_u16()),
        400 if message.contains("check-and-set") => StoreError::CasMismatch(target.to_string()),
        429 | 500..=599 => StoreError::Unavailable {
            status: status.as_u16(),
            message,
        },
        other => StoreError::Api {
            status: other,
            message,
        },
    }
}

/// Connector producing verified [`VaultKv2Client`]s
#[derive(Debug, Clone)]
pub struct VaultConnector {
    tls: VaultTlsConfig,
    request_timeout: Duration,
}

impl VaultConnector {
    #[must_use]
    pub fn new(tls: VaultTlsConfig, request_timeout: Duration) -> Self {
        Self {
            tls,
            request_timeout,
        }
    }
}

#[async_trait]
impl StoreConnector for VaultConnector {
    type Store = VaultKv2Client;

    async fn try_connect(&self, endpoint: &StoreEndpoint) -> Result<VaultKv2Client, StoreError> {
        let client = VaultKv2Client::new(endpoint, &self.tls, self.request_timeout)?;
        client.verify_token().await?;
        Ok(client)
    }
}
