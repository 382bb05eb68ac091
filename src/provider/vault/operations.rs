//! # KV v2 Operations
//!
//! Implementation of [`SecretStore`] for the Vault KV v2 REST API.

use super::requests::KvWriteRequest;
use super::responses::{KvReadResponse, KvWriteResponse};
use super::{map_error_status, VaultKv2Client};
use crate::observability::metrics;
use crate::provider::{SecretData, SecretStore, StoreError, VersionedSecret};
use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use std::time::Instant;
use tracing::{debug, info_span, Instrument};

/// Record a transport failure (no response, or a truncated body)
fn network_failure(
    operation: &'static str,
    start: Instant,
) -> impl FnOnce(reqwest::Error) -> StoreError {
    move |e| {
        metrics::record_store_operation(operation, "network_error", start);
        StoreError::Network(e)
    }
}

#[async_trait]
impl SecretStore for VaultKv2Client {
    async fn read_secret(
        &self,
        mount: &str,
        path: &str,
    ) -> Result<Option<VersionedSecret>, StoreError> {
        let span = info_span!("vault.kv2.read", kv.mount = mount, kv.path = path);
        async move {
            let start = Instant::now();
            let url = self.kv_data_url(mount, path)?;
            let response = self
                .make_request(Method::GET, url)
                .send()
                .await
                .map_err(network_failure("read", start))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(network_failure("read", start))?;

            if status == StatusCode::NOT_FOUND {
                // A soft-deleted latest version still has metadata; report it as
                // present-but-empty so a write can target its version.
                let deleted = serde_json::from_str::<KvReadResponse>(&body)
                    .ok()
                    .filter(|r| r.data.metadata.version > 0);
                metrics::record_store_operation("read", "not_found", start);
                return Ok(deleted.map(|r| {
                    debug!(
                        version = r.data.metadata.version,
                        deletion_time = %r.data.metadata.deletion_time,
                        destroyed = r.data.metadata.destroyed,
                        "Latest secret version is deleted"
                    );
                    VersionedSecret {
                        data: SecretData::new(),
                        version: r.data.metadata.version,
                    }
                }));
            }

            if !status.is_success() {
                metrics::record_store_operation("read", "error", start);
                return Err(map_error_status(status, &body, &format!("{mount}/{path}")));
            }

            let parsed: KvReadResponse = serde_json::from_str(&body).map_err(|e| {
                metrics::record_store_operation("read", "error", start);
                StoreError::InvalidResponse(format!("reading {mount}/{path}: {e}"))
            })?;

            metrics::record_store_operation("read", "success", start);
            Ok(Some(VersionedSecret {
                data: parsed.data.data.unwrap_or_default(),
                version: parsed.data.metadata.version,
            }))
        }
        .instrument(span)
        .await
    }

    async fn write_secret(
        &self,
        mount: &str,
        path: &str,
        data: &SecretData,
        cas: Option<u64>,
    ) -> Result<u64, StoreError> {
        let span = info_span!(
            "vault.kv2.write",
            kv.mount = mount,
            kv.path = path,
            kv.cas = cas
        );
        async move {
            let start = Instant::now();
            let url = self.kv_data_url(mount, path)?;
            let response = self
                .make_request(Method::POST, url)
                .json(&KvWriteRequest::new(data, cas))
                .send()
                .await
                .map_err(network_failure("write", start))?;

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(network_failure("write", start))?;

            if !status.is_success() {
                let error = map_error_status(status, &body, &format!("{mount}/{path}"));
                let label = if matches!(error, StoreError::CasMismatch(_)) {
                    "cas_mismatch"
                } else {
                    "error"
                };
                metrics::record_store_operation("write", label, start);
                return Err(error);
            }

            let parsed: KvWriteResponse = serde_json::from_str(&body).map_err(|e| {
                metrics::record_store_operation("write", "error", start);
                StoreError::InvalidResponse(format!("writing {mount}/{path}: {e}"))
            })?;

            metrics::record_store_operation("write", "success", start);
            debug!(version = parsed.data.version, "Secret version written");
            Ok(parsed.data.version)
        }
        .instrument(span)
        .await
    }
}
