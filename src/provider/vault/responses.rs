//! # Response Structures
//!
//! JSON bodies returned by the Vault API. Only the fields the initializer
//! needs are modelled.

use crate::provider::SecretData;
use serde::Deserialize;

/// Response of `GET /v1/{mount}/data/{path}`
///
/// A soft-deleted latest version comes back as 404 with this same shape,
/// `data.data` set to `null` and `metadata.deletion_time` filled in.
#[derive(Debug, Deserialize)]
pub(crate) struct KvReadResponse {
    pub data: KvReadData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KvReadData {
    #[serde(default)]
    pub data: Option<SecretData>,
    pub metadata: KvVersionMetadata,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KvVersionMetadata {
    pub version: u64,
    #[serde(default)]
    pub deletion_time: String,
    #[serde(default)]
    pub destroyed: bool,
}

/// Response of `POST /v1/{mount}/data/{path}`
#[derive(Debug, Deserialize)]
pub(crate) struct KvWriteResponse {
    pub data: KvWriteData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct KvWriteData {
    pub version: u64,
}

/// Response of `GET /v1/auth/token/lookup-self`
#[derive(Debug, Deserialize)]
pub(crate) struct TokenLookupResponse {
    pub data: TokenLookupData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokenLookupData {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub ttl: Option<u64>,
}

/// Standard Vault error body: `{"errors": ["..."]}`
#[derive(Debug, Deserialize)]
pub(crate) struct VaultErrorResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_response_parses_kv2_shape() {
        let body = r#"{
            "request_id": "abc",
            "data": {
                "data": {"secret": "s", "issuer": null},
                "metadata": {
                    "created_time": "2024-01-01T00:00:00Z",
                    "deletion_time": "",
                    "destroyed": false,
                    "version": 3
                }
            }
        }"#;
        let parsed: KvReadResponse = serde_json::from_str(body).unwrap();
        let data = parsed.data.data.unwrap();
        assert_eq!(data["secret"], "s");
        assert!(data["issuer"].is_null());
        assert_eq!(parsed.data.metadata.version, 3);
    }

    #[test]
    fn test_read_response_parses_soft_deleted_version() {
        let body = r#"{"data": {"data": null, "metadata": {"deletion_time": "2024-01-02T00:00:00Z", "destroyed": false, "version": 2}}}"#;
        let parsed: KvReadResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.data.data.is_none());
        assert!(!parsed.data.metadata.deletion_time.is_empty());
    }
}
