//! # Request Structures
//!
//! JSON bodies sent to the Vault KV v2 API.

use crate::provider::SecretData;
use serde::Serialize;

/// Body of `POST /v1/{mount}/data/{path}`
#[derive(Debug, Serialize)]
pub(crate) struct KvWriteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<KvWriteOptions>,
    pub data: &'a SecretData,
}

#[derive(Debug, Serialize)]
pub(crate) struct KvWriteOptions {
    /// Check-and-set version; `0` allows the write only if the key does not exist
    pub cas: u64,
}

impl<'a> KvWriteRequest<'a> {
    pub(crate) fn new(data: &'a SecretData, cas: Option<u64>) -> Self {
        Self {
            options: cas.map(|cas| KvWriteOptions { cas }),
            data,
        }
    }
}
