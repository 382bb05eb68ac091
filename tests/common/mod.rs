//! Common test utilities
//!
//! In-memory [`SecretStore`] with KV v2 check-and-set semantics and a
//! scripted [`StoreConnector`]. Timestamps use tokio's clock so tests can run
//! with paused time.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use tokio::time::Instant;
use vault_initializer::config::InitializerConfig;
use vault_initializer::controller::backoff::RetryPolicy;
use vault_initializer::controller::reconciler::SecretBundle;
use vault_initializer::provider::{
    SecretData, SecretStore, StoreConnector, StoreEndpoint, StoreError, VersionedSecret,
};

pub const JWT_SECRET: &str = "test-jwt-signing-secret";
pub const JWT_ISSUER: &str = "https://auth.example.test";
pub const VAULT_ADDR: &str = "http://vault.test:8200";

static RUSTLS_INIT: Once = Once::new();

/// Install the rustls crypto provider once per test binary
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub fn bundle() -> SecretBundle {
    SecretBundle::new(JWT_SECRET, JWT_ISSUER).expect("valid bundle")
}

pub fn expected_data() -> SecretData {
    data(&[
        ("secret", json!(JWT_SECRET)),
        ("issuer", json!(JWT_ISSUER)),
        ("internalApiKey", json!("ThySevenSecretInternalApiKey")),
    ])
}

pub fn data(pairs: &[(&str, Value)]) -> SecretData {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

pub fn unavailable() -> StoreError {
    StoreError::Unavailable {
        status: 503,
        message: "Vault is sealed".to_string(),
    }
}

pub fn api_error() -> StoreError {
    StoreError::Api {
        status: 500,
        message: "internal error".to_string(),
    }
}

/// Config with a 5 s fixed backoff and no invocation timeout
pub fn config(address: &str) -> InitializerConfig {
    let mut config = InitializerConfig::new(StoreEndpoint::new(address, "test-token"), bundle());
    config.retry = RetryPolicy::default();
    config.invocation_timeout = None;
    config
}

/// Log output captured from a thread-local subscriber
#[derive(Debug, Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// Route this thread's events into a fresh buffer until the guard drops
    pub fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let logs = Self::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        (logs, tracing::subscriber::set_default(subscriber))
    }

    /// Number of log lines containing `needle`
    pub fn count(&self, needle: &str) -> usize {
        let bytes = self.0.lock().expect("poisoned");
        String::from_utf8_lossy(&bytes)
            .lines()
            .filter(|line| line.contains(needle))
            .count()
    }
}

impl std::io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("poisoned").extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// A recorded write call
#[derive(Debug, Clone)]
pub struct WriteCall {
    pub data: SecretData,
    pub cas: Option<u64>,
    pub at: Instant,
}

#[derive(Default)]
struct MockState {
    secret: Option<VersionedSecret>,
    read_faults: VecDeque<StoreError>,
    write_faults: VecDeque<StoreError>,
    hang_reads: bool,
    discard_writes: bool,
    /// Applied just before our next write, as if another process won the race
    racing_writer: Option<SecretData>,
    reads: Vec<Instant>,
    writes: Vec<WriteCall>,
}

/// In-memory KV v2 path. Clones share state.
#[derive(Clone, Default)]
pub struct MockStore {
    state: Arc<Mutex<MockState>>,
}

impl MockStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_secret(data: SecretData, version: u64) -> Self {
        let store = Self::default();
        store.lock().secret = Some(VersionedSecret { data, version });
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock store poisoned")
    }

    /// Fail the next `n` reads with errors produced by `fault`
    pub fn fail_reads(&self, n: usize, fault: fn() -> StoreError) -> &Self {
        self.lock().read_faults.extend((0..n).map(|_| fault()));
        self
    }

    /// Fail the next `n` writes with errors produced by `fault`
    pub fn fail_writes(&self, n: usize, fault: fn() -> StoreError) -> &Self {
        self.lock().write_faults.extend((0..n).map(|_| fault()));
        self
    }

    /// Every read blocks forever
    pub fn hang_reads(&self) -> &Self {
        self.lock().hang_reads = true;
        self
    }

    /// Writes are acknowledged but not persisted
    pub fn discard_writes(&self) -> &Self {
        self.lock().discard_writes = true;
        self
    }

    /// Another writer stores `data` right before our next write
    pub fn race_next_write(&self, data: SecretData) -> &Self {
        self.lock().racing_writer = Some(data);
        self
    }

    pub fn current(&self) -> Option<VersionedSecret> {
        self.lock().secret.clone()
    }

    pub fn read_count(&self) -> usize {
        self.lock().reads.len()
    }

    pub fn read_times(&self) -> Vec<Instant> {
        self.lock().reads.clone()
    }

    pub fn writes(&self) -> Vec<WriteCall> {
        self.lock().writes.clone()
    }
}

impl std::fmt::Debug for MockStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SecretStore for MockStore {
    async fn read_secret(
        &self,
        _mount: &str,
        _path: &str,
    ) -> Result<Option<VersionedSecret>, StoreError> {
        let hang = {
            let mut state = self.lock();
            state.reads.push(Instant::now());
            state.hang_reads
        };
        if hang {
            std::future::pending::<()>().await;
        }

        let mut state = self.lock();
        if let Some(fault) = state.read_faults.pop_front() {
            return Err(fault);
        }
        Ok(state.secret.clone())
    }

    async fn write_secret(
        &self,
        mount: &str,
        path: &str,
        data: &SecretData,
        cas: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut state = self.lock();
        state.writes.push(WriteCall {
            data: data.clone(),
            cas,
            at: Instant::now(),
        });

        if let Some(fault) = state.write_faults.pop_front() {
            return Err(fault);
        }

        if let Some(winner) = state.racing_writer.take() {
            let version = state.secret.as_ref().map_or(0, |s| s.version) + 1;
            state.secret = Some(VersionedSecret {
                data: winner,
                version,
            });
        }

        let current = state.secret.as_ref().map_or(0, |s| s.version);
        if let Some(cas) = cas {
            if cas != current {
                return Err(StoreError::CasMismatch(format!("{mount}/{path}")));
            }
        }

        let version = current + 1;
        if !state.discard_writes {
            state.secret = Some(VersionedSecret {
                data: data.clone(),
                version,
            });
        }
        Ok(version)
    }
}

/// Connector that fails a scripted number of times before handing out a
/// [`MockStore`]. An empty address always fails with `InvalidEndpoint`.
#[derive(Debug)]
pub struct MockConnector {
    store: MockStore,
    failures: Mutex<u32>,
    hang: bool,
    attempts: Mutex<Vec<(String, Instant)>>,
}

impl MockConnector {
    pub fn new(store: MockStore) -> Self {
        Self {
            store,
            failures: Mutex::new(0),
            hang: false,
            attempts: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `n` attempts as if Vault were down
    pub fn failing(self, n: u32) -> Self {
        *self.failures.lock().expect("poisoned") = n;
        self
    }

    /// Every attempt blocks forever
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn store(&self) -> &MockStore {
        &self.store
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().expect("poisoned").len()
    }

    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .expect("poisoned")
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.attempts
            .lock()
            .expect("poisoned")
            .iter()
            .map(|(address, _)| address.clone())
            .collect()
    }
}

#[async_trait]
impl StoreConnector for MockConnector {
    type Store = MockStore;

    async fn try_connect(&self, endpoint: &StoreEndpoint) -> Result<MockStore, StoreError> {
        self.attempts
            .lock()
            .expect("poisoned")
            .push((endpoint.address.clone(), Instant::now()));

        if self.hang {
            std::future::pending::<()>().await;
        }
        if !endpoint.has_address() {
            return Err(StoreError::InvalidEndpoint("address is empty".to_string()));
        }

        let mut failures = self.failures.lock().expect("poisoned");
        if *failures > 0 {
            *failures -= 1;
            return Err(unavailable());
        }
        Ok(self.store.clone())
    }
}
