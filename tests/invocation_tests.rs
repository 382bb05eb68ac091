//! # Invocation and Scheduler Tests
//!
//! Endpoint resolution, in-process serialization of triggers, the invocation
//! timeout, and the timer loop. Paused time throughout.

mod common;

use common::{config, expected_data, MockConnector, MockStore, VAULT_ADDR};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vault_initializer::config::InitializerConfig;
use vault_initializer::controller::invocation::{
    Initializer, InvocationError, InvocationOutcome, TriggerSource,
};
use vault_initializer::runtime::scheduler::run_scheduler;

fn initializer(
    connector: MockConnector,
    config: InitializerConfig,
) -> Arc<Initializer<MockConnector>> {
    Arc::new(Initializer::new(connector, Arc::new(config)))
}

#[tokio::test(start_paused = true)]
async fn test_startup_invocation_creates_bundle() {
    let store = MockStore::empty();
    let init = initializer(MockConnector::new(store.clone()), config(VAULT_ADDR));

    let report = init
        .run(TriggerSource::Startup, None, &CancellationToken::new())
        .await
        .expect("not busy");

    assert_eq!(report.trigger, TriggerSource::Startup);
    assert_eq!(report.outcome, InvocationOutcome::Created { version: 1 });
    assert_eq!(report.connect_attempts, 1);
    assert_eq!(report.reconcile_attempts, 1);
    assert_eq!(store.current().map(|s| s.data), Some(expected_data()));
}

#[tokio::test(start_paused = true)]
async fn test_connect_retries_count_toward_report() {
    let init = initializer(
        MockConnector::new(MockStore::with_secret(expected_data(), 1)).failing(2),
        config(VAULT_ADDR),
    );

    let report = init
        .run(TriggerSource::Timer, None, &CancellationToken::new())
        .await
        .expect("not busy");

    assert_eq!(report.outcome, InvocationOutcome::AlreadyPresent);
    assert_eq!(report.connect_attempts, 3);
    assert_eq!(report.elapsed_ms, 10_000);
}

#[tokio::test(start_paused = true)]
async fn test_address_override_replaces_configured_address() {
    let init = initializer(MockConnector::new(MockStore::empty()), config(VAULT_ADDR));

    init.run(
        TriggerSource::Http,
        Some("http://10.0.0.7:8200"),
        &CancellationToken::new(),
    )
    .await
    .expect("not busy");
    init.run(TriggerSource::Http, Some("  "), &CancellationToken::new())
        .await
        .expect("not busy");

    assert_eq!(
        init.connector().addresses(),
        vec!["http://10.0.0.7:8200".to_string(), VAULT_ADDR.to_string()]
    );
    assert_eq!(
        init.resolve_endpoint(Some("http://10.0.0.7:8200")).address,
        "http://10.0.0.7:8200"
    );
    assert_eq!(init.resolve_endpoint(Some("  ")).address, VAULT_ADDR);
    assert_eq!(init.resolve_endpoint(None).address, VAULT_ADDR);
    assert_eq!(init.resolve_endpoint(None).token, "test-token");
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_trigger_is_rejected_as_busy() {
    let init = initializer(
        MockConnector::new(MockStore::empty()).failing(u32::MAX),
        config(VAULT_ADDR),
    );
    let shutdown = CancellationToken::new();

    let (first, second) = tokio::join!(
        init.run(TriggerSource::Timer, None, &shutdown),
        async {
            let second = init.run(TriggerSource::Http, None, &shutdown).await;
            assert!(init.is_busy());
            tokio::time::sleep(Duration::from_secs(1)).await;
            shutdown.cancel();
            second
        }
    );

    assert!(matches!(second, Err(InvocationError::Busy)));
    let first = first.expect("first trigger should run");
    match first.outcome {
        InvocationOutcome::Failed { timed_out, reason } => {
            assert!(!timed_out);
            assert!(reason.contains("cancelled"), "{reason}");
        }
        other => panic!("expected Failed, got {other:?}"),
    }
    assert!(!init.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_invocation_timeout_cancels_retries() {
    let mut cfg = config(VAULT_ADDR);
    cfg.invocation_timeout = Some(Duration::from_secs(12));
    let init = initializer(MockConnector::new(MockStore::empty()).failing(u32::MAX), cfg);

    let report = init
        .run(TriggerSource::Http, None, &CancellationToken::new())
        .await
        .expect("not busy");

    match &report.outcome {
        InvocationOutcome::Failed { timed_out, reason } => {
            assert!(*timed_out);
            assert!(reason.starts_with("timed out after 12s"), "{reason}");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(report.outcome.as_str(), "timed_out");
    assert_eq!(report.connect_attempts, 3);
    assert_eq!(report.elapsed_ms, 12_000);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_during_reconcile() {
    let store = MockStore::empty();
    store.fail_reads(1000, common::unavailable);
    let mut cfg = config(VAULT_ADDR);
    cfg.invocation_timeout = Some(Duration::from_secs(32));
    let init = initializer(MockConnector::new(store), cfg);

    let report = init
        .run(TriggerSource::Timer, None, &CancellationToken::new())
        .await
        .expect("not busy");

    assert!(matches!(report.outcome, InvocationOutcome::Failed { timed_out: true, .. }));
    assert_eq!(report.connect_attempts, 1);
    // reads at 0, 5, .., 30 s; cancelled while waiting for the next one
    assert_eq!(report.reconcile_attempts, 7);
}

#[tokio::test(start_paused = true)]
async fn test_report_serializes_outcome_with_status_tag() {
    let init = initializer(MockConnector::new(MockStore::empty()), config(VAULT_ADDR));

    let report = init
        .run(TriggerSource::Cli, None, &CancellationToken::new())
        .await
        .expect("not busy");
    let value = serde_json::to_value(&report).expect("serializable");

    assert_eq!(value["trigger"], json!("cli"));
    assert_eq!(value["outcome"], json!({"status": "created", "version": 1}));
    assert_eq!(value["connect_attempts"], json!(1));
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_runs_each_period_until_shutdown() {
    let store = MockStore::empty();
    let init = initializer(MockConnector::new(store.clone()), config(VAULT_ADDR));
    let shutdown = CancellationToken::new();

    let (runs, ()) = tokio::join!(
        run_scheduler(Arc::clone(&init), Duration::from_secs(300), shutdown.clone()),
        async {
            tokio::time::sleep(Duration::from_secs(650)).await;
            shutdown.cancel();
        }
    );

    assert_eq!(runs, 2);
    // the first run creates, the second finds it present
    assert_eq!(store.writes().len(), 1);
    assert_eq!(store.read_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_scheduler_skips_ticks_without_address() {
    let store = MockStore::empty();
    let init = initializer(MockConnector::new(store.clone()), config(""));
    let shutdown = CancellationToken::new();

    let (runs, ()) = tokio::join!(
        run_scheduler(Arc::clone(&init), Duration::from_secs(60), shutdown.clone()),
        async {
            tokio::time::sleep(Duration::from_secs(200)).await;
            shutdown.cancel();
        }
    );

    assert_eq!(runs, 0);
    assert_eq!(store.read_count(), 0);
}
