//! End-to-end scenarios against the in-memory store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use idempotency_guard::config::IdempotencyConfig;
use idempotency_guard::handler::IdempotencyHandler;
use idempotency_guard::key::HashFunction;
use idempotency_guard::record::DataRecord;
use idempotency_guard::store::memory::MemoryStore;
use idempotency_guard::store::PersistenceStore;
use idempotency_guard::time::now_secs;
use idempotency_guard::Error;
use pretty_assertions::assert_eq;
use serde_json::json;

fn config() -> IdempotencyConfig {
    IdempotencyConfig {
        event_key_selector: "address".to_string(),
        function_name: "send_email".to_string(),
        hash_function: HashFunction::Sha256,
        ..Default::default()
    }
}

#[tokio::test]
async fn fresh_call_creates_then_completes_a_row() {
    let store = MemoryStore::new();
    let handler = IdempotencyHandler::new(config(), store.clone()).unwrap();
    let event = json!({"address": "https://x"});

    let response = handler
        .call(&event, |_event| async { Ok::<_, anyhow::Error>(json!({"ok": true})) })
        .await
        .unwrap();

    assert_eq!(response, json!({"ok": true}));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn warm_duplicate_within_ttl_replays_without_reexecuting() {
    let store = MemoryStore::new();
    let handler = IdempotencyHandler::new(config(), store).unwrap();
    let event = json!({"address": "https://x"});
    let executions = Arc::new(AtomicU32::new(0));

    let first_executions = Arc::clone(&executions);
    let first = handler
        .call(&event, move |_event| {
            first_executions.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(json!({"sent": 1})) }
        })
        .await
        .unwrap();

    let second_executions = Arc::clone(&executions);
    let second = handler
        .call(&event, move |_event| {
            second_executions.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, anyhow::Error>(json!({"sent": 2})) }
        })
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(executions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_duplicate_against_a_live_lease_fails_fast() {
    // Race two real invocations against a store that starts empty, instead of
    // pre-seeding an in-progress row: the winner's `put` succeeds and holds
    // its user function open on a sleep, so the loser's concurrent `put`
    // genuinely contends on the same key rather than observing a fixture.
    let handler = Arc::new(IdempotencyHandler::new(config(), MemoryStore::new()).unwrap());
    let event = json!({"address": "https://x"});

    let winner_handler = Arc::clone(&handler);
    let winner_event = event.clone();
    let winner = async move {
        winner_handler
            .call(&winner_event, |_event| async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                Ok::<_, anyhow::Error>(json!("done"))
            })
            .await
    };

    let loser_handler = Arc::clone(&handler);
    let loser_event = event.clone();
    let loser = async move {
        loser_handler
            .call(&loser_event, |_event| async { Ok::<_, anyhow::Error>(json!("racer")) })
            .await
    };

    let (first, second) = tokio::join!(winner, loser);

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|r| matches!(r, Err(Error::AlreadyInProgress(_))))
            .count(),
        1
    );
}

#[tokio::test]
async fn validation_subtree_mismatch_is_rejected() {
    let cfg = IdempotencyConfig {
        payload_validation_selector: Some("amount".to_string()),
        ..config()
    };
    let handler = IdempotencyHandler::new(cfg, MemoryStore::new()).unwrap();

    let first = json!({"address": "https://x", "amount": 5});
    handler
        .call(&first, |_event| async { Ok::<_, anyhow::Error>(json!("done")) })
        .await
        .unwrap();

    let second = json!({"address": "https://x", "amount": 6});
    let err = handler
        .call(&second, |_event| async { Ok::<_, anyhow::Error>(json!("done")) })
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PayloadValidationFailed));
}

#[tokio::test]
async fn expired_lease_is_overwritten_by_the_next_caller() {
    let store = MemoryStore::new();
    let handler = IdempotencyHandler::new(config(), store.clone()).unwrap();

    let key = idempotency_guard::key::derive_key(
        "send_email",
        None,
        &json!("https://x"),
        HashFunction::Sha256,
    );
    let lapsed = DataRecord::new_in_progress(key, now_secs(), 0, 3600, 30, None);
    store.put(&lapsed).await.unwrap();

    let event = json!({"address": "https://x"});
    let response = handler
        .call(&event, |_event| async { Ok::<_, anyhow::Error>(json!("recovered")) })
        .await
        .unwrap();

    assert_eq!(response, json!("recovered"));
}

#[tokio::test]
async fn kill_switch_bypasses_persistence_entirely() {
    let store = MemoryStore::new();
    let handler = IdempotencyHandler::new(config(), store.clone()).unwrap();

    std::env::set_var("IDEMPOTENCY_DISABLED", "true");
    let event = json!({"address": "https://x"});
    let response = handler
        .call(&event, |_event| async { Ok::<_, anyhow::Error>(json!("bypassed")) })
        .await
        .unwrap();
    std::env::remove_var("IDEMPOTENCY_DISABLED");

    assert_eq!(response, json!("bypassed"));
    assert!(store.is_empty());
}

#[tokio::test]
async fn failed_user_function_does_not_block_a_clean_retry() {
    let store = MemoryStore::new();
    let handler = IdempotencyHandler::new(config(), store.clone()).unwrap();
    let event = json!({"address": "https://x"});

    let err = handler
        .call(&event, |_event| async { Err::<serde_json::Value, _>(anyhow::anyhow!("boom")) })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::HandlerFailed(_)));
    assert!(store.is_empty());

    let response = handler
        .call(&event, |_event| async { Ok::<_, anyhow::Error>(json!("retried")) })
        .await
        .unwrap();
    assert_eq!(response, json!("retried"));
}
