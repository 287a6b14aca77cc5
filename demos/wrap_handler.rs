//! Demonstrates wrapping a user function with [`wrap_handler`] against the
//! in-memory store, and replaying a warm duplicate invocation.

use std::sync::Arc;

use idempotency_guard::config::IdempotencyConfig;
use idempotency_guard::handler::{wrap_handler, IdempotencyHandler};
use idempotency_guard::key::HashFunction;
use idempotency_guard::store::memory::MemoryStore;
use serde_json::{json, Value};

async fn send_email(event: Value) -> anyhow::Result<Value> {
    println!("sending email to {}", event["address"]);
    Ok(json!({ "status": "sent", "address": event["address"] }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    idempotency_guard::setup_tracing("info", None)?;

    let config = IdempotencyConfig {
        event_key_selector: "address".to_string(),
        function_name: "send_email".to_string(),
        hash_function: HashFunction::Sha256,
        use_local_cache: true,
        ..Default::default()
    };
    let handler = Arc::new(IdempotencyHandler::new(config, MemoryStore::new())?);

    let wrapped = wrap_handler(Arc::clone(&handler), send_email);

    let first = wrapped(json!({ "address": "user@example.com" })).await?;
    println!("first call: {first}");

    let second = wrapped(json!({ "address": "user@example.com" })).await?;
    println!("duplicate call (replayed, email not resent): {second}");

    Ok(())
}
