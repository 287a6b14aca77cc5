//! Idempotency Guard
//!
//! Idempotency middleware for short-lived, stateless function invocations
//! running behind an event-driven compute platform. Wraps a user function so
//! that repeated invocations with the same logical payload within a
//! configured window return the same stored result instead of re-executing
//! side effects, coordinating concurrent duplicates through a
//! conditional-write persistence store.
//!
//! # Components
//!
//! - [`selector`]: compiles and evaluates the path expressions used to pull
//!   an idempotency key (and optionally a validation subtree) out of an event.
//! - [`key`]: canonical serialization and digest derivation.
//! - [`record`]: the persisted row shape and its state-machine transitions.
//! - [`store`]: the pluggable [`store::PersistenceStore`] trait plus an
//!   in-process and a DynamoDB-backed implementation.
//! - [`cache`]: the process-local bounded LRU of completed records.
//! - [`handler`]: [`handler::IdempotencyHandler`], the protocol orchestrator,
//!   and [`handler::wrap_handler`] for higher-order wrapping of user functions.
//! - [`config`]: immutable configuration, loaded via `figment`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod key;
pub mod record;
pub mod selector;
pub mod store;
pub mod time;

pub use error::{Error, Result};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global `tracing` subscriber.
///
/// `format` of `Some("json")` selects structured JSON output; anything else
/// falls back to human-readable text. Honors `RUST_LOG` if set, otherwise
/// defaults to `level`.
///
/// # Errors
///
/// Never fails today; returns `Result` for forward compatibility with
/// subscriber backends that can fail to initialize.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
