//! Compiles and evaluates the JMESPath-style selector expressions used to pull
//! an idempotency key (and, optionally, a validation subtree) out of an
//! incoming event.
//!
//! The expression library itself is treated as opaque per scope — this module
//! only compiles an expression once and evaluates it against a JSON value,
//! translating "no match" into the [`SelectorOutcome::Missing`] sentinel.

use serde_json::Value;

use crate::error::{Error, Result};

/// Outcome of evaluating a [`Selector`] against an event.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectorOutcome {
    /// The selector matched; holds the resulting subtree (primitive, array,
    /// or object).
    Value(Value),
    /// The selector produced no match (JMESPath's `null` result).
    Missing,
}

/// A precompiled selector expression.
///
/// Compiled once at configuration time and reused for every invocation —
/// never recompiled per event.
pub struct Selector {
    source: String,
    expr: jmespath::Expression<'static>,
}

impl std::fmt::Debug for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Selector").field("source", &self.source).finish()
    }
}

impl Selector {
    /// Compile `expression`. Fails with [`Error::ConfigurationError`] on a
    /// malformed expression.
    pub fn compile(expression: &str) -> Result<Self> {
        let expr = jmespath::compile(expression).map_err(|e| {
            Error::ConfigurationError(format!("invalid selector `{expression}`: {e}"))
        })?;
        Ok(Self {
            source: expression.to_string(),
            expr,
        })
    }

    /// The original expression source, for logging/error messages.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the expression against `event`.
    pub fn evaluate(&self, event: &Value) -> Result<SelectorOutcome> {
        let result = self
            .expr
            .search(event.clone())
            .map_err(|e| Error::persistence(format!("selector evaluation failed: {e}")))?;

        if result.is_null() {
            return Ok(SelectorOutcome::Missing);
        }

        let value = serde_json::to_value(&*result)?;
        Ok(SelectorOutcome::Value(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn compile_rejects_malformed_expression() {
        let err = Selector::compile("..(").unwrap_err();
        assert!(matches!(err, Error::ConfigurationError(_)));
    }

    #[test]
    fn evaluate_returns_matched_subtree() {
        let selector = Selector::compile("address").unwrap();
        let event = json!({"address": "https://x", "amount": 5});
        match selector.evaluate(&event).unwrap() {
            SelectorOutcome::Value(v) => assert_eq!(v, json!("https://x")),
            SelectorOutcome::Missing => panic!("expected a match"),
        }
    }

    #[test]
    fn evaluate_returns_missing_when_field_absent() {
        let selector = Selector::compile("nonexistent").unwrap();
        let event = json!({"address": "https://x"});
        assert_eq!(selector.evaluate(&event).unwrap(), SelectorOutcome::Missing);
    }

    #[test]
    fn evaluate_can_select_nested_object_subtree() {
        let selector = Selector::compile("payload.user").unwrap();
        let event = json!({"payload": {"user": {"id": 1, "name": "a"}}});
        match selector.evaluate(&event).unwrap() {
            SelectorOutcome::Value(v) => assert_eq!(v, json!({"id": 1, "name": "a"})),
            SelectorOutcome::Missing => panic!("expected a match"),
        }
    }
}
