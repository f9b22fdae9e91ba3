//! Tiered output validation
//!
//! Three validators of increasing cost score a task output:
//!
//! 1. `rules`: deterministic required-field checks
//! 2. `embedding`: structural similarity to reference outputs
//! 3. `llm`: a judge model reviewing input and output
//!
//! The `evaluator` combines them into one confidence score and short-circuits
//! the LLM tier when the first two already clear the threshold. Every tier's
//! report is memoized in the `cache`.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::AgentKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod cache;
pub mod embedding;
pub mod evaluator;
pub mod llm;
pub mod rules;

pub use cache::{CacheStats, ValidationCache};
pub use embedding::{EmbeddingValidator, HashingEmbedder, ReferenceLibrary};
pub use evaluator::{ConfidenceBreakdown, ConfidenceEvaluator, EvaluatorSettings, TierWeights};
pub use llm::LlmValidator;
pub use rules::{OutputRule, RuleValidator, RuleVerdict};

/// Validator tiers, cheapest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidatorTier {
    Rule,
    Embedding,
    Llm,
}

impl ValidatorTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidatorTier::Rule => "rule",
            ValidatorTier::Embedding => "embedding",
            ValidatorTier::Llm => "llm",
        }
    }
}

/// The (agent, task, input, output) tuple under validation
#[derive(Debug, Clone, Copy)]
pub struct ValidationSubject<'a> {
    pub agent: &'a AgentKind,
    pub task: &'a str,
    pub input: &'a Value,
    pub output: &'a Value,
}

/// Result of one validator tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierReport {
    pub tier: ValidatorTier,
    pub is_valid: bool,
    /// 0-100
    pub score: f64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub details: Value,
}

/// A single validation tier
#[async_trait]
pub trait Validator: Send + Sync {
    fn tier(&self) -> ValidatorTier;

    async fn validate(&self, subject: &ValidationSubject<'_>) -> Result<TierReport, EngineError>;
}

/// Clamp a score into [0, 100]; non-finite scores become 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_finite() {
        score.clamp(0.0, 100.0)
    } else {
        0.0
    }
}

/// Serialize JSON with object keys sorted at every level
///
/// Used wherever a payload is hashed, so that logically equal payloads hash
/// equally regardless of key insertion order.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                if let Some(child) = map.get(key) {
                    write_canonical(child, out);
                }
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// BLAKE3 hex digest of a payload's canonical form
pub fn content_hash(value: &Value) -> String {
    blake3::hash(canonical_json(value).as_bytes())
        .to_hex()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clamp_score() {
        assert_eq!(clamp_score(-5.0), 0.0);
        assert_eq!(clamp_score(150.0), 100.0);
        assert_eq!(clamp_score(42.5), 42.5);
        assert_eq!(clamp_score(f64::NAN), 0.0);
        assert_eq!(clamp_score(f64::INFINITY), 0.0);
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let a = json!({"b": 1, "a": {"z": [1, {"y": 2, "x": 3}], "c": "s"}});
        assert_eq!(
            canonical_json(&a),
            r#"{"a":{"c":"s","z":[1,{"x":3,"y":2}]},"b":1}"#
        );
    }

    #[test]
    fn test_content_hash_ignores_key_order() {
        let mut first = serde_json::Map::new();
        first.insert("x".to_string(), json!(1));
        first.insert("y".to_string(), json!(2));
        let mut second = serde_json::Map::new();
        second.insert("y".to_string(), json!(2));
        second.insert("x".to_string(), json!(1));

        assert_eq!(
            content_hash(&Value::Object(first)),
            content_hash(&Value::Object(second))
        );
        assert_ne!(content_hash(&json!({"x": 1})), content_hash(&json!({"x": 2})));
    }
}
