//! Rule-based validation
//!
//! Deterministic required-field checks keyed by (agent, task). Each rule
//! starts from a baseline of 85 and subtracts a fixed penalty per missing or
//! empty field, never going below 0. A rule reports the output as invalid
//! when its primary collection is missing or empty.

use async_trait::async_trait;
use sdk::errors::EngineError;
use sdk::types::AgentKind;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

use super::{clamp_score, TierReport, ValidationSubject, Validator, ValidatorTier};

/// Starting score for a registered rule
pub const RULE_BASELINE: f64 = 85.0;

/// Score for (agent, task) pairs with no registered rule
pub const UNREGISTERED_SCORE: f64 = 50.0;

/// Outcome of a rule check
#[derive(Debug, Clone, PartialEq)]
pub struct RuleVerdict {
    pub is_valid: bool,
    pub score: f64,
    pub message: String,
}

/// A deterministic check over one task's output
pub trait OutputRule: Send + Sync {
    fn check(&self, input: &Value, output: &Value) -> RuleVerdict;
}

/// Accumulates penalties from the baseline
struct Scorecard {
    score: f64,
    valid: bool,
    issues: Vec<String>,
}

impl Scorecard {
    fn new() -> Self {
        Self {
            score: RULE_BASELINE,
            valid: true,
            issues: Vec::new(),
        }
    }

    fn penalize(&mut self, penalty: f64, issue: impl Into<String>) {
        self.score -= penalty;
        self.issues.push(issue.into());
    }

    /// Penalize and mark the output invalid
    fn reject(&mut self, penalty: f64, issue: impl Into<String>) {
        self.valid = false;
        self.penalize(penalty, issue);
    }

    /// Check the primary collection; returns true when it has content
    fn require_collection(
        &mut self,
        output: &Value,
        field: &str,
        missing_penalty: f64,
        empty_penalty: f64,
    ) -> bool {
        match presence(output.get(field)) {
            Presence::Missing => {
                self.reject(missing_penalty, format!("Missing '{}' field", field));
                false
            }
            Presence::Empty => {
                self.reject(empty_penalty, format!("'{}' is empty", field));
                false
            }
            Presence::Present => true,
        }
    }

    /// Check `metadata` and, when present, its required keys
    fn require_metadata(
        &mut self,
        output: &Value,
        missing_penalty: f64,
        required: &[&str],
        field_penalty: f64,
    ) {
        match output.get("metadata").and_then(Value::as_object) {
            None => self.penalize(missing_penalty, "Missing 'metadata' field"),
            Some(metadata) => {
                for key in required {
                    if !metadata.contains_key(*key) {
                        self.penalize(field_penalty, format!("Metadata missing '{}'", key));
                    }
                }
            }
        }
    }

    fn finish(self) -> RuleVerdict {
        let message = if self.issues.is_empty() {
            "All required fields present".to_string()
        } else {
            self.issues.join("; ")
        };
        RuleVerdict {
            is_valid: self.valid,
            score: clamp_score(self.score),
            message,
        }
    }
}

enum Presence {
    Missing,
    Empty,
    Present,
}

fn presence(value: Option<&Value>) -> Presence {
    match value {
        None | Some(Value::Null) => Presence::Missing,
        Some(Value::Array(items)) if items.is_empty() => Presence::Empty,
        Some(Value::Object(map)) if map.is_empty() => Presence::Empty,
        Some(Value::String(s)) if s.is_empty() => Presence::Empty,
        Some(_) => Presence::Present,
    }
}

/// `extract_data` must yield records and source metadata
pub struct ExtractionRule;

impl OutputRule for ExtractionRule {
    fn check(&self, _input: &Value, output: &Value) -> RuleVerdict {
        let mut card = Scorecard::new();
        card.require_collection(output, "data", 40.0, 30.0);
        card.require_metadata(
            output,
            20.0,
            &["source", "record_count", "extraction_timestamp"],
            5.0,
        );
        card.finish()
    }
}

/// `analyze_data` must yield results and method metadata
pub struct AnalysisRule;

impl OutputRule for AnalysisRule {
    fn check(&self, _input: &Value, output: &Value) -> RuleVerdict {
        let mut card = Scorecard::new();
        card.require_collection(output, "analysis_results", 50.0, 30.0);
        card.require_metadata(
            output,
            15.0,
            &["analysis_timestamp", "analysis_methods"],
            5.0,
        );
        card.finish()
    }
}

/// `create_visualizations` must yield complete visualization descriptors
pub struct VisualizationRule;

const VISUALIZATION_FIELDS: [&str; 4] = ["id", "title", "type", "data"];

impl OutputRule for VisualizationRule {
    fn check(&self, _input: &Value, output: &Value) -> RuleVerdict {
        let mut card = Scorecard::new();
        if card.require_collection(output, "visualizations", 50.0, 40.0) {
            if let Some(items) = output.get("visualizations").and_then(Value::as_array) {
                for (i, viz) in items.iter().enumerate() {
                    let missing: Vec<&str> = VISUALIZATION_FIELDS
                        .iter()
                        .copied()
                        .filter(|field| viz.get(*field).is_none())
                        .collect();
                    if !missing.is_empty() {
                        card.penalize(
                            10.0,
                            format!("Visualization {} missing {}", i, missing.join(", ")),
                        );
                    }
                }
            }
        }
        if output.get("metadata").is_none() {
            card.penalize(10.0, "Missing 'metadata' field");
        }
        card.finish()
    }
}

/// Registry of rules keyed by agent and task
pub struct RuleValidator {
    rules: HashMap<(AgentKind, String), Arc<dyn OutputRule>>,
}

impl RuleValidator {
    /// An empty registry
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
        }
    }

    /// Registry with the rules for the three built-in pipeline stages
    pub fn with_default_rules() -> Self {
        let mut validator = Self::new();
        validator.register(
            AgentKind::DataExtraction,
            "extract_data",
            Arc::new(ExtractionRule),
        );
        validator.register(
            AgentKind::StatisticalAnalysis,
            "analyze_data",
            Arc::new(AnalysisRule),
        );
        validator.register(
            AgentKind::Visualization,
            "create_visualizations",
            Arc::new(VisualizationRule),
        );
        validator
    }

    pub fn register(
        &mut self,
        agent: AgentKind,
        task: impl Into<String>,
        rule: Arc<dyn OutputRule>,
    ) {
        self.rules.insert((agent, task.into()), rule);
    }

    pub fn check(
        &self,
        agent: &AgentKind,
        task: &str,
        input: &Value,
        output: &Value,
    ) -> RuleVerdict {
        match self.rules.get(&(agent.clone(), task.to_string())) {
            Some(rule) => rule.check(input, output),
            None => RuleVerdict {
                is_valid: true,
                score: UNREGISTERED_SCORE,
                message: format!("No validation rule defined for {}.{}", agent, task),
            },
        }
    }
}

impl Default for RuleValidator {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

#[async_trait]
impl Validator for RuleValidator {
    fn tier(&self) -> ValidatorTier {
        ValidatorTier::Rule
    }

    async fn validate(&self, subject: &ValidationSubject<'_>) -> Result<TierReport, EngineError> {
        let verdict = self.check(subject.agent, subject.task, subject.input, subject.output);
        tracing::debug!(
            "Rule check {}.{}: score={:.1} valid={}",
            subject.agent,
            subject.task,
            verdict.score,
            verdict.is_valid
        );
        Ok(TierReport {
            tier: ValidatorTier::Rule,
            is_valid: verdict.is_valid,
            score: verdict.score,
            details: json!({ "baseline": RULE_BASELINE }),
            message: verdict.message,
        })
    }
}
