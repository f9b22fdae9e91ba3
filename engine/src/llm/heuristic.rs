//! Deterministic offline judge
//!
//! Stands in for a language model when none is configured. It looks for the
//! kinds of problems a reviewer would flag (empty fields, missing metadata,
//! records with inconsistent shapes, distributions that do not sum to one,
//! visualizations without a title or data) and maps the issue count onto a
//! verdict.

use async_trait::async_trait;
use sdk::capability::Judge;
use sdk::errors::EngineError;
use sdk::types::{Assessment, JudgeVerdict, ReviewRequest};
use serde_json::Value;
use std::collections::BTreeSet;

const SUM_TOLERANCE: f64 = 0.01;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicJudge;

impl HeuristicJudge {
    pub fn new() -> Self {
        Self
    }

    /// Collect (issue, suggestion) pairs for an output
    pub fn inspect(&self, output: &Value) -> Vec<(String, String)> {
        let mut findings = Vec::new();

        let Some(fields) = output.as_object() else {
            findings.push((
                "Output is not a JSON object".to_string(),
                "Return a structured object with named fields".to_string(),
            ));
            return findings;
        };

        for (key, value) in fields {
            if is_blank(value) {
                findings.push((
                    format!("Field '{}' is empty", key),
                    format!("Populate '{}' or remove it", key),
                ));
            }
        }

        if !fields.contains_key("metadata") {
            findings.push((
                "Output has no metadata".to_string(),
                "Include a metadata object describing provenance".to_string(),
            ));
        }

        if let Some(records) = fields.get("data").and_then(Value::as_array) {
            if !records_share_shape(records) {
                findings.push((
                    "Records have inconsistent fields".to_string(),
                    "Normalize records to a common schema".to_string(),
                ));
            }
        }

        if let Some(distribution) = fields
            .get("analysis_results")
            .and_then(|r| r.get("sentiment_distribution"))
            .and_then(Value::as_object)
        {
            let total: f64 = distribution.values().filter_map(Value::as_f64).sum();
            if (total - 1.0).abs() > SUM_TOLERANCE {
                findings.push((
                    format!("Sentiment distribution sums to {:.2}", total),
                    "Normalize the distribution so fractions sum to 1".to_string(),
                ));
            }
        }

        if let Some(visualizations) = fields.get("visualizations").and_then(Value::as_array) {
            for (index, viz) in visualizations.iter().enumerate() {
                if viz.get("title").map_or(true, is_blank) || viz.get("data").map_or(true, is_blank) {
                    findings.push((
                        format!("Visualization {} lacks a title or data", index),
                        "Give every visualization a title and data".to_string(),
                    ));
                }
            }
        }

        findings
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn records_share_shape(records: &[Value]) -> bool {
    let mut shapes = records.iter().filter_map(Value::as_object).map(|record| {
        record.keys().map(String::as_str).collect::<BTreeSet<_>>()
    });
    match shapes.next() {
        Some(first) => shapes.all(|shape| shape == first),
        None => true,
    }
}

#[async_trait]
impl Judge for HeuristicJudge {
    fn name(&self) -> &str {
        "heuristic"
    }

    async fn judge(&self, request: &ReviewRequest) -> Result<JudgeVerdict, EngineError> {
        let findings = self.inspect(&request.output);

        let (assessment, confidence) = match findings.len() {
            0 => (Assessment::Valid, 90.0),
            1..=2 => (Assessment::PartiallyValid, 70.0),
            _ => (Assessment::Invalid, 40.0),
        };

        tracing::debug!(
            "Heuristic judge: {}.{} -> {} ({} issues)",
            request.agent,
            request.task,
            assessment.as_str(),
            findings.len()
        );

        let (issues, suggestions) = findings.into_iter().unzip();
        Ok(JudgeVerdict {
            assessment,
            confidence,
            issues,
            suggestions,
        })
    }
}
